use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};
use tokio::sync::RwLock;
use tracing_subscriber::fmt::MakeWriter;

use crate::distributor::{CrawlSummary, ProgressEvent};
use crate::export::WrittenOutputs;

#[derive(Clone, Copy, Debug, PartialEq, PartialOrd)]
pub enum VerbosityLevel {
    Summary = 0,  // Progress bar, run start and final summary
    Detailed = 1, // Per-domain rejections
    Debug = 2,    // Everything, including accepted domains
}

impl VerbosityLevel {
    pub fn from_verbose_count(count: u8) -> Self {
        match count {
            0 => VerbosityLevel::Summary,
            1 => VerbosityLevel::Detailed,
            2.. => VerbosityLevel::Debug,
        }
    }
}

/// User-facing progress and run summary. Cheap to clone; clones share state.
#[derive(Clone)]
pub struct CrawlLogger {
    verbosity: VerbosityLevel,
    progress_bar: Arc<RwLock<Option<ProgressBar>>>,
    metadata: Arc<Mutex<RunMetadata>>,
    log_buffer: Arc<Mutex<Vec<String>>>,
    log_file_path: Option<PathBuf>,
}

#[derive(Default, Clone)]
struct RunMetadata {
    start_time: Option<SystemTime>,
    end_time: Option<SystemTime>,
    total_domains: usize,
    duplicates_dropped: usize,
    workers: usize,
    processed: usize,
    accepted: usize,
    failures_by_reason: BTreeMap<String, usize>,
    cache_hits: usize,
    fetched: usize,
    outputs: Vec<String>,
}

impl CrawlLogger {
    pub fn new(verbosity: VerbosityLevel) -> Self {
        Self {
            verbosity,
            progress_bar: Arc::new(RwLock::new(None)),
            metadata: Arc::new(Mutex::new(RunMetadata::default())),
            log_buffer: Arc::new(Mutex::new(Vec::new())),
            log_file_path: None,
        }
    }

    pub fn with_log_file(verbosity: VerbosityLevel, log_file_path: PathBuf) -> Self {
        Self {
            log_file_path: Some(log_file_path),
            ..Self::new(verbosity)
        }
    }

    pub fn info(&self, message: &str) {
        self.print_message("INFO", message);
    }

    pub fn warn(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Detailed {
            self.print_message("WARN", message);
        }
    }

    pub fn error(&self, message: &str) {
        self.print_message("ERROR", message);
    }

    pub fn debug(&self, message: &str) {
        if self.verbosity >= VerbosityLevel::Debug {
            self.print_message("DEBUG", message);
        }
    }

    fn print_message(&self, level: &str, message: &str) {
        let msg = format!("[{}] {}: {}", self.get_timestamp(), level, message);

        if self.log_file_path.is_some() {
            if let Ok(mut buffer) = self.log_buffer.lock() {
                buffer.push(msg.clone());
            }
        }

        // Route through the progress bar so lines never tear it
        if let Ok(guard) = self.progress_bar.try_read() {
            if let Some(pb) = guard.as_ref() {
                pb.println(msg);
                return;
            }
        }

        eprintln!("{}", msg);
    }

    fn get_timestamp(&self) -> String {
        let now = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        let secs = now.as_secs();

        format!(
            "{:02}:{:02}:{:02}.{:03}",
            (secs / 3600) % 24,
            (secs % 3600) / 60,
            secs % 60,
            now.subsec_millis()
        )
    }

    fn with_metadata<F: FnOnce(&mut RunMetadata)>(&self, update: F) {
        if let Ok(mut metadata) = self.metadata.lock() {
            update(&mut metadata);
        }
    }

    pub fn log_run_start(&self, total_domains: usize, duplicates_dropped: usize, workers: usize) {
        self.with_metadata(|m| {
            m.total_domains = total_domains;
            m.duplicates_dropped = duplicates_dropped;
            m.workers = workers.min(total_domains.max(1));
        });
        self.info(&format!(
            "Crawling {} domains with {} workers ({} duplicates dropped)",
            total_domains, workers, duplicates_dropped
        ));
    }

    pub async fn start_progress(&self, total_steps: u64) {
        let pb = ProgressBar::new(total_steps);
        pb.set_style(
            ProgressStyle::default_bar()
                .template("[{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({percent}%) {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_bar())
                .progress_chars("##-"),
        );
        pb.set_message("Starting workers...");

        *self.progress_bar.write().await = Some(pb);
        self.with_metadata(|m| m.start_time = Some(SystemTime::now()));
    }

    /// Account for one finished domain
    pub async fn record_progress(&self, event: &ProgressEvent) {
        self.with_metadata(|m| {
            m.processed += 1;
            match event.failure {
                None => m.accepted += 1,
                Some(reason) => *m.failures_by_reason.entry(reason.to_string()).or_insert(0) += 1,
            }
        });

        match event.failure {
            None => self.debug(&format!("[worker {}] accepted {}", event.worker_id, event.domain)),
            Some(reason) => self.warn(&format!("[worker {}] rejected {} ({})", event.worker_id, event.domain, reason)),
        }

        if let Some(pb) = self.progress_bar.read().await.as_ref() {
            pb.inc(1);
            pb.set_message(event.domain.clone());
        }
    }

    pub async fn finish_progress(&self, final_message: &str) {
        if let Some(pb) = self.progress_bar.write().await.take() {
            pb.finish_and_clear();
        }
        self.with_metadata(|m| m.end_time = Some(SystemTime::now()));
        self.info(final_message);
    }

    /// Replace streamed counters with the authoritative merged totals
    pub fn record_summary(&self, summary: &CrawlSummary) {
        self.with_metadata(|m| {
            m.workers = summary.workers;
            m.processed = summary.accepted_count() + summary.failure_count();
            m.accepted = summary.accepted_count();
            m.failures_by_reason = summary
                .failures_by_reason()
                .into_iter()
                .map(|(reason, count)| (reason.to_string(), count))
                .collect();
            m.cache_hits = summary.cache_hits;
            m.fetched = summary.fetched;
        });
    }

    pub fn record_outputs(&self, written: &WrittenOutputs) {
        self.with_metadata(|m| {
            m.outputs.push(written.artifact.display().to_string());
            m.outputs.push(written.preview.display().to_string());
            if let Some(failures) = &written.failures {
                m.outputs.push(failures.display().to_string());
            }
        });
        self.info(&format!("Export completed: {} ({} rows)", written.artifact.display(), written.rows));
    }

    pub fn summary_lines(&self) -> Vec<String> {
        let metadata = match self.metadata.lock() {
            Ok(m) => m.clone(),
            Err(_) => return Vec::new(),
        };

        let mut lines = vec!["=== CRAWL SUMMARY ===".to_string()];
        if let (Some(start), Some(end)) = (metadata.start_time, metadata.end_time) {
            let duration = end.duration_since(start).unwrap_or_default();
            lines.push(format!("Crawl Duration: {:.2}s", duration.as_secs_f64()));
        }
        lines.push(format!("Domains: {} ({} duplicates dropped)", metadata.total_domains, metadata.duplicates_dropped));
        lines.push(format!("Workers: {}", metadata.workers));
        lines.push(format!("Accepted: {}", metadata.accepted));

        let failed: usize = metadata.failures_by_reason.values().sum();
        lines.push(format!("Failed: {}", failed));
        for (reason, count) in &metadata.failures_by_reason {
            lines.push(format!("  {}: {}", reason, count));
        }

        lines.push(format!("Cache Hits: {}", metadata.cache_hits));
        lines.push(format!("Pages Fetched: {}", metadata.fetched));
        for output in &metadata.outputs {
            lines.push(format!("Written: {}", output));
        }
        lines.push("=====================".to_string());
        lines
    }

    pub fn print_final_summary(&self) {
        print!("\x1b[2K\r");
        let _ = io::stdout().flush();

        println!();
        for line in self.summary_lines() {
            println!("{}", line);
        }
        println!();
    }

    /// Export all collected log lines, followed by the summary, to the configured file
    pub fn export_logs(&self) -> io::Result<()> {
        let Some(log_file_path) = &self.log_file_path else {
            return Ok(());
        };

        if let Some(parent) = Path::new(log_file_path).parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(log_file_path)?;

        if let Ok(buffer) = self.log_buffer.lock() {
            for entry in buffer.iter() {
                writeln!(file, "{}", entry)?;
            }
        }
        for line in self.summary_lines() {
            writeln!(file, "{}", line)?;
        }

        file.flush()
    }

    pub fn is_log_export_enabled(&self) -> bool {
        self.log_file_path.is_some()
    }

    pub fn get_log_count(&self) -> usize {
        self.log_buffer.lock().map(|b| b.len()).unwrap_or(0)
    }
}

/// Diagnostics writer for the tracing subscriber. While a progress bar is live, each event is
/// written with the bar suspended so it never tears the bar.
pub struct ProgressWriter {
    bar: Option<ProgressBar>,
}

impl Write for ProgressWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match &self.bar {
            Some(bar) => bar.suspend(|| io::stderr().write(buf)),
            None => io::stderr().write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        io::stderr().flush()
    }
}

impl<'a> MakeWriter<'a> for CrawlLogger {
    type Writer = ProgressWriter;

    fn make_writer(&'a self) -> Self::Writer {
        let bar = self
            .progress_bar
            .try_read()
            .ok()
            .and_then(|guard| guard.as_ref().cloned());
        ProgressWriter { bar }
    }
}
