use anyhow::{Context, Result};
use csv::Writer;
use std::fs::File;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::distributor::CrawlSummary;
use crate::feature_sink::{self, FeatureMatrix};
use crate::features::FeatureVector;
use crate::orchestrator::FailureRecord;

/// Files written for one run, all derived from the configured output path
#[derive(Debug, Clone, PartialEq)]
pub struct OutputPaths {
    pub artifact: PathBuf,
    pub preview: PathBuf,
    pub failures: PathBuf,
}

impl OutputPaths {
    /// `out/features.jsonl.zst` → `out/features_preview.csv` and `out/features-failed.csv`
    pub fn for_output(output: &Path) -> Self {
        let stem = output
            .file_name()
            .and_then(|n| n.to_str())
            .and_then(|n| n.split('.').next())
            .filter(|s| !s.is_empty())
            .unwrap_or("features");
        let dir = output.parent().unwrap_or_else(|| Path::new(""));

        Self {
            artifact: output.to_path_buf(),
            preview: dir.join(format!("{}_preview.csv", stem)),
            failures: dir.join(format!("{}-failed.csv", stem)),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct WrittenOutputs {
    pub artifact: PathBuf,
    pub rows: usize,
    pub preview: PathBuf,
    /// Only present when at least one domain failed
    pub failures: Option<PathBuf>,
}

/// Persist a run: feature artifact and preview always, failure CSV only when there are failures.
/// Any write error is fatal.
pub fn write_outputs(output: &Path, summary: &CrawlSummary) -> Result<WrittenOutputs> {
    let paths = OutputPaths::for_output(output);
    let matrix = FeatureMatrix::from_accepted(&summary.accepted);

    let rows = feature_sink::write_artifact(&paths.artifact, &matrix)?;
    info!("Wrote {} feature rows to {}", rows, paths.artifact.display());

    export_preview_csv(&matrix, &paths.preview)?;

    let failures = if summary.failures.is_empty() {
        None
    } else {
        export_failures_csv(&summary.failures, &paths.failures)?;
        Some(paths.failures.clone())
    };

    Ok(WrittenOutputs {
        artifact: paths.artifact,
        rows,
        preview: paths.preview,
        failures,
    })
}

fn create_file(path: &Path) -> Result<File> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create parent directory: {}", parent.display()))?;
    }
    File::create(path).with_context(|| format!("Failed to create {}", path.display()))
}

/// One named column per feature slot plus a trailing `domain` column
pub fn export_preview_csv(matrix: &FeatureMatrix, path: &Path) -> Result<()> {
    debug!("Exporting {} rows to preview CSV: {}", matrix.len(), path.display());

    let mut wtr = Writer::from_writer(create_file(path)?);

    let mut header = FeatureVector::column_names();
    header.push("domain".to_string());
    wtr.write_record(&header)?;

    for (domain, features) in matrix.domains.iter().zip(&matrix.vectors) {
        let mut record: Vec<String> = features.iter().map(|v| v.to_string()).collect();
        record.push(domain.clone());
        wtr.write_record(&record)?;
    }

    wtr.flush()?;
    Ok(())
}

pub fn export_failures_csv(failures: &[FailureRecord], path: &Path) -> Result<()> {
    debug!("Exporting {} failures to CSV: {}", failures.len(), path.display());

    let mut wtr = Writer::from_writer(create_file(path)?);
    wtr.write_record(["domain", "reason"])?;
    for failure in failures {
        wtr.write_record([failure.domain.as_str(), failure.reason.as_str()])?;
    }

    wtr.flush()?;
    info!("Wrote {} failures to {}", failures.len(), path.display());
    Ok(())
}
