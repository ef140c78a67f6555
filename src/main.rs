use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tracing::Level;

use scamcrawl::browser::ChromeSource;
use scamcrawl::cache_commands;
use scamcrawl::cli::{CacheCommands, Cli, Commands};
use scamcrawl::config::AppConfig;
use scamcrawl::distributor::{self, OrchestratorFactory};
use scamcrawl::domain_utils::dedup_domains;
use scamcrawl::export;
use scamcrawl::fetcher::PageFetcher;
use scamcrawl::gate::ContentGate;
use scamcrawl::geo::{CountryTable, DnsHostResolver, GeoEnricher, IpCountryDb};
use scamcrawl::input;
use scamcrawl::logger::{CrawlLogger, VerbosityLevel};
use scamcrawl::orchestrator::Orchestrator;
use scamcrawl::page_cache::PageCache;
use scamcrawl::whois::{NativeWhois, WhoisResolver};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let verbosity = VerbosityLevel::from_verbose_count(cli.verbose);
    let logger = match &cli.log_file {
        Some(path) => CrawlLogger::with_log_file(verbosity, path.clone()),
        None => CrawlLogger::new(verbosity),
    };
    init_tracing(cli.verbose, logger.clone());

    if cli.init {
        let path = AppConfig::create_default_config().context("Failed to create configuration file")?;
        println!("Created default configuration file at: {}", path.display());
        println!("Edit this file to customize settings, then run scamcrawl again.");
        return Ok(());
    }

    let mut config = match &cli.config {
        Some(path) => AppConfig::load_from_path(path),
        None => AppConfig::load(),
    }
    .context("Configuration error")?;
    cli.apply_overrides(&mut config);
    config.validate().context("Invalid configuration after command-line overrides")?;

    if let Some(Commands::Cache { action }) = &cli.command {
        let cache = PageCache::new(&config.crawl.cache_dir);
        return match action {
            CacheCommands::List => cache_commands::list_cached_pages(&cache),
            CacheCommands::Show { domain } => {
                cache_commands::show_cache_entry(&cache, &ContentGate::new(&config.gate), domain)
            }
            CacheCommands::Clear { domain, all } => {
                if *all {
                    cache_commands::clear_all_cache(&cache).map(|_| ())
                } else if let Some(d) = domain {
                    cache_commands::clear_domain_cache(&cache, d)
                } else {
                    bail!("Either specify a domain or use --all (scamcrawl cache clear <domain> | --all)")
                }
            }
        };
    }

    cli.validate().map_err(|e| anyhow!("Invalid arguments: {}", e))?;

    let raw_entries = match (&cli.url, &cli.input_file) {
        (Some(url), _) => vec![url.clone()],
        (None, Some(path)) => input::read_domain_file(path)?,
        (None, None) => bail!("An input file is required (use --input-file or --url)"),
    };
    let domains = dedup_domains(&raw_entries);
    let duplicates = raw_entries.len() - domains.len();

    // Lookup tables are required; load them once so a missing file fails before any worker starts
    let countries = CountryTable::load(&config.assets.country_table).context("Failed to load country table")?;
    let ip_db = IpCountryDb::load(&config.assets.ip_country_db).context("Failed to load IP country database")?;

    logger.log_run_start(domains.len(), duplicates, config.crawl.workers);

    let handle = Handle::current();
    let factory: OrchestratorFactory = {
        let config = config.clone();
        Arc::new(move |worker_id| build_orchestrator(worker_id, &config, &countries, &ip_db, handle.clone()))
    };

    logger.start_progress(domains.len() as u64).await;
    let (tx, mut rx) = mpsc::unbounded_channel();
    let progress_logger = logger.clone();
    let progress_task = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            progress_logger.record_progress(&event).await;
        }
    });

    let result = distributor::run(domains, config.crawl.workers, factory, Some(tx)).await;
    let _ = progress_task.await;
    logger.finish_progress("Crawl finished").await;

    let summary = match result {
        Ok(summary) => summary,
        Err(e) => {
            logger.error(&format!("Crawl aborted: {:#}", e));
            if let Err(export_err) = logger.export_logs() {
                logger.error(&format!("Failed to write log file: {}", export_err));
            }
            return Err(e);
        }
    };
    logger.record_summary(&summary);

    let written = export::write_outputs(&config.crawl.output, &summary)?;
    logger.record_outputs(&written);
    logger.print_final_summary();

    if logger.is_log_export_enabled() {
        logger.export_logs().context("Failed to write log file")?;
    }

    Ok(())
}

/// -v count to tracing level; diagnostics go to stderr, around the progress bar when one is live
fn init_tracing(verbose: u8, logger: CrawlLogger) {
    let level = match verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_writer(logger)
        .with_target(false)
        .init();
}

/// Assemble one worker's private pipeline: WHOIS client, browser, cache, gate and geo tables
fn build_orchestrator(
    worker_id: usize,
    config: &AppConfig,
    countries: &CountryTable,
    ip_db: &IpCountryDb,
    handle: Handle,
) -> Result<Orchestrator> {
    let whois_backend = NativeWhois::new(&config.whois.servers_file, config.whois.system_whois_fallback)?;
    let fetcher = PageFetcher::new(
        PageCache::new(&config.crawl.cache_dir),
        Box::new(ChromeSource::new(config.browser.clone(), worker_id)),
    );
    let geo = GeoEnricher::new(
        countries.clone(),
        ip_db.clone(),
        Box::new(DnsHostResolver::new(handle)),
    );

    Ok(Orchestrator::new(
        worker_id,
        WhoisResolver::new(Box::new(whois_backend)),
        fetcher,
        ContentGate::new(&config.gate),
        geo,
        config.whois.require_record,
    ))
}
