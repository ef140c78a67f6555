use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::config::{parse_language_list, AppConfig};

#[derive(Parser, Debug)]
#[command(name = "scamcrawl")]
#[command(about = "Crawl candidate scam storefront domains and extract per-domain feature vectors")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Option<Commands>,

    /// Create default configuration file at ./config/scamcrawl.toml
    #[arg(long, global = true)]
    pub init: bool,

    /// Path to the domain list (plain lines/CSV, .jsonl, or .json)
    #[arg(short, long, value_name = "FILE", conflicts_with = "url")]
    pub input_file: Option<PathBuf>,

    /// Crawl a single URL or domain instead of an input file
    #[arg(short, long)]
    pub url: Option<String>,

    /// Number of parallel browser workers (overrides crawl.workers)
    #[arg(short, long, value_name = "N")]
    pub workers: Option<usize>,

    /// Feature artifact path; preview and failure CSVs are written next to it
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Directory holding cached page HTML (overrides crawl.cache_dir)
    #[arg(long, value_name = "DIR")]
    pub cache_dir: Option<PathBuf>,

    /// Comma-separated languages to accept, e.g. "en,de" (implies --language-filter)
    #[arg(long, value_name = "LANGS")]
    pub languages: Option<String>,

    /// Reject pages whose visible text is not in an accepted language
    #[arg(long)]
    pub language_filter: bool,

    /// Configuration file to use instead of ./config/scamcrawl.toml
    #[arg(short, long, value_name = "FILE", global = true)]
    pub config: Option<PathBuf>,

    /// Verbose logging (use -v for INFO, -vv for DEBUG, -vvv for TRACE)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Write collected log lines and the run summary to this file
    #[arg(long, value_name = "FILE")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Manage the page HTML cache
    Cache {
        #[command(subcommand)]
        action: CacheCommands,
    },
}

#[derive(Subcommand, Debug)]
pub enum CacheCommands {
    /// List all cached pages
    List,

    /// Show cache entry details for a specific domain
    Show {
        /// Domain to show cache details for
        domain: String,
    },

    /// Clear cache for a specific domain or all domains
    Clear {
        /// Domain to clear cache for (omit to use --all)
        domain: Option<String>,

        /// Clear cache for all domains
        #[arg(long)]
        all: bool,
    },
}

impl Cli {
    /// Crawl runs need exactly one source of domains
    pub fn validate(&self) -> Result<(), String> {
        if self.init || self.command.is_some() {
            return Ok(());
        }

        match (&self.input_file, &self.url) {
            (None, None) => return Err("An input file is required (use --input-file or --url)".to_string()),
            (None, Some(url)) if url.trim().is_empty() => return Err("URL cannot be empty".to_string()),
            _ => {}
        }

        if self.workers == Some(0) {
            return Err("Workers must be greater than 0".to_string());
        }

        if let Some(languages) = &self.languages {
            if parse_language_list(languages).is_empty() {
                return Err("At least one language is required with --languages".to_string());
            }
        }

        Ok(())
    }

    /// Fold command-line overrides into the loaded configuration
    pub fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(workers) = self.workers {
            config.crawl.workers = workers;
        }
        if let Some(output) = &self.output {
            config.crawl.output = output.clone();
        }
        if let Some(cache_dir) = &self.cache_dir {
            config.crawl.cache_dir = cache_dir.clone();
        }
        if let Some(languages) = &self.languages {
            config.gate.languages = parse_language_list(languages);
            config.gate.language_filter = true;
        }
        if self.language_filter {
            config.gate.language_filter = true;
        }
    }
}
