pub mod browser;
pub mod cache_commands;
pub mod cli;
pub mod config;
pub mod distributor;
pub mod domain_utils;
pub mod export;
pub mod feature_sink;
pub mod features;
pub mod fetcher;
pub mod gate;
pub mod geo;
pub mod input;
pub mod logger;
pub mod orchestrator;
pub mod page_cache;
pub mod whois;

pub use distributor::{CrawlSummary, OrchestratorFactory};
pub use features::{FeatureVector, FEATURE_LEN};
pub use orchestrator::{FailureReason, FailureRecord, Orchestrator};
