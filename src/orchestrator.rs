//! Per-domain crawl state machine.
//!
//! ```text
//! Pending → WhoisLookup → CacheCheck → {CacheHit, Fetching} → ContentGate
//!         → {Rejected(reason), FeatureExtraction} → Done
//! ```
//!
//! `Fetching` may go straight to `Rejected(content)`. Each domain ends in exactly one
//! `CrawlOutcome`: an accepted vector or a failure reason, never both.

use std::fmt;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, trace, warn};

use crate::domain_utils::Domain;
use crate::features::{self, FeatureVector};
use crate::fetcher::PageFetcher;
use crate::gate::{ContentGate, GateRejection};
use crate::geo::GeoEnricher;
use crate::whois::{WhoisRecord, WhoisResolver};

/// Why a domain produced no feature vector
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum FailureReason {
    #[serde(rename = "whois")]
    Whois,
    #[serde(rename = "content")]
    Content,
    #[serde(rename = "too little content")]
    TooLittleContent,
    #[serde(rename = "parked")]
    Parked,
    #[serde(rename = "wrong language")]
    WrongLanguage,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::Whois => "whois",
            FailureReason::Content => "content",
            FailureReason::TooLittleContent => "too little content",
            FailureReason::Parked => "parked",
            FailureReason::WrongLanguage => "wrong language",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl From<GateRejection> for FailureReason {
    fn from(rejection: GateRejection) -> Self {
        match rejection {
            GateRejection::TooLittleContent => FailureReason::TooLittleContent,
            GateRejection::Parked => FailureReason::Parked,
            GateRejection::WrongLanguage => FailureReason::WrongLanguage,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FailureRecord {
    pub domain: String,
    pub reason: FailureReason,
}

/// Where a domain is in its pipeline. States past the cache check carry the page they act on.
#[derive(Debug, Clone, PartialEq)]
pub enum CrawlState {
    Pending,
    WhoisLookup,
    CacheCheck,
    CacheHit(String),
    Fetching,
    ContentGate(String),
    FeatureExtraction(String),
    Rejected(FailureReason),
    Done(Box<FeatureVector>),
}

impl CrawlState {
    pub fn name(&self) -> &'static str {
        match self {
            CrawlState::Pending => "pending",
            CrawlState::WhoisLookup => "whois_lookup",
            CrawlState::CacheCheck => "cache_check",
            CrawlState::CacheHit(_) => "cache_hit",
            CrawlState::Fetching => "fetching",
            CrawlState::ContentGate(_) => "content_gate",
            CrawlState::FeatureExtraction(_) => "feature_extraction",
            CrawlState::Rejected(_) => "rejected",
            CrawlState::Done(_) => "done",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, CrawlState::Rejected(_) | CrawlState::Done(_))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum CrawlOutcome {
    Accepted { domain: String, vector: FeatureVector },
    Rejected(FailureRecord),
}

impl CrawlOutcome {
    pub fn domain(&self) -> &str {
        match self {
            CrawlOutcome::Accepted { domain, .. } => domain,
            CrawlOutcome::Rejected(record) => &record.domain,
        }
    }

    pub fn failure_reason(&self) -> Option<FailureReason> {
        match self {
            CrawlOutcome::Accepted { .. } => None,
            CrawlOutcome::Rejected(record) => Some(record.reason),
        }
    }
}

/// Everything one worker produced, in batch order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlResult {
    pub worker_id: usize,
    pub accepted: Vec<(String, FeatureVector)>,
    pub failures: Vec<FailureRecord>,
    pub cache_hits: usize,
    pub fetched: usize,
}

impl CrawlResult {
    pub fn new(worker_id: usize) -> Self {
        Self {
            worker_id,
            ..Default::default()
        }
    }

    pub fn record(&mut self, outcome: CrawlOutcome) {
        match outcome {
            CrawlOutcome::Accepted { domain, vector } => self.accepted.push((domain, vector)),
            CrawlOutcome::Rejected(record) => self.failures.push(record),
        }
    }

    pub fn processed(&self) -> usize {
        self.accepted.len() + self.failures.len()
    }
}

/// Per-worker pipeline. Owns its WHOIS cache, page source and geo tables exclusively.
pub struct Orchestrator {
    worker_id: usize,
    whois: WhoisResolver,
    fetcher: PageFetcher,
    gate: ContentGate,
    geo: GeoEnricher,
    require_whois_record: bool,
    cache_hits: usize,
    fetched: usize,
}

impl Orchestrator {
    pub fn new(
        worker_id: usize,
        whois: WhoisResolver,
        fetcher: PageFetcher,
        gate: ContentGate,
        geo: GeoEnricher,
        require_whois_record: bool,
    ) -> Self {
        Self {
            worker_id,
            whois,
            fetcher,
            gate,
            geo,
            require_whois_record,
            cache_hits: 0,
            fetched: 0,
        }
    }

    /// Drive one domain from `Pending` to a terminal state
    pub fn process(&mut self, domain: &Domain) -> CrawlOutcome {
        let mut state = CrawlState::Pending;
        let mut whois: Option<WhoisRecord> = None;

        loop {
            trace!(worker = self.worker_id, domain = %domain.key, state = state.name(), "transition");

            state = match state {
                CrawlState::Pending => CrawlState::WhoisLookup,

                CrawlState::WhoisLookup => match self.whois.resolve(&domain.key) {
                    Ok(record) => {
                        whois = Some(record);
                        CrawlState::CacheCheck
                    }
                    Err(e) if self.require_whois_record => {
                        debug!("Worker {}: rejecting {} without WHOIS record: {}", self.worker_id, domain.key, e);
                        CrawlState::Rejected(FailureReason::Whois)
                    }
                    Err(_) => CrawlState::CacheCheck,
                },

                CrawlState::CacheCheck => match self.fetcher.load_cached(domain) {
                    Ok(Some(html)) => CrawlState::CacheHit(html),
                    Ok(None) => CrawlState::Fetching,
                    Err(e) => {
                        warn!("Worker {}: {}", self.worker_id, e);
                        CrawlState::Rejected(FailureReason::Content)
                    }
                },

                CrawlState::CacheHit(html) => {
                    self.cache_hits += 1;
                    debug!("Worker {}: cache hit for {}", self.worker_id, domain.key);
                    CrawlState::ContentGate(html)
                }

                CrawlState::Fetching => {
                    self.fetched += 1;
                    match self.fetcher.fetch_live(domain) {
                        Ok(html) => CrawlState::ContentGate(html),
                        Err(e) => {
                            debug!("Worker {}: fetch failed for {}: {}", self.worker_id, domain.key, e);
                            CrawlState::Rejected(FailureReason::Content)
                        }
                    }
                }

                CrawlState::ContentGate(html) => match self.gate.check(&html) {
                    Ok(()) => CrawlState::FeatureExtraction(html),
                    Err(rejection) => CrawlState::Rejected(rejection.into()),
                },

                CrawlState::FeatureExtraction(html) => {
                    let registrant_country = whois.as_ref().and_then(|w| w.country.as_deref());
                    let geo = self.geo.geo(domain, registrant_country);
                    let vector = features::extract(domain, whois.as_ref(), &html, &geo);
                    CrawlState::Done(Box::new(vector))
                }

                CrawlState::Rejected(reason) => {
                    info!("Worker {}: {} rejected ({})", self.worker_id, domain.key, reason);
                    return CrawlOutcome::Rejected(FailureRecord {
                        domain: domain.key.clone(),
                        reason,
                    });
                }

                CrawlState::Done(vector) => {
                    info!("Worker {}: {} accepted", self.worker_id, domain.key);
                    return CrawlOutcome::Accepted {
                        domain: domain.key.clone(),
                        vector: *vector,
                    };
                }
            };
        }
    }

    /// Process a batch strictly in order, reporting each outcome as it lands
    pub fn run_batch<F>(&mut self, batch: &[Domain], mut on_outcome: F) -> CrawlResult
    where
        F: FnMut(&CrawlOutcome),
    {
        let mut result = CrawlResult::new(self.worker_id);

        for domain in batch {
            let outcome = self.process(domain);
            on_outcome(&outcome);
            result.record(outcome);
        }

        result.cache_hits = self.cache_hits;
        result.fetched = self.fetched;
        debug!(
            "Worker {} finished: {} accepted, {} failed, {} WHOIS lookups cached",
            self.worker_id,
            result.accepted.len(),
            result.failures.len(),
            self.whois.cached_count()
        );
        result
    }
}
