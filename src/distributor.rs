//! Static work partitioning across a fixed pool of blocking workers, and result merging.
//!
//! Workers share nothing: each builds its own `Orchestrator` from the factory and owns its batch.
//! Progress flows one way over a channel. A worker that panics or fails to start aborts the run.

use std::collections::BTreeMap;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use tokio::sync::mpsc::UnboundedSender;
use tracing::{debug, info};

use crate::domain_utils::Domain;
use crate::features::FeatureVector;
use crate::orchestrator::{CrawlResult, FailureReason, FailureRecord, Orchestrator};

/// Builds the per-worker pipeline; called once on each worker thread with its worker id
pub type OrchestratorFactory = Arc<dyn Fn(usize) -> Result<Orchestrator> + Send + Sync>;

/// One finished domain, as seen by the progress display
#[derive(Debug, Clone, PartialEq)]
pub struct ProgressEvent {
    pub worker_id: usize,
    pub domain: String,
    pub failure: Option<FailureReason>,
}

/// Merged output of every worker
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CrawlSummary {
    pub accepted: Vec<(String, FeatureVector)>,
    pub failures: Vec<FailureRecord>,
    pub cache_hits: usize,
    pub fetched: usize,
    pub workers: usize,
}

impl CrawlSummary {
    pub fn accepted_count(&self) -> usize {
        self.accepted.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failures.len()
    }

    pub fn failures_by_reason(&self) -> BTreeMap<FailureReason, usize> {
        let mut counts = BTreeMap::new();
        for failure in &self.failures {
            *counts.entry(failure.reason).or_insert(0) += 1;
        }
        counts
    }
}

/// Split into contiguous batches of `len / workers`, the last absorbing the remainder.
/// With fewer domains than workers each domain gets its own batch; no domains, no batches.
pub fn partition(domains: &[Domain], workers: usize) -> Vec<Vec<Domain>> {
    if domains.is_empty() {
        return Vec::new();
    }

    let workers = workers.clamp(1, domains.len());
    let size = domains.len() / workers;

    (0..workers)
        .map(|i| {
            let start = i * size;
            let end = if i + 1 == workers { domains.len() } else { start + size };
            domains[start..end].to_vec()
        })
        .collect()
}

/// Run every batch on its own blocking worker and wait for all of them
pub async fn run(
    domains: Vec<Domain>,
    workers: usize,
    factory: OrchestratorFactory,
    progress: Option<UnboundedSender<ProgressEvent>>,
) -> Result<CrawlSummary> {
    let batches = partition(&domains, workers);
    info!("Distributing {} domains across {} workers", domains.len(), batches.len());

    let mut handles = Vec::with_capacity(batches.len());
    for (worker_id, batch) in batches.into_iter().enumerate() {
        let factory = factory.clone();
        let progress = progress.clone();

        let handle = tokio::task::spawn_blocking(move || -> Result<CrawlResult> {
            let mut orchestrator = factory(worker_id)
                .with_context(|| format!("Worker {} failed to start", worker_id))?;
            debug!("Worker {} starting batch of {} domains", worker_id, batch.len());

            Ok(orchestrator.run_batch(&batch, |outcome| {
                if let Some(tx) = &progress {
                    // Receiver gone means the display shut down; the crawl itself carries on
                    let _ = tx.send(ProgressEvent {
                        worker_id,
                        domain: outcome.domain().to_string(),
                        failure: outcome.failure_reason(),
                    });
                }
            }))
        });
        handles.push((worker_id, handle));
    }
    drop(progress);

    // Every handle is awaited before any error is reported so no worker outlives the run
    let mut results = Vec::with_capacity(handles.len());
    let mut first_error = None;
    for (worker_id, handle) in handles {
        match handle.await {
            Ok(Ok(result)) => results.push(result),
            Ok(Err(e)) => {
                first_error.get_or_insert(e);
            }
            Err(join_error) => {
                first_error.get_or_insert(anyhow!("Worker {} crashed: {}", worker_id, join_error));
            }
        }
    }

    if let Some(e) = first_error {
        return Err(e);
    }

    Ok(merge(results))
}

/// Concatenate worker results in worker order, preserving each worker's emission order
pub fn merge(results: Vec<CrawlResult>) -> CrawlSummary {
    let mut summary = CrawlSummary {
        workers: results.len(),
        ..Default::default()
    };

    for result in results {
        summary.accepted.extend(result.accepted);
        summary.failures.extend(result.failures);
        summary.cache_hits += result.cache_hits;
        summary.fetched += result.fetched;
    }

    info!(
        "Merged {} workers: {} accepted, {} failed",
        summary.workers,
        summary.accepted_count(),
        summary.failure_count()
    );
    summary
}
