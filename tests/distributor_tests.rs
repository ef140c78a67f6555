mod common;

use std::sync::Arc;

use anyhow::anyhow;
use common::fixtures::{parked_html, storefront_html};
use common::TestEnv;
use scamcrawl::distributor::{self, OrchestratorFactory};
use scamcrawl::domain_utils::{dedup_domains, Domain};
use scamcrawl::orchestrator::FailureReason;
use tokio::sync::mpsc;

fn factory(env: Arc<TestEnv>) -> OrchestratorFactory {
    Arc::new(move |worker_id| Ok(env.orchestrator(worker_id)))
}

fn store_env(count: usize) -> (Arc<TestEnv>, Vec<Domain>) {
    let mut env = TestEnv::new();
    let mut names = Vec::new();
    for i in 0..count {
        let host = format!("store{}.shop", i);
        env = env.with_page(&host, &storefront_html());
        names.push(host);
    }
    (Arc::new(env), dedup_domains(&names))
}

#[tokio::test]
async fn test_merged_output_follows_input_order() {
    let (env, domains) = store_env(7);

    let summary = distributor::run(domains.clone(), 3, factory(env.clone()), None).await.unwrap();

    let order: Vec<&str> = summary.accepted.iter().map(|(d, _)| d.as_str()).collect();
    let expected: Vec<&str> = domains.iter().map(|d| d.key.as_str()).collect();
    assert_eq!(order, expected);
    assert_eq!(summary.workers, 3);
    assert_eq!(summary.fetched, 7);
    assert_eq!(env.fetch_count(), 7);
}

#[tokio::test]
async fn test_every_domain_ends_in_exactly_one_list() {
    let env = TestEnv::new()
        .with_page("good.shop", &storefront_html())
        .with_page("parked.shop", &parked_html())
        .with_page("short.shop", "<html><body>hi</body></html>");
    let domains = dedup_domains(["good.shop", "parked.shop", "short.shop", "dead.shop", "GOOD.shop/"]);
    assert_eq!(domains.len(), 4);

    let summary = distributor::run(domains, 2, factory(Arc::new(env)), None).await.unwrap();

    assert_eq!(summary.accepted_count() + summary.failure_count(), 4);
    assert_eq!(summary.accepted[0].0, "good.shop");
    let reasons = summary.failures_by_reason();
    assert_eq!(reasons.get(&FailureReason::Parked), Some(&1));
    assert_eq!(reasons.get(&FailureReason::TooLittleContent), Some(&1));
    assert_eq!(reasons.get(&FailureReason::Content), Some(&1));
}

#[tokio::test]
async fn test_fewer_domains_than_workers() {
    let (env, domains) = store_env(2);

    let summary = distributor::run(domains, 5, factory(env), None).await.unwrap();
    assert_eq!(summary.workers, 2);
    assert_eq!(summary.accepted_count(), 2);
}

#[tokio::test]
async fn test_empty_input_yields_empty_summary() {
    let env = Arc::new(TestEnv::new());

    let summary = distributor::run(Vec::new(), 4, factory(env), None).await.unwrap();
    assert_eq!(summary.workers, 0);
    assert!(summary.accepted.is_empty());
    assert!(summary.failures.is_empty());
}

#[tokio::test]
async fn test_worker_panic_aborts_run() {
    let (env, domains) = store_env(6);
    env.panic_workers.lock().unwrap().push(1);

    let err = distributor::run(domains, 3, factory(env.clone()), None).await.unwrap_err();
    assert!(err.to_string().contains("Worker 1 crashed"), "unexpected error: {}", err);
}

#[tokio::test]
async fn test_worker_start_failure_aborts_run() {
    let (_, domains) = store_env(4);
    let failing: OrchestratorFactory = Arc::new(|worker_id| Err(anyhow!("no browser for worker {}", worker_id)));

    let err = distributor::run(domains, 2, failing, None).await.unwrap_err();
    assert!(format!("{:#}", err).contains("failed to start"));
}

#[tokio::test]
async fn test_progress_event_per_domain() {
    let env = TestEnv::new()
        .with_page("a.shop", &storefront_html())
        .with_page("b.shop", &parked_html());
    let domains = dedup_domains(["a.shop", "b.shop", "c.shop"]);
    let (tx, mut rx) = mpsc::unbounded_channel();

    distributor::run(domains, 2, factory(Arc::new(env)), Some(tx)).await.unwrap();

    let mut events = Vec::new();
    while let Some(event) = rx.recv().await {
        events.push(event);
    }
    events.sort_by(|a, b| a.domain.cmp(&b.domain));

    assert_eq!(events.len(), 3);
    assert_eq!(events[0].failure, None);
    assert_eq!(events[1].failure, Some(FailureReason::Parked));
    assert_eq!(events[2].failure, Some(FailureReason::Content));
    assert_eq!(events[0].worker_id, 0);
    assert_eq!(events[2].worker_id, 1);
}
