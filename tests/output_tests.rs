mod common;

use std::sync::Arc;

use common::fixtures::{parked_html, storefront_html};
use common::{whois_text, TestEnv, US_HOST};
use scamcrawl::distributor::{self, CrawlSummary, OrchestratorFactory};
use scamcrawl::domain_utils::dedup_domains;
use scamcrawl::export::{self, OutputPaths};
use scamcrawl::feature_sink::read_artifact;
use scamcrawl::features::FEATURE_LEN;
use tempfile::TempDir;

#[tokio::test]
async fn test_crawl_outputs_round_trip() {
    let env = Arc::new(
        TestEnv::new()
            .with_page("kicks-a.shop", &storefront_html())
            .with_page("kicks-b.shop", &storefront_html())
            .with_page("kicks-parked.shop", &parked_html())
            .with_whois("kicks-a.shop", &whois_text("Porkbun LLC", "2024-01-10", "2025-01-10", "US"))
            .with_host("kicks-a.shop", US_HOST),
    );
    let factory: OrchestratorFactory = {
        let env = env.clone();
        Arc::new(move |worker_id| Ok(env.orchestrator(worker_id)))
    };
    let domains = dedup_domains(["kicks-a.shop", "kicks-parked.shop", "kicks-b.shop"]);

    let summary = distributor::run(domains, 2, factory, None).await.unwrap();

    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("run").join("features.jsonl.zst");
    let written = export::write_outputs(&output, &summary).unwrap();
    assert_eq!(written.rows, 2);

    let matrix = read_artifact(&output).unwrap();
    assert_eq!(matrix.domains, vec!["kicks-a.shop", "kicks-b.shop"]);
    assert!(matrix.vectors.iter().all(|v| v.len() == FEATURE_LEN));
    assert_eq!(matrix.vectors[0], summary.accepted[0].1.to_vec());

    let failures = std::fs::read_to_string(written.failures.unwrap()).unwrap();
    assert_eq!(failures, "domain,reason\nkicks-parked.shop,parked\n");

    let mut preview = csv::Reader::from_path(&written.preview).unwrap();
    assert_eq!(preview.headers().unwrap().len(), FEATURE_LEN + 1);
    assert_eq!(preview.records().count(), 2);
}

#[test]
fn test_empty_run_still_writes_artifact() {
    let out_dir = TempDir::new().unwrap();
    let output = out_dir.path().join("empty.jsonl.zst");

    let written = export::write_outputs(&output, &CrawlSummary::default()).unwrap();
    assert_eq!(written.rows, 0);
    assert!(written.failures.is_none());
    assert!(read_artifact(&output).unwrap().is_empty());

    let paths = OutputPaths::for_output(&output);
    assert!(paths.preview.exists());
    assert!(!paths.failures.exists());
}
