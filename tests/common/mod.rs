//! Shared fakes for driving the crawl pipeline without a browser, WHOIS servers or DNS
#![allow(dead_code)]

pub mod fixtures;

use std::collections::HashMap;
use std::net::{IpAddr, Ipv4Addr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use scamcrawl::config::GateConfig;
use scamcrawl::fetcher::{FetchError, PageFetcher, PageSource};
use scamcrawl::gate::ContentGate;
use scamcrawl::geo::{CountryTable, GeoEnricher, GeoError, HostResolver, IpCountryDb};
use scamcrawl::orchestrator::Orchestrator;
use scamcrawl::page_cache::PageCache;
use scamcrawl::whois::{WhoisError, WhoisLookup, WhoisResolver};
use tempfile::TempDir;

pub const COUNTRIES: &str = r#"{"US": "United States", "DE": "Germany", "FR": "France"}"#;

pub const IP_CSV: &str = "\"16777216\",\"16777471\",\"US\",\"United States of America\"\n\
\"3232235520\",\"3232301055\",\"DE\",\"Germany\"\n";

pub const US_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(1, 0, 0, 7));
pub const DE_HOST: IpAddr = IpAddr::V4(Ipv4Addr::new(192, 168, 4, 2));

pub fn whois_text(registrar: &str, created: &str, expires: &str, country: &str) -> String {
    format!(
        "Domain Name: EXAMPLE\nRegistrar: {}\nCreation Date: {}\nRegistry Expiry Date: {}\nRegistrant Country: {}\n",
        registrar, created, expires, country
    )
}

pub struct MapWhois(pub HashMap<String, String>);

impl WhoisLookup for MapWhois {
    fn lookup_raw(&self, domain: &str) -> Result<String, WhoisError> {
        self.0
            .get(domain)
            .cloned()
            .ok_or_else(|| WhoisError::Lookup(format!("no record for {}", domain)))
    }
}

/// Serves pages by URL and counts every render request
pub struct MapPageSource {
    pub pages: HashMap<String, String>,
    pub calls: Arc<AtomicUsize>,
}

impl PageSource for MapPageSource {
    fn fetch_html(&mut self, url: &str) -> Result<String, FetchError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.pages.get(url).cloned().ok_or_else(|| FetchError::Navigation {
            url: url.to_string(),
            message: "net::ERR_NAME_NOT_RESOLVED".to_string(),
        })
    }
}

pub struct MapResolver(pub HashMap<String, IpAddr>);

impl HostResolver for MapResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, GeoError> {
        self.0.get(host).copied().ok_or_else(|| GeoError::NoAddress(host.to_string()))
    }
}

/// A fake world of domains: their pages, WHOIS text and host addresses
pub struct TestEnv {
    pub cache_dir: TempDir,
    pub pages: HashMap<String, String>,
    pub whois: HashMap<String, String>,
    pub hosts: HashMap<String, IpAddr>,
    pub fetch_calls: Arc<AtomicUsize>,
    pub require_whois_record: bool,
    pub gate: GateConfig,
    /// Worker ids whose factory call should panic
    pub panic_workers: Mutex<Vec<usize>>,
}

impl TestEnv {
    pub fn new() -> Self {
        Self {
            cache_dir: TempDir::new().unwrap(),
            pages: HashMap::new(),
            whois: HashMap::new(),
            hosts: HashMap::new(),
            fetch_calls: Arc::new(AtomicUsize::new(0)),
            require_whois_record: false,
            gate: GateConfig {
                min_content_length: 3000,
                language_filter: false,
                languages: vec!["en".to_string()],
            },
            panic_workers: Mutex::new(Vec::new()),
        }
    }

    /// Serve `html` for `host`, rendered at `https://<host>`
    pub fn with_page(mut self, host: &str, html: &str) -> Self {
        self.pages.insert(format!("https://{}", host), html.to_string());
        self
    }

    pub fn with_whois(mut self, key: &str, raw: &str) -> Self {
        self.whois.insert(key.to_string(), raw.to_string());
        self
    }

    pub fn with_host(mut self, host: &str, ip: IpAddr) -> Self {
        self.hosts.insert(host.to_string(), ip);
        self
    }

    pub fn requiring_whois(mut self) -> Self {
        self.require_whois_record = true;
        self
    }

    pub fn fetch_count(&self) -> usize {
        self.fetch_calls.load(Ordering::SeqCst)
    }

    pub fn cache(&self) -> PageCache {
        PageCache::new(self.cache_dir.path())
    }

    pub fn orchestrator(&self, worker_id: usize) -> Orchestrator {
        if self.panic_workers.lock().unwrap().contains(&worker_id) {
            panic!("worker {} failed to launch its browser", worker_id);
        }

        let source = MapPageSource {
            pages: self.pages.clone(),
            calls: self.fetch_calls.clone(),
        };
        let geo = GeoEnricher::new(
            CountryTable::from_json(COUNTRIES).unwrap(),
            IpCountryDb::from_reader(IP_CSV.as_bytes()).unwrap(),
            Box::new(MapResolver(self.hosts.clone())),
        );

        Orchestrator::new(
            worker_id,
            WhoisResolver::new(Box::new(MapWhois(self.whois.clone()))),
            PageFetcher::new(self.cache(), Box::new(source)),
            ContentGate::new(&self.gate),
            geo,
            self.require_whois_record,
        )
    }
}
