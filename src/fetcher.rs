//! Fetch-or-load gate in front of the page cache.
//!
//! A cache hit returns the stored bytes without touching the network. A miss goes to the
//! worker's `PageSource` exactly once and the rendered document is persisted before returning.

use thiserror::Error;
use tracing::{debug, warn};

use crate::domain_utils::Domain;
use crate::page_cache::PageCache;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum FetchError {
    #[error("browser session unavailable: {0}")]
    Session(String),

    #[error("navigation to {url} failed: {message}")]
    Navigation { url: String, message: String },

    #[error("cached page for {domain} unreadable: {message}")]
    CacheRead { domain: String, message: String },
}

/// Something that can render a URL into an HTML document
pub trait PageSource: Send {
    fn fetch_html(&mut self, url: &str) -> Result<String, FetchError>;
}

#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
    pub html: String,
    pub cache_hit: bool,
}

pub struct PageFetcher {
    cache: PageCache,
    source: Box<dyn PageSource>,
}

impl PageFetcher {
    pub fn new(cache: PageCache, source: Box<dyn PageSource>) -> Self {
        Self { cache, source }
    }

    pub fn cache(&self) -> &PageCache {
        &self.cache
    }

    /// Cached HTML for a domain, `Ok(None)` on a miss
    pub fn load_cached(&self, domain: &Domain) -> Result<Option<String>, FetchError> {
        self.cache.load(&domain.key).map_err(|e| FetchError::CacheRead {
            domain: domain.key.clone(),
            message: e.to_string(),
        })
    }

    /// Render the domain through the page source and persist the result.
    /// A failed cache write only costs a refetch next run, so it is logged and ignored.
    pub fn fetch_live(&mut self, domain: &Domain) -> Result<String, FetchError> {
        let url = domain.fetch_url();
        debug!("Fetching {} from {}", domain.key, url);

        let html = self.source.fetch_html(&url)?;

        match self.cache.store(&domain.key, &html) {
            Ok(path) => debug!("Cached {} ({} bytes) at {}", domain.key, html.len(), path.display()),
            Err(e) => warn!("Failed to cache page for {}: {}", domain.key, e),
        }

        Ok(html)
    }

    pub fn fetch(&mut self, domain: &Domain) -> Result<FetchedPage, FetchError> {
        if let Some(html) = self.load_cached(domain)? {
            return Ok(FetchedPage { html, cache_hit: true });
        }

        let html = self.fetch_live(domain)?;
        Ok(FetchedPage { html, cache_hit: false })
    }
}
