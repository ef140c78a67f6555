//! Headless Chrome page source.
//!
//! Each worker owns one `ChromeSource`. The local browser is launched on first use and reused
//! for the worker's whole batch; every page is rendered in a fresh incognito context. When the
//! local attempt fails and a remote DevTools endpoint is configured, the page gets exactly one
//! more attempt there.

use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use headless_chrome::protocol::cdp::Target;
use headless_chrome::{Browser, LaunchOptions, Tab};
use tracing::{debug, info};

use crate::config::{BrowserConfig, SandboxMode, MAX_PAGE_LOAD_TIMEOUT_SECS};
use crate::fetcher::{FetchError, PageSource};

/// Extra Chrome flags applied to every local launch
const LAUNCH_ARGS: [&str; 4] = [
    "--incognito",
    "--ignore-certificate-errors",
    "--disable-dev-shm-usage",
    "--disable-blink-features=AutomationControlled",
];

/// Debug ports are assigned per worker so concurrent launches never collide
const BASE_DEBUG_PORT: u16 = 9300;

/// Keep the browser alive across slow WHOIS lookups between pages
const IDLE_BROWSER_TIMEOUT: Duration = Duration::from_secs(600);

pub struct ChromeSource {
    config: BrowserConfig,
    worker_id: usize,
    local: Option<Browser>,
}

impl ChromeSource {
    pub fn new(config: BrowserConfig, worker_id: usize) -> Self {
        Self {
            config,
            worker_id,
            local: None,
        }
    }

    fn page_timeout(&self) -> Duration {
        Duration::from_secs(self.config.page_load_timeout_secs.clamp(1, MAX_PAGE_LOAD_TIMEOUT_SECS))
    }

    fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.config.settle_delay_ms)
    }

    fn ensure_local(&mut self) -> Result<(), FetchError> {
        if self.local.is_none() {
            let browser = launch_local(&self.config, self.worker_id)
                .map_err(|e| FetchError::Session(e.to_string()))?;
            info!("Worker {} launched headless Chrome", self.worker_id);
            self.local = Some(browser);
        }
        Ok(())
    }

    fn fetch_local(&mut self, url: &str) -> Result<String, FetchError> {
        self.ensure_local()?;
        let browser = self
            .local
            .as_ref()
            .ok_or_else(|| FetchError::Session("local browser not running".to_string()))?;

        let result = render_page(browser, url, self.page_timeout(), self.settle_delay());
        if let Err(FetchError::Session(_)) = &result {
            // A dead browser is relaunched for the next domain
            self.local = None;
        }
        result
    }

    fn fetch_remote(&self, ws_url: &str, url: &str) -> Result<String, FetchError> {
        let browser = Browser::connect(ws_url.to_string())
            .map_err(|e| FetchError::Session(format!("Failed to connect to {}: {}", ws_url, e)))?;
        render_page(&browser, url, self.page_timeout(), self.settle_delay())
    }
}

impl PageSource for ChromeSource {
    fn fetch_html(&mut self, url: &str) -> Result<String, FetchError> {
        let local_err = match self.fetch_local(url) {
            Ok(html) => return Ok(html),
            Err(e) => e,
        };

        match self.config.remote_debugging_url.clone() {
            Some(ws_url) => {
                debug!("Local browser failed for {}: {}, trying remote session", url, local_err);
                self.fetch_remote(&ws_url, url)
            }
            None => Err(local_err),
        }
    }
}

fn is_container() -> bool {
    std::env::var("SCAMCRAWL_CONTAINER").is_ok() || Path::new("/.dockerenv").exists()
}

fn resolve_chrome_path(config: &BrowserConfig) -> Option<PathBuf> {
    std::env::var("CHROME_PATH")
        .ok()
        .map(PathBuf::from)
        .or_else(|| config.chrome_path.clone())
}

fn sandbox_enabled(mode: SandboxMode, in_container: bool) -> bool {
    match mode {
        SandboxMode::Auto => !in_container,
        SandboxMode::On => true,
        SandboxMode::Off => false,
    }
}

fn launch_local(config: &BrowserConfig, worker_id: usize) -> anyhow::Result<Browser> {
    let port = BASE_DEBUG_PORT.saturating_add(worker_id as u16);
    let sandbox = sandbox_enabled(config.sandbox, is_container());
    let chrome_path = resolve_chrome_path(config);
    debug!(
        "Launching Chrome for worker {} (port {}, sandbox {}, path {:?})",
        worker_id, port, sandbox, chrome_path
    );

    let options = LaunchOptions::default_builder()
        .headless(true)
        .sandbox(sandbox)
        .path(chrome_path)
        .port(Some(port))
        .idle_browser_timeout(IDLE_BROWSER_TIMEOUT)
        .args(LAUNCH_ARGS.iter().map(OsStr::new).collect())
        .build()
        .map_err(|e| anyhow::anyhow!("Failed to build Chrome launch options: {}", e))?;

    Browser::new(options).map_err(|e| anyhow::anyhow!("Failed to launch headless Chrome: {}", e))
}

/// Runs its closure when dropped, so cleanup happens on early returns as well
struct OnDrop<F: FnMut()>(F);

impl<F: FnMut()> Drop for OnDrop<F> {
    fn drop(&mut self) {
        (self.0)();
    }
}

fn dispose_context(browser: &Browser, context_id: &str) {
    let method = Target::DisposeBrowserContext {
        browser_context_id: context_id.to_string(),
    };
    if let Err(e) = browser.call_method(method) {
        debug!("Failed to dispose browser context {}: {}", context_id, e);
    }
}

fn close_tab(tab: &Tab, url: &str) {
    if let Err(e) = tab.close(false) {
        debug!("Failed to close tab for {}: {}", url, e);
    }
}

/// Navigate a fresh incognito tab to `url`, wait for load plus the settle delay, return the DOM.
/// The tab is closed and its context disposed on every path out of here.
fn render_page(browser: &Browser, url: &str, timeout: Duration, settle: Duration) -> Result<String, FetchError> {
    let navigation = |message: String| FetchError::Navigation {
        url: url.to_string(),
        message,
    };

    let context = browser
        .new_context()
        .map_err(|e| FetchError::Session(format!("Failed to open incognito context: {}", e)))?;
    let context_id = context.get_id().to_string();
    let _context_guard = OnDrop(|| dispose_context(browser, &context_id));

    let tab = context
        .new_tab()
        .map_err(|e| FetchError::Session(format!("Failed to create new browser tab: {}", e)))?;
    let _tab_guard = OnDrop(|| close_tab(&tab, url));
    tab.set_default_timeout(timeout);

    tab.navigate_to(url)
        .map_err(|e| navigation(format!("Failed to navigate: {}", e)))?;
    tab.wait_until_navigated()
        .map_err(|e| navigation(format!("Page failed to load: {}", e)))?;

    std::thread::sleep(settle);

    let html = tab
        .get_content()
        .map_err(|e| navigation(format!("Failed to get page content: {}", e)))?;
    debug!("Rendered {} ({} chars)", url, html.len());

    Ok(html)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn browser_config() -> BrowserConfig {
        BrowserConfig {
            page_load_timeout_secs: 45,
            settle_delay_ms: 250,
            remote_debugging_url: None,
            chrome_path: Some(PathBuf::from("/opt/chrome/chrome")),
            sandbox: SandboxMode::Auto,
        }
    }

    #[test]
    fn test_sandbox_modes() {
        assert!(sandbox_enabled(SandboxMode::Auto, false));
        assert!(!sandbox_enabled(SandboxMode::Auto, true));
        assert!(sandbox_enabled(SandboxMode::On, true));
        assert!(!sandbox_enabled(SandboxMode::Off, false));
    }

    #[test]
    fn test_page_timeout_is_capped() {
        let source = ChromeSource::new(browser_config(), 0);
        assert_eq!(source.page_timeout(), Duration::from_secs(30));
        assert_eq!(source.settle_delay(), Duration::from_millis(250));
    }

    #[test]
    fn test_cleanup_runs_on_error_paths() {
        use std::cell::RefCell;

        fn step(log: &RefCell<Vec<&'static str>>, fail_at: usize) -> Result<(), FetchError> {
            let _context_guard = OnDrop(|| log.borrow_mut().push("context disposed"));
            if fail_at == 0 {
                return Err(FetchError::Session("no context".to_string()));
            }
            let _tab_guard = OnDrop(|| log.borrow_mut().push("tab closed"));
            if fail_at == 1 {
                return Err(FetchError::Navigation { url: "https://a.com".to_string(), message: "timeout".to_string() });
            }
            Ok(())
        }

        for (fail_at, expected) in [
            (0, vec!["context disposed"]),
            (1, vec!["tab closed", "context disposed"]),
            (2, vec!["tab closed", "context disposed"]),
        ] {
            let log = RefCell::new(Vec::new());
            let _ = step(&log, fail_at);
            assert_eq!(log.into_inner(), expected, "fail_at={}", fail_at);
        }
    }

    #[test]
    fn test_browser_is_not_launched_eagerly() {
        let source = ChromeSource::new(browser_config(), 3);
        assert!(source.local.is_none());
    }
}
