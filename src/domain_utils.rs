use std::collections::HashSet;

/// Top-level domains considered "common" for the uncommon-TLD flag
pub const COMMON_TLDS: [&str; 6] = ["com", "net", "org", "uk", "gov", "au"];

/// Low-cost TLDs heavily used by throwaway storefronts
pub const CHEAP_TLDS: [&str; 25] = [
    "club", "buzz", "xyz", "ua", "icu", "space", "agency", "monster", "pw", "click",
    "website", "site", "online", "link", "shop", "feedback", "uno", "press", "best",
    "fun", "host", "store", "tech", "top", "it",
];

/// A candidate domain in a batch.
///
/// `host` is the fetch form (scheme, path and quotes stripped, lowercase, `www.` kept).
/// `key` is the fully normalized form used for deduplication, caching, WHOIS and features.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Domain {
    pub host: String,
    pub key: String,
}

impl Domain {
    pub fn parse(raw: &str) -> Self {
        let host = fixed_point(raw, host_step);
        let key = normalize(&host);
        Self { host, key }
    }

    /// URL handed to the browser. Hosts never carry a scheme, so https is always prefixed.
    pub fn fetch_url(&self) -> String {
        format!("https://{}", self.host)
    }

    /// Last label of the normalized key
    pub fn tld(&self) -> &str {
        self.key.rsplit('.').next().unwrap_or("")
    }

    /// Everything before the TLD (e.g. "shop.example" for "shop.example.com")
    pub fn name_without_tld(&self) -> &str {
        match self.key.rfind('.') {
            Some(idx) => &self.key[..idx],
            None => "",
        }
    }
}

impl std::fmt::Display for Domain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.key)
    }
}

/// Canonicalize a raw URL or domain string into its registrable-host key.
///
/// Strips quotes, scheme, path/query/fragment, trailing slashes and any leading `www.`,
/// then lowercases. Never fails; degenerate input yields a degenerate (possibly empty) key.
/// Applied until nothing changes, so `normalize(normalize(x)) == normalize(x)`.
pub fn normalize(raw: &str) -> String {
    fixed_point(raw, |s| strip_www(&host_step(s)))
}

fn fixed_point(raw: &str, step: impl Fn(&str) -> String) -> String {
    let mut current = step(raw);
    loop {
        let next = step(&current);
        if next == current {
            return current;
        }
        current = next;
    }
}

fn host_step(raw: &str) -> String {
    let trimmed = trim_wrapping(raw).to_lowercase();

    // Only a leading scheme counts; a URL embedded in a path or query is not the host
    let without_scheme = match trimmed.find("://") {
        Some(idx) if !trimmed[..idx].contains(|c| matches!(c, '/' | '?' | '#')) => &trimmed[idx + 3..],
        _ => trimmed.as_str(),
    };

    let netloc = without_scheme
        .split(|c| c == '/' || c == '?' || c == '#')
        .next()
        .unwrap_or("");

    trim_wrapping(netloc).to_string()
}

fn trim_wrapping(s: &str) -> &str {
    s.trim_matches(|c: char| c.is_whitespace() || c == '"' || c == '\'' || c == '/')
}

fn strip_www(host: &str) -> String {
    let mut stripped = host;
    while let Some(rest) = stripped.strip_prefix("www.") {
        stripped = rest;
    }
    stripped.to_string()
}

/// Parse and deduplicate raw entries by normalized key.
/// First occurrence wins; later duplicates and empty keys are dropped silently.
pub fn dedup_domains<I, S>(raw_entries: I) -> Vec<Domain>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let mut seen = HashSet::new();
    let mut domains = Vec::new();

    for raw in raw_entries {
        let domain = Domain::parse(raw.as_ref());
        if domain.key.is_empty() {
            continue;
        }
        if seen.insert(domain.key.clone()) {
            domains.push(domain);
        }
    }

    domains
}

/// Filesystem-safe file stem for a domain key (drops `/ ? ! @ :`)
pub fn cache_file_stem(key: &str) -> String {
    key.chars()
        .filter(|c| !matches!(c, '/' | '?' | '!' | '@' | ':'))
        .collect()
}

/// True when `host` is the page's own domain or one of its subdomains
pub fn is_same_site(host: &str, own_key: &str) -> bool {
    let host_key = normalize(host);
    !own_key.is_empty()
        && (host_key == own_key || host_key.ends_with(&format!(".{}", own_key)))
}
