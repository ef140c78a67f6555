use chrono::{DateTime, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashMap;
use std::path::Path;
use std::process::Command;
use thiserror::Error;
use tracing::debug;
use whois_rust::{WhoIs, WhoIsLookupOptions};

/// Server map used when no whois-servers.json is available
const FALLBACK_SERVERS: &str = r#"{
    "com": "whois.verisign-grs.com",
    "net": "whois.verisign-grs.com",
    "org": "whois.pir.org",
    "xyz": "whois.nic.xyz",
    "shop": "whois.nic.shop",
    "store": "whois.nic.store",
    "online": "whois.nic.online",
    "site": "whois.nic.site",
    "top": "whois.nic.top",
    "": "whois.iana.org"
}"#;

static CREATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:creation date|created on|created|registered on|registration time|domain registration date|registered)\s*:\s*(.+?)\s*$").unwrap()
});

static EXPIRATION_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:registry expiry date|registrar registration expiration date|expiration date|expiry date|expires on|expires|expiration time|paid-till)\s*:\s*(.+?)\s*$").unwrap()
});

static REGISTRAR_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:registrar|sponsoring registrar|registrar name)\s*:\s*(.+?)\s*$").unwrap()
});

static COUNTRY_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?im)^\s*(?:registrant country|registrant country/economy|country)\s*:\s*(.+?)\s*$").unwrap()
});

#[derive(Error, Debug, Clone, PartialEq)]
pub enum WhoisError {
    #[error("invalid domain for WHOIS lookup: {0}")]
    InvalidDomain(String),

    #[error("WHOIS lookup failed: {0}")]
    Lookup(String),

    #[error("WHOIS response for {0} contained no registration data")]
    EmptyRecord(String),
}

/// Registration metadata. Every field is optional; absence degrades to sentinels downstream.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct WhoisRecord {
    pub creation_date: Option<NaiveDate>,
    pub expiration_date: Option<NaiveDate>,
    /// All registrar lines in response order; the first one is authoritative
    pub registrars: Vec<String>,
    pub country: Option<String>,
}

impl WhoisRecord {
    pub fn registrar(&self) -> Option<&str> {
        self.registrars.first().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.creation_date.is_none()
            && self.expiration_date.is_none()
            && self.registrars.is_empty()
            && self.country.is_none()
    }
}

/// Raw WHOIS text source
pub trait WhoisLookup: Send {
    fn lookup_raw(&self, domain: &str) -> Result<String, WhoisError>;
}

/// whois-rust client with optional fallback to the system `whois` binary
pub struct NativeWhois {
    client: WhoIs,
    system_fallback: bool,
}

impl NativeWhois {
    pub fn new(servers_file: &Path, system_fallback: bool) -> Result<Self, WhoisError> {
        let client = WhoIs::from_path(servers_file)
            .or_else(|_| {
                debug!("No WHOIS server map at {}, using built-in servers", servers_file.display());
                WhoIs::from_string(FALLBACK_SERVERS)
            })
            .map_err(|e| WhoisError::Lookup(format!("Failed to create WHOIS client: {}", e)))?;

        Ok(Self { client, system_fallback })
    }

    fn try_native(&self, domain: &str) -> Result<String, WhoisError> {
        let options = WhoIsLookupOptions::from_string(domain)
            .map_err(|e| WhoisError::InvalidDomain(format!("{}: {}", domain, e)))?;

        self.client
            .lookup(options)
            .map_err(|e| WhoisError::Lookup(format!("whois-rust: {}", e)))
    }
}

impl WhoisLookup for NativeWhois {
    fn lookup_raw(&self, domain: &str) -> Result<String, WhoisError> {
        match self.try_native(domain) {
            Ok(raw) => Ok(raw),
            Err(native_err) if self.system_fallback => {
                debug!("Native WHOIS failed for {}: {}, trying system whois", domain, native_err);
                execute_whois_command(domain)
            }
            Err(native_err) => Err(native_err),
        }
    }
}

fn execute_whois_command(domain: &str) -> Result<String, WhoisError> {
    let whois_commands = if cfg!(windows) {
        vec!["whois.exe", "whois"]
    } else {
        vec!["whois", "/usr/bin/whois", "/usr/local/bin/whois"]
    };

    for cmd in whois_commands {
        match Command::new(cmd).arg(domain).output() {
            Ok(output) => {
                if output.status.success() {
                    return Ok(String::from_utf8_lossy(&output.stdout).to_string());
                }
            }
            Err(_) => continue,
        }
    }

    Err(WhoisError::Lookup("No working whois command found".to_string()))
}

/// Extract registration fields from raw WHOIS text
pub fn parse_whois(raw: &str) -> WhoisRecord {
    let first = |regex: &Regex| {
        regex
            .captures_iter(raw)
            .filter_map(|cap| cap.get(1).map(|m| m.as_str().trim().to_string()))
            .find(|v| !v.is_empty())
    };

    let registrars = REGISTRAR_REGEX
        .captures_iter(raw)
        .filter_map(|cap| cap.get(1).map(|m| clean_value(m.as_str())))
        .filter(|v| !v.is_empty())
        .fold(Vec::<String>::new(), |mut acc, v| {
            if !acc.contains(&v) {
                acc.push(v);
            }
            acc
        });

    WhoisRecord {
        creation_date: first(&*CREATION_REGEX).and_then(|v| parse_whois_date(&v)),
        expiration_date: first(&*EXPIRATION_REGEX).and_then(|v| parse_whois_date(&v)),
        registrars,
        country: first(&*COUNTRY_REGEX).map(|v| clean_value(&v)),
    }
}

fn clean_value(value: &str) -> String {
    value.split_whitespace().collect::<Vec<&str>>().join(" ")
}

/// Parse the date formats registries actually emit
pub fn parse_whois_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.date_naive());
    }

    let token = value.split(|c: char| c.is_whitespace() || c == 'T').next()?;
    let formats = ["%Y-%m-%d", "%d-%b-%Y", "%Y.%m.%d", "%d.%m.%Y", "%Y/%m/%d", "%d/%m/%Y"];

    formats
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(token, fmt).ok())
}

/// Per-worker WHOIS resolver. One attempt per domain; outcomes are memoized for the
/// lifetime of the resolver, failures included.
pub struct WhoisResolver {
    backend: Box<dyn WhoisLookup>,
    cache: HashMap<String, Result<WhoisRecord, WhoisError>>,
}

impl WhoisResolver {
    pub fn new(backend: Box<dyn WhoisLookup>) -> Self {
        Self {
            backend,
            cache: HashMap::new(),
        }
    }

    pub fn resolve(&mut self, domain_key: &str) -> Result<WhoisRecord, WhoisError> {
        if let Some(cached) = self.cache.get(domain_key) {
            debug!("WHOIS cache hit for {}", domain_key);
            return cached.clone();
        }

        let outcome = self.backend.lookup_raw(domain_key).and_then(|raw| {
            let record = parse_whois(&raw);
            if record.is_empty() {
                Err(WhoisError::EmptyRecord(domain_key.to_string()))
            } else {
                Ok(record)
            }
        });

        match &outcome {
            Ok(record) => debug!(
                "WHOIS lookup successful for {}: registrar={:?}, created={:?}, expires={:?}",
                domain_key, record.registrar(), record.creation_date, record.expiration_date
            ),
            Err(e) => debug!("WHOIS lookup failed for {}: {}", domain_key, e),
        }

        self.cache.insert(domain_key.to_string(), outcome.clone());
        outcome
    }

    pub fn cached_count(&self) -> usize {
        self.cache.len()
    }
}
