//! Host geolocation: DNS resolution plus a local IP-range → country database.
//!
//! Both lookup tables are loaded once at startup and cloned into every worker; a missing or
//! unreadable table is fatal for the run. Per-domain resolution failures only ever produce the unresolved sentinel.

use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use hickory_resolver::config::{LookupIpStrategy, ResolverConfig, ResolverOpts};
use hickory_resolver::TokioAsyncResolver;
use thiserror::Error;
use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::domain_utils::Domain;

/// Size of each country one-hot block
pub const COUNTRY_SLOTS: usize = 255;

#[derive(Error, Debug)]
pub enum AssetError {
    #[error("required asset not found: {0}")]
    Missing(PathBuf),

    #[error("failed to read asset {path}: {message}")]
    Read { path: PathBuf, message: String },

    #[error("malformed asset {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("asset {0} contains no usable entries")]
    Empty(PathBuf),
}

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeoError {
    #[error("DNS resolution failed for {host}: {message}")]
    Dns { host: String, message: String },

    #[error("no address records for {0}")]
    NoAddress(String),

    #[error("{0} is not covered by the IP country database")]
    NotInDatabase(IpAddr),

    #[error("country code {0} is not in the country table")]
    UnknownCountry(String),
}

/// Ordered country universe. Position in the table is the one-hot slot.
#[derive(Debug, Clone)]
pub struct CountryTable {
    /// (ISO code, display name) in file order
    entries: Vec<(String, String)>,
}

impl CountryTable {
    /// Load a JSON object mapping ISO codes to names; key order is preserved
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        if !path.exists() {
            return Err(AssetError::Missing(path.to_path_buf()));
        }
        let content = fs::read_to_string(path).map_err(|e| AssetError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        let table = Self::from_json(&content).map_err(|message| AssetError::Parse {
            path: path.to_path_buf(),
            message,
        })?;

        if table.is_empty() {
            return Err(AssetError::Empty(path.to_path_buf()));
        }
        if table.len() > COUNTRY_SLOTS {
            warn!(
                "Country table {} has {} entries; only the first {} map to feature slots",
                path.display(),
                table.len(),
                COUNTRY_SLOTS
            );
        }
        Ok(table)
    }

    pub fn from_json(content: &str) -> Result<Self, String> {
        let value: serde_json::Value = serde_json::from_str(content).map_err(|e| e.to_string())?;
        let object = value
            .as_object()
            .ok_or_else(|| "country table must be a JSON object of code -> name".to_string())?;

        let entries = object
            .iter()
            .map(|(code, name)| {
                let name = name.as_str().unwrap_or(code).to_string();
                (code.trim().to_uppercase(), name)
            })
            .collect();

        Ok(Self { entries })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Slot of a country given either its ISO code or its full name (case-insensitive).
    /// Entries past the one-hot width have no slot.
    pub fn index_of(&self, code_or_name: &str) -> Option<usize> {
        let needle = code_or_name.trim();
        if needle.is_empty() {
            return None;
        }

        self.entries
            .iter()
            .position(|(code, name)| code.eq_ignore_ascii_case(needle) || name.eq_ignore_ascii_case(needle))
            .filter(|&idx| idx < COUNTRY_SLOTS)
    }

    pub fn code_at(&self, index: usize) -> Option<&str> {
        self.entries.get(index).map(|(code, _)| code.as_str())
    }
}

#[derive(Debug, Clone, PartialEq)]
struct IpRange {
    from: u128,
    to: u128,
    code: String,
}

/// IP2Location LITE DB1 range table (`ip_from, ip_to, country_code, country_name`).
/// Works with both the IPv4 and the IPv6 editions.
#[derive(Debug, Clone)]
pub struct IpCountryDb {
    ranges: Vec<IpRange>,
}

impl IpCountryDb {
    pub fn load(path: &Path) -> Result<Self, AssetError> {
        if !path.exists() {
            return Err(AssetError::Missing(path.to_path_buf()));
        }
        let file = fs::File::open(path).map_err(|e| AssetError::Read {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;

        let db = Self::from_reader(file).map_err(|message| AssetError::Parse {
            path: path.to_path_buf(),
            message,
        })?;
        if db.ranges.is_empty() {
            return Err(AssetError::Empty(path.to_path_buf()));
        }

        debug!("Loaded {} IP ranges from {}", db.ranges.len(), path.display());
        Ok(db)
    }

    pub fn from_reader<R: std::io::Read>(reader: R) -> Result<Self, String> {
        let mut csv_reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(reader);

        let mut ranges = Vec::new();
        for (line, record) in csv_reader.records().enumerate() {
            let record = record.map_err(|e| format!("line {}: {}", line + 1, e))?;
            let field = |idx: usize| record.get(idx).map(str::trim).unwrap_or("");

            let from = field(0).parse::<u128>();
            let to = field(1).parse::<u128>();
            let (from, to) = match (from, to) {
                (Ok(from), Ok(to)) => (from, to),
                // Header rows and comments
                _ if line == 0 => continue,
                _ => return Err(format!("line {}: invalid IP range", line + 1)),
            };

            let code = field(2).to_uppercase();
            if code.is_empty() || code == "-" {
                continue;
            }
            ranges.push(IpRange { from, to, code });
        }

        ranges.sort_by_key(|r| r.from);
        Ok(Self { ranges })
    }

    /// Country code for an address, or `None` when no range covers it
    pub fn lookup(&self, ip: IpAddr) -> Option<&str> {
        let candidates: Vec<u128> = match ip {
            IpAddr::V4(v4) => vec![u32::from(v4) as u128, u128::from(v4.to_ipv6_mapped())],
            IpAddr::V6(v6) => vec![u128::from(v6)],
        };

        candidates.into_iter().find_map(|value| self.lookup_value(value))
    }

    fn lookup_value(&self, value: u128) -> Option<&str> {
        let idx = self.ranges.partition_point(|r| r.from <= value);
        let range = self.ranges.get(idx.checked_sub(1)?)?;
        if value <= range.to {
            Some(range.code.as_str())
        } else {
            None
        }
    }
}

/// Hostname → IP resolution
pub trait HostResolver: Send {
    fn resolve(&self, host: &str) -> Result<IpAddr, GeoError>;
}

/// System-configured hickory resolver, driven from a blocking worker thread
pub struct DnsHostResolver {
    resolver: TokioAsyncResolver,
    handle: Handle,
}

impl DnsHostResolver {
    /// Must be called from a thread that can see the tokio runtime (including `spawn_blocking` threads)
    pub fn new(handle: Handle) -> Self {
        let _guard = handle.enter();

        let (config, mut opts) = hickory_resolver::system_conf::read_system_conf().unwrap_or_else(|e| {
            debug!("Failed to read system resolver config ({}), using defaults", e);
            (ResolverConfig::default(), ResolverOpts::default())
        });
        opts.ip_strategy = LookupIpStrategy::Ipv4thenIpv6;
        opts.attempts = 1;

        let resolver = TokioAsyncResolver::tokio(config, opts);
        Self { resolver, handle }
    }
}

impl HostResolver for DnsHostResolver {
    fn resolve(&self, host: &str) -> Result<IpAddr, GeoError> {
        let lookup = self
            .handle
            .block_on(self.resolver.lookup_ip(host))
            .map_err(|e| GeoError::Dns {
                host: host.to_string(),
                message: e.to_string(),
            })?;

        lookup
            .iter()
            .next()
            .ok_or_else(|| GeoError::NoAddress(host.to_string()))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum HostCountry {
    Resolved { code: String, index: usize },
    Unresolved,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GeoRecord {
    pub host_country: HostCountry,
    /// One-hot slot of the registrant country, when known
    pub registrant_index: Option<usize>,
    /// Host country equals registrant country; always false when the host is unresolved
    pub country_match: bool,
}

impl GeoRecord {
    pub fn unresolved(registrant_index: Option<usize>) -> Self {
        Self {
            host_country: HostCountry::Unresolved,
            registrant_index,
            country_match: false,
        }
    }

    pub fn host_index(&self) -> Option<usize> {
        match &self.host_country {
            HostCountry::Resolved { index, .. } => Some(*index),
            HostCountry::Unresolved => None,
        }
    }
}

pub struct GeoEnricher {
    countries: CountryTable,
    ip_db: IpCountryDb,
    resolver: Box<dyn HostResolver>,
}

impl GeoEnricher {
    pub fn new(countries: CountryTable, ip_db: IpCountryDb, resolver: Box<dyn HostResolver>) -> Self {
        Self {
            countries,
            ip_db,
            resolver,
        }
    }

    /// Resolve the fetch host and compare its country with the registrant country.
    /// Every failure degrades to `HostCountry::Unresolved`.
    pub fn geo(&self, domain: &Domain, registrant_country: Option<&str>) -> GeoRecord {
        let registrant_index = registrant_country.and_then(|c| self.countries.index_of(c));

        match self.host_country(&domain.host) {
            Ok((code, index)) => {
                debug!("Host {} located in {}", domain.host, code);
                GeoRecord {
                    host_country: HostCountry::Resolved { code, index },
                    registrant_index,
                    country_match: registrant_index == Some(index),
                }
            }
            Err(e) => {
                debug!("Geo lookup failed for {}: {}", domain.host, e);
                GeoRecord::unresolved(registrant_index)
            }
        }
    }

    fn host_country(&self, host: &str) -> Result<(String, usize), GeoError> {
        let ip = self.resolver.resolve(host)?;
        let code = self.ip_db.lookup(ip).ok_or(GeoError::NotInDatabase(ip))?;
        let index = self
            .countries
            .index_of(code)
            .ok_or_else(|| GeoError::UnknownCountry(code.to_string()))?;
        Ok((code.to_string(), index))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::net::Ipv4Addr;

    const COUNTRIES: &str = r#"{"US": "United States", "DE": "Germany", "IS": "Iceland"}"#;

    const IP_CSV: &str = "\"0\",\"16777215\",\"-\",\"-\"\n\
\"16777216\",\"16777471\",\"US\",\"United States of America\"\n\
\"3232235520\",\"3232301055\",\"DE\",\"Germany\"\n\
\"281470698652416\",\"281470698652671\",\"IS\",\"Iceland\"\n";

    struct MapResolver(HashMap<String, IpAddr>);

    impl HostResolver for MapResolver {
        fn resolve(&self, host: &str) -> Result<IpAddr, GeoError> {
            self.0.get(host).copied().ok_or_else(|| GeoError::NoAddress(host.to_string()))
        }
    }

    fn enricher() -> GeoEnricher {
        let mut hosts = HashMap::new();
        hosts.insert("www.shop.de".to_string(), IpAddr::V4(Ipv4Addr::new(192, 168, 1, 1)));
        hosts.insert("usa.com".to_string(), IpAddr::V4(Ipv4Addr::new(1, 0, 0, 1)));
        GeoEnricher::new(
            CountryTable::from_json(COUNTRIES).unwrap(),
            IpCountryDb::from_reader(IP_CSV.as_bytes()).unwrap(),
            Box::new(MapResolver(hosts)),
        )
    }

    #[test]
    fn test_bundled_country_table_fits_slots() {
        let path = Path::new(concat!(env!("CARGO_MANIFEST_DIR"), "/assets/country.json"));
        let table = CountryTable::load(path).unwrap();

        assert_eq!(table.len(), 250);
        assert!(table.len() <= COUNTRY_SLOTS);
        assert_eq!(table.index_of("AF"), Some(0));
        assert_eq!(table.index_of("Germany"), table.index_of("DE"));
        assert_eq!(table.index_of("XK"), Some(249));
        assert_eq!(table.code_at(table.len() - 1), Some("XK"));
    }

    #[test]
    fn test_country_table_preserves_order() {
        let table = CountryTable::from_json(COUNTRIES).unwrap();
        assert_eq!(table.index_of("US"), Some(0));
        assert_eq!(table.index_of("de"), Some(1));
        assert_eq!(table.index_of("Iceland"), Some(2));
        assert_eq!(table.index_of("FR"), None);
        assert_eq!(table.index_of(""), None);
        assert_eq!(table.code_at(2), Some("IS"));
    }

    #[test]
    fn test_ip_lookup_ranges() {
        let db = IpCountryDb::from_reader(IP_CSV.as_bytes()).unwrap();
        assert_eq!(db.lookup("1.0.0.1".parse().unwrap()), Some("US"));
        assert_eq!(db.lookup("192.168.0.1".parse().unwrap()), Some("DE"));
        assert_eq!(db.lookup("0.0.0.1".parse().unwrap()), None);
        assert_eq!(db.lookup("8.8.8.8".parse().unwrap()), None);
        // IPv4-mapped range from the IPv6 edition
        assert_eq!(db.lookup("::ffff:1.2.3.4".parse().unwrap()), Some("IS"));
    }

    #[test]
    fn test_geo_match_and_mismatch() {
        let geo = enricher();

        let record = geo.geo(&Domain::parse("https://www.shop.de"), Some("Germany"));
        assert_eq!(record.host_country, HostCountry::Resolved { code: "DE".to_string(), index: 1 });
        assert!(record.country_match);

        let record = geo.geo(&Domain::parse("usa.com"), Some("DE"));
        assert_eq!(record.host_index(), Some(0));
        assert_eq!(record.registrant_index, Some(1));
        assert!(!record.country_match);
    }

    #[test]
    fn test_geo_unresolved_is_soft() {
        let record = enricher().geo(&Domain::parse("nowhere.xyz"), Some("US"));
        assert_eq!(record, GeoRecord::unresolved(Some(0)));
    }

    #[test]
    fn test_missing_assets_are_errors() {
        assert!(matches!(
            CountryTable::load(Path::new("/nonexistent/country.json")),
            Err(AssetError::Missing(_))
        ));
        assert!(matches!(
            IpCountryDb::load(Path::new("/nonexistent/ip.csv")),
            Err(AssetError::Missing(_))
        ));
    }
}
