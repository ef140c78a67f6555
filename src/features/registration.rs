//! Registration, lexical, social-presence and link features (the vector head)

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Selector};
use url::Url;

use crate::domain_utils::{self, Domain, CHEAP_TLDS, COMMON_TLDS};
use crate::features::vector::HeadFeatures;
use crate::geo::{GeoRecord, HostCountry};
use crate::whois::WhoisRecord;

const PRIVACY_KEYWORDS: [&str; 5] = [
    "whoisguard",
    "redacted for privacy",
    "private whois",
    "domain privacy",
    "priva",
];

const CHEAP_REGISTRARS: [&str; 6] = ["namecheap", "godaddy", "porkbun", "namesilo", "danesco", "hostinger"];

static SOCIAL_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"instagram\.com/([a-zA-Z0-9_\-]+)").unwrap(),
        Regex::new(r"facebook\.com/([a-zA-Z0-9_\-]+)").unwrap(),
        Regex::new(r"twitter\.com/([a-zA-Z0-9_\-]+)").unwrap(),
    ]
});

static SCRIPT_SRC_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("script[src]").unwrap());
static LINK_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("a[href]").unwrap());
static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

pub fn head_features(
    domain: &Domain,
    whois: Option<&WhoisRecord>,
    html: &str,
    document: &Html,
    geo: &GeoRecord,
) -> HeadFeatures {
    let registrar = whois.and_then(WhoisRecord::registrar);
    let [instagram, facebook, twitter] = social_flags(html, domain);

    HeadFeatures {
        whois_privacy: privacy_flag(registrar),
        instagram,
        facebook,
        twitter,
        external_links: count_external_links(document, domain) as f64,
        host_country_match: match geo.host_country {
            HostCountry::Unresolved => -1.0,
            HostCountry::Resolved { .. } => flag(geo.country_match),
        },
        script_tags: document.select(&SCRIPT_SRC_SELECTOR).count() as f64,
        has_hyphen: flag(domain.key.contains('-')),
        subdomain_labels: domain.name_without_tld().matches('.').count() as f64,
        has_digit: flag(domain.key.chars().any(|c| c.is_ascii_digit())),
        cheap_registrar: flag(is_cheap_registrar(registrar)),
        cheap_tld: flag(CHEAP_TLDS.contains(&domain.tld())),
        domain_mentions: domain_mentions(html, document, domain),
        uncommon_tld: flag(!COMMON_TLDS.contains(&domain.tld())),
        domain_age_years: domain_age_years(whois),
    }
}

fn flag(value: bool) -> f64 {
    if value {
        1.0
    } else {
        0.0
    }
}

/// 1 when the registrar is a privacy/proxy service, 0 otherwise, -1 with no registrar at all
pub fn privacy_flag(registrar: Option<&str>) -> f64 {
    match registrar {
        None => -1.0,
        Some(name) => {
            let name = name.to_lowercase();
            flag(PRIVACY_KEYWORDS.iter().any(|kw| name.contains(kw)))
        }
    }
}

pub fn is_cheap_registrar(registrar: Option<&str>) -> bool {
    registrar.map_or(false, |name| {
        let name = name.to_lowercase();
        CHEAP_REGISTRARS.iter().any(|cr| name.contains(cr))
    })
}

/// Registration span in years, -1 when either date is missing
pub fn domain_age_years(whois: Option<&WhoisRecord>) -> f64 {
    match whois.and_then(|w| w.creation_date.zip(w.expiration_date)) {
        Some((created, expires)) => (expires - created).num_days() as f64 / 365.0,
        None => -1.0,
    }
}

/// Instagram / Facebook / Twitter: 1 when the first profile handle appears in the domain,
/// 0 when a profile link exists with another handle, -1 with no profile link
pub fn social_flags(html: &str, domain: &Domain) -> [f64; 3] {
    let key = domain.key.as_str();
    let mut flags = [-1.0; 3];

    for (slot, pattern) in flags.iter_mut().zip(SOCIAL_PATTERNS.iter()) {
        if let Some(handle) = pattern.captures(html).and_then(|cap| cap.get(1)) {
            *slot = flag(key.contains(&handle.as_str().to_lowercase()));
        }
    }

    flags
}

/// Absolute http(s) links whose host is neither the page's domain nor one of its subdomains
pub fn count_external_links(document: &Html, domain: &Domain) -> usize {
    document
        .select(&LINK_SELECTOR)
        .filter_map(|a| a.value().attr("href"))
        .map(str::trim)
        .filter(|href| href.starts_with("http"))
        .filter(|href| match Url::parse(href) {
            Ok(url) => url
                .host_str()
                .map_or(true, |host| !domain_utils::is_same_site(host, &domain.key)),
            Err(_) => !href.to_lowercase().contains(&domain.key),
        })
        .count()
}

/// Case-sensitive occurrences of the (lowercase) domain key in the body text, -1 when the page
/// has no `<body>` tag.
/// The parser synthesizes a body for any input, so presence is checked on the raw markup.
pub fn domain_mentions(html: &str, document: &Html, domain: &Domain) -> f64 {
    if domain.key.is_empty() || !html.to_lowercase().contains("<body") {
        return -1.0;
    }

    let body_text: String = document
        .select(&BODY_SELECTOR)
        .next()
        .map(|body| body.text().collect())
        .unwrap_or_default();

    body_text.matches(domain.key.as_str()).count() as f64
}
