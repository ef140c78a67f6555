//! Feature extraction
//!
//! `extract` is a pure function of its inputs: identical HTML and enrichment data always yield
//! the identical vector. Every sub-feature has a zero or -1 fallback, so extraction never fails.

pub mod dom;
pub mod registration;
pub mod vector;

use scraper::Html;

use crate::domain_utils::Domain;
use crate::geo::GeoRecord;
use crate::whois::WhoisRecord;

pub use vector::{BehaviorFeatures, FeatureVector, HeadFeatures, BEHAVIOR_LEN, FEATURE_LEN, HEAD_LEN};

pub fn extract(domain: &Domain, whois: Option<&WhoisRecord>, html: &str, geo: &GeoRecord) -> FeatureVector {
    let document = Html::parse_document(html);

    FeatureVector {
        head: registration::head_features(domain, whois, html, &document, geo),
        registrant_country: geo.registrant_index,
        host_country: geo.host_index(),
        behavior: dom::behavior_features(html, &document),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geo::HostCountry;
    use chrono::NaiveDate;

    #[test]
    fn test_extract_is_deterministic_and_fixed_length() {
        let domain = Domain::parse("https://www.sneaker-outlet.shop");
        let whois = WhoisRecord {
            creation_date: NaiveDate::from_ymd_opt(2023, 3, 1),
            expiration_date: NaiveDate::from_ymd_opt(2024, 3, 1),
            registrars: vec!["NameCheap, Inc.".to_string()],
            country: Some("IS".to_string()),
        };
        let geo = GeoRecord {
            host_country: HostCountry::Resolved { code: "US".to_string(), index: 7 },
            registrant_index: Some(3),
            country_match: false,
        };
        let html = "<html><body><a href=\"https://instagram.com/sneakeroutlet\">ig</a><form><input></form></body></html>";

        let first = extract(&domain, Some(&whois), html, &geo);
        let second = extract(&domain, Some(&whois), html, &geo);
        assert_eq!(first, second);

        let values = first.to_vec();
        assert_eq!(values.len(), FEATURE_LEN);
        assert_eq!(values[HEAD_LEN + 3], 1.0);
        assert_eq!(values[HEAD_LEN + 255 + 7], 1.0);
        assert_eq!(first.head.host_country_match, 0.0);
        assert_eq!(first.head.cheap_registrar, 1.0);
        assert_eq!(first.head.instagram, 0.0);
        assert_eq!(first.behavior.input_count, 2.0);
    }

    #[test]
    fn test_extract_without_enrichment() {
        let domain = Domain::parse("plain.com");
        let vector = extract(&domain, None, "", &GeoRecord::unresolved(None));

        assert_eq!(vector.to_vec().len(), FEATURE_LEN);
        assert_eq!(vector.head.whois_privacy, -1.0);
        assert_eq!(vector.head.domain_age_years, -1.0);
        assert_eq!(vector.head.host_country_match, -1.0);
        assert_eq!(vector.head.domain_mentions, -1.0);
        assert_eq!(vector.head.instagram, -1.0);
    }
}
