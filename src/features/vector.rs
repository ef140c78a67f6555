//! Fixed feature-vector schema.
//!
//! Consumers index the flattened vector positionally, so the field order of every struct here
//! and the order of `to_vec` are part of the output contract.

use crate::geo::COUNTRY_SLOTS;

/// Registration, lexical, social and geo features
pub const HEAD_LEN: usize = 15;
/// DOM-structural, behavioral and keyword features
pub const BEHAVIOR_LEN: usize = 11;
/// Total flattened length: head, registrant one-hot, host one-hot, behavior
pub const FEATURE_LEN: usize = HEAD_LEN + 2 * COUNTRY_SLOTS + BEHAVIOR_LEN;

pub const HEAD_COLUMNS: [&str; HEAD_LEN] = [
    "whois_privacy",
    "instagram",
    "facebook",
    "twitter",
    "external_links",
    "host_country_match",
    "script_tags",
    "has_hyphen",
    "subdomain_labels",
    "has_digit",
    "cheap_registrar",
    "cheap_tld",
    "domain_mentions",
    "uncommon_tld",
    "domain_age_years",
];

pub const BEHAVIOR_COLUMNS: [&str; BEHAVIOR_LEN] = [
    "node_count",
    "dom_depth",
    "branching_factor",
    "script_ratio",
    "input_count",
    "hidden_ratio",
    "redirect_scripts",
    "eval_usage",
    "suspicious_handlers",
    "login_keywords",
    "payment_keywords",
];

/// Tri-state flags use 1 / 0 / -1 where -1 means "no evidence either way"
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct HeadFeatures {
    pub whois_privacy: f64,
    pub instagram: f64,
    pub facebook: f64,
    pub twitter: f64,
    pub external_links: f64,
    pub host_country_match: f64,
    pub script_tags: f64,
    pub has_hyphen: f64,
    pub subdomain_labels: f64,
    pub has_digit: f64,
    pub cheap_registrar: f64,
    pub cheap_tld: f64,
    pub domain_mentions: f64,
    pub uncommon_tld: f64,
    pub domain_age_years: f64,
}

impl HeadFeatures {
    pub fn to_array(&self) -> [f64; HEAD_LEN] {
        [
            self.whois_privacy,
            self.instagram,
            self.facebook,
            self.twitter,
            self.external_links,
            self.host_country_match,
            self.script_tags,
            self.has_hyphen,
            self.subdomain_labels,
            self.has_digit,
            self.cheap_registrar,
            self.cheap_tld,
            self.domain_mentions,
            self.uncommon_tld,
            self.domain_age_years,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct BehaviorFeatures {
    pub node_count: f64,
    pub dom_depth: f64,
    pub branching_factor: f64,
    pub script_ratio: f64,
    pub input_count: f64,
    pub hidden_ratio: f64,
    pub redirect_scripts: f64,
    pub eval_usage: f64,
    pub suspicious_handlers: f64,
    pub login_keywords: f64,
    pub payment_keywords: f64,
}

impl BehaviorFeatures {
    pub fn to_array(&self) -> [f64; BEHAVIOR_LEN] {
        [
            self.node_count,
            self.dom_depth,
            self.branching_factor,
            self.script_ratio,
            self.input_count,
            self.hidden_ratio,
            self.redirect_scripts,
            self.eval_usage,
            self.suspicious_handlers,
            self.login_keywords,
            self.payment_keywords,
        ]
    }
}

/// Feature record for one accepted domain
#[derive(Debug, Clone, PartialEq, Default)]
pub struct FeatureVector {
    pub head: HeadFeatures,
    /// Hot slot of the registrant-country block, `None` leaves the block all zero
    pub registrant_country: Option<usize>,
    /// Hot slot of the host-country block
    pub host_country: Option<usize>,
    pub behavior: BehaviorFeatures,
}

impl FeatureVector {
    /// Flatten into the positional layout. Always `FEATURE_LEN` long.
    pub fn to_vec(&self) -> Vec<f64> {
        let mut values = Vec::with_capacity(FEATURE_LEN);
        values.extend_from_slice(&self.head.to_array());
        values.extend_from_slice(&one_hot(self.registrant_country));
        values.extend_from_slice(&one_hot(self.host_country));
        values.extend_from_slice(&self.behavior.to_array());
        values
    }

    /// Column names matching `to_vec` positions
    pub fn column_names() -> Vec<String> {
        let mut names: Vec<String> = HEAD_COLUMNS.iter().map(|c| c.to_string()).collect();
        names.extend((0..COUNTRY_SLOTS).map(|i| format!("registrant_country_{}", i)));
        names.extend((0..COUNTRY_SLOTS).map(|i| format!("host_country_{}", i)));
        names.extend(BEHAVIOR_COLUMNS.iter().map(|c| c.to_string()));
        names
    }
}

fn one_hot(index: Option<usize>) -> [f64; COUNTRY_SLOTS] {
    let mut block = [0.0; COUNTRY_SLOTS];
    if let Some(slot) = index.and_then(|i| block.get_mut(i)) {
        *slot = 1.0;
    }
    block
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_layout_length() {
        assert_eq!(FEATURE_LEN, 536);
        assert_eq!(FeatureVector::default().to_vec().len(), FEATURE_LEN);
        assert_eq!(FeatureVector::column_names().len(), FEATURE_LEN);
    }

    #[test]
    fn test_one_hot_positions() {
        let vector = FeatureVector {
            registrant_country: Some(3),
            host_country: Some(254),
            ..Default::default()
        };
        let values = vector.to_vec();

        assert_eq!(values[HEAD_LEN + 3], 1.0);
        assert_eq!(values[HEAD_LEN + COUNTRY_SLOTS + 254], 1.0);
        assert_eq!(values.iter().filter(|v| **v == 1.0).count(), 2);
    }

    #[test]
    fn test_out_of_range_slot_is_ignored() {
        let vector = FeatureVector {
            host_country: Some(COUNTRY_SLOTS),
            ..Default::default()
        };
        let values = vector.to_vec();
        assert_eq!(values.len(), FEATURE_LEN);
        assert!(values.iter().all(|v| *v == 0.0));
    }

    #[test]
    fn test_head_and_behavior_positions() {
        let vector = FeatureVector {
            head: HeadFeatures { whois_privacy: -1.0, domain_age_years: 2.5, ..Default::default() },
            behavior: BehaviorFeatures { node_count: 42.0, payment_keywords: 7.0, ..Default::default() },
            ..Default::default()
        };
        let values = vector.to_vec();
        let names = FeatureVector::column_names();

        assert_eq!(values[0], -1.0);
        assert_eq!(values[14], 2.5);
        assert_eq!(names[14], "domain_age_years");
        assert_eq!(values[525], 42.0);
        assert_eq!(names[525], "node_count");
        assert_eq!(values[535], 7.0);
        assert_eq!(names[535], "payment_keywords");
    }
}
