//! DOM-structural, behavioral-script and keyword features (the vector tail)

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{Html, Node};

use crate::features::vector::BehaviorFeatures;
use crate::gate;

pub const LOGIN_KEYWORDS: [&str; 9] = [
    "login",
    "log in",
    "sign in",
    "verify",
    "verification",
    "authenticate",
    "password",
    "reset your password",
    "secure your account",
];

pub const PAYMENT_KEYWORDS: [&str; 11] = [
    "credit card",
    "debit card",
    "payment",
    "pay now",
    "billing",
    "invoice",
    "paypal",
    "net banking",
    "upi",
    "card number",
    "cvv",
];

pub const SUSPICIOUS_EVENTS: [&str; 8] = [
    "onclick",
    "onload",
    "onmouseover",
    "onmouseout",
    "onfocus",
    "onblur",
    "onunload",
    "onsubmit",
];

/// Text inside these elements is never page copy
const NON_TEXT_ELEMENTS: [&str; 4] = ["script", "style", "noscript", "template"];

static TAG_OPEN_REGEX: Lazy<Regex> = Lazy::new(|| Regex::new(r"<[A-Za-z!]").unwrap());

static REDIRECT_PATTERNS: Lazy<[Regex; 3]> = Lazy::new(|| {
    [
        Regex::new(r"location\.href\s*=").unwrap(),
        Regex::new(r"window\.location").unwrap(),
        Regex::new(r#"http-equiv=['"]refresh['"]"#).unwrap(),
    ]
});

/// Tag-level structure of a parsed document
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct DomStats {
    pub node_count: usize,
    pub depth: usize,
    pub child_count: usize,
    pub script_count: usize,
    pub input_count: usize,
    pub hidden_count: usize,
}

impl DomStats {
    fn ratio(&self, count: usize) -> f64 {
        if self.node_count == 0 {
            0.0
        } else {
            count as f64 / self.node_count as f64
        }
    }
}

pub fn behavior_features(html: &str, document: &Html) -> BehaviorFeatures {
    let stats = if has_tags(html) {
        dom_stats(document)
    } else {
        DomStats::default()
    };

    let lower_html = html.to_lowercase();
    let text = gate::text_content(document.root_element(), &NON_TEXT_ELEMENTS).to_lowercase();

    BehaviorFeatures {
        node_count: stats.node_count as f64,
        dom_depth: stats.depth as f64,
        branching_factor: stats.ratio(stats.child_count),
        script_ratio: stats.ratio(stats.script_count),
        input_count: stats.input_count as f64,
        hidden_ratio: stats.ratio(stats.hidden_count),
        redirect_scripts: redirect_count(&lower_html) as f64,
        eval_usage: if lower_html.contains("eval(") { 1.0 } else { 0.0 },
        suspicious_handlers: suspicious_handler_count(&lower_html) as f64,
        login_keywords: keyword_count(&text, &LOGIN_KEYWORDS) as f64,
        payment_keywords: keyword_count(&text, &PAYMENT_KEYWORDS) as f64,
    }
}

/// The HTML parser synthesizes html/head/body for any input, so "no tags" is decided on the raw markup
pub fn has_tags(html: &str) -> bool {
    TAG_OPEN_REGEX.is_match(html)
}

/// Walk the whole tree once. Depth is the longest root-to-leaf path over all child nodes,
/// computed with an explicit stack so deeply nested pages cannot overflow the thread stack.
pub fn dom_stats(document: &Html) -> DomStats {
    let mut stats = DomStats::default();
    let mut stack = vec![(document.tree.root(), 0usize)];

    while let Some((node, depth)) = stack.pop() {
        let mut children = 0;
        for child in node.children() {
            children += 1;
            stack.push((child, depth + 1));
        }
        if children == 0 {
            stats.depth = stats.depth.max(depth);
        }

        let Node::Element(element) = node.value() else {
            continue;
        };

        stats.node_count += 1;
        stats.child_count += children;

        match element.name() {
            "script" => stats.script_count += 1,
            "input" | "form" => stats.input_count += 1,
            _ => {}
        }

        let style: String = element
            .attr("style")
            .unwrap_or("")
            .chars()
            .filter(|c| !c.is_whitespace())
            .collect::<String>()
            .to_lowercase();
        if style.contains("display:none") || style.contains("visibility:hidden") || element.attr("hidden").is_some() {
            stats.hidden_count += 1;
        }
    }

    stats
}

pub fn redirect_count(lower_html: &str) -> usize {
    REDIRECT_PATTERNS
        .iter()
        .map(|pattern| pattern.find_iter(lower_html).count())
        .sum()
}

pub fn suspicious_handler_count(lower_html: &str) -> usize {
    SUSPICIOUS_EVENTS
        .iter()
        .map(|event| lower_html.matches(&format!("{}=", event)).count())
        .sum()
}

pub fn keyword_count(text: &str, keywords: &[&str]) -> usize {
    keywords.iter().map(|kw| text.matches(kw).count()).sum()
}
