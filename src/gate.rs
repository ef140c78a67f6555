//! Content gate: rejects pages that are too short, parked/placeholder pages, and (when enabled)
//! pages whose visible text is not in an allowed language.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node, Selector};
use thiserror::Error;
use whatlang::Lang;

use crate::config::GateConfig;

/// Curated phrases of for-sale pages, registrar placeholders, construction pages and block pages
static PARKED_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(concat!(
        r"(?i)buy this domain|parked free|godaddy|is for sale",
        r"|domain parking|renew now|this domain|namecheap|buy now for",
        r"|hugedomains|is owned and listed by|sav\.com|searchvity\.com",
        r"|domain for sale|register4less|aplus\.net|related searches",
        r"|be the first to know when we launch|get notified when we open our online store",
        r"|related links|search ads|domain expert|united domains",
        r"|domian name has been registered|this domain may be for sale",
        r"|domain name is available for sale|premium domain",
        r"|registrar placeholder|under construction|coming soon",
        r"|this domain name|this domain has expired|domainpage\.io",
        r"|sedoparking\.com|parking-lander",
        r"|create your website",
        r"|something really good is coming very soon",
        r"|this domain is available on auction",
        r"|opening soon",
        r"|this page isn't working",
        r"|sorry, you have been blocked",
        r"|you are unable to access",
        r"|this content isn't available right now",
        r"|redirected you too many times",
    ))
    .unwrap()
});

static BODY_SELECTOR: Lazy<Selector> = Lazy::new(|| Selector::parse("body").unwrap());

/// Elements whose text never counts as visible page copy
const NON_VISIBLE_ELEMENTS: [&str; 7] = ["script", "style", "noscript", "template", "nav", "footer", "header"];

#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateRejection {
    #[error("too little content")]
    TooLittleContent,

    #[error("parked")]
    Parked,

    #[error("wrong language")]
    WrongLanguage,
}

#[derive(Debug, Clone)]
pub struct ContentGate {
    min_content_length: usize,
    language_filter: bool,
    languages: Vec<String>,
}

impl ContentGate {
    pub fn new(config: &GateConfig) -> Self {
        Self {
            min_content_length: config.min_content_length,
            language_filter: config.language_filter,
            languages: config.languages.iter().map(|l| l.trim().to_lowercase()).collect(),
        }
    }

    /// Run every enabled rule in order; the first match decides the rejection reason
    pub fn check(&self, html: &str) -> Result<(), GateRejection> {
        if html.chars().count() <= self.min_content_length {
            return Err(GateRejection::TooLittleContent);
        }

        if is_parked(html) {
            return Err(GateRejection::Parked);
        }

        if self.language_filter && !language_ok(&visible_text(html), &self.languages) {
            return Err(GateRejection::WrongLanguage);
        }

        Ok(())
    }

    /// Length and parked-page rules only
    pub fn accept(&self, html: &str) -> bool {
        html.chars().count() > self.min_content_length && !is_parked(html)
    }
}

pub fn is_parked(html: &str) -> bool {
    PARKED_REGEX.is_match(html)
}

/// True when the detected language of `text` is in `allowed` (ISO 639-1 or 639-3 codes).
/// Text with no detectable language is never accepted.
pub fn language_ok(text: &str, allowed: &[String]) -> bool {
    let Some(info) = whatlang::detect(text) else {
        return false;
    };

    let lang = info.lang();
    allowed.iter().any(|code| {
        let code = code.as_str();
        code == lang.code() || iso639_1(lang) == Some(code)
    })
}

fn iso639_1(lang: Lang) -> Option<&'static str> {
    let code = match lang {
        Lang::Eng => "en",
        Lang::Spa => "es",
        Lang::Fra => "fr",
        Lang::Deu => "de",
        Lang::Ita => "it",
        Lang::Por => "pt",
        Lang::Nld => "nl",
        Lang::Rus => "ru",
        Lang::Ukr => "uk",
        Lang::Pol => "pl",
        Lang::Ces => "cs",
        Lang::Ron => "ro",
        Lang::Hun => "hu",
        Lang::Swe => "sv",
        Lang::Dan => "da",
        Lang::Nob => "nb",
        Lang::Fin => "fi",
        Lang::Tur => "tr",
        Lang::Ell => "el",
        Lang::Ara => "ar",
        Lang::Heb => "he",
        Lang::Hin => "hi",
        Lang::Ben => "bn",
        Lang::Tha => "th",
        Lang::Vie => "vi",
        Lang::Ind => "id",
        Lang::Jpn => "ja",
        Lang::Kor => "ko",
        Lang::Cmn => "zh",
        Lang::Pes => "fa",
        _ => return None,
    };
    Some(code)
}

/// Visible body text: script, style and page-chrome elements dropped, text nodes joined with
/// single spaces and whitespace collapsed. Falls back to the whole document when there is no body.
pub fn visible_text(html: &str) -> String {
    let document = Html::parse_document(html);
    let root = match document.select(&BODY_SELECTOR).next() {
        Some(body) => body,
        None => document.root_element(),
    };
    text_content(root, &NON_VISIBLE_ELEMENTS)
}

/// Whitespace-collapsed text under `root`, skipping anything inside the named elements
pub fn text_content(root: ElementRef<'_>, skip: &[&str]) -> String {
    let mut parts: Vec<&str> = Vec::new();
    for node in root.descendants() {
        let Node::Text(text) = node.value() else {
            continue;
        };

        let skipped = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .map_or(false, |el| skip.contains(&el.name()))
        });
        if !skipped {
            parts.extend(text.split_whitespace());
        }
    }

    parts.join(" ")
}
