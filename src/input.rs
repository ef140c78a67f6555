//! Domain list input parsing
//!
//! Supports:
//! - Newline-delimited text/CSV (one URL or domain per line, first column used)
//! - Line-JSON (`.jsonl` / `.ndjson`): each line a JSON string or `{"url": ...}` / `{"domain": ...}`
//! - JSON (`.json`): array of strings/objects, or an object with a `domains` array
//!
//! Entries are returned raw; normalization and deduplication happen in `domain_utils`.

use anyhow::{Context, Result, bail};
use std::fs;
use std::path::Path;

/// Input format for domain list files
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum InputFormat {
    /// One entry per line (also covers simple CSV)
    Lines,
    /// One JSON value per line
    JsonLines,
    /// A single JSON document
    Json,
}

impl InputFormat {
    /// Detect format from file extension, defaulting to plain lines
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()).map(|e| e.to_lowercase()).as_deref() {
            Some("jsonl") | Some("ndjson") => Self::JsonLines,
            Some("json") => Self::Json,
            _ => Self::Lines,
        }
    }
}

/// Read raw domain entries from a file (format detected from extension)
pub fn read_domain_file(path: &Path) -> Result<Vec<String>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read input file: {}", path.display()))?;

    match InputFormat::from_path(path) {
        InputFormat::Lines => Ok(parse_lines(&content)),
        InputFormat::JsonLines => Ok(parse_json_lines(&content)),
        InputFormat::Json => match parse_json_document(&content) {
            Ok(entries) => Ok(entries),
            // Crawl dumps are often line-JSON saved with a .json extension
            Err(_) => Ok(parse_json_lines(&content)),
        },
    }
}

/// Parse newline-delimited entries, skipping blanks, comments and a `url`/`domain` header
pub fn parse_lines(content: &str) -> Vec<String> {
    let mut entries = Vec::new();

    for (idx, line) in content.lines().enumerate() {
        let entry = line.split(',').next().unwrap_or(line).trim().replace('"', "");

        if entry.is_empty() || entry.starts_with('#') {
            continue;
        }

        if idx == 0 && matches!(entry.to_lowercase().as_str(), "url" | "urls" | "domain") {
            continue;
        }

        entries.push(entry);
    }

    entries
}

/// Parse line-JSON entries. Lines that are not valid JSON are taken verbatim.
pub fn parse_json_lines(content: &str) -> Vec<String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .filter_map(|line| match serde_json::from_str::<serde_json::Value>(line) {
            Ok(value) => entry_from_value(&value),
            Err(_) => Some(line.replace('"', "")),
        })
        .collect()
}

/// Parse a single JSON document
///
/// Supports three formats:
/// 1. Array of strings: ["example.com", "https://test.org"]
/// 2. Array of objects with a "url" or "domain" field
/// 3. Object with "domains" array: {"domains": [...]}
pub fn parse_json_document(content: &str) -> Result<Vec<String>> {
    let value: serde_json::Value = serde_json::from_str(content)
        .context("Failed to parse JSON content")?;

    let entries = match &value {
        serde_json::Value::Array(arr) => arr.iter().filter_map(entry_from_value).collect(),
        serde_json::Value::Object(obj) => match obj.get("domains") {
            Some(serde_json::Value::Array(arr)) => arr.iter().filter_map(entry_from_value).collect(),
            Some(_) => bail!("'domains' field must be an array"),
            None => bail!("JSON object must have a 'domains' array field"),
        },
        _ => bail!("JSON must be an array of domains or an object with 'domains' field"),
    };

    Ok(entries)
}

fn entry_from_value(value: &serde_json::Value) -> Option<String> {
    let raw = match value {
        serde_json::Value::String(s) => s.as_str(),
        serde_json::Value::Object(obj) => obj
            .get("url")
            .or_else(|| obj.get("domain"))
            .and_then(|v| v.as_str())?,
        _ => return None,
    };

    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
