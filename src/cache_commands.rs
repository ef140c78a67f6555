//! Cache management commands for the scamcrawl CLI
//!
//! List, inspect and clear the page HTML cache under `crawl.cache_dir`.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use std::fs;
use std::time::SystemTime;

use crate::domain_utils::Domain;
use crate::gate::ContentGate;
use crate::page_cache::PageCache;

/// List all cached pages
pub fn list_cached_pages(cache: &PageCache) -> Result<()> {
    let entries = cache
        .entries()
        .with_context(|| format!("Failed to read cache directory: {}", cache.dir().display()))?;

    if entries.is_empty() {
        println!("No cached pages found in {}.", cache.dir().display());
        return Ok(());
    }

    let total_bytes: u64 = entries.iter().map(|(_, size)| size).sum();

    println!("Cached Pages ({} total, {}):", entries.len(), format_size(total_bytes));
    println!("{}", "=".repeat(60));
    println!("{:<45} {:>12}", "Domain", "Size");
    println!("{}", "-".repeat(60));

    for (stem, size) in entries {
        println!("{:<45} {:>12}", stem, format_size(size));
    }

    Ok(())
}

/// Show one cached page: location, size, age and what the content gate makes of it
pub fn show_cache_entry(cache: &PageCache, gate: &ContentGate, domain: &str) -> Result<()> {
    let domain = Domain::parse(domain);
    let path = cache.path_for(&domain.key);

    let Some(html) = cache
        .load(&domain.key)
        .with_context(|| format!("Failed to read cached page: {}", path.display()))?
    else {
        let similar: Vec<String> = cache
            .entries()
            .unwrap_or_default()
            .into_iter()
            .map(|(stem, _)| stem)
            .filter(|stem| stem.contains(&domain.key) || domain.key.contains(stem.as_str()))
            .collect();

        if !similar.is_empty() {
            eprintln!("Did you mean one of these?");
            for s in similar {
                eprintln!("  - {}", s);
            }
        }
        bail!("No cache entry found for: {}", domain.key);
    };

    let modified = fs::metadata(&path).and_then(|m| m.modified()).ok();

    println!("Cache Entry for: {}", domain.key);
    println!("{}", "=".repeat(60));
    println!("File: {}", path.display());
    println!("Size: {} ({} characters)", format_size(html.len() as u64), html.chars().count());
    println!(
        "Last Modified: {}",
        modified.map(format_timestamp).unwrap_or_else(|| "Unknown".to_string())
    );
    match gate.check(&html) {
        Ok(()) => println!("Content Gate: accepted"),
        Err(rejection) => println!("Content Gate: rejected ({})", rejection),
    }

    Ok(())
}

/// Clear the cached page for one domain
pub fn clear_domain_cache(cache: &PageCache, domain: &str) -> Result<()> {
    let domain = Domain::parse(domain);

    let removed = cache
        .remove(&domain.key)
        .with_context(|| format!("Failed to clear cache for {}", domain.key))?;
    if !removed {
        bail!("No cache entry found for: {}", domain.key);
    }

    println!("Successfully cleared cache for: {}", domain.key);
    Ok(())
}

/// Clear every cached page; returns how many were removed
pub fn clear_all_cache(cache: &PageCache) -> Result<usize> {
    let entries = cache
        .entries()
        .with_context(|| format!("Failed to read cache directory: {}", cache.dir().display()))?;

    let mut count = 0;
    for (stem, _) in entries {
        if cache.remove(&stem).with_context(|| format!("Failed to clear cache for {}", stem))? {
            count += 1;
        }
    }

    if count > 0 {
        println!("Successfully cleared {} cache entries.", count);
    } else {
        println!("No cache entries to clear.");
    }
    Ok(count)
}

fn format_timestamp(time: SystemTime) -> String {
    let datetime: DateTime<Utc> = time.into();
    datetime.format("%Y-%m-%d %H:%M:%S UTC").to_string()
}

fn format_size(bytes: u64) -> String {
    match bytes {
        b if b >= 1024 * 1024 => format!("{:.1} MB", b as f64 / (1024.0 * 1024.0)),
        b if b >= 1024 => format!("{:.1} KB", b as f64 / 1024.0),
        b => format!("{} B", b),
    }
}
