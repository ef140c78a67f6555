//! Disk-backed page cache
//!
//! One `<domain>.html` file per normalized domain. File existence is the only hit signal;
//! entries are never revalidated and never expire. Workers are handed disjoint domain sets,
//! so two writers never target the same file.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use crate::domain_utils;

pub const PAGE_EXTENSION: &str = "html";

#[derive(Debug, Clone)]
pub struct PageCache {
    dir: PathBuf,
}

impl PageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic cache path for a normalized domain key
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir
            .join(format!("{}.{}", domain_utils::cache_file_stem(key), PAGE_EXTENSION))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.path_for(key).exists()
    }

    /// Read a cached page, decoding invalid UTF-8 lossily. `Ok(None)` on a miss.
    pub fn load(&self, key: &str) -> io::Result<Option<String>> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        let bytes = fs::read(&path)?;
        Ok(Some(String::from_utf8_lossy(&bytes).into_owned()))
    }

    /// Persist a page. Written to a temp file then renamed so an interrupted write never
    /// leaves a truncated entry that would later count as a hit.
    pub fn store(&self, key: &str, html: &str) -> io::Result<PathBuf> {
        fs::create_dir_all(&self.dir)?;

        let path = self.path_for(key);
        let temp_path = path.with_extension(format!("{}.tmp", PAGE_EXTENSION));

        {
            let mut file = fs::File::create(&temp_path)?;
            io::Write::write_all(&mut file, html.as_bytes())?;
            file.sync_all()?;
        }
        fs::rename(&temp_path, &path)?;

        Ok(path)
    }

    pub fn remove(&self, key: &str) -> io::Result<bool> {
        let path = self.path_for(key);
        if path.exists() {
            fs::remove_file(&path)?;
            Ok(true)
        } else {
            Ok(false)
        }
    }

    /// All cached entries as (file stem, size in bytes), sorted by stem
    pub fn entries(&self) -> io::Result<Vec<(String, u64)>> {
        if !self.dir.exists() {
            return Ok(Vec::new());
        }

        let mut entries = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some(PAGE_EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                entries.push((stem.to_string(), entry.metadata()?.len()));
            }
        }
        entries.sort();
        Ok(entries)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_path_strips_unsafe_characters() {
        let cache = PageCache::new("/tmp/pages");
        assert_eq!(cache.path_for("example.com"), PathBuf::from("/tmp/pages/example.com.html"));
        assert_eq!(cache.path_for("host.com:8080"), PathBuf::from("/tmp/pages/host.com8080.html"));
    }

    #[test]
    fn test_store_then_load() {
        let dir = TempDir::new().unwrap();
        let cache = PageCache::new(dir.path().join("nested"));

        assert!(!cache.contains("example.com"));
        assert_eq!(cache.load("example.com").unwrap(), None);

        cache.store("example.com", "<html>hello</html>").unwrap();
        assert!(cache.contains("example.com"));
        assert_eq!(cache.load("example.com").unwrap().as_deref(), Some("<html>hello</html>"));
        assert!(!cache.path_for("example.com").with_extension("html.tmp").exists());
    }

    #[test]
    fn test_load_invalid_utf8_is_lossy() {
        let dir = TempDir::new().unwrap();
        let cache = PageCache::new(dir.path());
        std::fs::write(cache.path_for("bad.com"), [b'o', b'k', 0xff, 0xfe]).unwrap();

        let page = cache.load("bad.com").unwrap().unwrap();
        assert!(page.starts_with("ok"));
    }

    #[test]
    fn test_entries_and_remove() {
        let dir = TempDir::new().unwrap();
        let cache = PageCache::new(dir.path());
        cache.store("b.com", "bb").unwrap();
        cache.store("a.com", "a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        assert_eq!(
            cache.entries().unwrap(),
            vec![("a.com".to_string(), 1), ("b.com".to_string(), 2)]
        );

        assert!(cache.remove("a.com").unwrap());
        assert!(!cache.remove("a.com").unwrap());
        assert_eq!(cache.entries().unwrap().len(), 1);
    }
}
