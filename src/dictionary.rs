//! Shared wordlist cursor handed out to probe workers

use crate::error::{DirhoundError, Result};
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use tracing::info;

const EXTENSION_TAG: &str = "%EXT%";

/// Ordered, replayable sequence of candidate paths with a shared position
#[derive(Debug, Default)]
pub struct Dictionary {
    entries: Vec<String>,
    index: AtomicUsize,
}

impl Dictionary {
    pub fn new(entries: Vec<String>) -> Self {
        Self {
            entries,
            index: AtomicUsize::new(0),
        }
    }

    /// Loads and merges wordlist files, expanding `%EXT%` with every extension
    pub fn from_wordlists(paths: &[String], extensions: &[String]) -> Result<Self> {
        let mut seen = HashSet::new();
        let mut entries = Vec::new();

        for path in paths {
            for entry in read_entries(Path::new(path), extensions)? {
                if seen.insert(entry.clone()) {
                    entries.push(entry);
                }
            }
        }

        info!("Loaded {} dictionary entries", entries.len());
        Ok(Self::new(entries))
    }

    /// Restores a dictionary exported from a session
    pub fn import(entries: Vec<String>, index: usize) -> Self {
        let index = index.min(entries.len());
        Self {
            entries,
            index: AtomicUsize::new(index),
        }
    }

    /// Entries and current position
    pub fn export(&self) -> (Vec<String>, usize) {
        (self.entries.clone(), self.index())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of entries handed out so far
    pub fn index(&self) -> usize {
        self.index.load(Ordering::SeqCst)
    }

    pub fn reset(&self) {
        self.index.store(0, Ordering::SeqCst);
    }

    /// Takes the next entry, or `None` once the wordlist is exhausted
    pub fn next_entry(&self) -> Option<&str> {
        let len = self.entries.len();
        self.index
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |i| {
                (i < len).then_some(i + 1)
            })
            .ok()
            .map(|i| self.entries[i].as_str())
    }
}

/// Loads per-status blacklist files (`403 = "db/403_blacklist.txt"`)
pub fn load_blacklists(
    files: &BTreeMap<u16, String>,
    extensions: &[String],
) -> Result<BTreeMap<u16, Vec<String>>> {
    files
        .iter()
        .map(|(status, path)| Ok((*status, read_entries(Path::new(path), extensions)?)))
        .collect()
}

fn read_entries(path: &Path, extensions: &[String]) -> Result<Vec<String>> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        DirhoundError::ConfigError(format!("Cannot read wordlist {}: {e}", path.display()))
    })?;
    Ok(expand_entries(&content, extensions))
}

fn expand_entries(content: &str, extensions: &[String]) -> Vec<String> {
    let mut entries = Vec::new();
    for line in content.lines() {
        let line = line.trim().trim_start_matches('/');
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.contains(EXTENSION_TAG) {
            for extension in extensions {
                let extension = extension.trim_start_matches('.');
                entries.push(line.replace(EXTENSION_TAG, extension));
            }
        } else {
            entries.push(line.to_string());
        }
    }
    entries
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expand_entries() {
        let content = "# comment\nadmin\n/login.%EXT%\n\nbackup/\n";
        let extensions = vec!["php".to_string(), ".bak".to_string()];
        assert_eq!(
            expand_entries(content, &extensions),
            vec!["admin", "login.php", "login.bak", "backup/"]
        );
        assert_eq!(expand_entries("index.%EXT%\n", &[]), Vec::<String>::new());
    }

    #[test]
    fn test_cursor_stops_at_end() {
        let dictionary = Dictionary::new(vec!["a".to_string(), "b".to_string()]);
        assert_eq!(dictionary.next_entry(), Some("a"));
        assert_eq!(dictionary.next_entry(), Some("b"));
        assert_eq!(dictionary.next_entry(), None);
        assert_eq!(dictionary.index(), 2);

        dictionary.reset();
        assert_eq!(dictionary.next_entry(), Some("a"));
    }

    #[test]
    fn test_import_resumes_position() {
        let dictionary = Dictionary::import(vec!["a".into(), "b".into(), "c".into()], 2);
        assert_eq!(dictionary.next_entry(), Some("c"));
        let (entries, index) = dictionary.export();
        assert_eq!(entries.len(), 3);
        assert_eq!(index, 3);
    }
}
