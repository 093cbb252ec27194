use std::collections::HashSet;
use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use crate::error::FeedError;
use crate::layout::Layout;

/// Loads a JSON catalog. A missing or unreadable file is an empty catalog, never an error.
pub fn load_or_default<T>(path: &Utf8Path) -> T
where
    T: DeserializeOwned + Default,
{
    if !path.as_std_path().exists() {
        debug!(file = %path, "catalog not found, starting empty");
        return T::default();
    }
    let content = match fs::read_to_string(path.as_std_path()) {
        Ok(content) => content,
        Err(err) => {
            warn!(file = %path, error = %err, "failed to read catalog, starting empty");
            return T::default();
        }
    };
    match serde_json::from_str(&content) {
        Ok(value) => value,
        Err(err) => {
            warn!(file = %path, error = %err, "corrupt catalog, starting empty");
            T::default()
        }
    }
}

pub fn save<T: Serialize + ?Sized>(path: &Utf8Path, value: &T) -> Result<(), FeedError> {
    let content = serde_json::to_vec_pretty(value)
        .map_err(|err| FeedError::Catalog(format!("serialize {path}: {err}")))?;
    Layout::write_bytes_atomic(path, &content)
}

/// Every image URL already handled, in the order it was first seen.
#[derive(Debug)]
pub struct UrlHistory {
    path: Utf8PathBuf,
    urls: Vec<String>,
    index: HashSet<String>,
}

impl UrlHistory {
    pub fn load(path: Utf8PathBuf) -> Self {
        let stored: Vec<String> = load_or_default(&path);
        let mut history = Self {
            path,
            urls: Vec::with_capacity(stored.len()),
            index: HashSet::with_capacity(stored.len()),
        };
        for url in stored {
            history.insert(url);
        }
        history
    }

    pub fn contains(&self, url: &str) -> bool {
        self.index.contains(url)
    }

    /// Records `url`; returns `false` when it was already present.
    pub fn insert(&mut self, url: impl Into<String>) -> bool {
        let url = url.into();
        if !self.index.insert(url.clone()) {
            return false;
        }
        self.urls.push(url);
        true
    }

    pub fn len(&self) -> usize {
        self.urls.len()
    }

    pub fn is_empty(&self) -> bool {
        self.urls.is_empty()
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn flush(&self) -> Result<(), FeedError> {
        save(&self.path, &self.urls)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corrupt_catalog_loads_empty() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("urls.json")).unwrap();
        fs::write(path.as_std_path(), b"{ not json").unwrap();

        let history = UrlHistory::load(path);
        assert!(history.is_empty());
    }

    #[test]
    fn history_round_trips_in_insertion_order() {
        let temp = tempfile::tempdir().unwrap();
        let path = Utf8PathBuf::from_path_buf(temp.path().join("urls.json")).unwrap();

        let mut history = UrlHistory::load(path.clone());
        assert!(history.insert("https://example.com/b.jpg"));
        assert!(history.insert("https://example.com/a.jpg"));
        assert!(!history.insert("https://example.com/b.jpg"));
        history.flush().unwrap();

        let reloaded = UrlHistory::load(path);
        assert_eq!(
            reloaded.urls(),
            &[
                "https://example.com/b.jpg".to_string(),
                "https://example.com/a.jpg".to_string()
            ]
        );
        assert!(reloaded.contains("https://example.com/a.jpg"));
    }
}
