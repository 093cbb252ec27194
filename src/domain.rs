use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Characters that cannot appear in a file name on any of the platforms we save to.
const FORBIDDEN_FILE_NAME_CHARS: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

static SIZE_SUFFIX: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)_\d+x\d+(\.[a-z0-9]+)?$").expect("size suffix pattern is valid")
});

/// Market code the feed is crawled for, e.g. `en-US`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Locale(String);

impl Locale {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Locale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for Locale {
    type Err = FeedError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed
                .chars()
                .all(|ch| ch.is_ascii_alphanumeric() || ch == '-' || ch == '_');
        if !is_valid {
            return Err(FeedError::InvalidLocale(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

/// One dated record from the remote feed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ArchiveEntry {
    pub start_date: String,
    pub end_date: String,
    pub url_base: String,
    pub copyright: String,
    pub headline: String,
}

impl ArchiveEntry {
    pub fn date_pair(&self) -> (String, String) {
        (self.start_date.clone(), self.end_date.clone())
    }

    pub fn image_url(&self, host: &str, resolution: &str) -> String {
        image_url(host, &self.url_base, resolution)
    }
}

pub fn image_url(host: &str, url_base: &str, resolution: &str) -> String {
    format!("{}{}_{}.jpg", host.trim_end_matches('/'), url_base, resolution)
}

/// Derives the on-disk name for an image URL. `counter > 0` appends a ` (n)` disambiguator.
///
/// `https://www.bing.com/th?id=OHR.Test_EN-US1234567890_1920x1080.jpg` becomes `Test.jpg`:
/// scheme and host go, the `id` query value (or last path segment) is kept, the resolution
/// suffix and market tail are cut and the leading namespace before the first `.` is dropped.
pub fn derive_file_name(image_url: &str, counter: usize) -> String {
    let without_scheme = image_url
        .split_once("://")
        .map(|(_, rest)| rest)
        .unwrap_or(image_url);
    let path = without_scheme
        .split_once('/')
        .map(|(_, rest)| rest)
        .unwrap_or("");

    let stem = match path.split_once('?') {
        Some((route, query)) => query
            .split('&')
            .find_map(|pair| pair.strip_prefix("id="))
            .unwrap_or(route),
        None => path,
    };
    let stem = stem.rsplit('/').next().unwrap_or(stem);
    let stem = SIZE_SUFFIX.replace(stem, "");
    let stem = stem.split('_').next().unwrap_or_default();
    let stem = match stem.split_once('.') {
        Some((_, rest)) if !rest.is_empty() => rest,
        _ => stem,
    };
    let stem = if stem.trim().is_empty() {
        "image"
    } else {
        stem.trim()
    };

    let name = if counter > 0 {
        format!("{stem} ({counter}).jpg")
    } else {
        format!("{stem}.jpg")
    };
    sanitize_file_name(&name)
}

pub fn sanitize_file_name(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if FORBIDDEN_FILE_NAME_CHARS.contains(&ch) || ch.is_control() {
                '-'
            } else {
                ch
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_locale_valid() {
        let locale: Locale = " en-US ".parse().unwrap();
        assert_eq!(locale.as_str(), "en-US");
    }

    #[test]
    fn parse_locale_invalid() {
        let err = "en US".parse::<Locale>().unwrap_err();
        assert_matches!(err, FeedError::InvalidLocale(_));
        assert!("".parse::<Locale>().is_err());
    }

    #[test]
    fn file_name_from_query_id() {
        let url = image_url(
            "https://www.bing.com",
            "/th?id=OHR.Test_EN-US1234567890",
            "1920x1080",
        );
        assert_eq!(derive_file_name(&url, 0), "Test.jpg");
        assert_eq!(derive_file_name(&url, 2), "Test (2).jpg");
    }

    #[test]
    fn file_name_from_path_segment() {
        let url = "https://www.bing.com/az/hprichbg/rb/Lighthouse_DE-DE987_1366x768.jpg";
        assert_eq!(derive_file_name(url, 0), "Lighthouse.jpg");
    }

    #[test]
    fn file_name_replaces_forbidden_characters() {
        assert_eq!(sanitize_file_name("a:b|c?.jpg"), "a-b-c-.jpg");
    }
}
