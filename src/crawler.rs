use std::collections::HashSet;

use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::domain::{ArchiveEntry, Locale};
use crate::error::FeedError;
use crate::feed::FeedClient;

#[derive(Debug, Default, Deserialize)]
struct RawEntry {
    #[serde(default)]
    startdate: String,
    #[serde(default)]
    enddate: String,
    #[serde(default, rename = "urlbase", alias = "urlBase")]
    url_base: String,
    #[serde(default)]
    copyright: String,
    #[serde(default)]
    headline: Option<String>,
    #[serde(default)]
    title: Option<String>,
}

impl From<RawEntry> for ArchiveEntry {
    fn from(raw: RawEntry) -> Self {
        Self {
            start_date: raw.startdate,
            end_date: raw.enddate,
            url_base: raw.url_base,
            copyright: raw.copyright,
            headline: raw.headline.or(raw.title).unwrap_or_default(),
        }
    }
}

/// Parses one archive page. A body that is not JSON or has no `images` array is malformed;
/// individual records that cannot be read are skipped.
pub fn parse_page(body: &str) -> Result<Vec<ArchiveEntry>, FeedError> {
    let document: Value =
        serde_json::from_str(body).map_err(|err| FeedError::MalformedPage(err.to_string()))?;
    let images = document
        .get("images")
        .and_then(Value::as_array)
        .ok_or_else(|| FeedError::MalformedPage("missing images array".to_string()))?;

    let mut entries = Vec::with_capacity(images.len());
    for image in images {
        match serde_json::from_value::<RawEntry>(image.clone()) {
            Ok(raw) => entries.push(ArchiveEntry::from(raw)),
            Err(err) => warn!(error = %err, "skipping unreadable archive record"),
        }
    }
    Ok(entries)
}

/// Walks the paged archive of one locale until it runs dry or wraps around.
pub struct Crawler<'a, F: FeedClient> {
    client: &'a F,
    page_size: usize,
    max_pages: usize,
}

impl<'a, F: FeedClient> Crawler<'a, F> {
    pub fn new(client: &'a F, page_size: usize, max_pages: usize) -> Self {
        Self {
            client,
            page_size: page_size.max(1),
            max_pages,
        }
    }

    /// Collects every distinct entry for `locale`, sorted by start date.
    ///
    /// Paging stops on an empty or unreadable page, a failed request, or as soon as a page
    /// repeats a `(start, end)` pair already collected. Failures are logged, not returned.
    pub fn crawl(&self, locale: &Locale) -> Vec<ArchiveEntry> {
        let mut entries: Vec<ArchiveEntry> = Vec::new();
        let mut seen: HashSet<(String, String)> = HashSet::new();
        let mut pages = 0;

        loop {
            if pages >= self.max_pages {
                warn!(%locale, pages, "page ceiling reached, stopping crawl");
                break;
            }
            pages += 1;

            let cursor = entries.len();
            let body = match self.client.fetch_page(cursor, self.page_size, locale) {
                Ok(body) => body,
                Err(err) => {
                    warn!(%locale, cursor, error = %err, "failed to load archive page");
                    break;
                }
            };
            let page = match parse_page(&body) {
                Ok(page) => page,
                Err(err) => {
                    warn!(%locale, cursor, error = %err, "failed to read archive page");
                    break;
                }
            };
            if page.is_empty() {
                debug!(%locale, cursor, "archive page empty");
                break;
            }

            let mut wrapped = false;
            for entry in page {
                if !seen.insert(entry.date_pair()) {
                    debug!(
                        %locale,
                        start = %entry.start_date,
                        end = %entry.end_date,
                        "archive wrapped around"
                    );
                    wrapped = true;
                    continue;
                }
                entries.push(entry);
            }
            if wrapped {
                break;
            }
        }

        entries.sort_by(|a, b| a.start_date.cmp(&b.start_date));
        info!(%locale, entries = entries.len(), pages, "crawled archive");
        entries
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[test]
    fn parse_page_reads_records() {
        let body = serde_json::json!({
            "images": [{
                "startdate": "20240101",
                "enddate": "20240102",
                "urlbase": "/th?id=OHR.A_EN-US1",
                "copyright": "A (© B)",
                "title": "Title A"
            }]
        })
        .to_string();
        let entries = parse_page(&body).unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].url_base, "/th?id=OHR.A_EN-US1");
        assert_eq!(entries[0].headline, "Title A");
    }

    #[test]
    fn parse_page_prefers_headline() {
        let body = serde_json::json!({
            "images": [{
                "startdate": "1",
                "enddate": "2",
                "urlbase": "/x",
                "headline": "H",
                "title": "T"
            }]
        })
        .to_string();
        let entries = parse_page(&body).unwrap();
        assert_eq!(entries[0].headline, "H");
    }

    #[test]
    fn parse_page_rejects_missing_container() {
        assert_matches!(parse_page(r#"{"tooltips":{}}"#), Err(FeedError::MalformedPage(_)));
        assert_matches!(parse_page("<html>"), Err(FeedError::MalformedPage(_)));
    }

    #[test]
    fn parse_page_empty_images() {
        assert!(parse_page(r#"{"images":[]}"#).unwrap().is_empty());
    }
}
