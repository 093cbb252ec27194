use std::fs::File;
use std::path::Path;
use std::thread;
use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};

use crate::domain::Locale;
use crate::error::FeedError;

/// Remote side of the crawl: archive pages and the images they point at.
pub trait FeedClient {
    /// Raw body of the archive page starting at `cursor`.
    fn fetch_page(&self, cursor: usize, count: usize, locale: &Locale)
    -> Result<String, FeedError>;
    fn download_image(&self, url: &str, destination: &Path) -> Result<(), FeedError>;
}

#[derive(Clone)]
pub struct FeedHttpClient {
    client: Client,
    host: String,
}

impl FeedHttpClient {
    pub fn new(host: &str) -> Result<Self, FeedError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&format!("feedkeeper/{}", env!("CARGO_PKG_VERSION")))
                .map_err(|err| FeedError::ArchiveHttp(err.to_string()))?,
        );
        let client = Client::builder()
            .default_headers(headers)
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|err| FeedError::ArchiveHttp(err.to_string()))?;
        Ok(Self {
            client,
            host: host.trim_end_matches('/').to_string(),
        })
    }

    pub fn page_url(&self, cursor: usize, count: usize, locale: &Locale) -> String {
        page_url(&self.host, cursor, count, locale)
    }

    fn send_with_retries<F>(&self, mut make_req: F) -> Result<Response, reqwest::Error>
    where
        F: FnMut() -> RequestBuilder,
    {
        const MAX_RETRIES: usize = 3;
        const BASE_DELAY_MS: u64 = 200;
        let mut attempt = 0usize;
        loop {
            match make_req().send() {
                Ok(resp) => {
                    if attempt < MAX_RETRIES && is_retryable_status(resp.status().as_u16()) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Ok(resp);
                }
                Err(err) => {
                    if attempt < MAX_RETRIES && is_retryable_error(&err) {
                        thread::sleep(Duration::from_millis(BASE_DELAY_MS * (attempt as u64 + 1)));
                        attempt += 1;
                        continue;
                    }
                    return Err(err);
                }
            }
        }
    }
}

impl FeedClient for FeedHttpClient {
    fn fetch_page(
        &self,
        cursor: usize,
        count: usize,
        locale: &Locale,
    ) -> Result<String, FeedError> {
        let url = self.page_url(cursor, count, locale);
        let response = self
            .send_with_retries(|| self.client.get(&url))
            .map_err(|err| FeedError::ArchiveHttp(format!("{url}: {err}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "archive request failed".to_string());
            return Err(FeedError::ArchiveStatus { status, message });
        }
        response
            .text()
            .map_err(|err| FeedError::ArchiveHttp(err.to_string()))
    }

    fn download_image(&self, url: &str, destination: &Path) -> Result<(), FeedError> {
        let response = self
            .send_with_retries(|| self.client.get(url))
            .map_err(|err| FeedError::ImageHttp(format!("{url}: {err}")))?;
        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response
                .text()
                .unwrap_or_else(|_| "image request failed".to_string());
            return Err(FeedError::ImageStatus { status, message });
        }
        let mut response = response;
        let mut file =
            File::create(destination).map_err(|err| FeedError::Filesystem(err.to_string()))?;
        std::io::copy(&mut response, &mut file)
            .map_err(|err| FeedError::ImageHttp(format!("{url}: {err}")))?;
        Ok(())
    }
}

pub fn page_url(host: &str, cursor: usize, count: usize, locale: &Locale) -> String {
    format!(
        "{}/HPImageArchive.aspx?format=js&idx={cursor}&n={count}&mkt={}",
        host.trim_end_matches('/'),
        locale.as_str()
    )
}

fn is_retryable_status(status: u16) -> bool {
    matches!(status, 429 | 500 | 502 | 503 | 504)
}

fn is_retryable_error(err: &reqwest::Error) -> bool {
    err.is_timeout() || err.is_connect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_url_carries_cursor_and_market() {
        let locale: Locale = "en-GB".parse().unwrap();
        assert_eq!(
            page_url("https://www.bing.com/", 8, 8, &locale),
            "https://www.bing.com/HPImageArchive.aspx?format=js&idx=8&n=8&mkt=en-GB"
        );
    }
}
