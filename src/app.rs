use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Instant;

use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::catalog::UrlHistory;
use crate::config::ResolvedConfig;
use crate::crawler::Crawler;
use crate::domain::{ArchiveEntry, Locale, derive_file_name};
use crate::error::FeedError;
use crate::feed::FeedClient;
use crate::fingerprint::FingerprintExtractor;
use crate::layout::Layout;
use crate::store::{FingerprintStore, ReconcileReport};
use crate::tags::{ImageTags, TagWriter};

#[derive(Debug, Clone)]
pub struct FeedOptions {
    pub host: String,
    pub resolution: String,
    pub page_size: usize,
    pub max_pages: usize,
}

impl From<&ResolvedConfig> for FeedOptions {
    fn from(config: &ResolvedConfig) -> Self {
        Self {
            host: config.host.clone(),
            resolution: config.resolution.clone(),
            page_size: config.page_size,
            max_pages: config.max_pages,
        }
    }
}

/// How a single feed entry was handled.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EntryOutcome {
    SeenUrl,
    Duplicate { matched: String },
    NewImage { file_name: String },
    Error,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct LocaleResult {
    pub locale: String,
    pub entries: usize,
    pub downloaded: usize,
    pub duplicates: usize,
    pub seen_urls: usize,
    pub errors: usize,
    pub elapsed_ms: u128,
}

impl LocaleResult {
    fn record(&mut self, outcome: &EntryOutcome) {
        match outcome {
            EntryOutcome::SeenUrl => self.seen_urls += 1,
            EntryOutcome::Duplicate { .. } => self.duplicates += 1,
            EntryOutcome::NewImage { .. } => self.downloaded += 1,
            EntryOutcome::Error => self.errors += 1,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct RunResult {
    pub locales: Vec<LocaleResult>,
    pub downloaded: usize,
    pub duplicates: usize,
    pub seen_urls: usize,
    pub errors: usize,
    pub cancelled: bool,
    pub duration_secs: f64,
}

/// Cooperative stop signal, checked between locales.
#[derive(Debug, Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Owns the catalogs for one run and drives crawl → download → compare → commit.
///
/// Catalogs are flushed after reconciliation, after each locale and on [`App::finish`]. If the
/// app is dropped without `finish` (an error or panic unwinding past it) the drop path still
/// flushes and clears scratch space.
pub struct App<F: FeedClient, T: TagWriter> {
    layout: Layout,
    client: F,
    tags: T,
    options: FeedOptions,
    extractor: FingerprintExtractor,
    fingerprints: FingerprintStore,
    history: UrlHistory,
    finished: bool,
}

impl<F: FeedClient, T: TagWriter> App<F, T> {
    pub fn open(
        layout: Layout,
        config: &ResolvedConfig,
        client: F,
        tags: T,
    ) -> Result<Self, FeedError> {
        layout.ensure()?;
        let extractor = FingerprintExtractor::new(config.fingerprint, layout.scratch_dir());
        let fingerprints = FingerprintStore::load(&layout, config.fingerprint);
        let history = UrlHistory::load(layout.url_history_path());
        info!(count = history.len(), "loaded previous urls");

        Ok(Self {
            layout,
            client,
            tags,
            options: FeedOptions::from(config),
            extractor,
            fingerprints,
            history,
            finished: false,
        })
    }

    pub fn layout(&self) -> &Layout {
        &self.layout
    }

    pub fn fingerprints(&self) -> &FingerprintStore {
        &self.fingerprints
    }

    pub fn history(&self) -> &UrlHistory {
        &self.history
    }

    pub fn client(&self) -> &F {
        &self.client
    }

    pub fn reconcile(&mut self) -> Result<ReconcileReport, FeedError> {
        let report = self.fingerprints.reconcile(&self.extractor)?;
        self.fingerprints.flush()?;
        Ok(report)
    }

    pub fn crawl(&self, locale: &Locale) -> Vec<ArchiveEntry> {
        Crawler::new(&self.client, self.options.page_size, self.options.max_pages).crawl(locale)
    }

    /// Crawls and processes each locale in turn, stopping early once `cancel` is set.
    pub fn run(&mut self, locales: &[Locale], cancel: &CancelFlag) -> Result<RunResult, FeedError> {
        let start = Instant::now();
        let mut result = RunResult::default();
        info!(count = locales.len(), "searching locales");

        for (index, locale) in locales.iter().enumerate() {
            if cancel.is_cancelled() {
                warn!(%locale, "cancelled, skipping remaining locales");
                result.cancelled = true;
                break;
            }
            info!(%locale, progress = index + 1, of = locales.len(), "searching for images");
            let entries = self.crawl(locale);
            let locale_result = self.process(locale, &entries);
            self.fingerprints.flush()?;

            result.downloaded += locale_result.downloaded;
            result.duplicates += locale_result.duplicates;
            result.seen_urls += locale_result.seen_urls;
            result.errors += locale_result.errors;
            result.locales.push(locale_result);
        }

        result.duration_secs = start.elapsed().as_secs_f64();
        info!(
            downloaded = result.downloaded,
            duplicates = result.duplicates,
            seen_urls = result.seen_urls,
            errors = result.errors,
            duration_secs = result.duration_secs,
            "run complete"
        );
        Ok(result)
    }

    /// Handles the entries of one locale strictly in order. A failing entry is logged and
    /// counted; it never stops the locale.
    pub fn process(&mut self, locale: &Locale, entries: &[ArchiveEntry]) -> LocaleResult {
        let start = Instant::now();
        let mut result = LocaleResult {
            locale: locale.to_string(),
            entries: entries.len(),
            ..LocaleResult::default()
        };

        for entry in entries {
            let outcome = match self.process_entry(entry) {
                Ok(outcome) => outcome,
                Err(err) => {
                    error!(
                        %locale,
                        url_base = %entry.url_base,
                        error = %err,
                        "failed to process image"
                    );
                    EntryOutcome::Error
                }
            };
            result.record(&outcome);
        }

        result.elapsed_ms = start.elapsed().as_millis();
        info!(
            %locale,
            downloaded = result.downloaded,
            duplicates = result.duplicates,
            seen_urls = result.seen_urls,
            errors = result.errors,
            elapsed_ms = result.elapsed_ms,
            "locale complete"
        );
        result
    }

    pub fn process_entry(&mut self, entry: &ArchiveEntry) -> Result<EntryOutcome, FeedError> {
        let url = entry.image_url(&self.options.host, &self.options.resolution);
        debug!(start = %entry.start_date, end = %entry.end_date, %url, "image found");

        if self.history.contains(&url) {
            debug!(%url, "already downloaded image url");
            return Ok(EntryOutcome::SeenUrl);
        }

        let scratch_dir = self.layout.scratch_dir();
        std::fs::create_dir_all(scratch_dir.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        let download = tempfile::Builder::new()
            .prefix("download")
            .suffix(".jpg")
            .tempfile_in(scratch_dir.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;

        if let Err(err) = self.client.download_image(&url, download.path()) {
            warn!(%url, error = %err, "error downloading image");
            return Ok(EntryOutcome::Error);
        }

        let probe = self.extractor.extract(download.path())?;
        if let Some(existing) = self.fingerprints.find_near_duplicate(&probe) {
            let matched = existing.file_name().to_string();
            info!(%url, %matched, "identical image downloaded");
            self.mark_seen(url)?;
            return Ok(EntryOutcome::Duplicate { matched });
        }

        let file_name = self.unique_file_name(&url);
        let target = self.layout.save_dir().join(&file_name);
        Layout::copy_file_atomic(download.path(), &target)?;
        if let Err(err) = self.tags.write_tags(&target, &ImageTags::from_entry(entry)) {
            warn!(file = %file_name, error = %err, "failed to write image tags");
        }
        self.fingerprints.add(probe.with_file_name(file_name.clone()));
        self.mark_seen(url)?;
        info!(file = %file_name, "found new image");

        Ok(EntryOutcome::NewImage { file_name })
    }

    /// Flushes both catalogs and clears scratch space.
    pub fn finish(mut self) -> Result<(), FeedError> {
        self.finished = true;
        self.history.flush()?;
        self.fingerprints.flush()?;
        self.layout.clear_scratch()
    }

    fn mark_seen(&mut self, url: String) -> Result<(), FeedError> {
        if self.history.insert(url) {
            self.history.flush()?;
        }
        Ok(())
    }

    fn unique_file_name(&self, url: &str) -> String {
        let mut counter = 0;
        loop {
            let name = derive_file_name(url, counter);
            if !self.fingerprints.is_known_file_name(&name) && !self.layout.file_exists(&name) {
                return name;
            }
            counter += 1;
        }
    }
}

impl<F: FeedClient, T: TagWriter> Drop for App<F, T> {
    fn drop(&mut self) {
        if self.finished {
            return;
        }
        if let Err(err) = self.history.flush() {
            error!(error = %err, "failed to save url history");
        }
        if let Err(err) = self.fingerprints.flush() {
            error!(error = %err, "failed to save fingerprints");
        }
        if let Err(err) = self.layout.clear_scratch() {
            error!(error = %err, "failed to clear scratch directory");
        }
    }
}
