use camino::{Utf8Path, Utf8PathBuf};
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::catalog;
use crate::error::FeedError;
use crate::fingerprint::{Fingerprint, FingerprintExtractor, FingerprintSettings};
use crate::layout::Layout;

pub const MAX_SCAN_ATTEMPTS: usize = 5;

/// Counts from one reconciliation pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ReconcileReport {
    pub loaded: usize,
    pub pruned: usize,
    pub added: usize,
    pub total: usize,
    pub attempts: usize,
}

/// The durable catalog of fingerprints for every image kept so far.
///
/// Entries whose file has left both the save and archive directories stay in the catalog until
/// the next prune, but are never offered as a duplicate reference.
#[derive(Debug)]
pub struct FingerprintStore {
    path: Utf8PathBuf,
    save_dir: Utf8PathBuf,
    archive_dir: Utf8PathBuf,
    settings: FingerprintSettings,
    entries: Vec<Fingerprint>,
}

impl FingerprintStore {
    pub fn load(layout: &Layout, settings: FingerprintSettings) -> Self {
        let path = layout.fingerprints_path();
        let entries: Vec<Fingerprint> = catalog::load_or_default(&path);
        info!(count = entries.len(), "loaded fingerprints");
        Self {
            path,
            save_dir: layout.save_dir().to_path_buf(),
            archive_dir: layout.archive_dir(),
            settings,
            entries,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> &[Fingerprint] {
        &self.entries
    }

    pub fn is_known_file_name(&self, name: &str) -> bool {
        self.entries
            .iter()
            .any(|fingerprint| fingerprint.has_file_name(name))
    }

    pub fn has_near_duplicate(&self, probe: &Fingerprint) -> bool {
        self.find_near_duplicate(probe).is_some()
    }

    pub fn find_near_duplicate(&self, probe: &Fingerprint) -> Option<&Fingerprint> {
        self.entries.iter().find(|candidate| {
            probe.matches(candidate, &self.settings) && !self.is_invalid(candidate)
        })
    }

    /// Adds `fingerprint` unless its file name is already catalogued. Returns whether it was added.
    pub fn add(&mut self, fingerprint: Fingerprint) -> bool {
        if self.is_known_file_name(fingerprint.file_name()) {
            return false;
        }
        self.entries.push(fingerprint);
        true
    }

    pub fn remove_invalid(&mut self) -> usize {
        let before = self.entries.len();
        let save_dir = &self.save_dir;
        let archive_dir = &self.archive_dir;
        self.entries.retain(|fingerprint| {
            let invalid =
                fingerprint.is_invalid(save_dir.as_std_path(), archive_dir.as_std_path());
            if invalid {
                debug!(file = fingerprint.file_name(), "pruning invalid fingerprint");
            }
            !invalid
        });
        before - self.entries.len()
    }

    /// Aligns the catalog with the images actually on disk: prunes entries whose file is gone or
    /// whose data is empty, then fingerprints every image not yet catalogued. The scan restarts
    /// on failure, up to [`MAX_SCAN_ATTEMPTS`] attempts.
    pub fn reconcile(
        &mut self,
        extractor: &FingerprintExtractor,
    ) -> Result<ReconcileReport, FeedError> {
        self.reconcile_with(|path| extractor.extract(path.as_std_path()))
    }

    /// [`FingerprintStore::reconcile`] with a custom extraction step.
    pub fn reconcile_with<E>(&mut self, mut extract: E) -> Result<ReconcileReport, FeedError>
    where
        E: FnMut(&Utf8Path) -> Result<Fingerprint, FeedError>,
    {
        let loaded = self.entries.len();
        let mut pruned = self.remove_invalid();
        let kept = self.entries.len();
        info!(remaining = kept, pruned, "removed invalid fingerprints");

        let mut attempts = 0;
        retry_scan(|attempt| {
            attempts = attempt;
            if attempt > 1 {
                info!(attempt, "fingerprinting missing images");
            }
            self.fingerprint_missing(&mut extract)
        })?;
        // Entries added by a failed attempt are kept, so count against the pruned baseline.
        let added = self.entries.len() - kept;
        info!(total = self.entries.len(), added, "fingerprinted missing images");

        pruned += self.remove_invalid();

        Ok(ReconcileReport {
            loaded,
            pruned,
            added,
            total: self.entries.len(),
            attempts,
        })
    }

    fn fingerprint_missing<E>(&mut self, extract: &mut E) -> Result<usize, FeedError>
    where
        E: FnMut(&Utf8Path) -> Result<Fingerprint, FeedError>,
    {
        let mut files = Layout::list_images(&self.save_dir)?;
        files.extend(Layout::list_images(&self.archive_dir)?);
        let missing: Vec<Utf8PathBuf> = files
            .into_iter()
            .filter(|path| {
                path.file_name()
                    .map(|name| !self.is_known_file_name(name))
                    .unwrap_or(false)
            })
            .collect();

        let mut added = 0;
        for (index, file) in missing.iter().enumerate() {
            debug!(file = %file, progress = index + 1, of = missing.len(), "fingerprinting");
            let fingerprint = extract(file)?;
            if self.add(fingerprint) {
                added += 1;
            }
        }
        Ok(added)
    }

    pub fn flush(&self) -> Result<(), FeedError> {
        catalog::save(&self.path, &self.entries)
    }

    fn is_invalid(&self, fingerprint: &Fingerprint) -> bool {
        fingerprint.is_invalid(self.save_dir.as_std_path(), self.archive_dir.as_std_path())
    }
}

/// Runs `scan` until it succeeds, passing the 1-based attempt number. After
/// [`MAX_SCAN_ATTEMPTS`] failures the last error is escalated.
pub fn retry_scan<F>(mut scan: F) -> Result<usize, FeedError>
where
    F: FnMut(usize) -> Result<usize, FeedError>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match scan(attempt) {
            Ok(added) => return Ok(added),
            Err(err) if attempt < MAX_SCAN_ATTEMPTS => {
                warn!(attempt, error = %err, "fingerprint scan failed, starting over");
            }
            Err(err) => {
                return Err(FeedError::ReconcileExhausted {
                    attempts: attempt,
                    message: err.to_string(),
                });
            }
        }
    }
}
