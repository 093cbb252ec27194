use std::fs;
use std::path::Path;

use camino::Utf8PathBuf;
use image::ImageReader;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::FeedError;

/// Grid size and tolerances used to build and compare fingerprints.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FingerprintSettings {
    pub width: u32,
    pub height: u32,
    /// Largest intensity difference (out of 255) a sample may show and still count as unchanged.
    pub pixel_threshold: u8,
    /// Two fingerprints are equal while the share of changed samples stays below this percentage.
    pub percent_threshold: f64,
}

impl Default for FingerprintSettings {
    fn default() -> Self {
        // 96x54 keeps the 16:9 aspect of the feed at 5% of 1920x1080.
        Self {
            width: 96,
            height: 54,
            pixel_threshold: 3,
            percent_threshold: 5.0,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Sample {
    pub x: u32,
    pub y: u32,
    pub intensity: u8,
}

/// Downsampled grayscale readings of one saved image, keyed by its file name.
///
/// Samples are held sorted by `(x, y)` with unique coordinates, whatever order they were supplied
/// or stored in.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", from = "FingerprintRecord")]
pub struct Fingerprint {
    file_name: String,
    samples: Vec<Sample>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct FingerprintRecord {
    #[serde(default)]
    file_name: String,
    #[serde(default)]
    samples: Vec<Sample>,
}

impl From<FingerprintRecord> for Fingerprint {
    fn from(record: FingerprintRecord) -> Self {
        Fingerprint::new(record.file_name, record.samples)
    }
}

impl Fingerprint {
    pub fn new(file_name: impl Into<String>, mut samples: Vec<Sample>) -> Self {
        samples.sort_by_key(|sample| (sample.x, sample.y));
        samples.dedup_by_key(|sample| (sample.x, sample.y));
        Self {
            file_name: file_name.into(),
            samples,
        }
    }

    pub fn file_name(&self) -> &str {
        &self.file_name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn with_file_name(mut self, file_name: impl Into<String>) -> Self {
        self.file_name = file_name.into();
        self
    }

    pub fn intensity_at(&self, x: u32, y: u32) -> Option<u8> {
        self.samples
            .binary_search_by_key(&(x, y), |sample| (sample.x, sample.y))
            .ok()
            .map(|index| self.samples[index].intensity)
    }

    /// Whether the file name is case-insensitively the same as `name`.
    pub fn has_file_name(&self, name: &str) -> bool {
        self.file_name.to_lowercase() == name.to_lowercase()
    }

    /// A fingerprint is unusable when it has no name or samples, or its file is gone from both
    /// the save and archive directories.
    pub fn is_invalid(&self, save_dir: &Path, archive_dir: &Path) -> bool {
        if self.file_name.trim().is_empty() || self.samples.is_empty() {
            return true;
        }
        !save_dir.join(&self.file_name).is_file() && !archive_dir.join(&self.file_name).is_file()
    }

    /// Near-duplicate test. Every sample of `self` must exist in `other`; samples differing by
    /// more than the pixel threshold count as violations.
    pub fn matches(&self, other: &Fingerprint, settings: &FingerprintSettings) -> bool {
        if self.samples.is_empty() {
            return false;
        }
        let total = self.samples.len() as f64;
        let mut violations = 0usize;
        for sample in &self.samples {
            let Some(other_intensity) = other.intensity_at(sample.x, sample.y) else {
                return false;
            };
            if sample.intensity.abs_diff(other_intensity) > settings.pixel_threshold {
                violations += 1;
                if violations as f64 / total * 100.0 >= settings.percent_threshold {
                    return false;
                }
            }
        }
        violations as f64 / total * 100.0 < settings.percent_threshold
    }
}

/// Builds fingerprints from image files, working on a scratch copy of each.
#[derive(Debug, Clone)]
pub struct FingerprintExtractor {
    settings: FingerprintSettings,
    scratch_dir: Utf8PathBuf,
}

impl FingerprintExtractor {
    pub fn new(settings: FingerprintSettings, scratch_dir: Utf8PathBuf) -> Self {
        Self {
            settings,
            scratch_dir,
        }
    }

    pub fn settings(&self) -> &FingerprintSettings {
        &self.settings
    }

    pub fn extract(&self, path: &Path) -> Result<Fingerprint, FeedError> {
        let file_name = path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();

        fs::create_dir_all(self.scratch_dir.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        // Dropped on every return path, which removes the copy.
        let scratch = tempfile::Builder::new()
            .prefix("fingerprint")
            .tempfile_in(self.scratch_dir.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        fs::copy(path, scratch.path()).map_err(|err| {
            FeedError::Filesystem(format!("copy {} to scratch: {err}", path.display()))
        })?;

        let decode_error = |message: String| FeedError::ImageDecode {
            path: path.display().to_string(),
            message,
        };
        let image = ImageReader::open(scratch.path())
            .map_err(|err| decode_error(err.to_string()))?
            .with_guessed_format()
            .map_err(|err| decode_error(err.to_string()))?
            .decode()
            .map_err(|err| decode_error(err.to_string()))?;

        let gray = image
            .resize_exact(
                self.settings.width,
                self.settings.height,
                FilterType::Triangle,
            )
            .to_luma8();
        let samples = gray
            .enumerate_pixels()
            .map(|(x, y, pixel)| Sample {
                x,
                y,
                intensity: pixel.0[0],
            })
            .collect();

        Ok(Fingerprint::new(file_name, samples))
    }
}
