use std::fs;
use std::path::PathBuf;

use camino::Utf8PathBuf;
use serde::{Deserialize, Serialize};

use crate::domain::Locale;
use crate::error::FeedError;
use crate::fingerprint::FingerprintSettings;

pub const DEFAULT_CONFIG_FILE: &str = "feedkeeper.json";
pub const DEFAULT_HOST: &str = "https://www.bing.com";
pub const DEFAULT_RESOLUTION: &str = "1920x1080";

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub schema_version: Option<u32>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub locales: Vec<String>,
    #[serde(default)]
    pub host: Option<String>,
    #[serde(default)]
    pub resolution: Option<String>,
    #[serde(default)]
    pub page_size: Option<usize>,
    #[serde(default)]
    pub max_pages: Option<usize>,
    #[serde(default)]
    pub archive_months: Option<u32>,
    #[serde(default)]
    pub log_retention_days: Option<u32>,
    #[serde(default)]
    pub fingerprint: Option<FingerprintEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct FingerprintEntry {
    #[serde(default)]
    pub width: Option<u32>,
    #[serde(default)]
    pub height: Option<u32>,
    #[serde(default)]
    pub pixel_threshold: Option<u8>,
    #[serde(default)]
    pub percent_threshold: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub schema_version: u32,
    pub path: Option<Utf8PathBuf>,
    pub locales: Vec<Locale>,
    pub host: String,
    pub resolution: String,
    pub page_size: usize,
    pub max_pages: usize,
    pub archive_months: u32,
    pub log_retention_days: u32,
    pub fingerprint: FingerprintSettings,
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Reads the given config file, or `feedkeeper.json` when present. Without either the
    /// defaults apply.
    pub fn resolve(path: Option<&str>) -> Result<ResolvedConfig, FeedError> {
        let config_path = match path {
            Some(path) => PathBuf::from(path),
            None => PathBuf::from(DEFAULT_CONFIG_FILE),
        };

        if path.is_none() && !config_path.exists() {
            return Self::resolve_config(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| FeedError::ConfigRead(config_path.clone()))?;
        let config: Config = serde_json::from_str(&content)
            .map_err(|err| FeedError::ConfigParse(err.to_string()))?;

        Self::resolve_config(config)
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, FeedError> {
        let schema_version = config.schema_version.unwrap_or(1);

        let locales = if config.locales.is_empty() {
            default_locales()
        } else {
            config.locales
        };
        let locales = locales
            .iter()
            .map(|value| value.parse())
            .collect::<Result<Vec<Locale>, FeedError>>()?;

        let page_size = config.page_size.unwrap_or(8);
        if page_size == 0 {
            return Err(FeedError::InvalidConfig(
                "page_size must be at least 1".to_string(),
            ));
        }

        let defaults = FingerprintSettings::default();
        let entry = config.fingerprint.unwrap_or_default();
        let fingerprint = FingerprintSettings {
            width: entry.width.unwrap_or(defaults.width),
            height: entry.height.unwrap_or(defaults.height),
            pixel_threshold: entry.pixel_threshold.unwrap_or(defaults.pixel_threshold),
            percent_threshold: entry.percent_threshold.unwrap_or(defaults.percent_threshold),
        };
        if fingerprint.width == 0 || fingerprint.height == 0 {
            return Err(FeedError::InvalidConfig(
                "fingerprint grid must be at least 1x1".to_string(),
            ));
        }

        Ok(ResolvedConfig {
            schema_version,
            path: config.path.map(Utf8PathBuf::from),
            locales,
            host: config.host.unwrap_or_else(|| DEFAULT_HOST.to_string()),
            resolution: config
                .resolution
                .unwrap_or_else(|| DEFAULT_RESOLUTION.to_string()),
            page_size,
            max_pages: config.max_pages.unwrap_or(64),
            archive_months: config.archive_months.unwrap_or(1),
            log_retention_days: config.log_retention_days.unwrap_or(28),
            fingerprint,
        })
    }
}

pub fn default_locales() -> Vec<String> {
    [
        "en-US", "en-GB", "en-AU", "en-CA", "en-IN", "en-NZ", "de-DE", "fr-FR", "fr-CA", "es-ES",
        "it-IT", "pt-BR", "ja-JP", "zh-CN",
    ]
    .iter()
    .map(|value| value.to_string())
    .collect()
}
