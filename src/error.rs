use std::path::PathBuf;

use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum FeedError {
    #[error("invalid locale: {0}")]
    InvalidLocale(String),

    #[error("no locales configured")]
    NoLocales,

    #[error("failed to read config file at {0}")]
    ConfigRead(PathBuf),

    #[error("failed to parse JSON config: {0}")]
    ConfigParse(String),

    #[error("invalid config value: {0}")]
    InvalidConfig(String),

    #[error("archive request failed: {0}")]
    ArchiveHttp(String),

    #[error("archive returned status {status}: {message}")]
    ArchiveStatus { status: u16, message: String },

    #[error("malformed archive page: {0}")]
    MalformedPage(String),

    #[error("image request failed: {0}")]
    ImageHttp(String),

    #[error("image returned status {status}: {message}")]
    ImageStatus { status: u16, message: String },

    #[error("failed to decode image {path}: {message}")]
    ImageDecode { path: String, message: String },

    #[error("filesystem error: {0}")]
    Filesystem(String),

    #[error("catalog error: {0}")]
    Catalog(String),

    #[error("failed to write image tags: {0}")]
    Tags(String),

    #[error("fingerprint scan failed after {attempts} attempts: {message}")]
    #[diagnostic(help("check that the save and archive directories are readable"))]
    ReconcileExhausted { attempts: usize, message: String },
}

impl FeedError {
    pub fn is_network(&self) -> bool {
        matches!(
            self,
            FeedError::ArchiveHttp(_)
                | FeedError::ArchiveStatus { .. }
                | FeedError::ImageHttp(_)
                | FeedError::ImageStatus { .. }
        )
    }
}
