use std::fs::File;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

use crate::error::FeedError;

/// Installs the global subscriber: human-readable events on stderr and, when `log_dir` is
/// given, a plain-text copy in a dated log file. Returns the log file path.
pub fn init(log_dir: Option<&Utf8Path>) -> Result<Option<Utf8PathBuf>, FeedError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stderr_layer = fmt::layer().with_target(false).with_writer(std::io::stderr);

    let (file_layer, log_path) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir.as_std_path())
                .map_err(|err| FeedError::Filesystem(err.to_string()))?;
            let path = log_file_path(dir, &chrono::Utc::now().format("%Y-%m-%d").to_string());
            let file = File::create(path.as_std_path())
                .map_err(|err| FeedError::Filesystem(format!("create {path}: {err}")))?;
            let layer = fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(file));
            (Some(layer), Some(path))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|err| FeedError::Filesystem(format!("install log subscriber: {err}")))?;
    Ok(log_path)
}

/// First free `feedkeeper-<date>.log`, `feedkeeper-<date> (1).log`, ... in `dir`.
pub fn log_file_path(dir: &Utf8Path, date: &str) -> Utf8PathBuf {
    let mut path = dir.join(format!("feedkeeper-{date}.log"));
    let mut counter = 0;
    while path.as_std_path().exists() {
        counter += 1;
        path = dir.join(format!("feedkeeper-{date} ({counter}).log"));
    }
    path
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn log_file_path_skips_taken_names() {
        let temp = tempfile::tempdir().unwrap();
        let dir = Utf8PathBuf::from_path_buf(temp.path().to_path_buf()).unwrap();
        let first = log_file_path(&dir, "2024-05-01");
        assert!(first.ends_with("feedkeeper-2024-05-01.log"));

        std::fs::write(first.as_std_path(), b"").unwrap();
        let second = log_file_path(&dir, "2024-05-01");
        assert!(second.ends_with("feedkeeper-2024-05-01 (1).log"));
    }
}
