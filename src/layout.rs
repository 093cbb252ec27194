use std::fs;
use std::path::Path;

use camino::{Utf8Path, Utf8PathBuf};
use directories::UserDirs;

use crate::error::FeedError;

const METADATA_DIR: &str = ".feedkeeper";
const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg"];

/// Directory layout of one archive: committed images live at the root, retention-moved images in
/// `archive/`, catalogs and scratch space under `.feedkeeper/`.
#[derive(Debug, Clone)]
pub struct Layout {
    root: Utf8PathBuf,
}

impl Layout {
    pub fn new() -> Result<Self, FeedError> {
        let root = UserDirs::new()
            .and_then(|dirs| {
                let base = dirs
                    .picture_dir()
                    .map(Path::to_path_buf)
                    .unwrap_or_else(|| dirs.home_dir().join("Pictures"));
                Utf8PathBuf::from_path_buf(base.join("feedkeeper")).ok()
            })
            .ok_or_else(|| {
                FeedError::Filesystem("unable to resolve pictures directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn save_dir(&self) -> &Utf8Path {
        &self.root
    }

    pub fn archive_dir(&self) -> Utf8PathBuf {
        self.root.join("archive")
    }

    pub fn metadata_dir(&self) -> Utf8PathBuf {
        self.root.join(METADATA_DIR)
    }

    pub fn scratch_dir(&self) -> Utf8PathBuf {
        self.metadata_dir().join("scratch")
    }

    pub fn tags_dir(&self) -> Utf8PathBuf {
        self.metadata_dir().join("tags")
    }

    pub fn log_dir(&self) -> Utf8PathBuf {
        self.metadata_dir().join("logs")
    }

    pub fn url_history_path(&self) -> Utf8PathBuf {
        self.metadata_dir().join("urls.json")
    }

    pub fn fingerprints_path(&self) -> Utf8PathBuf {
        self.metadata_dir().join("fingerprints.json")
    }

    pub fn ensure(&self) -> Result<(), FeedError> {
        for dir in [
            self.root.clone(),
            self.archive_dir(),
            self.metadata_dir(),
            self.scratch_dir(),
            self.tags_dir(),
            self.log_dir(),
        ] {
            fs::create_dir_all(dir.as_std_path())
                .map_err(|err| FeedError::Filesystem(format!("create {dir}: {err}")))?;
        }
        Ok(())
    }

    /// Whether a file with this name already sits in the save or archive directory.
    pub fn file_exists(&self, file_name: &str) -> bool {
        self.save_dir().join(file_name).as_std_path().exists()
            || self.archive_dir().join(file_name).as_std_path().exists()
    }

    pub fn clear_scratch(&self) -> Result<(), FeedError> {
        let scratch = self.scratch_dir();
        if scratch.as_std_path().exists() {
            fs::remove_dir_all(scratch.as_std_path())
                .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        }
        Ok(())
    }

    pub fn write_bytes_atomic(path: &Utf8Path, content: &[u8]) -> Result<(), FeedError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent.as_std_path())
                .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        }
        let tmp_path = path.with_extension("tmp");
        fs::write(tmp_path.as_std_path(), content)
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        fs::rename(tmp_path.as_std_path(), path.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Copies `source` next to `dest` under a temporary name and renames it into place, so a
    /// reader never sees a half-written image.
    pub fn copy_file_atomic(source: &Path, dest: &Utf8Path) -> Result<(), FeedError> {
        let parent = dest
            .parent()
            .ok_or_else(|| FeedError::Filesystem("invalid destination path".to_string()))?;
        fs::create_dir_all(parent.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        let temp = tempfile::Builder::new()
            .prefix(".feedkeeper-commit")
            .tempfile_in(parent.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        fs::copy(source, temp.path()).map_err(|err| FeedError::Filesystem(err.to_string()))?;
        temp.persist(dest.as_std_path())
            .map_err(|err| FeedError::Filesystem(err.to_string()))?;
        Ok(())
    }

    /// Image files directly inside `dir`, sorted by name. A missing directory has no images.
    pub fn list_images(dir: &Utf8Path) -> Result<Vec<Utf8PathBuf>, FeedError> {
        if !dir.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(dir.as_std_path())
            .map_err(|err| FeedError::Filesystem(format!("read {dir}: {err}")))?;
        let mut images = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| FeedError::Filesystem(err.to_string()))?;
            let path = Utf8PathBuf::from_path_buf(entry.path()).map_err(|path| {
                FeedError::Filesystem(format!("non-utf8 path: {}", path.display()))
            })?;
            if path.is_file() && is_image(&path) {
                images.push(path);
            }
        }
        images.sort();
        Ok(images)
    }
}

fn is_image(path: &Utf8Path) -> bool {
    path.extension()
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
        .unwrap_or(false)
}
