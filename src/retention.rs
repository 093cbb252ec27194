use std::fs;
use std::time::SystemTime;

use camino::Utf8Path;
use chrono::{DateTime, Days, Months, Utc};
use tracing::{info, warn};

use crate::error::FeedError;
use crate::layout::Layout;

#[derive(Debug, Clone, Copy)]
pub struct RetentionPolicy {
    /// Images older than this many months move to the archive directory. `0` disables archiving.
    pub archive_months: u32,
    pub log_retention_days: u32,
}

/// Moves images whose creation (or modification) time is older than the policy into the archive
/// directory. Name clashes in the archive are left in place.
pub fn archive_old_images(
    layout: &Layout,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<usize, FeedError> {
    if policy.archive_months == 0 {
        return Ok(0);
    }
    let Some(cutoff) = now.checked_sub_months(Months::new(policy.archive_months)) else {
        return Ok(0);
    };
    let archive_dir = layout.archive_dir();
    fs::create_dir_all(archive_dir.as_std_path())
        .map_err(|err| FeedError::Filesystem(err.to_string()))?;

    let mut moved = 0;
    for image in Layout::list_images(layout.save_dir())? {
        let Some(stamp) = file_time(&image, true) else {
            continue;
        };
        if stamp >= cutoff {
            continue;
        }
        let Some(name) = image.file_name() else {
            continue;
        };
        let target = archive_dir.join(name);
        if target.as_std_path().exists() {
            warn!(file = %name, "archive already holds an image with this name, leaving it");
            continue;
        }
        info!(file = %name, "archiving image");
        fs::rename(image.as_std_path(), target.as_std_path())
            .map_err(|err| FeedError::Filesystem(format!("archive {image}: {err}")))?;
        moved += 1;
    }
    Ok(moved)
}

pub fn clear_old_logs(
    layout: &Layout,
    policy: RetentionPolicy,
    now: DateTime<Utc>,
) -> Result<usize, FeedError> {
    let log_dir = layout.log_dir();
    if !log_dir.as_std_path().exists() {
        return Ok(0);
    }
    let Some(cutoff) = now.checked_sub_days(Days::new(u64::from(policy.log_retention_days)))
    else {
        return Ok(0);
    };

    let mut removed = 0;
    let entries =
        fs::read_dir(log_dir.as_std_path()).map_err(|err| FeedError::Filesystem(err.to_string()))?;
    for entry in entries {
        let entry = entry.map_err(|err| FeedError::Filesystem(err.to_string()))?;
        let Ok(path) = camino::Utf8PathBuf::from_path_buf(entry.path()) else {
            continue;
        };
        if !path.is_file() {
            continue;
        }
        let Some(stamp) = file_time(&path, false) else {
            continue;
        };
        if stamp < cutoff {
            match fs::remove_file(path.as_std_path()) {
                Ok(()) => removed += 1,
                Err(err) => warn!(file = %path, error = %err, "error clearing a log file"),
            }
        }
    }
    Ok(removed)
}

/// Runs every shutdown sweep, logging failures instead of returning them.
pub fn sweep(layout: &Layout, policy: RetentionPolicy) {
    let now = Utc::now();
    match archive_old_images(layout, policy, now) {
        Ok(moved) if moved > 0 => info!(moved, "archived old images"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "error archiving images"),
    }
    match clear_old_logs(layout, policy, now) {
        Ok(removed) if removed > 0 => info!(removed, "cleared old log files"),
        Ok(_) => {}
        Err(err) => warn!(error = %err, "error clearing log files"),
    }
    if let Err(err) = layout.clear_scratch() {
        warn!(error = %err, "error cleaning up scratch directory");
    }
}

fn file_time(path: &Utf8Path, prefer_created: bool) -> Option<DateTime<Utc>> {
    let metadata = fs::metadata(path.as_std_path()).ok()?;
    let stamp: SystemTime = if prefer_created {
        metadata.created().or_else(|_| metadata.modified()).ok()?
    } else {
        metadata.modified().ok()?
    };
    Some(DateTime::<Utc>::from(stamp))
}
