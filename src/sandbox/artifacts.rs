//! Managed artifact directory: unique names, listing, and stale cleanup.

use crate::error::StorageError;
use chrono::{DateTime, Local, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tracing::{info, warn};
use walkdir::WalkDir;

const PREFIX: &str = "chart_";
const EXTENSION: &str = "png";

/// Metadata for one retained artifact
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub name: String,
    pub size: u64,
    pub created: Option<DateTime<Utc>>,
    pub modified: DateTime<Utc>,
    pub modified_human: String,
}

/// Fresh `chart_<token>.png` path under `dir`
pub fn new_artifact_path(dir: &Path) -> PathBuf {
    dir.join(format!(
        "{}{}.{}",
        PREFIX,
        uuid::Uuid::new_v4().simple(),
        EXTENSION
    ))
}

fn is_artifact_name(name: &str) -> bool {
    name.starts_with(PREFIX) && name.ends_with(&format!(".{}", EXTENSION))
}

/// All artifacts in `dir`, newest first
pub fn list_artifacts(dir: &Path) -> Result<Vec<ArtifactInfo>, StorageError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut artifacts = Vec::new();
    for entry in WalkDir::new(dir).min_depth(1).max_depth(1) {
        let entry = entry.map_err(|e| StorageError::backend("Failed to read artifact directory", e))?;
        let name = entry.file_name().to_string_lossy().to_string();
        if !entry.file_type().is_file() || !is_artifact_name(&name) {
            continue;
        }

        let metadata = match entry.metadata() {
            Ok(metadata) => metadata,
            Err(e) => {
                warn!(path = %entry.path().display(), error = %e, "Failed to stat artifact");
                continue;
            }
        };
        let modified: DateTime<Utc> = metadata
            .modified()
            .unwrap_or(SystemTime::UNIX_EPOCH)
            .into();
        let created = metadata.created().ok().map(DateTime::<Utc>::from);

        artifacts.push(ArtifactInfo {
            path: entry.path().to_path_buf(),
            name,
            size: metadata.len(),
            created,
            modified,
            modified_human: modified
                .with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S")
                .to_string(),
        });
    }

    artifacts.sort_by(|a, b| b.modified.cmp(&a.modified).then_with(|| a.name.cmp(&b.name)));
    Ok(artifacts)
}

/// Delete artifacts older than `max_age`, and all but the newest `max_files`.
/// Returns the number of files removed.
pub fn cleanup_stale(dir: &Path, max_age: Duration, max_files: usize) -> Result<usize, StorageError> {
    let now = SystemTime::now();

    let mut deleted = 0;
    for (index, artifact) in list_artifacts(dir)?.into_iter().enumerate() {
        let expired = now
            .duration_since(SystemTime::from(artifact.modified))
            .unwrap_or_default()
            > max_age;
        if !expired && index < max_files {
            continue;
        }
        match std::fs::remove_file(&artifact.path) {
            Ok(()) => deleted += 1,
            Err(e) => {
                warn!(path = %artifact.path.display(), error = %e, "Failed to delete artifact")
            }
        }
    }

    if deleted > 0 {
        info!(deleted, dir = %dir.display(), "Cleaned up stale chart artifacts");
    }
    Ok(deleted)
}
