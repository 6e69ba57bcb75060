//! Staged writes: new objects land under a dot-prefixed temp name and are
//! renamed into place, so a failed write is never visible to a listing.

use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tracing::{info, warn};
use uuid::Uuid;

const STAGED_PREFIX: &str = ".staged.";

/// True for temp names produced by [`StagedFile`]; listings and duplicate
/// probes skip these.
pub fn is_staged_name(name: &str) -> bool {
    name.starts_with(STAGED_PREFIX)
}

/// A temp file that becomes the target only on [`StagedFile::commit`].
pub struct StagedFile {
    target: PathBuf,
    temp_path: PathBuf,
    file: File,
}

impl StagedFile {
    /// Creates the temp file next to `target` so the final rename stays on
    /// one filesystem.
    pub async fn create(target: &Path) -> io::Result<Self> {
        let parent = target.parent().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "target path has no parent")
        })?;
        let temp_path = parent.join(format!("{STAGED_PREFIX}{}.tmp", Uuid::new_v4()));
        let file = File::create(&temp_path).await?;
        Ok(Self {
            target: target.to_path_buf(),
            temp_path,
            file,
        })
    }

    pub async fn write_all(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.file.write_all(bytes).await
    }

    /// Abandons the write and removes the temp file.
    pub async fn discard(self) {
        drop(self.file);
        let _ = fs::remove_file(&self.temp_path).await;
    }

    /// Syncs the temp file and renames it onto the target path.
    pub async fn commit(self) -> io::Result<()> {
        self.file.sync_all().await?;
        drop(self.file);

        if let Err(err) = fs::rename(&self.temp_path, &self.target).await {
            let _ = fs::remove_file(&self.temp_path).await;
            return Err(err);
        }

        if let Some(parent) = self.target.parent() {
            let _ = sync_dir(parent).await;
        }
        Ok(())
    }
}

async fn sync_dir(path: &Path) -> io::Result<()> {
    let path = path.to_path_buf();
    tokio::task::spawn_blocking(move || {
        let dir = std::fs::File::open(path)?;
        dir.sync_all()
    })
    .await
    .map_err(|err| io::Error::other(err.to_string()))?
}

/// Removes staged temp files in `dir` whose age reached `ttl`. Leftovers
/// only exist after a crashed or aborted write.
pub async fn sweep_stale(dir: &Path, ttl: Duration) -> io::Result<()> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(err) => return Err(err),
    };

    let now = SystemTime::now();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name().to_string_lossy().to_string();
        if !is_staged_name(&name) {
            continue;
        }
        let metadata = match entry.metadata().await {
            Ok(metadata) => metadata,
            Err(_) => continue,
        };
        let age = metadata
            .modified()
            .ok()
            .and_then(|modified| now.duration_since(modified).ok());
        let Some(age) = age else { continue };
        if age >= ttl {
            let path = entry.path();
            if let Err(err) = fs::remove_file(&path).await {
                warn!(path = ?path, error = %err, "failed to remove stale staged file");
            } else {
                info!(path = ?path, "removed stale staged file");
            }
        }
    }

    Ok(())
}
