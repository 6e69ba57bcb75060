use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::{Duration, UNIX_EPOCH};
use tokio::fs;
use tokio::io::ErrorKind;
use tracing::warn;

use crate::category::Category;
use crate::staged::{self, StagedFile};

/// Filesystem-backed store: one subdirectory per category, flat files named
/// by their sanitized upload name, no sidecar metadata.
#[derive(Clone, Debug)]
pub struct Storage {
    root: PathBuf,
}

impl Storage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    pub async fn ensure_root(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root).await
    }

    pub fn root_path(&self) -> &Path {
        &self.root
    }

    pub fn category_dir(&self, category: Category) -> PathBuf {
        self.root.join(category.spec().directory)
    }

    /// Replaces every character outside `[A-Za-z0-9._-]` with `_`. This is
    /// the sole normalization; path separators never survive it.
    pub fn sanitize_file_name(name: &str) -> String {
        name.chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                    c
                } else {
                    '_'
                }
            })
            .collect()
    }

    /// Case-insensitive duplicate probe; returns the on-disk name when a
    /// match exists.
    pub async fn find_existing(
        &self,
        category: Category,
        name: &str,
    ) -> Result<Option<String>, StorageError> {
        let dir = self.category_dir(category);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let wanted = name.to_lowercase();
        while let Some(entry) = entries.next_entry().await? {
            let existing = entry.file_name().to_string_lossy().to_string();
            if staged::is_staged_name(&existing) {
                continue;
            }
            if existing.to_lowercase() == wanted {
                return Ok(Some(existing));
            }
        }
        Ok(None)
    }

    /// Installs a brand-new object, creating the category directory on
    /// first use. Fails with `Conflict` when the name is already taken
    /// (ignoring case); never overwrites. Callers hold the object lock
    /// across this call.
    pub async fn create(
        &self,
        category: Category,
        name: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let dir = self.category_dir(category);
        fs::create_dir_all(&dir).await?;

        if self.find_existing(category, name).await?.is_some() {
            return Err(StorageError::Conflict);
        }

        let mut staged = StagedFile::create(&dir.join(name)).await?;
        if let Err(err) = staged.write_all(bytes).await {
            staged.discard().await;
            return Err(StorageError::Io(err));
        }
        staged.commit().await?;
        Ok(())
    }

    /// One entry per file currently in the category directory, in
    /// filesystem enumeration order. A missing directory is an empty
    /// listing, not an error.
    pub async fn list(&self, category: Category) -> Result<Vec<ObjectStat>, StorageError> {
        let dir = self.category_dir(category);
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => return Err(StorageError::Io(err)),
        };

        let mut objects = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            if staged::is_staged_name(&name) {
                continue;
            }
            let metadata = entry.metadata().await?;
            if !metadata.is_file() {
                continue;
            }
            let modified = metadata
                .modified()
                .ok()
                .and_then(|ts| ts.duration_since(UNIX_EPOCH).ok())
                .map(format_timestamp);
            objects.push(ObjectStat {
                name,
                size: metadata.len(),
                modified,
            });
        }
        Ok(objects)
    }

    /// Resolves the on-disk path of one object by exact name.
    pub async fn object_path(
        &self,
        category: Category,
        name: &str,
    ) -> Result<PathBuf, StorageError> {
        // Stored names are always sanitized, so anything else cannot exist.
        if name.is_empty() || Self::sanitize_file_name(name) != name {
            return Err(StorageError::NotFound);
        }
        let path = self.category_dir(category).join(name);
        match fs::metadata(&path).await {
            Ok(metadata) if metadata.is_file() => Ok(path),
            Ok(_) => Err(StorageError::NotFound),
            Err(err) if err.kind() == ErrorKind::NotFound => Err(StorageError::NotFound),
            Err(err) => Err(StorageError::Io(err)),
        }
    }

    /// Permanently removes one object.
    pub async fn delete(&self, category: Category, name: &str) -> Result<(), StorageError> {
        let path = self.object_path(category, name).await?;
        fs::remove_file(path).await?;
        Ok(())
    }

    /// Removes every object in the category, best effort: a failed removal
    /// is recorded and the sweep continues.
    pub async fn delete_all(&self, category: Category) -> Result<BulkDelete, StorageError> {
        let mut outcome = BulkDelete::default();
        for stat in self.list(category).await? {
            let path = self.category_dir(category).join(&stat.name);
            match fs::remove_file(&path).await {
                Ok(()) => outcome.removed += 1,
                Err(err) => {
                    warn!(category = %category, name = stat.name, error = %err, "bulk delete failed for one object");
                    outcome.failed.push(stat.name);
                }
            }
        }
        Ok(outcome)
    }

    /// Sweeps stale staged temp files out of every category directory.
    pub async fn sweep_staged(&self, ttl: Duration) -> io::Result<()> {
        for category in Category::ALL {
            staged::sweep_stale(&self.category_dir(category), ttl).await?;
        }
        Ok(())
    }
}

/// Listing view of one stored file; everything is derived from filesystem
/// metadata at read time.
#[derive(Debug)]
pub struct ObjectStat {
    pub name: String,
    pub size: u64,
    pub modified: Option<String>,
}

#[derive(Debug, Default)]
pub struct BulkDelete {
    pub removed: u64,
    pub failed: Vec<String>,
}

fn format_timestamp(duration: Duration) -> String {
    let timestamp = UNIX_EPOCH + duration;
    let datetime: DateTime<Utc> = timestamp.into();
    datetime.format("%Y-%m-%d %H:%M:%S").to_string()
}

#[derive(Debug)]
pub enum StorageError {
    Conflict,
    NotFound,
    Io(io::Error),
}

impl From<io::Error> for StorageError {
    fn from(err: io::Error) -> Self {
        StorageError::Io(err)
    }
}
