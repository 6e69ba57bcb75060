//! In-memory object locks serializing writes per (category, name) slot.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;
use tokio::time;

use crate::category::Category;

/// Manages asynchronous mutexes keyed by stored-object slot, restoring the
/// at-most-one-writer invariant the bare check-then-write lacks.
#[derive(Debug, Default)]
pub struct LockManager {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl LockManager {
    pub fn new() -> Self {
        Self {
            locks: Mutex::new(HashMap::new()),
        }
    }

    /// Acquires the lock for one (category, name) slot, waiting at most
    /// `timeout`.
    pub async fn lock_object_with_timeout(
        &self,
        category: Category,
        name: &str,
        timeout: Duration,
    ) -> Result<tokio::sync::OwnedMutexGuard<()>, ()> {
        let key = lock_key(category, name);
        let lock = {
            let mut locks = self.locks.lock().await;
            locks
                .entry(key)
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        time::timeout(timeout, lock.lock_owned())
            .await
            .map_err(|_| ())
    }
}

// Duplicate detection is case-insensitive, so the key folds case too and
// mixed-case concurrent uploads serialize onto the same lock.
fn lock_key(category: Category, name: &str) -> String {
    format!("{}/{}", category.as_str(), name.to_lowercase())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn same_slot_blocks_until_released() {
        let manager = LockManager::new();
        let guard = manager
            .lock_object_with_timeout(Category::Images, "Photo.png", Duration::from_secs(1))
            .await
            .expect("first lock");

        // Case variant of the same name contends on the same key.
        let blocked = manager
            .lock_object_with_timeout(Category::Images, "photo.PNG", Duration::from_millis(50))
            .await;
        assert!(blocked.is_err());

        drop(guard);
        let reacquired = manager
            .lock_object_with_timeout(Category::Images, "photo.png", Duration::from_millis(50))
            .await;
        assert!(reacquired.is_ok());
    }

    #[tokio::test]
    async fn different_slots_do_not_contend() {
        let manager = LockManager::new();
        let _guard = manager
            .lock_object_with_timeout(Category::Images, "photo.png", Duration::from_secs(1))
            .await
            .expect("first lock");
        let other = manager
            .lock_object_with_timeout(Category::Videos, "photo.png", Duration::from_millis(50))
            .await;
        assert!(other.is_ok());
    }
}
