//! # Job Store
//!
//! Persists `JobRecord`s as JSON documents in a key/value cache with expiry,
//! keyed `task:{task_id}`. Every write replaces the whole document and resets
//! its time-to-live to the retention window, so job metadata disappears
//! together with the files it describes.
//!
//! ## Key Types:
//! - **`MetadataCache`**: the cache seam (`set_with_expiry` / `get` / `delete`)
//! - **`MemoryCache`**: in-process cache with per-entry deadlines
//! - **`JobStore`**: typed record access plus read-modify-replace transitions

use crate::jobs::record::{JobRecord, TransitionError};
use anyhow::{anyhow, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::{Duration, Instant};

/// Key/value storage with per-key expiry.
pub trait MetadataCache: Send + Sync {
    fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<String>>;

    /// Returns whether a live entry was removed.
    fn delete(&self, key: &str) -> Result<bool>;

    /// Drop expired entries; returns how many were removed.
    fn purge_expired(&self) -> usize {
        0
    }
}

/// In-memory `MetadataCache`.
///
/// Expired entries are invisible to `get` immediately and physically removed
/// by `purge_expired`.
#[derive(Default)]
pub struct MemoryCache {
    entries: RwLock<HashMap<String, (String, Instant)>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    #[cfg(test)]
    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl MetadataCache for MemoryCache {
    fn set_with_expiry(&self, key: &str, value: String, ttl: Duration) -> Result<()> {
        let deadline = Instant::now() + ttl;
        self.entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), (value, deadline));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.read().unwrap_or_else(PoisonError::into_inner);
        Ok(entries
            .get(key)
            .filter(|(_, deadline)| *deadline > Instant::now())
            .map(|(value, _)| value.clone()))
    }

    fn delete(&self, key: &str) -> Result<bool> {
        let removed = self
            .entries
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        Ok(removed.is_some_and(|(_, deadline)| deadline > Instant::now()))
    }

    fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|_, (_, deadline)| *deadline > now);
        before - entries.len()
    }
}

/// Typed access to job records.
pub struct JobStore {
    cache: Arc<dyn MetadataCache>,
    ttl: Duration,
    /// Serializes read-modify-replace cycles
    write_lock: Mutex<()>,
}

impl JobStore {
    pub fn new(cache: Arc<dyn MetadataCache>, ttl: Duration) -> Self {
        Self {
            cache,
            ttl,
            write_lock: Mutex::new(()),
        }
    }

    fn key(task_id: &str) -> String {
        format!("task:{}", task_id)
    }

    pub fn put(&self, record: &JobRecord) -> Result<()> {
        let value = serde_json::to_string(record)?;
        self.cache.set_with_expiry(&Self::key(&record.task_id), value, self.ttl)
    }

    pub fn get(&self, task_id: &str) -> Result<Option<JobRecord>> {
        match self.cache.get(&Self::key(task_id))? {
            Some(value) => Ok(Some(serde_json::from_str(&value)?)),
            None => Ok(None),
        }
    }

    /// Read the record, compute its successor and replace it.
    ///
    /// A missing record or an illegal transition leaves the store untouched.
    pub fn transition<F>(&self, task_id: &str, next: F) -> Result<JobRecord>
    where
        F: FnOnce(&JobRecord) -> Result<JobRecord, TransitionError>,
    {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);

        let current = self
            .get(task_id)?
            .ok_or_else(|| anyhow!("No job record for task {}", task_id))?;
        let updated = next(&current)?;
        self.put(&updated)?;
        Ok(updated)
    }

    pub fn remove(&self, task_id: &str) -> Result<bool> {
        let _guard = self.write_lock.lock().unwrap_or_else(PoisonError::into_inner);
        self.cache.delete(&Self::key(task_id))
    }

    pub fn purge_expired(&self) -> usize {
        self.cache.purge_expired()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::record::JobStatus;
    use std::path::PathBuf;

    fn record(task_id: &str) -> JobRecord {
        JobRecord::queued(
            task_id,
            "memo.wav",
            PathBuf::from("uploads/in.wav"),
            PathBuf::from("processed/out.wav"),
            0,
        )
    }

    fn store(ttl: Duration) -> (JobStore, Arc<MemoryCache>) {
        let cache = Arc::new(MemoryCache::new());
        (JobStore::new(cache.clone(), ttl), cache)
    }

    #[test]
    fn test_put_get_remove() {
        let (store, cache) = store(Duration::from_secs(60));
        let original = record("abc");
        store.put(&original).unwrap();

        assert!(cache.get("task:abc").unwrap().is_some());
        assert_eq!(store.get("abc").unwrap(), Some(original));

        assert!(store.remove("abc").unwrap());
        assert!(store.get("abc").unwrap().is_none());
        assert!(!store.remove("abc").unwrap());
    }

    #[test]
    fn test_transition_replaces_record() {
        let (store, _) = store(Duration::from_secs(60));
        store.put(&record("abc")).unwrap();

        let updated = store.transition("abc", |r| r.begin_processing()).unwrap();
        assert_eq!(updated.status, JobStatus::Processing);
        assert_eq!(store.get("abc").unwrap().unwrap().status, JobStatus::Processing);
    }

    #[test]
    fn test_rejected_transition_leaves_record() {
        let (store, _) = store(Duration::from_secs(60));
        store.put(&record("abc")).unwrap();

        assert!(store.transition("abc", |r| r.fail("too early")).is_err());
        let stored = store.get("abc").unwrap().unwrap();
        assert_eq!(stored.status, JobStatus::Queued);
        assert!(stored.error.is_none());

        assert!(store.transition("missing", |r| r.begin_processing()).is_err());
    }

    #[test]
    fn test_entries_expire() {
        let (store, cache) = store(Duration::from_millis(20));
        store.put(&record("abc")).unwrap();
        assert!(store.get("abc").unwrap().is_some());

        std::thread::sleep(Duration::from_millis(40));
        assert!(store.get("abc").unwrap().is_none());
        assert_eq!(cache.len(), 1);
        assert_eq!(store.purge_expired(), 1);
        assert_eq!(cache.len(), 0);
    }
}
