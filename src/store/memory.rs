//! In-process control collection with the same matching rules as the Mongo
//! one. Backs tests and embedders that keep their version ledger elsewhere.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use tokio::sync::Mutex;

use crate::error::{MigrationError, Result};
use crate::store::{ControlCollection, ControlFilter, ControlRecord, ControlUpdate, UpdateOutcome};

#[derive(Debug, Default)]
pub struct MemoryCollection {
    records: Mutex<HashMap<String, ControlRecord>>,
    lock_attempts: AtomicUsize,
    fail_version_writes: AtomicBool,
    fail_lock_releases: AtomicBool,
}

impl MemoryCollection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of conditional (`locked == false`) updates seen so far.
    pub fn lock_attempts(&self) -> usize {
        self.lock_attempts.load(Ordering::SeqCst)
    }

    /// Make every update that writes `version` fail with a store error.
    pub fn fail_version_writes(&self, fail: bool) {
        self.fail_version_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every unconditional `locked: false` update fail with a store
    /// error.
    pub fn fail_lock_releases(&self, fail: bool) {
        self.fail_lock_releases.store(fail, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.records.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.lock().await.is_empty()
    }
}

#[async_trait]
impl ControlCollection for MemoryCollection {
    async fn find_one(&self, id: &str) -> Result<Option<ControlRecord>> {
        Ok(self.records.lock().await.get(id).cloned())
    }

    async fn update_one(
        &self,
        filter: ControlFilter<'_>,
        update: ControlUpdate,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        if filter.unlocked_only {
            self.lock_attempts.fetch_add(1, Ordering::SeqCst);
        }
        if update.set.version.is_some() && self.fail_version_writes.load(Ordering::SeqCst) {
            return Err(MigrationError::Store("version write rejected".into()));
        }
        if !filter.unlocked_only
            && update.set.locked == Some(false)
            && self.fail_lock_releases.load(Ordering::SeqCst)
        {
            return Err(MigrationError::Store("lock release rejected".into()));
        }

        let mut records = self.records.lock().await;
        if let Some(record) = records.get_mut(filter.id) {
            if filter.unlocked_only && record.locked {
                return Ok(UpdateOutcome::default());
            }
            let changed = update.set.apply(record);
            return Ok(UpdateOutcome {
                matched: 1,
                modified: u64::from(changed),
                upserted: false,
            });
        }
        if !upsert {
            return Ok(UpdateOutcome::default());
        }

        // Fields neither patch sets keep their defaults.
        let mut record = ControlRecord::default();
        update.set_on_insert.apply(&mut record);
        update.set.apply(&mut record);
        records.insert(filter.id.to_string(), record);
        Ok(UpdateOutcome {
            upserted: true,
            ..UpdateOutcome::default()
        })
    }

    async fn delete_many(&self) -> Result<u64> {
        let mut records = self.records.lock().await;
        let deleted = records.len() as u64;
        records.clear();
        Ok(deleted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::ControlPatch;

    fn set_locked(locked: bool) -> ControlUpdate {
        ControlUpdate {
            set: ControlPatch { locked: Some(locked), ..ControlPatch::default() },
            ..ControlUpdate::default()
        }
    }

    #[tokio::test]
    async fn test_update_without_upsert_misses() {
        let collection = MemoryCollection::new();
        let outcome = collection
            .update_one(ControlFilter::id("control"), set_locked(true), false)
            .await
            .unwrap();
        assert_eq!(outcome, UpdateOutcome::default());
        assert!(collection.is_empty().await);
    }

    #[tokio::test]
    async fn test_unchanged_match_is_not_modified() {
        let collection = MemoryCollection::new();
        collection
            .update_one(ControlFilter::id("control"), set_locked(false), true)
            .await
            .unwrap();

        let outcome = collection
            .update_one(ControlFilter::id("control"), set_locked(false), false)
            .await
            .unwrap();
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.modified, 0);
    }

    #[tokio::test]
    async fn test_unlocked_filter_skips_locked_record() {
        let collection = MemoryCollection::new();
        collection
            .update_one(ControlFilter::id("control"), set_locked(true), true)
            .await
            .unwrap();

        let outcome = collection
            .update_one(ControlFilter::unlocked("control"), set_locked(true), false)
            .await
            .unwrap();
        assert_eq!(outcome.matched, 0);
        assert_eq!(collection.lock_attempts(), 1);
    }

    #[tokio::test]
    async fn test_set_on_insert_only_applies_to_new_records() {
        let collection = MemoryCollection::new();
        let update = ControlUpdate {
            set: ControlPatch::default(),
            set_on_insert: ControlPatch { version: Some(9), ..ControlPatch::default() },
        };
        collection.update_one(ControlFilter::id("control"), update.clone(), true).await.unwrap();
        collection
            .update_one(
                ControlFilter::id("control"),
                ControlUpdate {
                    set: ControlPatch { version: Some(2), ..ControlPatch::default() },
                    ..ControlUpdate::default()
                },
                false,
            )
            .await
            .unwrap();
        collection.update_one(ControlFilter::id("control"), update, true).await.unwrap();

        let record = collection.find_one("control").await.unwrap().unwrap();
        assert_eq!(record.version, 2);
    }

    #[tokio::test]
    async fn test_injected_version_failure() {
        let collection = MemoryCollection::new();
        collection.fail_version_writes(true);
        let update = ControlUpdate {
            set: ControlPatch { version: Some(1), ..ControlPatch::default() },
            ..ControlUpdate::default()
        };
        let err = collection
            .update_one(ControlFilter::id("control"), update, true)
            .await
            .unwrap_err();
        assert!(err.is_store_error());
    }

    #[tokio::test]
    async fn test_injected_release_failure() {
        let collection = MemoryCollection::new();
        collection
            .update_one(ControlFilter::id("control"), set_locked(true), true)
            .await
            .unwrap();
        collection.fail_lock_releases(true);

        let err = collection
            .update_one(ControlFilter::id("control"), set_locked(false), false)
            .await
            .unwrap_err();
        assert!(err.is_store_error());
        assert!(collection.find_one("control").await.unwrap().unwrap().locked);
    }
}
