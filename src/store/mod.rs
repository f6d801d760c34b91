//! Persistence of the control record: the singleton document holding the
//! installed version and the run lock.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;

use crate::error::Result;

pub mod lock;
pub mod memory;
pub mod mongo;

pub use lock::Lock;
pub use memory::MemoryCollection;
pub use mongo::MongoControlCollection;

/// Well-known key of the control record.
pub const CONTROL_ID: &str = "control";

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct ControlRecord {
    /// Last applied version, `0` before any migration ran.
    pub version: i64,
    pub locked: bool,
    pub locked_at: Option<DateTime<Utc>>,
}

/// Matches the record with `id`, and with `unlocked_only` additionally
/// requires `locked == false`.
#[derive(Debug, Clone, Copy)]
pub struct ControlFilter<'a> {
    pub id: &'a str,
    pub unlocked_only: bool,
}

impl<'a> ControlFilter<'a> {
    pub fn id(id: &'a str) -> Self {
        Self { id, unlocked_only: false }
    }

    pub fn unlocked(id: &'a str) -> Self {
        Self { id, unlocked_only: true }
    }
}

/// Field assignments; `None` leaves a field untouched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ControlPatch {
    pub version: Option<i64>,
    pub locked: Option<bool>,
    pub locked_at: Option<DateTime<Utc>>,
}

impl ControlPatch {
    pub fn is_empty(&self) -> bool {
        self.version.is_none() && self.locked.is_none() && self.locked_at.is_none()
    }

    /// Apply to `record`, returning whether any field changed.
    pub fn apply(&self, record: &mut ControlRecord) -> bool {
        let before = record.clone();
        if let Some(version) = self.version {
            record.version = version;
        }
        if let Some(locked) = self.locked {
            record.locked = locked;
        }
        if let Some(locked_at) = self.locked_at {
            record.locked_at = Some(locked_at);
        }
        *record != before
    }
}

/// `set` applies to matched and upserted records, `set_on_insert` only to
/// records created by an upsert.
#[derive(Debug, Clone, Default)]
pub struct ControlUpdate {
    pub set: ControlPatch,
    pub set_on_insert: ControlPatch,
}

/// Counts reported by an update, as MongoDB reports them: `modified` stays 0
/// when a matched record already had the assigned values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UpdateOutcome {
    pub matched: u64,
    pub modified: u64,
    pub upserted: bool,
}

/// The database capability the migrator needs: point reads, single
/// conditional updates and a full clear.
#[async_trait]
pub trait ControlCollection: Send + Sync {
    async fn find_one(&self, id: &str) -> Result<Option<ControlRecord>>;

    /// Atomically update at most one record matching `filter`.
    async fn update_one(
        &self,
        filter: ControlFilter<'_>,
        update: ControlUpdate,
        upsert: bool,
    ) -> Result<UpdateOutcome>;

    /// Remove every document in the collection.
    async fn delete_many(&self) -> Result<u64>;
}

#[derive(Clone)]
pub struct ControlStore {
    collection: Arc<dyn ControlCollection>,
}

impl ControlStore {
    pub fn new(collection: Arc<dyn ControlCollection>) -> Self {
        Self { collection }
    }

    /// Read the control record, creating `{version: 0, locked: false}` when
    /// it does not exist yet.
    pub async fn get_control(&self) -> Result<ControlRecord> {
        if let Some(record) = self.collection.find_one(CONTROL_ID).await? {
            return Ok(record);
        }

        let create = ControlUpdate {
            set: ControlPatch::default(),
            set_on_insert: ControlPatch {
                version: Some(0),
                locked: Some(false),
                locked_at: None,
            },
        };
        let outcome = self
            .collection
            .update_one(ControlFilter::id(CONTROL_ID), create, true)
            .await?;
        if outcome.upserted {
            debug!(id = CONTROL_ID, "Created migration control record");
        }
        let record = self.collection.find_one(CONTROL_ID).await?;
        Ok(record.unwrap_or_default())
    }

    pub async fn get_version(&self) -> Result<i64> {
        Ok(self.get_control().await?.version)
    }

    pub async fn set_version(&self, version: i64) -> Result<()> {
        let update = ControlUpdate {
            set: ControlPatch {
                version: Some(version),
                ..ControlPatch::default()
            },
            set_on_insert: ControlPatch {
                locked: Some(false),
                ..ControlPatch::default()
            },
        };
        self.collection
            .update_one(ControlFilter::id(CONTROL_ID), update, true)
            .await?;
        Ok(())
    }

    /// Drop all control state. The record is created first so the clear
    /// always has something to act on.
    pub async fn reset(&self) -> Result<u64> {
        self.get_control().await?;
        self.collection.delete_many().await
    }

    pub fn lock(&self) -> Lock {
        Lock::new(self.collection.clone(), CONTROL_ID)
    }
}
