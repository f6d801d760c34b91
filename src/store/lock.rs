//! Exclusive run lock kept on the control record.
//!
//! Acquisition is one conditional update matching the record only while it
//! is unlocked, so among concurrent callers at most one sees a modified
//! document. There is no owner token and no lease: a process that dies while
//! holding the lock leaves it set until [`Lock::release`] is called by an
//! operator.

use std::sync::Arc;

use chrono::Utc;
use tracing::warn;

use crate::error::Result;
use crate::store::{ControlCollection, ControlFilter, ControlPatch, ControlUpdate};

#[derive(Clone)]
pub struct Lock {
    collection: Arc<dyn ControlCollection>,
    id: &'static str,
}

impl Lock {
    pub fn new(collection: Arc<dyn ControlCollection>, id: &'static str) -> Self {
        Self { collection, id }
    }

    /// Returns `true` iff this call flipped the record from unlocked to
    /// locked.
    pub async fn acquire(&self) -> Result<bool> {
        let update = ControlUpdate {
            set: ControlPatch {
                locked: Some(true),
                locked_at: Some(Utc::now()),
                ..ControlPatch::default()
            },
            ..ControlUpdate::default()
        };
        let outcome = self
            .collection
            .update_one(ControlFilter::unlocked(self.id), update, false)
            .await?;
        Ok(outcome.modified == 1)
    }

    /// Unconditionally clear the lock. Returns `false` when there was no
    /// control record to clear.
    pub async fn release(&self) -> Result<bool> {
        let update = ControlUpdate {
            set: ControlPatch {
                locked: Some(false),
                ..ControlPatch::default()
            },
            ..ControlUpdate::default()
        };
        let outcome = self
            .collection
            .update_one(ControlFilter::id(self.id), update, false)
            .await?;
        if outcome.matched == 0 {
            warn!(id = self.id, "No control record to unlock");
        }
        Ok(outcome.matched == 1)
    }
}
