use async_trait::async_trait;
use chrono::{DateTime, Utc};
use mongodb::bson::{doc, DateTime as MongoDateTime, Document};
use mongodb::options::UpdateOptions;
use mongodb::{Collection, Database};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::metrics::time_store_operation;
use crate::store::{ControlCollection, ControlFilter, ControlPatch, ControlRecord, ControlUpdate, UpdateOutcome};

/// Control record as stored in MongoDB.
#[derive(Debug, Serialize, Deserialize, Clone)]
struct ControlDoc {
    #[serde(rename = "_id")]
    id: String,
    #[serde(default)]
    version: i64,
    #[serde(default)]
    locked: bool,
    #[serde(rename = "lockedAt", default, skip_serializing_if = "Option::is_none")]
    locked_at: Option<MongoDateTime>,
}

impl From<ControlDoc> for ControlRecord {
    fn from(doc: ControlDoc) -> Self {
        ControlRecord {
            version: doc.version,
            locked: doc.locked,
            locked_at: doc
                .locked_at
                .and_then(|at| DateTime::<Utc>::from_timestamp_millis(at.timestamp_millis())),
        }
    }
}

fn patch_document(patch: &ControlPatch) -> Document {
    let mut fields = Document::new();
    if let Some(version) = patch.version {
        fields.insert("version", version);
    }
    if let Some(locked) = patch.locked {
        fields.insert("locked", locked);
    }
    if let Some(locked_at) = patch.locked_at {
        fields.insert("lockedAt", MongoDateTime::from_millis(locked_at.timestamp_millis()));
    }
    fields
}

fn filter_document(filter: &ControlFilter<'_>) -> Document {
    let mut query = doc! { "_id": filter.id };
    if filter.unlocked_only {
        query.insert("locked", false);
    }
    query
}

fn update_document(update: &ControlUpdate) -> Document {
    let mut modifiers = Document::new();
    if !update.set.is_empty() {
        modifiers.insert("$set", patch_document(&update.set));
    }
    if !update.set_on_insert.is_empty() {
        modifiers.insert("$setOnInsert", patch_document(&update.set_on_insert));
    }
    modifiers
}

/// Control collection backed by a MongoDB collection.
#[derive(Clone)]
pub struct MongoControlCollection {
    collection: Collection<ControlDoc>,
    name: String,
}

impl MongoControlCollection {
    pub fn new(db: &Database, name: &str) -> Self {
        Self {
            collection: db.collection(name),
            name: name.to_string(),
        }
    }
}

#[async_trait]
impl ControlCollection for MongoControlCollection {
    async fn find_one(&self, id: &str) -> Result<Option<ControlRecord>> {
        let found = time_store_operation(
            "find_one",
            &self.name,
            self.collection.find_one(doc! { "_id": id }, None),
        )
        .await?;
        Ok(found.map(ControlRecord::from))
    }

    async fn update_one(
        &self,
        filter: ControlFilter<'_>,
        update: ControlUpdate,
        upsert: bool,
    ) -> Result<UpdateOutcome> {
        let options = UpdateOptions::builder().upsert(upsert).build();
        let result = time_store_operation(
            "update_one",
            &self.name,
            self.collection
                .update_one(filter_document(&filter), update_document(&update), options),
        )
        .await?;
        Ok(UpdateOutcome {
            matched: result.matched_count,
            modified: result.modified_count,
            upserted: result.upserted_id.is_some(),
        })
    }

    async fn delete_many(&self) -> Result<u64> {
        let result = time_store_operation(
            "delete_many",
            &self.name,
            self.collection.delete_many(doc! {}, None),
        )
        .await?;
        Ok(result.deleted_count)
    }
}
