use mongodb::bson::{doc, Document};
use mongodb::Database;
use mongo_migrator::Migration;

/// Older URL documents predate `transition_count`. One way: there is no
/// telling backfilled zeros apart from real ones afterwards.
pub fn migration(db: &Database) -> Migration {
    let urls = db.collection::<Document>("urls");
    Migration::new(3)
        .with_name("backfill transition counts")
        .up(move |_| {
            let urls = urls.clone();
            async move {
                let result = urls
                    .update_many(
                        doc! { "transition_count": { "$exists": false } },
                        doc! { "$set": { "transition_count": 0_i64 } },
                        None,
                    )
                    .await?;
                tracing::info!(modified = result.modified_count, "Backfilled transition counts");
                anyhow::Ok(())
            }
        })
}
