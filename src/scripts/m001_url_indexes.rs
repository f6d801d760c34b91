use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use mongo_migrator::Migration;

const SHORT_CODE_INDEX: &str = "short_code_unique";

/// Unique index on `urls.short_code` so generated codes cannot collide.
pub fn migration(db: &Database) -> Migration {
    let urls = db.collection::<Document>("urls");
    let urls_down = urls.clone();
    Migration::new(1)
        .with_name("create url indexes")
        .up(move |_| {
            let urls = urls.clone();
            async move {
                let index = IndexModel::builder()
                    .keys(doc! { "short_code": 1 })
                    .options(
                        IndexOptions::builder()
                            .unique(true)
                            .name(SHORT_CODE_INDEX.to_string())
                            .build(),
                    )
                    .build();
                urls.create_index(index, None).await?;
                anyhow::Ok(())
            }
        })
        .down(move |_| {
            let urls = urls_down.clone();
            async move {
                urls.drop_index(SHORT_CODE_INDEX, None).await?;
                anyhow::Ok(())
            }
        })
}
