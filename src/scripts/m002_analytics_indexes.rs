use mongodb::bson::{doc, Document};
use mongodb::options::IndexOptions;
use mongodb::{Database, IndexModel};
use mongo_migrator::Migration;

const URL_ID_INDEX: &str = "url_id";
const URL_RECENCY_INDEX: &str = "url_id_last_accessed";

fn named(keys: Document, name: &str) -> IndexModel {
    IndexModel::builder()
        .keys(keys)
        .options(IndexOptions::builder().name(name.to_string()).build())
        .build()
}

/// Lookup of analytics by URL, plus URL and recency for "latest hits" queries.
pub fn migration(db: &Database) -> Migration {
    let analytics = db.collection::<Document>("analytics");
    let analytics_down = analytics.clone();
    Migration::new(2)
        .with_name("create analytics indexes")
        .up(move |_| {
            let analytics = analytics.clone();
            async move {
                analytics
                    .create_indexes(
                        vec![
                            named(doc! { "url_id": 1 }, URL_ID_INDEX),
                            named(doc! { "url_id": 1, "last_accessed": -1 }, URL_RECENCY_INDEX),
                        ],
                        None,
                    )
                    .await?;
                anyhow::Ok(())
            }
        })
        .down(move |_| {
            let analytics = analytics_down.clone();
            async move {
                analytics.drop_index(URL_RECENCY_INDEX, None).await?;
                analytics.drop_index(URL_ID_INDEX, None).await?;
                anyhow::Ok(())
            }
        })
}
