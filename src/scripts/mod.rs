// Migrations shipped with the shortener service
use mongodb::Database;
use mongo_migrator::Migration;

mod m001_url_indexes;
mod m002_analytics_indexes;
mod m003_backfill_transition_counts;

pub fn all_migrations(db: &Database) -> Vec<Migration> {
    vec![
        m001_url_indexes::migration(db),
        m002_analytics_indexes::migration(db),
        m003_backfill_transition_counts::migration(db),
        // Add more migrations here as needed
    ]
}
