//! Sequential, version-numbered migrations for MongoDB.
//!
//! A single control record in the migrations collection stores the installed
//! version and a run lock. [`Migrator`] walks the registered migrations up or
//! down to a target version, persisting the version after every step, and the
//! lock keeps concurrent processes from applying migrations at the same time.
//!
//! ```no_run
//! use mongo_migrator::{Migration, Migrator, MigratorConfig};
//!
//! # async fn run(db: mongodb::Database) -> anyhow::Result<()> {
//! let mut migrator = Migrator::new(MigratorConfig::default());
//! migrator.connect_database(&db);
//! migrator.add(
//!     Migration::new(1)
//!         .with_name("create users")
//!         .up(|_| async { anyhow::Ok(()) })
//!         .down(|_| async { anyhow::Ok(()) }),
//! )?;
//!
//! let report = migrator.migrate_to("latest").await?;
//! assert!(report.success);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod logging;
pub mod metrics;
pub mod migrations;
pub mod store;

pub use config::{MigratorConfig, MongoSettings};
pub use error::{MigrationError, Result};
pub use logging::{LogLevel, LogRecord, Logger, TracingLogger};
pub use migrations::command::{Command, Directive, Subcommand, Target};
pub use migrations::registry::Registry;
pub use migrations::runner::{MigrationReport, Migrator};
pub use migrations::{blocking, Direction, Migration, StepAction};
pub use store::{ControlCollection, ControlRecord, ControlStore, Lock, MemoryCollection, MongoControlCollection};
