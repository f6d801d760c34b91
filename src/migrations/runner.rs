use std::sync::Arc;

use mongodb::Database;
use serde::{Serialize, Serializer};

use crate::config::MigratorConfig;
use crate::error::{MigrationError, Result};
use crate::logging::{LogLevel, LogRecord, Logger, TracingLogger, LOG_TAG};
use crate::metrics::Timer;
use crate::migrations::command::{Command, Directive};
use crate::migrations::registry::Registry;
use crate::migrations::{Direction, Migration};
use crate::store::{ControlCollection, ControlRecord, ControlStore, MongoControlCollection};

/// Outcome of a migration run.
///
/// On failure `from_version` is the version read when the run started, not
/// the version persisted when it stopped; versions are written after every
/// step, so call [`Migrator::get_version`] to learn how far the run got.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MigrationReport {
    pub success: bool,
    pub from_version: i64,
    pub to_version: i64,
    pub migrations_run: usize,
    #[serde(serialize_with = "error_message", skip_serializing_if = "Option::is_none")]
    pub error: Option<MigrationError>,
}

fn error_message<S: Serializer>(error: &Option<MigrationError>, serializer: S) -> std::result::Result<S::Ok, S::Error> {
    match error {
        Some(error) => serializer.serialize_some(&error.to_string()),
        None => serializer.serialize_none(),
    }
}

impl MigrationReport {
    fn succeeded(from_version: i64, to_version: i64, migrations_run: usize) -> Self {
        Self {
            success: true,
            from_version,
            to_version,
            migrations_run,
            error: None,
        }
    }

    fn failed(from_version: i64, to_version: i64, migrations_run: usize, error: MigrationError) -> Self {
        Self {
            success: false,
            from_version,
            to_version,
            migrations_run,
            error: Some(error),
        }
    }

    pub fn is_lock_held(&self) -> bool {
        matches!(self.error, Some(MigrationError::LockHeld))
    }
}

/// What the locked phase of a run has to do.
#[derive(Debug, Clone, Copy)]
enum Plan {
    /// Run `up` of the migration at this position again.
    Rerun { position: usize },
    /// Walk from one registry position to another.
    Walk { from: usize, to: usize },
}

/// Applies registered migrations against a control store.
///
/// Each migrator owns its configuration, registry and store handle, so
/// several independent migrators can run in one process.
pub struct Migrator {
    config: MigratorConfig,
    registry: Registry,
    store: Option<ControlStore>,
}

impl Default for Migrator {
    fn default() -> Self {
        Self::new(MigratorConfig::default())
    }
}

impl Migrator {
    pub fn new(config: MigratorConfig) -> Self {
        Self {
            config,
            registry: Registry::new(),
            store: None,
        }
    }

    pub fn config(&self) -> &MigratorConfig {
        &self.config
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn connect(&mut self, collection: Arc<dyn ControlCollection>) {
        self.store = Some(ControlStore::new(collection));
    }

    /// Keep the control record in `db`, in the configured collection.
    pub fn connect_database(&mut self, db: &Database) {
        let collection = MongoControlCollection::new(db, &self.config.collection_name);
        self.connect(Arc::new(collection));
    }

    pub fn add(&mut self, migration: Migration) -> Result<()> {
        self.registry.add(migration)
    }

    pub async fn get_version(&self) -> Result<i64> {
        self.store()?.get_version().await
    }

    /// Current control record, created if missing.
    pub async fn control(&self) -> Result<ControlRecord> {
        self.store()?.get_control().await
    }

    /// Clear the run lock regardless of who holds it.
    pub async fn unlock(&self) -> Result<()> {
        let store = self.store()?;
        store.get_control().await?;
        store.lock().release().await?;
        self.log(LogLevel::Warn, "Control lock cleared manually.");
        Ok(())
    }

    /// Delete all control state. Registered migrations are kept.
    pub async fn reset(&self) -> Result<()> {
        self.store()?.reset().await?;
        Ok(())
    }

    pub async fn migrate_to(&self, command: impl Into<Command>) -> Result<MigrationReport> {
        let directive = Directive::parse(command)?;
        self.migrate(&directive).await
    }

    pub async fn migrate(&self, directive: &Directive) -> Result<MigrationReport> {
        let store = self.store()?;
        if self.registry.is_empty() {
            return Err(MigrationError::InvalidCommand(format!(
                "{} (no migrations registered)",
                directive
            )));
        }

        let target = self.registry.resolve(&directive.target)?;
        let rerun = directive.is_rerun();
        let current = store.get_version().await?;

        if !rerun && current == target {
            return Ok(self.already_at(current, target));
        }

        if rerun && target == 0 {
            return Err(MigrationError::NotFound(target.to_string()));
        }
        self.registry.position(target)?;
        if !rerun {
            self.registry.position(current)?;
        }

        let lock = store.lock();
        if !lock.acquire().await? {
            self.log(LogLevel::Info, "Not migrating, control is locked.");
            return Ok(MigrationReport::failed(current, target, 0, MigrationError::LockHeld));
        }

        // `current` may be stale by now: another run can finish between the
        // read above and the acquire.
        let plan = match self.locked_plan(&store, rerun, target).await {
            Ok(plan) => plan,
            Err(err) => {
                if let Err(release_err) = lock.release().await {
                    self.log_release_failure(&release_err);
                }
                return Err(err);
            }
        };
        let Some(plan) = plan else {
            lock.release().await?;
            return Ok(self.already_at(current, target));
        };

        let mut migrations_run = 0;
        let applied = self.apply(&store, plan, &mut migrations_run).await;
        let released = lock.release().await;

        match applied {
            Ok(()) => {
                released?;
                self.log(LogLevel::Info, "Finished migrating.");
                Ok(MigrationReport::succeeded(current, target, migrations_run))
            }
            Err(err) if err.is_store_error() => {
                if let Err(release_err) = released {
                    self.log_release_failure(&release_err);
                }
                Err(err)
            }
            Err(err) => {
                self.log(
                    LogLevel::Error,
                    format!("Migration failed after {} step(s): {}", migrations_run, err),
                );
                released?;
                Ok(MigrationReport::failed(current, target, migrations_run, err))
            }
        }
    }

    fn already_at(&self, current: i64, target: i64) -> MigrationReport {
        if self.config.log_if_latest {
            self.log(LogLevel::Info, format!("Not migrating, already at version {}", target));
        }
        MigrationReport::succeeded(current, target, 0)
    }

    /// Decide what to run from the version persisted once the lock is held.
    /// `None` means the store is already at `target`.
    async fn locked_plan(&self, store: &ControlStore, rerun: bool, target: i64) -> Result<Option<Plan>> {
        let to = self.registry.position(target)?;
        if rerun {
            return Ok(Some(Plan::Rerun { position: to }));
        }
        let version = store.get_version().await?;
        if version == target {
            return Ok(None);
        }
        Ok(Some(Plan::Walk {
            from: self.registry.position(version)?,
            to,
        }))
    }

    /// Runs with the lock held. `migrations_run` counts steps whose new
    /// version has been persisted.
    async fn apply(&self, store: &ControlStore, plan: Plan, migrations_run: &mut usize) -> Result<()> {
        match plan {
            Plan::Rerun { position } => {
                let migration = self.migration_at(position)?;
                self.log(LogLevel::Info, format!("Rerunning version {}", migration.version()));
                self.run_step(migration, Direction::Up).await?;
                *migrations_run += 1;
            }
            Plan::Walk { from, to } => {
                self.log(
                    LogLevel::Info,
                    format!(
                        "Migrating from version {} -> {}",
                        self.registry.version_at(from),
                        self.registry.version_at(to)
                    ),
                );
                if from < to {
                    for position in from + 1..=to {
                        let migration = self.migration_at(position)?;
                        self.run_step(migration, Direction::Up).await?;
                        self.persist(store, migration.version()).await?;
                        *migrations_run += 1;
                    }
                } else {
                    for position in (to + 1..=from).rev() {
                        let migration = self.migration_at(position)?;
                        self.run_step(migration, Direction::Down).await?;
                        self.persist(store, self.registry.version_at(position - 1)).await?;
                        *migrations_run += 1;
                    }
                }
            }
        }
        Ok(())
    }

    async fn persist(&self, store: &ControlStore, version: i64) -> Result<()> {
        store.set_version(version).await?;
        self.log(LogLevel::Debug, format!("Set version to {}", version));
        Ok(())
    }

    async fn run_step(&self, migration: &Migration, direction: Direction) -> Result<()> {
        let action = migration
            .action(direction)
            .ok_or(MigrationError::UnsupportedDirection {
                direction,
                version: migration.version(),
            })?;

        self.log(
            LogLevel::Info,
            format!("Running {}() on {}", direction, migration.describe()),
        );
        let timer = Timer::new(format!("migration::{}", direction)).with_thresholds(5_000, 60_000);
        let outcome = action.run(migration).await;
        timer.log_elapsed(Some(&migration.describe()));

        outcome.map_err(|source| MigrationError::Step {
            version: migration.version(),
            direction,
            source,
        })
    }

    fn migration_at(&self, position: usize) -> Result<&Migration> {
        self.registry
            .at(position)
            .ok_or_else(|| MigrationError::NotFound(format!("at position {}", position)))
    }

    fn store(&self) -> Result<ControlStore> {
        self.store.clone().ok_or(MigrationError::NotConfigured)
    }

    fn log_release_failure(&self, err: &MigrationError) {
        self.log(LogLevel::Warn, format!("Failed to release migration lock: {}", err));
    }

    fn log(&self, level: LogLevel, message: impl AsRef<str>) {
        if !self.config.log {
            return;
        }
        let record = LogRecord {
            level,
            message: message.as_ref(),
            tag: LOG_TAG,
        };
        match &self.config.logger {
            Some(logger) => logger.log(&record),
            None => TracingLogger.log(&record),
        }
    }
}
