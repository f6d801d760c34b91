// Migration definitions and the step actions they carry
use std::fmt;
use std::future::Future;

use async_trait::async_trait;

pub mod command;
pub mod registry;
pub mod runner;

/// Work performed by one direction of a migration.
///
/// Async closures taking `&Migration` implement this directly; wrap
/// synchronous functions with [`blocking`].
#[async_trait]
pub trait StepAction: Send + Sync {
    async fn run(&self, migration: &Migration) -> anyhow::Result<()>;
}

#[async_trait]
impl<F, Fut> StepAction for F
where
    F: Fn(&Migration) -> Fut + Send + Sync,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    async fn run(&self, migration: &Migration) -> anyhow::Result<()> {
        (self)(migration).await
    }
}

/// Adapter for step actions that do not need to suspend.
pub struct SyncStep<F>(F);

pub fn blocking<F>(f: F) -> SyncStep<F>
where
    F: Fn(&Migration) -> anyhow::Result<()> + Send + Sync,
{
    SyncStep(f)
}

#[async_trait]
impl<F> StepAction for SyncStep<F>
where
    F: Fn(&Migration) -> anyhow::Result<()> + Send + Sync,
{
    async fn run(&self, migration: &Migration) -> anyhow::Result<()> {
        (self.0)(migration)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Up,
    Down,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Up => write!(f, "up"),
            Direction::Down => write!(f, "down"),
        }
    }
}

/// A versioned migration.
///
/// Built once with the chained constructors below and handed to
/// [`Migrator::add`](runner::Migrator::add); afterwards the registry owns it
/// and only read access is available.
pub struct Migration {
    version: i64,
    name: Option<String>,
    up: Option<Box<dyn StepAction>>,
    down: Option<Box<dyn StepAction>>,
}

impl Migration {
    pub fn new(version: i64) -> Self {
        Self {
            version,
            name: None,
            up: None,
            down: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn up<F, Fut>(self, f: F) -> Self
    where
        F: Fn(&Migration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.up_with(f)
    }

    pub fn down<F, Fut>(self, f: F) -> Self
    where
        F: Fn(&Migration) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.down_with(f)
    }

    pub fn up_with(mut self, action: impl StepAction + 'static) -> Self {
        self.up = Some(Box::new(action));
        self
    }

    pub fn down_with(mut self, action: impl StepAction + 'static) -> Self {
        self.down = Some(Box::new(action));
        self
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn has_up(&self) -> bool {
        self.up.is_some()
    }

    pub fn is_reversible(&self) -> bool {
        self.down.is_some()
    }

    pub fn action(&self, direction: Direction) -> Option<&dyn StepAction> {
        match direction {
            Direction::Up => self.up.as_deref(),
            Direction::Down => self.down.as_deref(),
        }
    }

    /// `version N` or `version N (name)`, as used in log lines.
    pub fn describe(&self) -> String {
        match &self.name {
            Some(name) => format!("version {} ({})", self.version, name),
            None => format!("version {}", self.version),
        }
    }
}

impl fmt::Debug for Migration {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Migration")
            .field("version", &self.version)
            .field("name", &self.name)
            .field("up", &self.up.is_some())
            .field("down", &self.down.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_async_closure_receives_migration() {
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_by_up = seen.clone();
        let migration = Migration::new(4).with_name("add ttl index").up(move |m| {
            seen_by_up.store(m.version() as usize, Ordering::SeqCst);
            async { anyhow::Ok(()) }
        });

        let action = migration.action(Direction::Up).unwrap();
        action.run(&migration).await.unwrap();
        assert_eq!(seen.load(Ordering::SeqCst), 4);
        assert!(migration.action(Direction::Down).is_none());
    }

    #[tokio::test]
    async fn test_blocking_step() {
        let migration = Migration::new(1)
            .up_with(blocking(|_| Ok(())))
            .down_with(blocking(|m| anyhow::bail!("cannot undo {}", m.version())));

        assert!(migration.is_reversible());
        let down = migration.action(Direction::Down).unwrap();
        let err = down.run(&migration).await.unwrap_err();
        assert_eq!(err.to_string(), "cannot undo 1");
    }

    #[test]
    fn test_describe() {
        assert_eq!(Migration::new(2).describe(), "version 2");
        assert_eq!(Migration::new(2).with_name("seed").describe(), "version 2 (seed)");
    }
}
