//! Ordered, version-keyed collection of registered migrations.

use crate::error::{MigrationError, Result};
use crate::migrations::command::Target;
use crate::migrations::Migration;

/// Migrations sorted ascending by version.
///
/// Positions are 1-based: position `0` stands for the unmigrated state
/// before the first migration and has no entry of its own.
#[derive(Debug, Default)]
pub struct Registry {
    migrations: Vec<Migration>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate and store a migration, keeping the collection sorted.
    pub fn add(&mut self, migration: Migration) -> Result<()> {
        if !migration.has_up() {
            return Err(MigrationError::Validation(
                "migration must supply an up function".into(),
            ));
        }
        if migration.version() <= 0 {
            return Err(MigrationError::Validation(format!(
                "migration version must be greater than 0, got {}",
                migration.version()
            )));
        }
        if self.contains(migration.version()) {
            return Err(MigrationError::Validation(format!(
                "migration version {} is already registered",
                migration.version()
            )));
        }

        self.migrations.push(migration);
        self.migrations.sort_by_key(Migration::version);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.migrations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.migrations.is_empty()
    }

    pub fn contains(&self, version: i64) -> bool {
        self.migrations
            .binary_search_by_key(&version, Migration::version)
            .is_ok()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Migration> {
        self.migrations.iter()
    }

    pub fn versions(&self) -> Vec<i64> {
        self.migrations.iter().map(Migration::version).collect()
    }

    /// Highest registered version, `0` when nothing is registered.
    pub fn latest_version(&self) -> i64 {
        self.migrations.last().map(Migration::version).unwrap_or(0)
    }

    /// Concrete version a directive target points at.
    pub fn resolve(&self, target: &Target) -> Result<i64> {
        match target {
            Target::Latest => Ok(self.latest_version()),
            Target::Version(version) => Ok(*version),
            Target::Invalid(raw) => Err(MigrationError::NotFound(raw.clone())),
        }
    }

    /// Position of `version`, with `0` mapping to the unmigrated state.
    pub fn position(&self, version: i64) -> Result<usize> {
        if version == 0 {
            return Ok(0);
        }
        self.migrations
            .binary_search_by_key(&version, Migration::version)
            .map(|index| index + 1)
            .map_err(|_| MigrationError::NotFound(version.to_string()))
    }

    /// Migration stored at a 1-based position.
    pub fn at(&self, position: usize) -> Option<&Migration> {
        position.checked_sub(1).and_then(|index| self.migrations.get(index))
    }

    /// Version recorded at a position, `0` for the unmigrated state.
    pub fn version_at(&self, position: usize) -> i64 {
        self.at(position).map(Migration::version).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn noop(version: i64) -> Migration {
        Migration::new(version).up(|_| async { anyhow::Ok(()) })
    }

    #[test]
    fn test_add_sorts_by_version() {
        let orders: [[i64; 4]; 3] = [[1, 2, 3, 4], [4, 3, 2, 1], [3, 1, 4, 2]];
        for order in orders {
            let mut registry = Registry::new();
            for version in order {
                registry.add(noop(version)).unwrap();
            }
            assert_eq!(registry.versions(), vec![1, 2, 3, 4]);
        }
    }

    #[test]
    fn test_add_rejects_invalid_migrations() {
        let mut registry = Registry::new();
        registry.add(noop(1)).unwrap();

        for bad in [noop(0), noop(-3), noop(1), Migration::new(5)] {
            let err = registry.add(bad).unwrap_err();
            assert!(matches!(err, MigrationError::Validation(_)));
        }
        assert_eq!(registry.versions(), vec![1]);
    }

    #[test]
    fn test_position_lookup() {
        let mut registry = Registry::new();
        for version in [10, 20, 30] {
            registry.add(noop(version)).unwrap();
        }

        assert_eq!(registry.position(0).unwrap(), 0);
        assert_eq!(registry.position(10).unwrap(), 1);
        assert_eq!(registry.position(30).unwrap(), 3);
        assert!(matches!(registry.position(15), Err(MigrationError::NotFound(v)) if v == "15"));

        assert!(registry.at(0).is_none());
        assert_eq!(registry.version_at(0), 0);
        assert_eq!(registry.version_at(2), 20);
        assert!(registry.at(4).is_none());
    }

    #[test]
    fn test_resolve_targets() {
        let mut registry = Registry::new();
        assert_eq!(registry.resolve(&Target::Latest).unwrap(), 0);

        registry.add(noop(2)).unwrap();
        registry.add(noop(7)).unwrap();
        assert_eq!(registry.resolve(&Target::Latest).unwrap(), 7);
        assert_eq!(registry.resolve(&Target::Version(2)).unwrap(), 2);
        assert!(matches!(
            registry.resolve(&Target::Invalid("abc".into())),
            Err(MigrationError::NotFound(_))
        ));
    }
}
