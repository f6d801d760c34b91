//! Error taxonomy for registration, command parsing and migration runs.

use thiserror::Error;

use crate::migrations::Direction;

/// Result type for migration operations
pub type Result<T> = std::result::Result<T, MigrationError>;

#[derive(Debug, Error)]
pub enum MigrationError {
    /// No control store has been connected to the migrator.
    #[error("migrations are not connected to a database")]
    NotConfigured,

    /// A migration was rejected at registration time.
    #[error("invalid migration: {0}")]
    Validation(String),

    #[error("cannot migrate using invalid command: {0:?}")]
    InvalidCommand(String),

    /// Target or persisted version is not in the registry.
    #[error("can't find migration version {0}")]
    NotFound(String),

    /// Another run holds the control lock.
    #[error("not migrating, control is locked")]
    LockHeld,

    #[error("cannot migrate {direction} on version {version}")]
    UnsupportedDirection { direction: Direction, version: i64 },

    /// A user supplied step action failed.
    #[error("{direction}() on version {version} failed: {source}")]
    Step {
        version: i64,
        direction: Direction,
        #[source]
        source: anyhow::Error,
    },

    #[error("database error: {0}")]
    Database(#[from] mongodb::error::Error),

    /// Failure of a non-Mongo control store.
    #[error("control store error: {0}")]
    Store(String),
}

impl MigrationError {
    /// True for failures talking to the control store. These leave a run
    /// unchanged instead of being folded into a failed report.
    pub fn is_store_error(&self) -> bool {
        matches!(self, MigrationError::Database(_) | MigrationError::Store(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_store_errors_are_classified() {
        assert!(MigrationError::Store("down".into()).is_store_error());
        assert!(!MigrationError::LockHeld.is_store_error());
        assert!(!MigrationError::NotFound("7".into()).is_store_error());
    }

    #[test]
    fn test_step_error_keeps_source() {
        let err = MigrationError::Step {
            version: 2,
            direction: Direction::Up,
            source: anyhow::anyhow!("index build failed"),
        };
        assert_eq!(err.to_string(), "up() on version 2 failed: index build failed");
        let source = std::error::Error::source(&err).map(ToString::to_string);
        assert_eq!(source.as_deref(), Some("index build failed"));
    }

    #[test]
    fn test_unsupported_direction_message() {
        let err = MigrationError::UnsupportedDirection { direction: Direction::Down, version: 3 };
        assert_eq!(err.to_string(), "cannot migrate down on version 3");
    }
}
