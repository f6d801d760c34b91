use std::future::Future;
use std::time::{Duration, Instant};

use tracing::{debug, warn, Instrument};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Threshold {
    Warn,
    Error,
}

pub struct Timer {
    start: Instant,
    operation: String,
    threshold_warn: Duration,
    threshold_error: Duration,
}

impl Timer {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            operation: operation.into(),
            threshold_warn: Duration::from_millis(100),
            threshold_error: Duration::from_millis(500),
        }
    }

    pub fn with_thresholds(mut self, warn_ms: u64, error_ms: u64) -> Self {
        self.threshold_warn = Duration::from_millis(warn_ms);
        self.threshold_error = Duration::from_millis(error_ms);
        self
    }

    pub fn elapsed(&self) -> Duration {
        self.start.elapsed()
    }

    /// The threshold `elapsed` is over, if any. The error threshold wins
    /// when both are exceeded.
    pub fn exceeded(&self, elapsed: Duration) -> Option<Threshold> {
        if elapsed > self.threshold_error {
            Some(Threshold::Error)
        } else if elapsed > self.threshold_warn {
            Some(Threshold::Warn)
        } else {
            None
        }
    }

    pub fn log_elapsed(&self, additional_context: Option<&str>) {
        let elapsed = self.elapsed();
        let elapsed_ms = elapsed.as_millis();
        let context = match additional_context {
            Some(ctx) => format!("{} ({})", self.operation, ctx),
            None => self.operation.clone(),
        };
        match self.exceeded(elapsed) {
            Some(Threshold::Error) => {
                warn!(operation = %context, duration_ms = %elapsed_ms, "Operation exceeded error threshold")
            }
            Some(Threshold::Warn) => {
                warn!(operation = %context, duration_ms = %elapsed_ms, "Operation exceeded warning threshold")
            }
            None => debug!(operation = %context, duration_ms = %elapsed_ms, "Operation completed"),
        }
    }
}

pub fn create_store_span(operation: &str, collection: &str) -> tracing::Span {
    tracing::span!(
        tracing::Level::DEBUG,
        "database",
        operation = operation,
        collection = collection,
        db_type = "mongodb"
    )
}

/// Run a control store round trip inside a `database` span and log its
/// duration.
pub async fn time_store_operation<F, T, E>(operation: &str, collection: &str, f: F) -> Result<T, E>
where
    F: Future<Output = Result<T, E>>,
{
    let timer = Timer::new(format!("db::{}", operation)).with_thresholds(50, 200);
    let result = f.instrument(create_store_span(operation, collection)).await;
    timer.log_elapsed(Some(collection));
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_time_store_operation_passes_result_through() {
        let ok: Result<u8, ()> = time_store_operation("find_one", "migrations", async { Ok(7) }).await;
        assert_eq!(ok, Ok(7));
        let err: Result<u8, &str> = time_store_operation("delete_many", "migrations", async { Err("gone") }).await;
        assert_eq!(err, Err("gone"));
    }

    #[test]
    fn test_timer_thresholds() {
        let timer = Timer::new("migration::up").with_thresholds(5_000, 60_000);
        assert_eq!(timer.exceeded(Duration::from_millis(5_000)), None);
        assert_eq!(timer.exceeded(Duration::from_millis(5_001)), Some(Threshold::Warn));
        assert_eq!(timer.exceeded(Duration::from_secs(61)), Some(Threshold::Error));

        let defaults = Timer::new("db::find_one");
        assert_eq!(defaults.exceeded(Duration::from_millis(50)), None);
        assert_eq!(defaults.exceeded(Duration::from_millis(150)), Some(Threshold::Warn));
        assert_eq!(defaults.exceeded(Duration::from_millis(501)), Some(Threshold::Error));
    }

    #[tokio::test]
    async fn test_slow_operation_exceeds_threshold() {
        let timer = Timer::new("migration::up").with_thresholds(1, 60_000);
        tokio::time::sleep(Duration::from_millis(5)).await;
        assert_eq!(timer.exceeded(timer.elapsed()), Some(Threshold::Warn));
        timer.log_elapsed(Some("version 1"));
    }
}
