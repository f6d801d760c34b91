use std::fmt;
use std::sync::Arc;

use tracing_subscriber::{fmt as tracing_fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Tag attached to every line the migrator emits.
pub const LOG_TAG: &str = "Migrations";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct LogRecord<'a> {
    pub level: LogLevel,
    pub message: &'a str,
    pub tag: &'a str,
}

/// Sink for migrator log lines.
pub trait Logger: Send + Sync {
    fn log(&self, record: &LogRecord<'_>);
}

impl<F> Logger for F
where
    F: Fn(&LogRecord<'_>) + Send + Sync,
{
    fn log(&self, record: &LogRecord<'_>) {
        self(record)
    }
}

/// Shares a closure as a [`Logger`].
pub fn logger_fn<F>(f: F) -> Arc<dyn Logger>
where
    F: Fn(&LogRecord<'_>) + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Default sink, forwards to the installed `tracing` subscriber.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, record: &LogRecord<'_>) {
        match record.level {
            LogLevel::Debug => tracing::debug!(tag = record.tag, "{}", record.message),
            LogLevel::Info => tracing::info!(tag = record.tag, "{}", record.message),
            LogLevel::Warn => tracing::warn!(tag = record.tag, "{}", record.message),
            LogLevel::Error => tracing::error!(tag = record.tag, "{}", record.message),
        }
    }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("mongo_migrator=info"))
}

fn is_development() -> bool {
    std::env::var("APP_ENV").unwrap_or_else(|_| "development".into()) == "development"
}

pub fn init_logging() -> Result<(), Box<dyn std::error::Error>> {
    let is_dev = is_development();
    let registry = tracing_subscriber::registry().with(env_filter());

    if is_dev {
        let fmt_layer = tracing_fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_line_number(true)
            .with_ansi(true)
            .with_writer(std::io::stderr)
            .pretty();
        registry.with(fmt_layer).try_init()?;
    } else {
        let json_layer = tracing_fmt::layer()
            .with_target(true)
            .with_level(true)
            .with_line_number(true)
            .with_ansi(false)
            .with_writer(std::io::stderr)
            .json();
        registry.with(json_layer).try_init()?;
    }
    tracing::debug!("Logging initialized in {} mode", if is_dev { "development" } else { "production" });
    Ok(())
}

pub fn set_panic_hook() {
    std::panic::set_hook(Box::new(|panic_info| {
        let backtrace = std::backtrace::Backtrace::capture();
        if let Some(location) = panic_info.location() {
            tracing::error!(
                message = %panic_info,
                file = %location.file(),
                line = %location.line(),
                column = %location.column(),
                backtrace = %format!("{:?}", backtrace),
                "Migrator panic"
            );
        } else {
            tracing::error!(
                message = %panic_info,
                backtrace = %format!("{:?}", backtrace),
                "Migrator panic (unknown location)"
            );
        }
        eprintln!("PANIC: {}", panic_info);
    }));
}

pub fn init_logging_with_fallback() {
    if let Err(e) = init_logging() {
        eprintln!("Failed to initialize structured logging: {}", e);
        eprintln!("Falling back to simple stderr logging");
        let stderr_layer = tracing_fmt::layer()
            .with_ansi(false)
            .with_writer(std::io::stderr);
        if let Err(e) = tracing_subscriber::registry()
            .with(stderr_layer)
            .try_init() {
            eprintln!("Failed to initialize fallback logging: {}", e);
        }
    }
}
