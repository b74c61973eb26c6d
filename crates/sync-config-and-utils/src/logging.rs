//! Logging initialization.
//!
//! Thin wrapper over the observability crate so every host process logs the
//! same way: structured JSONL in `~/.gallery-sync/logs/dev.jsonl`, level from
//! `RUST_LOG` or the configured default.

use observability::LogConfig;
use std::path::PathBuf;

/// Initialize logging for the session sync service.
///
/// ```ignore
/// init_logging("info");
/// tracing::info!("sync loop started");
/// ```
pub fn init_logging(level: &str) {
    init_logging_for_service("session-sync", level, None);
}

/// Initialize logging with a custom service name and optional log file.
pub fn init_logging_for_service(service_name: &str, level: &str, log_path: Option<PathBuf>) {
    let also_stderr = std::env::var("GALLERY_SYNC_LOG_STDERR")
        .map(|value| matches!(value.trim(), "1" | "true" | "yes"))
        .unwrap_or(false);

    observability::init_with_config(LogConfig {
        service_name: service_name.into(),
        default_level: parse_level(level).to_string().to_lowercase(),
        log_path,
        also_stderr,
    });
}

/// Parse a log level string into a tracing Level.
pub fn parse_level(level: &str) -> tracing::Level {
    match level.trim().to_lowercase().as_str() {
        "trace" => tracing::Level::TRACE,
        "debug" => tracing::Level::DEBUG,
        "info" => tracing::Level::INFO,
        "warn" | "warning" => tracing::Level::WARN,
        "error" => tracing::Level::ERROR,
        _ => tracing::Level::INFO,
    }
}
