//! Configuration, paths, and logging setup for the gallery session sync.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    Config, DEFAULT_COOKIE_MAX_AGE_SECS, DEFAULT_FRESHNESS_WINDOW_SECS,
    DEFAULT_INTROSPECTION_TIMEOUT_SECS, DEFAULT_INTROSPECTION_URL, DEFAULT_LOG_LEVEL,
    DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_TOKEN_URL, DEFAULT_WEB_APP_URL,
};
pub use error::{CoreError, CoreResult};
pub use logging::{init_logging, init_logging_for_service, parse_level};
pub use paths::Paths;
