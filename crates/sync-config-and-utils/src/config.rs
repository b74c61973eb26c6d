//! Configuration management.

use crate::{CoreError, CoreResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Default web application URL (can be overridden at compile time via GALLERY_WEB_APP_URL).
pub const DEFAULT_WEB_APP_URL: &str = match option_env!("GALLERY_WEB_APP_URL") {
    Some(url) => url,
    None => "https://gallery.example.com",
};

/// Google token-info endpoint used to introspect provider access tokens.
pub const DEFAULT_INTROSPECTION_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

/// Google token endpoint used for `grant_type=refresh_token`.
pub const DEFAULT_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Upper bound for a single issuer introspection call.
pub const DEFAULT_INTROSPECTION_TIMEOUT_SECS: u64 = 3;

/// Interval between periodic reconciliation passes.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 60;

/// How long a completed pass counts as fresh.
pub const DEFAULT_FRESHNESS_WINDOW_SECS: u64 = 5 * 60;

/// Cookie lifetime used when a session carries no expiry.
pub const DEFAULT_COOKIE_MAX_AGE_SECS: i64 = 7 * 24 * 60 * 60;

/// Sync runtime configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Web application origin whose cookies mirror the session.
    #[serde(default = "default_web_app_url")]
    pub web_app_url: String,
    /// Cookie `Domain` attribute. Derived from `web_app_url` when unset.
    #[serde(default)]
    pub cookie_domain: Option<String>,
    /// Whether session cookies carry the `Secure` attribute.
    #[serde(default = "default_true")]
    pub cookie_secure: bool,
    /// Cookie lifetime for sessions without an expiry.
    #[serde(default = "default_cookie_max_age_secs")]
    pub cookie_max_age_secs: i64,
    /// Issuer token introspection endpoint.
    #[serde(default = "default_introspection_url")]
    pub introspection_url: String,
    /// Timeout for one introspection call.
    #[serde(default = "default_introspection_timeout_secs")]
    pub introspection_timeout_secs: u64,
    /// Issuer token endpoint for refresh grants.
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// OAuth client id sent with refresh grants.
    #[serde(default)]
    pub client_id: Option<String>,
    /// Interval between periodic passes.
    #[serde(default = "default_reconcile_interval_secs")]
    pub reconcile_interval_secs: u64,
    /// Freshness window after a completed pass.
    #[serde(default = "default_freshness_window_secs")]
    pub freshness_window_secs: u64,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_web_app_url() -> String {
    DEFAULT_WEB_APP_URL.to_string()
}

fn default_true() -> bool {
    true
}

fn default_cookie_max_age_secs() -> i64 {
    DEFAULT_COOKIE_MAX_AGE_SECS
}

fn default_introspection_url() -> String {
    DEFAULT_INTROSPECTION_URL.to_string()
}

fn default_introspection_timeout_secs() -> u64 {
    DEFAULT_INTROSPECTION_TIMEOUT_SECS
}

fn default_token_url() -> String {
    DEFAULT_TOKEN_URL.to_string()
}

fn default_reconcile_interval_secs() -> u64 {
    DEFAULT_RECONCILE_INTERVAL_SECS
}

fn default_freshness_window_secs() -> u64 {
    DEFAULT_FRESHNESS_WINDOW_SECS
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            web_app_url: default_web_app_url(),
            cookie_domain: None,
            cookie_secure: true,
            cookie_max_age_secs: DEFAULT_COOKIE_MAX_AGE_SECS,
            introspection_url: default_introspection_url(),
            introspection_timeout_secs: DEFAULT_INTROSPECTION_TIMEOUT_SECS,
            token_url: default_token_url(),
            client_id: None,
            reconcile_interval_secs: DEFAULT_RECONCILE_INTERVAL_SECS,
            freshness_window_secs: DEFAULT_FRESHNESS_WINDOW_SECS,
        }
    }
}

impl Config {
    /// Load configuration from the config file, falling back to defaults,
    /// then apply environment overrides and validate.
    pub fn load(paths: &Paths) -> CoreResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();
        config.validate()?;

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to the config file.
    pub fn save(&self, paths: &Paths) -> CoreResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `GALLERY_SYNC_*` overrides from `lookup`.
    ///
    /// Unparseable numeric values are ignored with a warning.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());

        if let Some(level) = get("GALLERY_SYNC_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = get("GALLERY_SYNC_WEB_APP_URL") {
            self.web_app_url = url.trim_end_matches('/').to_string();
        }
        if let Some(domain) = get("GALLERY_SYNC_COOKIE_DOMAIN") {
            self.cookie_domain = Some(domain);
        }
        if let Some(url) = get("GALLERY_SYNC_INTROSPECTION_URL") {
            self.introspection_url = url;
        }
        if let Some(client_id) = get("GALLERY_SYNC_CLIENT_ID") {
            self.client_id = Some(client_id);
        }

        let numeric = [
            ("GALLERY_SYNC_RECONCILE_INTERVAL_SECS", &mut self.reconcile_interval_secs),
            ("GALLERY_SYNC_FRESHNESS_WINDOW_SECS", &mut self.freshness_window_secs),
            ("GALLERY_SYNC_INTROSPECTION_TIMEOUT_SECS", &mut self.introspection_timeout_secs),
        ];
        for (name, slot) in numeric {
            if let Some(raw) = get(name) {
                match raw.trim().parse::<u64>() {
                    Ok(value) => *slot = value,
                    Err(_) => tracing::warn!(variable = name, value = %raw, "Ignoring invalid override"),
                }
            }
        }
    }

    /// Reject values the runtime cannot work with.
    pub fn validate(&self) -> CoreResult<()> {
        self.web_app_url()?;
        Url::parse(&self.introspection_url)?;
        Url::parse(&self.token_url)?;

        if self.reconcile_interval_secs == 0 {
            return Err(CoreError::Config(
                "reconcile_interval_secs must be greater than zero".to_string(),
            ));
        }
        if self.introspection_timeout_secs == 0 {
            return Err(CoreError::Config(
                "introspection_timeout_secs must be greater than zero".to_string(),
            ));
        }
        if self.cookie_max_age_secs <= 0 {
            return Err(CoreError::Config(
                "cookie_max_age_secs must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Get the web application URL as a parsed URL.
    pub fn web_app_url(&self) -> CoreResult<Url> {
        Url::parse(&self.web_app_url).map_err(CoreError::from)
    }

    /// Cookie domain: the explicit setting, else the web application host.
    pub fn cookie_domain(&self) -> CoreResult<String> {
        if let Some(domain) = &self.cookie_domain {
            return Ok(domain.clone());
        }
        self.web_app_url()?
            .host_str()
            .map(str::to_string)
            .ok_or_else(|| CoreError::Config(format!("{} has no host", self.web_app_url)))
    }

    pub fn introspection_timeout(&self) -> Duration {
        Duration::from_secs(self.introspection_timeout_secs)
    }

    pub fn reconcile_interval(&self) -> Duration {
        Duration::from_secs(self.reconcile_interval_secs)
    }

    pub fn freshness_window(&self) -> Duration {
        Duration::from_secs(self.freshness_window_secs)
    }
}
