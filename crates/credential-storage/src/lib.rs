//! Credential storage for the gallery extension and its web application.
//!
//! A user's session lives in two independent places:
//! - **Local**: the extension's key/value storage ([`LocalStorage`])
//! - **Remote**: cookies scoped to the web application's domain ([`CookieBackend`])
//!
//! [`CredentialStore`] reads and writes a [`Session`] against either backend.
//! Its operations are total: backend faults and malformed data surface as an
//! absent session or [`WriteOutcome::Failed`], never as an error.

mod cookies;
mod file;
mod keys;
mod local;
mod memory;
mod session;
mod store;
mod traits;

pub use cookies::{decode_session, CookiePolicy, RemoteCookies};
pub use file::{FileCookieJar, FileStorage};
pub use keys::{CookieNames, StorageKeys};
pub use memory::{MemoryCookieJar, MemoryStorage};
pub use session::{CredentialSnapshot, Provider, Session};
pub use store::{AuthStateChanged, Backend, CredentialStore, WriteOutcome};
pub use traits::{CookieBackend, LocalStorage};

use thiserror::Error;

/// Error type for backend operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Backend-specific failure (quota, permissions, unavailable context)
    #[error("Backend error: {0}")]
    Backend(String),

    /// Encoding/decoding error
    #[error("Encoding error: {0}")]
    Encoding(String),

    /// Cookie could not be parsed
    #[error("Cookie parse error: {0}")]
    Cookie(#[from] cookie::ParseError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for backend operations.
pub type StorageResult<T> = Result<T, StorageError>;
