//! Backend trait definitions.

use crate::StorageResult;
use async_trait::async_trait;
use cookie::Cookie;

/// Extension-local key/value storage.
#[async_trait]
pub trait LocalStorage: Send + Sync {
    /// Store a value
    async fn set(&self, key: &str, value: &str) -> StorageResult<()>;

    /// Retrieve a value
    async fn get(&self, key: &str) -> StorageResult<Option<String>>;

    /// Delete a value, returning whether it existed
    async fn delete(&self, key: &str) -> StorageResult<bool>;
}

/// Cookies scoped to the web application's domain.
#[async_trait]
pub trait CookieBackend: Send + Sync {
    /// Current value of a live (unexpired) cookie
    async fn get(&self, name: &str) -> StorageResult<Option<String>>;

    /// Set a cookie. A cookie with `Max-Age=0` removes it.
    async fn set(&self, cookie: Cookie<'static>) -> StorageResult<()>;

    /// Remove a cookie by name
    async fn remove(&self, name: &str) -> StorageResult<()>;
}
