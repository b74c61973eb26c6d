//! In-memory backends for embedding and tests.

use crate::{CookieBackend, LocalStorage, StorageError, StorageResult};
use async_trait::async_trait;
use cookie::{Cookie, CookieJar};
use std::collections::HashMap;
use std::sync::Mutex;

fn poisoned<T>(_: T) -> StorageError {
    StorageError::Backend("storage lock poisoned".to_string())
}

/// Key/value storage held in a map.
#[derive(Debug, Default)]
pub struct MemoryStorage {
    data: Mutex<HashMap<String, String>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of every entry, for inspection.
    pub fn entries(&self) -> HashMap<String, String> {
        self.data.lock().map(|data| data.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl LocalStorage for MemoryStorage {
    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let mut data = self.data.lock().map_err(poisoned)?;
        data.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let data = self.data.lock().map_err(poisoned)?;
        Ok(data.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let mut data = self.data.lock().map_err(poisoned)?;
        Ok(data.remove(key).is_some())
    }
}

/// Cookie jar held in memory. Expired cookies read as absent.
#[derive(Debug, Default)]
pub struct MemoryCookieJar {
    jar: Mutex<CookieJar>,
}

impl MemoryCookieJar {
    pub fn new() -> Self {
        Self::default()
    }

    /// Full cookie (with attributes) for inspection.
    pub fn cookie(&self, name: &str) -> Option<Cookie<'static>> {
        let jar = self.jar.lock().ok()?;
        jar.get(name).cloned()
    }

    /// `name=value` pairs of every live cookie, sorted by name.
    pub fn values(&self) -> Vec<(String, String)> {
        let Ok(jar) = self.jar.lock() else {
            return Vec::new();
        };
        let mut values: Vec<_> = jar
            .iter()
            .filter(|cookie| !is_expired(cookie))
            .map(|cookie| (cookie.name().to_string(), cookie.value().to_string()))
            .collect();
        values.sort();
        values
    }
}

pub(crate) fn is_expired(cookie: &Cookie<'_>) -> bool {
    cookie
        .expires_datetime()
        .is_some_and(|expires| expires <= time::OffsetDateTime::now_utc())
}

pub(crate) fn is_removal(cookie: &Cookie<'_>) -> bool {
    cookie.max_age().is_some_and(|max_age| max_age <= time::Duration::ZERO)
}

#[async_trait]
impl CookieBackend for MemoryCookieJar {
    async fn get(&self, name: &str) -> StorageResult<Option<String>> {
        let jar = self.jar.lock().map_err(poisoned)?;
        Ok(jar
            .get(name)
            .filter(|cookie| !is_expired(cookie))
            .map(|cookie| cookie.value().to_string()))
    }

    async fn set(&self, cookie: Cookie<'static>) -> StorageResult<()> {
        let mut jar = self.jar.lock().map_err(poisoned)?;
        if is_removal(&cookie) {
            jar.remove(Cookie::from(cookie.name().to_string()));
        } else {
            jar.add(cookie);
        }
        Ok(())
    }

    async fn remove(&self, name: &str) -> StorageResult<()> {
        let mut jar = self.jar.lock().map_err(poisoned)?;
        jar.remove(Cookie::from(name.to_string()));
        Ok(())
    }
}
