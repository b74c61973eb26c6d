//! File-backed backends so a session survives restarts.
//!
//! Both files are rewritten whole through a temp file and a rename, so a
//! crash mid-write leaves either the old or the new contents.

use crate::memory::{is_expired, is_removal};
use crate::{CookieBackend, LocalStorage, StorageError, StorageResult};
use async_trait::async_trait;
use cookie::Cookie;
use std::collections::BTreeMap;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;
use tracing::warn;

async fn read_or_empty(path: &Path) -> StorageResult<String> {
    match tokio::fs::read_to_string(path).await {
        Ok(content) => Ok(content),
        Err(err) if err.kind() == ErrorKind::NotFound => Ok(String::new()),
        Err(err) => Err(err.into()),
    }
}

async fn atomic_write(path: &Path, content: &str) -> StorageResult<()> {
    let dir = path
        .parent()
        .ok_or_else(|| StorageError::Backend(format!("no parent directory: {}", path.display())))?;
    let file_name = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| StorageError::Backend(format!("invalid file name: {}", path.display())))?;
    tokio::fs::create_dir_all(dir).await?;

    let tmp_path = dir.join(format!(".{}.tmp.{}", file_name, std::process::id()));
    let result = async {
        tokio::fs::write(&tmp_path, content).await?;
        tokio::fs::rename(&tmp_path, path).await
    }
    .await;

    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&tmp_path).await;
        return Err(err.into());
    }
    Ok(())
}

/// Key/value storage persisted as a JSON object.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<BTreeMap<String, String>> {
        let content = read_or_empty(&self.path).await?;
        if content.trim().is_empty() {
            return Ok(BTreeMap::new());
        }
        serde_json::from_str(&content).map_err(|err| {
            StorageError::Encoding(format!("{}: {}", self.path.display(), err))
        })
    }

    async fn store(&self, data: &BTreeMap<String, String>) -> StorageResult<()> {
        let content = serde_json::to_string_pretty(data)?;
        atomic_write(&self.path, &content).await
    }
}

#[async_trait]
impl LocalStorage for FileStorage {
    async fn set(&self, key: &str, value: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        data.insert(key.to_string(), value.to_string());
        self.store(&data).await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key))
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        let mut data = self.load().await?;
        if data.remove(key).is_none() {
            return Ok(false);
        }
        self.store(&data).await?;
        Ok(true)
    }
}

/// Cookie jar persisted one `Set-Cookie` line per cookie.
#[derive(Debug)]
pub struct FileCookieJar {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileCookieJar {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load(&self) -> StorageResult<Vec<Cookie<'static>>> {
        let content = read_or_empty(&self.path).await?;
        let mut cookies = Vec::new();
        for line in content.lines().filter(|line| !line.trim().is_empty()) {
            match Cookie::parse_encoded(line.to_string()) {
                Ok(cookie) if !is_expired(&cookie) => cookies.push(cookie),
                Ok(_) => {}
                Err(err) => warn!(path = %self.path.display(), error = %err, "Skipping unreadable cookie line"),
            }
        }
        Ok(cookies)
    }

    async fn store(&self, cookies: &[Cookie<'static>]) -> StorageResult<()> {
        let content: String = cookies
            .iter()
            .map(|cookie| format!("{}\n", cookie.encoded()))
            .collect();
        atomic_write(&self.path, &content).await
    }
}

#[async_trait]
impl CookieBackend for FileCookieJar {
    async fn get(&self, name: &str) -> StorageResult<Option<String>> {
        let _guard = self.lock.lock().await;
        Ok(self
            .load()
            .await?
            .into_iter()
            .find(|cookie| cookie.name() == name)
            .map(|cookie| cookie.value().to_string()))
    }

    async fn set(&self, cookie: Cookie<'static>) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut cookies = self.load().await?;
        cookies.retain(|existing| existing.name() != cookie.name());
        if !is_removal(&cookie) {
            cookies.push(cookie);
        }
        self.store(&cookies).await
    }

    async fn remove(&self, name: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut cookies = self.load().await?;
        let before = cookies.len();
        cookies.retain(|existing| existing.name() != name);
        if cookies.len() != before {
            self.store(&cookies).await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_file_storage_persists_across_instances() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local-storage.json");

        let storage = FileStorage::new(&path);
        assert_eq!(storage.get("k").await.unwrap(), None);
        storage.set("k", "v").await.unwrap();
        storage.set("other", "x").await.unwrap();

        let reopened = FileStorage::new(&path);
        assert_eq!(reopened.get("k").await.unwrap(), Some("v".to_string()));
        assert!(reopened.delete("k").await.unwrap());
        assert!(!reopened.delete("k").await.unwrap());
        assert_eq!(storage.get("other").await.unwrap(), Some("x".to_string()));
    }

    #[tokio::test]
    async fn test_file_storage_corrupt_file_is_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("local-storage.json");
        std::fs::write(&path, "not json").unwrap();

        let storage = FileStorage::new(&path);
        assert!(matches!(storage.get("k").await, Err(StorageError::Encoding(_))));
    }

    #[tokio::test]
    async fn test_file_cookie_jar_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nested").join("cookies.txt");

        let jar = FileCookieJar::new(&path);
        let user = Cookie::build(("user", r#"{"id":"u1"}"#))
            .path("/")
            .max_age(time::Duration::hours(1))
            .build();
        jar.set(user).await.unwrap();
        jar.set(Cookie::new("auth_token", "A")).await.unwrap();
        jar.set(Cookie::new("auth_token", "B")).await.unwrap();

        let reopened = FileCookieJar::new(&path);
        assert_eq!(
            reopened.get("user").await.unwrap(),
            Some(r#"{"id":"u1"}"#.to_string())
        );
        assert_eq!(reopened.get("auth_token").await.unwrap(), Some("B".to_string()));

        let removal = Cookie::build(("auth_token", ""))
            .max_age(time::Duration::ZERO)
            .build();
        reopened.set(removal).await.unwrap();
        assert_eq!(jar.get("auth_token").await.unwrap(), None);

        jar.remove("user").await.unwrap();
        assert_eq!(jar.get("user").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_file_cookie_jar_skips_garbage_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("cookies.txt");
        std::fs::write(&path, "=\nauth_token=A\n").unwrap();

        let jar = FileCookieJar::new(&path);
        assert_eq!(jar.get("auth_token").await.unwrap(), Some("A".to_string()));
    }
}
