//! File-backed JSON document store
//!
//! Every logical document (warnings, cases, override codes) lives in its own
//! `<name>.json` file under the data directory. Reads and read-modify-write
//! cycles on the same document are serialized by a per-document async mutex,
//! so two commands racing on the same document cannot lose each other's
//! updates.

use dashmap::DashMap;
use serde::{Serialize, de::DeserializeOwned};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::debug;

/// Errors raised while reading or writing a document
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error on {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Malformed document {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

pub type StoreResult<T> = Result<T, StoreError>;

/// JSON document store rooted at a data directory
#[derive(Clone, Debug)]
pub struct JsonStore {
    root: PathBuf,
    locks: Arc<DashMap<String, Arc<Mutex<()>>>>,
}

impl JsonStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            locks: Arc::new(DashMap::new()),
        }
    }

    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path of the file backing `document`
    #[must_use]
    pub fn path_for(&self, document: &str) -> PathBuf {
        self.root.join(format!("{document}.json"))
    }

    fn lock_for(&self, document: &str) -> Arc<Mutex<()>> {
        self.locks.entry(document.to_string()).or_default().clone()
    }

    /// Load a document. A missing or empty file yields the default value.
    ///
    /// # Errors
    /// Returns a `StoreError` if the file cannot be read or does not parse.
    pub async fn load<T>(&self, document: &str) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let lock = self.lock_for(document);
        let _guard = lock.lock().await;
        self.read(document).await
    }

    /// Replace a document wholesale.
    ///
    /// # Errors
    /// Returns a `StoreError` if the document cannot be serialized or written.
    pub async fn save<T>(&self, document: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize,
    {
        let lock = self.lock_for(document);
        let _guard = lock.lock().await;
        self.write(document, value).await
    }

    /// Atomic read-modify-write of a document.
    ///
    /// The closure runs while the document lock is held and its return value
    /// is handed back once the mutated document has been persisted.
    ///
    /// # Errors
    /// Returns a `StoreError` if loading or saving fails. The closure's
    /// mutation is discarded in that case.
    pub async fn update<T, R, F>(&self, document: &str, mutate: F) -> StoreResult<R>
    where
        T: Serialize + DeserializeOwned + Default,
        F: FnOnce(&mut T) -> R,
    {
        let lock = self.lock_for(document);
        let _guard = lock.lock().await;
        let mut value: T = self.read(document).await?;
        let result = mutate(&mut value);
        self.write(document, &value).await?;
        Ok(result)
    }

    async fn read<T>(&self, document: &str) -> StoreResult<T>
    where
        T: DeserializeOwned + Default,
    {
        let path = self.path_for(document);
        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(source) if source.kind() == std::io::ErrorKind::NotFound => {
                debug!(document, "Document missing, starting empty");
                return Ok(T::default());
            }
            Err(source) => return Err(StoreError::Io { path, source }),
        };

        if content.trim().is_empty() {
            return Ok(T::default());
        }

        serde_json::from_str(&content).map_err(|source| StoreError::Json { path, source })
    }

    async fn write<T>(&self, document: &str, value: &T) -> StoreResult<()>
    where
        T: Serialize,
    {
        let path = self.path_for(document);
        let json = serde_json::to_string_pretty(value).map_err(|source| StoreError::Json {
            path: path.clone(),
            source,
        })?;

        tokio::fs::create_dir_all(&self.root)
            .await
            .map_err(|source| StoreError::Io {
                path: self.root.clone(),
                source,
            })?;

        // Write next to the target and rename so readers never see a torn file.
        let tmp = self.root.join(format!("{document}.json.tmp"));
        tokio::fs::write(&tmp, json)
            .await
            .map_err(|source| StoreError::Io {
                path: tmp.clone(),
                source,
            })?;
        tokio::fs::rename(&tmp, &path)
            .await
            .map_err(|source| StoreError::Io { path, source })
    }
}
