//! JSON table store.
//!
//! Each table is one JSON document under the data directory, loaded whole
//! at startup and rewritten whole on every save. Writes run on the blocking
//! pool and go through a temp file + rename.

mod audit;
mod offset;

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{error, warn};

pub use audit::{AuditEntry, AuditLog};
pub use offset::UpdateOffset;

pub const TRACKED_DELIVERIES: &str = "tracked_deliveries";
pub const NOTIFY_PREFS: &str = "notify_prefs";
pub const UPDATE_OFFSET: &str = "update_offset";
pub const LAST_BACKUP: &str = "last_backup";
pub const AUDIT_LOG: &str = "audit_log";
pub const SETTINGS_MIRROR: &str = "settings_mirror";

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("table {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },

    #[error("table {name} is not valid JSON: {source}")]
    Json {
        name: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("store task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// Directory of JSON tables, with an optional fallback directory.
#[derive(Debug, Clone)]
pub struct JsonStore {
    dir: PathBuf,
    fallback: Option<PathBuf>,
}

impl JsonStore {
    pub fn new(dir: impl Into<PathBuf>, fallback: Option<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            fallback,
        }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path(&self, name: &str) -> PathBuf {
        table_path(&self.dir, name)
    }

    /// Load a table. A missing file yields `T::default()`.
    ///
    /// Falls back to the fallback directory when the primary file is absent.
    pub async fn load<T>(&self, name: &str) -> Result<T, StoreError>
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        let mut candidates = vec![self.path(name)];
        if let Some(fallback) = &self.fallback {
            candidates.push(table_path(fallback, name));
        }
        let name = name.to_string();

        tokio::task::spawn_blocking(move || {
            let mut last_error = None;
            for path in candidates {
                match std::fs::read(&path) {
                    Ok(bytes) => {
                        return serde_json::from_slice(&bytes)
                            .map_err(|source| StoreError::Json { name, source });
                    }
                    Err(e) if e.kind() == io::ErrorKind::NotFound => continue,
                    Err(e) => last_error = Some(e),
                }
            }
            match last_error {
                Some(source) => Err(StoreError::Io { name, source }),
                None => Ok(T::default()),
            }
        })
        .await?
    }

    /// Load a table, starting empty if it cannot be read.
    ///
    /// An unparseable file is moved aside to `<name>.json.corrupt` so the
    /// next save does not destroy it.
    pub async fn load_or_default<T>(&self, name: &str) -> T
    where
        T: DeserializeOwned + Default + Send + 'static,
    {
        match self.load(name).await {
            Ok(value) => value,
            Err(e) => {
                error!("Failed to load {}: {}", name, e);
                if matches!(e, StoreError::Json { .. }) {
                    let path = self.path(name);
                    let aside = path.with_extension("json.corrupt");
                    if let Err(e) = tokio::fs::rename(&path, &aside).await {
                        warn!("Could not move corrupt table {} aside: {}", name, e);
                    }
                }
                T::default()
            }
        }
    }

    /// Rewrite a table.
    pub async fn save<T: Serialize>(&self, name: &str, value: &T) -> Result<(), StoreError> {
        let bytes = serialize(name, value)?;
        write_table(self.dir.clone(), name.to_string(), bytes).await
    }

    /// Rewrite a table, trying the fallback directory if the primary write
    /// fails. Returns the directory that was written.
    pub async fn save_with_fallback<T: Serialize>(
        &self,
        name: &str,
        value: &T,
    ) -> Result<PathBuf, StoreError> {
        let bytes = serialize(name, value)?;
        match write_table(self.dir.clone(), name.to_string(), bytes.clone()).await {
            Ok(()) => Ok(self.dir.clone()),
            Err(e) => {
                let Some(fallback) = &self.fallback else {
                    return Err(e);
                };
                warn!("Primary write of {} failed ({}), using {}", name, e, fallback.display());
                write_table(fallback.clone(), name.to_string(), bytes).await?;
                Ok(fallback.clone())
            }
        }
    }
}

fn table_path(dir: &Path, name: &str) -> PathBuf {
    dir.join(format!("{}.json", name))
}

fn serialize<T: Serialize>(name: &str, value: &T) -> Result<Vec<u8>, StoreError> {
    serde_json::to_vec_pretty(value).map_err(|source| StoreError::Json {
        name: name.to_string(),
        source,
    })
}

async fn write_table(dir: PathBuf, name: String, bytes: Vec<u8>) -> Result<(), StoreError> {
    tokio::task::spawn_blocking(move || {
        let io_err = |source| StoreError::Io {
            name: name.clone(),
            source,
        };
        std::fs::create_dir_all(&dir).map_err(io_err)?;
        let path = table_path(&dir, &name);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes).map_err(io_err)?;
        std::fs::rename(&tmp, &path).map_err(io_err)
    })
    .await?
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    #[tokio::test]
    async fn test_missing_table_is_default() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);

        let table: HashMap<String, u32> = store.load("nothing").await.unwrap();
        assert!(table.is_empty());
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path().join("nested"), None);

        let mut table = HashMap::new();
        table.insert("a".to_string(), 1u32);
        store.save("t", &table).await.unwrap();

        let back: HashMap<String, u32> = store.load("t").await.unwrap();
        assert_eq!(back, table);
        assert!(!store.path("t").with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn test_corrupt_table_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);
        std::fs::write(store.path("t"), b"{not json").unwrap();

        let table: HashMap<String, u32> = store.load_or_default("t").await;
        assert!(table.is_empty());
        assert!(dir.path().join("t.json.corrupt").exists());
    }

    #[tokio::test]
    async fn test_fallback_write_and_read() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the primary directory should be makes the write fail.
        let blocked = dir.path().join("blocked");
        std::fs::write(&blocked, b"").unwrap();
        let fallback = dir.path().join("fallback");
        let store = JsonStore::new(&blocked, Some(fallback.clone()));

        let written = store.save_with_fallback("cfg", &vec![1, 2, 3]).await.unwrap();
        assert_eq!(written, fallback);

        let back: Vec<i32> = store.load("cfg").await.unwrap();
        assert_eq!(back, vec![1, 2, 3]);
    }
}
