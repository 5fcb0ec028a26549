//! Persistent key-value store shared between the poller and out-of-process
//! consumers such as the chat bridge.
//!
//! Values are plain strings. JSON structures go through [`TypedStore`].
//! Writes are whole-value last-write-wins; there are no partial updates.

use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::sync::broadcast;
use tracing::{debug, warn};

pub mod keys {
    pub const ACCESS_TOKEN: &str = "spotify_access_token";
    pub const REFRESH_TOKEN: &str = "spotify_refresh_token";
    pub const TOKEN_EXPIRES_AT: &str = "spotify_token_expires_at";
    pub const NOW_PLAYING: &str = "spotify_now_playing";
    pub const QUEUE: &str = "spotify_queue";
}

const EVENT_CAPACITY: usize = 64;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("invalid store key {0:?}")]
    InvalidKey(String),
    #[error("store i/o failed for {key}: {source}")]
    Io {
        key: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to serialize value for {key}: {source}")]
    Serialize {
        key: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreEvent {
    pub key: String,
    /// `None` when the key was removed.
    pub value: Option<String>,
}

pub trait KeyValueStore: Send + Sync {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError>;
    fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;
    fn remove(&self, key: &str) -> Result<(), StoreError>;
    /// Observes writes made through this handle. Writes from other processes
    /// are only visible by reading again.
    fn subscribe(&self) -> broadcast::Receiver<StoreEvent>;
}

fn validate_key(key: &str) -> Result<(), StoreError> {
    let ok = !key.is_empty()
        && !key.starts_with('.')
        && key
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.'));
    if ok {
        Ok(())
    } else {
        Err(StoreError::InvalidKey(key.to_string()))
    }
}

/// One file per key inside a directory. A write lands in a temp file and is
/// renamed over the target, so readers see either the old or the new value.
pub struct FileStore {
    dir: PathBuf,
    events: broadcast::Sender<StoreEvent>,
}

impl FileStore {
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir).map_err(|source| StoreError::Io {
            key: dir.display().to_string(),
            source,
        })?;
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Ok(Self { dir, events })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        validate_key(key)?;
        Ok(self.dir.join(key))
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let path = self.path_for(key)?;
        match std::fs::read_to_string(&path) {
            Ok(v) => Ok(Some(v)),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io {
                key: key.to_string(),
                source,
            }),
        }
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        let tmp = self.dir.join(format!(".{key}.{}.tmp", std::process::id()));
        let io = |source| StoreError::Io {
            key: key.to_string(),
            source,
        };
        std::fs::write(&tmp, value).map_err(io)?;
        std::fs::rename(&tmp, &path).map_err(io)?;
        debug!(key, bytes = value.len(), "store write");
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        let path = self.path_for(key)?;
        match std::fs::remove_file(&path) {
            Ok(()) => {}
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
            Err(source) => {
                return Err(StoreError::Io {
                    key: key.to_string(),
                    source,
                })
            }
        }
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value: None,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

pub struct MemoryStore {
    entries: Mutex<HashMap<String, String>>,
    events: broadcast::Sender<StoreEvent>,
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            events,
        }
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        validate_key(key)?;
        let entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(entries.get(key).cloned())
    }

    fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), value.to_string());
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value: Some(value.to_string()),
        });
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<(), StoreError> {
        validate_key(key)?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(key);
        let _ = self.events.send(StoreEvent {
            key: key.to_string(),
            value: None,
        });
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.events.subscribe()
    }
}

/// Shared handle adding JSON helpers on top of a [`KeyValueStore`].
#[derive(Clone)]
pub struct TypedStore {
    inner: Arc<dyn KeyValueStore>,
}

impl TypedStore {
    pub fn new(inner: Arc<dyn KeyValueStore>) -> Self {
        Self { inner }
    }

    pub fn in_memory() -> Self {
        Self::new(Arc::new(MemoryStore::new()))
    }

    pub fn get_string(&self, key: &str) -> Result<Option<String>, StoreError> {
        Ok(self
            .inner
            .get(key)?
            .filter(|v| !v.trim().is_empty()))
    }

    pub fn set_string(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.inner.set(key, value)
    }

    /// A value that fails to parse is logged and reported as absent.
    pub fn get_json<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, StoreError> {
        let Some(raw) = self.inner.get(key)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(v) => Ok(Some(v)),
            Err(err) => {
                warn!(key, error = %err, "ignoring malformed json in store");
                Ok(None)
            }
        }
    }

    pub fn set_json<T: Serialize>(&self, key: &str, value: &T) -> Result<(), StoreError> {
        let raw = serde_json::to_string(value).map_err(|source| StoreError::Serialize {
            key: key.to_string(),
            source,
        })?;
        self.inner.set(key, &raw)
    }

    pub fn remove(&self, key: &str) -> Result<(), StoreError> {
        self.inner.remove(key)
    }

    pub fn subscribe(&self) -> broadcast::Receiver<StoreEvent> {
        self.inner.subscribe()
    }
}

#[cfg(test)]
mod tests {
    use super::{keys, FileStore, KeyValueStore, StoreError, StoreEvent, TypedStore};
    use crate::model::QueueEntry;
    use std::sync::Arc;

    fn entry(id: &str) -> QueueEntry {
        QueueEntry {
            id: id.to_string(),
            name: format!("Song {id}"),
            artists: vec!["Artist".to_string()],
            duration: "3:00".to_string(),
            url: format!("https://open.spotify.com/track/{id}"),
        }
    }

    #[test]
    fn file_store_round_trips_and_removes() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();

        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap(), None);
        store.set(keys::ACCESS_TOKEN, "abc").unwrap();
        assert_eq!(store.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("abc"));

        // a second handle sees the write, as another process would
        let other = FileStore::open(dir.path()).unwrap();
        assert_eq!(other.get(keys::ACCESS_TOKEN).unwrap().as_deref(), Some("abc"));

        store.remove(keys::ACCESS_TOKEN).unwrap();
        store.remove(keys::ACCESS_TOKEN).unwrap();
        assert_eq!(other.get(keys::ACCESS_TOKEN).unwrap(), None);
    }

    #[test]
    fn rejects_path_like_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::open(dir.path()).unwrap();
        assert!(matches!(
            store.set("../escape", "x"),
            Err(StoreError::InvalidKey(_))
        ));
        assert!(matches!(store.get(""), Err(StoreError::InvalidKey(_))));
    }

    #[test]
    fn typed_store_handles_json_and_corruption() {
        let store = TypedStore::in_memory();
        store
            .set_json(keys::QUEUE, &vec![entry("a"), entry("b")])
            .unwrap();
        let queue: Vec<QueueEntry> = store.get_json(keys::QUEUE).unwrap().unwrap();
        assert_eq!(queue.len(), 2);
        assert_eq!(queue[1].id, "b");

        store.set_string(keys::QUEUE, "{not json").unwrap();
        let broken: Option<Vec<QueueEntry>> = store.get_json(keys::QUEUE).unwrap();
        assert!(broken.is_none());
    }

    #[test]
    fn blank_strings_read_as_absent() {
        let store = TypedStore::in_memory();
        store.set_string(keys::ACCESS_TOKEN, "  ").unwrap();
        assert_eq!(store.get_string(keys::ACCESS_TOKEN).unwrap(), None);
    }

    #[tokio::test]
    async fn subscribers_see_writes_and_removals() {
        let dir = tempfile::tempdir().unwrap();
        let store = TypedStore::new(Arc::new(FileStore::open(dir.path()).unwrap()));
        let mut rx = store.subscribe();

        store.set_string(keys::REFRESH_TOKEN, "r1").unwrap();
        store.remove(keys::REFRESH_TOKEN).unwrap();

        assert_eq!(
            rx.recv().await.unwrap(),
            StoreEvent {
                key: keys::REFRESH_TOKEN.to_string(),
                value: Some("r1".to_string()),
            }
        );
        assert_eq!(rx.recv().await.unwrap().value, None);
    }
}
