//! Snapshot persistence.
//!
//! Stores write the whole value every time. A failed write never rolls back
//! the in-memory change that triggered it; the failure travels alongside the
//! outcome in [`Written`] so the caller can report it.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::{DispatchError, Result};

/// Load/save contract for a single persisted value.
pub trait SnapshotStore<T>: Send + Sync {
    /// Returns `None` when nothing has been saved yet.
    fn load(&self) -> Result<Option<T>>;

    fn save(&self, value: &T) -> Result<()>;
}

/// Outcome of a mutation plus any persistence failure it hit.
#[derive(Debug)]
pub struct Written<T> {
    pub outcome: T,
    pub persist_error: Option<DispatchError>,
}

impl<T> Written<T> {
    pub fn clean(outcome: T) -> Self {
        Self {
            outcome,
            persist_error: None,
        }
    }

    pub fn is_persisted(&self) -> bool {
        self.persist_error.is_none()
    }

    /// Logs a persistence failure, if any, and yields the outcome.
    pub fn into_outcome(self) -> T {
        if let Some(e) = &self.persist_error {
            tracing::error!(error = %e, "State changed in memory but was not persisted");
        }
        self.outcome
    }
}

/// Pretty-printed JSON file, replaced atomically through a sibling temp file.
#[derive(Debug, Clone)]
pub struct JsonFile {
    path: PathBuf,
}

impl JsonFile {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_failed(&self, reason: impl ToString) -> DispatchError {
        DispatchError::PersistenceWriteFailed {
            what: self.path.display().to_string(),
            reason: reason.to_string(),
        }
    }
}

impl<T> SnapshotStore<T> for JsonFile
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>> {
        match std::fs::read(&self.path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DispatchError::Transport(format!(
                "reading {}: {}",
                self.path.display(),
                e
            ))),
        }
    }

    fn save(&self, value: &T) -> Result<()> {
        let body = serde_json::to_vec_pretty(value)?;
        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                std::fs::create_dir_all(dir).map_err(|e| self.write_failed(e))?;
            }
        }
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, body).map_err(|e| self.write_failed(e))?;
        std::fs::rename(&tmp, &self.path).map_err(|e| self.write_failed(e))?;
        Ok(())
    }
}

/// Keeps the last saved value as serialized JSON. Handy for tests and
/// for running without a data directory.
#[derive(Debug, Default)]
pub struct MemoryStore {
    saved: Mutex<Option<serde_json::Value>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl<T> SnapshotStore<T> for MemoryStore
where
    T: Serialize + DeserializeOwned,
{
    fn load(&self) -> Result<Option<T>> {
        let saved = self.saved.lock().unwrap_or_else(|p| p.into_inner());
        match saved.as_ref() {
            Some(v) => Ok(Some(serde_json::from_value(v.clone())?)),
            None => Ok(None),
        }
    }

    fn save(&self, value: &T) -> Result<()> {
        let v = serde_json::to_value(value)?;
        *self.saved.lock().unwrap_or_else(|p| p.into_inner()) = Some(v);
        Ok(())
    }
}

/// Per-guild audit channel mapping, persisted as `{"<guild_id>": <channel_id>}`.
pub struct GuildConfigStore {
    channels: HashMap<String, u64>,
    store: Box<dyn SnapshotStore<HashMap<String, u64>>>,
}

impl GuildConfigStore {
    pub fn open(store: Box<dyn SnapshotStore<HashMap<String, u64>>>) -> Result<Self> {
        let channels = store.load()?.unwrap_or_default();
        Ok(Self { channels, store })
    }

    pub fn log_channel(&self, guild_id: u64) -> Option<u64> {
        self.channels.get(&guild_id.to_string()).copied()
    }

    /// Returns the previously configured channel, if any.
    pub fn set_log_channel(&mut self, guild_id: u64, channel_id: u64) -> Written<Option<u64>> {
        let previous = self.channels.insert(guild_id.to_string(), channel_id);
        Written {
            outcome: previous,
            persist_error: self.store.save(&self.channels).err(),
        }
    }
}
