//! Per-target tuning records shared by every weighted worker of that target.
//!
//! Records are plain JSON text keyed by `chance-<target>`. Writers never
//! coordinate; the last complete write wins. [`FileTuningStore`] writes to a
//! temporary sibling and renames it into place so readers never observe a
//! half-written record.

use std::{
    collections::HashMap,
    fmt::Write as _,
    io::ErrorKind,
    path::{Path, PathBuf},
    sync::Arc,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use tracing::warn;
use uuid::Uuid;

use crate::tuning::WeightTuning;

/// Key/value store holding one tuning record per target.
#[async_trait]
pub trait TuningStore: Send + Sync {
    /// Returns the record stored under `key`, or `None` when absent.
    async fn read_record(&self, key: &str) -> Result<Option<String>>;
    /// Replaces the record stored under `key`.
    async fn write_record(&self, key: &str, text: &str) -> Result<()>;
}

/// Store key for the tuning record of `target`.
#[must_use]
pub fn record_key(target: &str) -> String {
    format!("chance-{target}")
}

/// Loads the persisted weights for `target`.
///
/// Missing, unreadable, or malformed records fall back to defaults; a record
/// with some malformed fields keeps the valid ones.
pub async fn load_weights(store: &dyn TuningStore, target: &str) -> WeightTuning {
    let key = record_key(target);
    match store.read_record(&key).await {
        Ok(Some(text)) => WeightTuning::from_record(&text).unwrap_or_else(|| {
            warn!(key = %key, "tuning record is not a JSON object, using defaults");
            WeightTuning::default()
        }),
        Ok(None) => WeightTuning::default(),
        Err(err) => {
            warn!(key = %key, error = %err, "tuning record unreadable, using defaults");
            WeightTuning::default()
        }
    }
}

/// Persists the complete weight triple for `target`.
pub async fn save_weights(
    store: &dyn TuningStore,
    target: &str,
    tuning: &WeightTuning,
) -> Result<()> {
    let text = tuning.to_record()?;
    store.write_record(&record_key(target), &text).await
}

/// Directory of `<key>.json` files.
#[derive(Debug, Clone)]
pub struct FileTuningStore {
    root: PathBuf,
}

impl FileTuningStore {
    /// Opens (and creates when needed) the store directory.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        std::fs::create_dir_all(&root)
            .with_context(|| format!("creating tuning store at {}", root.display()))?;
        Ok(Self { root })
    }

    /// Directory holding the records.
    #[must_use]
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// File backing the record stored under `key`.
    ///
    /// Bytes outside `[A-Za-z0-9._-]` are written as `%XX`, so distinct keys
    /// never share a file and no key can name a path outside the root.
    #[must_use]
    pub fn record_path(&self, key: &str) -> PathBuf {
        let mut file = String::with_capacity(key.len());
        for byte in key.bytes() {
            if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.') {
                file.push(char::from(byte));
            } else {
                let _ = write!(file, "%{byte:02X}");
            }
        }
        self.root.join(format!("{file}.json"))
    }
}

#[async_trait]
impl TuningStore for FileTuningStore {
    async fn read_record(&self, key: &str) -> Result<Option<String>> {
        let path = self.record_path(key);
        match tokio::fs::read_to_string(&path).await {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err).with_context(|| format!("reading {}", path.display())),
        }
    }

    async fn write_record(&self, key: &str, text: &str) -> Result<()> {
        let path = self.record_path(key);
        let staging = path.with_extension(format!("{}.tmp", Uuid::new_v4().simple()));
        tokio::fs::write(&staging, text)
            .await
            .with_context(|| format!("writing {}", staging.display()))?;
        if let Err(err) = tokio::fs::rename(&staging, &path).await {
            let _ = tokio::fs::remove_file(&staging).await;
            return Err(err).with_context(|| format!("replacing {}", path.display()));
        }
        Ok(())
    }
}

/// Process-local store for tests and single-process runs.
#[derive(Debug, Clone, Default)]
pub struct MemoryTuningStore {
    records: Arc<RwLock<HashMap<String, String>>>,
}

impl MemoryTuningStore {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current record under `key`.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<String> {
        self.records.read().get(key).cloned()
    }

    /// Seeds a record.
    pub fn insert(&self, key: impl Into<String>, text: impl Into<String>) {
        self.records.write().insert(key.into(), text.into());
    }
}

#[async_trait]
impl TuningStore for MemoryTuningStore {
    async fn read_record(&self, key: &str) -> Result<Option<String>> {
        Ok(self.get(key))
    }

    async fn write_record(&self, key: &str, text: &str) -> Result<()> {
        self.insert(key, text);
        Ok(())
    }
}
