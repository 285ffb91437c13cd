use std::{
    collections::{BTreeMap, HashMap},
    fs,
    path::PathBuf,
    sync::RwLock,
};

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::log_warn;

/// Durable key/value storage behind the shared settings. Keys are the
/// persisted storage keys; values are JSON.
#[async_trait]
pub trait SettingsBackend: Send + Sync {
    async fn read(&self, key: &str) -> Result<Option<Value>>;

    /// Stores `value` and returns the value it replaced.
    async fn write(&self, key: &str, value: Value) -> Result<Option<Value>>;
}

/// Volatile backend for tests and hosts with no profile directory.
#[derive(Debug, Default)]
pub struct MemoryBackend {
    data: RwLock<HashMap<String, Value>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SettingsBackend for MemoryBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        let guard = self.data.read().unwrap_or_else(|p| p.into_inner());
        Ok(guard.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<Option<Value>> {
        let mut guard = self.data.write().unwrap_or_else(|p| p.into_inner());
        Ok(guard.insert(key.to_string(), value))
    }
}

/// Settings kept in one pretty-printed JSON file, rewritten on every write.
pub struct JsonFileBackend {
    path: PathBuf,
    data: RwLock<BTreeMap<String, Value>>,
}

impl JsonFileBackend {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            match serde_json::from_str(&contents) {
                Ok(data) => data,
                Err(err) => {
                    log_warn!(
                        "Settings file {} is corrupt, starting empty: {err}",
                        path.display()
                    );
                    BTreeMap::new()
                }
            }
        } else {
            BTreeMap::new()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    fn persist(&self, data: &BTreeMap<String, Value>) -> Result<()> {
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

#[async_trait]
impl SettingsBackend for JsonFileBackend {
    async fn read(&self, key: &str) -> Result<Option<Value>> {
        let guard = self.data.read().unwrap_or_else(|p| p.into_inner());
        Ok(guard.get(key).cloned())
    }

    async fn write(&self, key: &str, value: Value) -> Result<Option<Value>> {
        let mut guard = self.data.write().unwrap_or_else(|p| p.into_inner());
        let mut next = guard.clone();
        let previous = next.insert(key.to_string(), value);
        // Memory only moves forward once the file accepted the write.
        self.persist(&next)?;
        *guard = next;
        Ok(previous)
    }
}
