use std::{
    collections::HashMap,
    fmt,
    path::Path,
    sync::{Arc, Mutex},
};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::{broadcast, Mutex as AsyncMutex};
use uuid::Uuid;

use crate::{config::AssistantConfig, db::Database, utils::lock};

use super::{
    backend::{JsonFileBackend, MemoryBackend, SettingsBackend},
    keys::SettingKey,
    SettingsSurface,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

const STORAGE_EVENT_CAPACITY: usize = 256;
const MAILBOX_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurfaceId(Uuid);

impl SurfaceId {
    fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl fmt::Display for SurfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SurfaceKind {
    Popup,
    Tab(u32),
}

/// Fired to every subscriber when a persisted value actually changed.
#[derive(Debug, Clone, PartialEq)]
pub struct StorageChange {
    pub key: SettingKey,
    pub old_value: Option<Value>,
    pub new_value: Value,
}

/// Direct notification a writer sends to every other live surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsMessage {
    #[serde(rename = "type")]
    pub message_type: String,
    pub key: SettingKey,
    pub value: Value,
    pub origin: SurfaceId,
}

struct SurfaceEntry {
    kind: SurfaceKind,
    mailbox: broadcast::Sender<SettingsMessage>,
}

/// Shared storage plus the messaging fabric between settings surfaces
/// (popup and per-tab overlays) of one browser profile.
pub struct SettingsHub {
    backend: Arc<dyn SettingsBackend>,
    storage_events: broadcast::Sender<StorageChange>,
    surfaces: Mutex<HashMap<SurfaceId, SurfaceEntry>>,
    write_locks: [AsyncMutex<()>; 4],
}

impl SettingsHub {
    pub fn new(backend: Arc<dyn SettingsBackend>) -> Arc<Self> {
        let (storage_events, _) = broadcast::channel(STORAGE_EVENT_CAPACITY);
        Arc::new(Self {
            backend,
            storage_events,
            surfaces: Mutex::new(HashMap::new()),
            write_locks: Default::default(),
        })
    }

    pub fn in_memory() -> Arc<Self> {
        Self::new(Arc::new(MemoryBackend::new()))
    }

    /// Opens durable storage: `.json` paths use a JSON file, anything else SQLite.
    pub fn open(path: &Path) -> Result<Arc<Self>> {
        let is_json = path
            .extension()
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let backend: Arc<dyn SettingsBackend> = if is_json {
            Arc::new(JsonFileBackend::new(path.to_path_buf())?)
        } else {
            Arc::new(
                Database::new(path.to_path_buf())
                    .with_context(|| format!("failed to open settings at {}", path.display()))?,
            )
        };

        log_info!("settings hub opened at {}", path.display());
        Ok(Self::new(backend))
    }

    /// Durable storage at the configured path, or memory when none is set.
    pub fn from_config(config: &AssistantConfig) -> Result<Arc<Self>> {
        match &config.settings_path {
            Some(path) => Self::open(path),
            None => {
                log_info!("no settings path configured; settings will not persist");
                Ok(Self::in_memory())
            }
        }
    }

    pub fn connect(self: &Arc<Self>, kind: SurfaceKind) -> SettingsSurface {
        let id = SurfaceId::new();
        let (mailbox, _) = broadcast::channel(MAILBOX_CAPACITY);
        lock(&self.surfaces).insert(
            id,
            SurfaceEntry {
                kind: kind.clone(),
                mailbox,
            },
        );
        log_debug!("settings surface {id} connected ({kind:?})");
        SettingsSurface::new(self.clone(), id, kind)
    }

    pub(crate) fn disconnect(&self, id: SurfaceId) {
        if lock(&self.surfaces).remove(&id).is_some() {
            log_debug!("settings surface {id} disconnected");
        }
    }

    pub fn live_surfaces(&self) -> Vec<(SurfaceId, SurfaceKind)> {
        lock(&self.surfaces)
            .iter()
            .map(|(id, entry)| (*id, entry.kind.clone()))
            .collect()
    }

    pub(crate) async fn read(&self, key: SettingKey) -> Result<Option<Value>> {
        self.backend.read(key.storage_key()).await
    }

    /// Persists one key, then fans out: a storage change to everyone (only
    /// if the value moved) and a direct message to every other surface.
    /// Writes to the same key are serialized so both paths see write order.
    pub(crate) async fn write(&self, origin: SurfaceId, key: SettingKey, value: Value) -> Result<()> {
        let _guard = self.write_locks[key.index()].lock().await;

        let previous = self.backend.write(key.storage_key(), value.clone()).await?;

        if previous.as_ref() != Some(&value) {
            // No receivers is fine; nobody is listening yet.
            let _ = self.storage_events.send(StorageChange {
                key,
                old_value: previous,
                new_value: value.clone(),
            });
        }

        let message = SettingsMessage {
            message_type: key.message_type().to_string(),
            key,
            value,
            origin,
        };
        let surfaces = lock(&self.surfaces);
        for (id, entry) in surfaces.iter().filter(|(id, _)| **id != origin) {
            if entry.mailbox.send(message.clone()).is_err() {
                log_debug!("surface {id} has no {} listeners", key.message_type());
            }
        }

        Ok(())
    }

    pub(crate) fn storage_events(&self) -> broadcast::Receiver<StorageChange> {
        self.storage_events.subscribe()
    }

    pub(crate) fn mailbox(&self, id: SurfaceId) -> Option<broadcast::Receiver<SettingsMessage>> {
        lock(&self.surfaces)
            .get(&id)
            .map(|entry| entry.mailbox.subscribe())
    }
}
