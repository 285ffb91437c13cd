use std::sync::Arc;

use serde_json::Value;

use super::{
    hub::{SettingsHub, SurfaceId},
    keys::{
        ExtensionEnabled, OverlayVisible, SettingField, SettingKey, SettingsSnapshot, XrayEnabled,
        XrayIssueCount,
    },
};

const ENABLE_LOGS: bool = true;

use crate::{log_error, log_warn};

/// Typed read/write access to the shared settings from one surface.
///
/// Reads never fail (defaults stand in for missing or unreadable values);
/// writes report success as a `bool`. Concurrent writers race at the field
/// level and the last write wins.
#[derive(Clone)]
pub struct SharedSettingsStore {
    hub: Arc<SettingsHub>,
    origin: SurfaceId,
}

impl SharedSettingsStore {
    pub(crate) fn new(hub: Arc<SettingsHub>, origin: SurfaceId) -> Self {
        Self { hub, origin }
    }

    pub async fn get<F: SettingField>(&self) -> F::Value {
        match self.hub.read(F::KEY).await {
            Ok(Some(raw)) => F::decode(&raw).unwrap_or_else(|| {
                log_warn!(
                    "{} holds unexpected value {raw}, using default",
                    F::KEY.storage_key()
                );
                F::default_value()
            }),
            Ok(None) => F::default_value(),
            Err(err) => {
                log_error!("Error reading {}: {err:#}", F::KEY.storage_key());
                F::default_value()
            }
        }
    }

    pub async fn set<F: SettingField>(&self, value: F::Value) -> bool {
        let raw = match serde_json::to_value(&value) {
            Ok(raw) => raw,
            Err(err) => {
                log_error!("Error encoding {}: {err}", F::KEY.storage_key());
                return false;
            }
        };
        self.write_raw(F::KEY, raw).await
    }

    async fn write_raw(&self, key: SettingKey, raw: Value) -> bool {
        match self.hub.write(self.origin, key, raw).await {
            Ok(()) => true,
            Err(err) => {
                log_error!("Error writing {}: {err:#}", key.storage_key());
                false
            }
        }
    }

    pub async fn snapshot(&self) -> SettingsSnapshot {
        SettingsSnapshot {
            extension_enabled: self.get::<ExtensionEnabled>().await,
            overlay_visible: self.get::<OverlayVisible>().await,
            xray_enabled: self.get::<XrayEnabled>().await,
            xray_issue_count: self.get::<XrayIssueCount>().await,
        }
    }
}
