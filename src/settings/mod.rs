//! Shared settings: durable per-key storage, typed access, and the
//! dual-path change fan-out between the popup and every tab's overlay.

use std::sync::Arc;

pub mod backend;
pub mod hub;
pub mod keys;
pub mod store;
pub mod sync;

pub use backend::{JsonFileBackend, MemoryBackend, SettingsBackend};
pub use hub::{SettingsHub, SettingsMessage, StorageChange, SurfaceId, SurfaceKind};
pub use keys::{
    ExtensionEnabled, OverlayVisible, SettingField, SettingKey, SettingsSnapshot, XrayEnabled,
    XrayIssueCount, EXTENSION_DEFAULT_ENABLED, OVERLAY_DEFAULT_VISIBLE, XRAY_DEFAULT_ENABLED,
    XRAY_DEFAULT_ISSUE_COUNT,
};
pub use store::SharedSettingsStore;
pub use sync::SettingsSyncChannel;

/// One settings surface's connection to the hub. Dropping it (or calling
/// `disconnect`) stops direct messages to this surface.
pub struct SettingsSurface {
    hub: Arc<SettingsHub>,
    id: SurfaceId,
    kind: SurfaceKind,
    store: SharedSettingsStore,
    channel: SettingsSyncChannel,
}

impl SettingsSurface {
    pub(crate) fn new(hub: Arc<SettingsHub>, id: SurfaceId, kind: SurfaceKind) -> Self {
        Self {
            store: SharedSettingsStore::new(hub.clone(), id),
            channel: SettingsSyncChannel::new(hub.clone(), id),
            hub,
            id,
            kind,
        }
    }

    pub fn id(&self) -> SurfaceId {
        self.id
    }

    pub fn kind(&self) -> &SurfaceKind {
        &self.kind
    }

    pub fn store(&self) -> &SharedSettingsStore {
        &self.store
    }

    pub fn channel(&self) -> &SettingsSyncChannel {
        &self.channel
    }

    pub fn disconnect(self) {
        drop(self);
    }
}

impl Drop for SettingsSurface {
    fn drop(&mut self) {
        self.hub.disconnect(self.id);
    }
}
