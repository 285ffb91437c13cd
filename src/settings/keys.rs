use std::fmt::Debug;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use serde_json::Value;

pub const EXTENSION_DEFAULT_ENABLED: bool = true;
pub const OVERLAY_DEFAULT_VISIBLE: bool = true;
pub const XRAY_DEFAULT_ENABLED: bool = false;
pub const XRAY_DEFAULT_ISSUE_COUNT: u32 = 12;

/// The four independently addressable shared settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SettingKey {
    ExtensionEnabled,
    OverlayVisible,
    XrayEnabled,
    XrayIssueCount,
}

impl SettingKey {
    pub const ALL: [SettingKey; 4] = [
        SettingKey::ExtensionEnabled,
        SettingKey::OverlayVisible,
        SettingKey::XrayEnabled,
        SettingKey::XrayIssueCount,
    ];

    /// Key under which the value is persisted.
    pub fn storage_key(self) -> &'static str {
        match self {
            SettingKey::ExtensionEnabled => "cliro_extension_enabled",
            SettingKey::OverlayVisible => "cliro_bubble_visible",
            SettingKey::XrayEnabled => "cliro_xray_enabled",
            SettingKey::XrayIssueCount => "cliro_xray_error_count",
        }
    }

    /// Type tag of the direct broadcast message for this key.
    pub fn message_type(self) -> &'static str {
        match self {
            SettingKey::ExtensionEnabled => "EXTENSION_ENABLED_CHANGED",
            SettingKey::OverlayVisible => "BUBBLE_VISIBILITY_CHANGED",
            SettingKey::XrayEnabled => "XRAY_ENABLED_CHANGED",
            SettingKey::XrayIssueCount => "XRAY_ERROR_COUNT_CHANGED",
        }
    }

    pub fn from_storage_key(raw: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|key| key.storage_key() == raw)
    }

    pub(crate) fn index(self) -> usize {
        match self {
            SettingKey::ExtensionEnabled => 0,
            SettingKey::OverlayVisible => 1,
            SettingKey::XrayEnabled => 2,
            SettingKey::XrayIssueCount => 3,
        }
    }
}

/// Compile-time description of one setting: its key, value type, default
/// and how a raw persisted value is interpreted.
pub trait SettingField: Send + Sync + 'static {
    type Value: Serialize + DeserializeOwned + Clone + PartialEq + Debug + Send + Sync + 'static;

    const KEY: SettingKey;

    fn default_value() -> Self::Value;

    fn decode(raw: &Value) -> Option<Self::Value> {
        serde_json::from_value(raw.clone()).ok()
    }
}

pub struct ExtensionEnabled;
pub struct OverlayVisible;
pub struct XrayEnabled;
pub struct XrayIssueCount;

impl SettingField for ExtensionEnabled {
    type Value = bool;
    const KEY: SettingKey = SettingKey::ExtensionEnabled;

    fn default_value() -> bool {
        EXTENSION_DEFAULT_ENABLED
    }
}

impl SettingField for OverlayVisible {
    type Value = bool;
    const KEY: SettingKey = SettingKey::OverlayVisible;

    fn default_value() -> bool {
        OVERLAY_DEFAULT_VISIBLE
    }

    /// Only an explicit `false` hides the overlay.
    fn decode(raw: &Value) -> Option<bool> {
        Some(raw != &Value::Bool(false))
    }
}

impl SettingField for XrayEnabled {
    type Value = bool;
    const KEY: SettingKey = SettingKey::XrayEnabled;

    fn default_value() -> bool {
        XRAY_DEFAULT_ENABLED
    }
}

impl SettingField for XrayIssueCount {
    type Value = u32;
    const KEY: SettingKey = SettingKey::XrayIssueCount;

    fn default_value() -> u32 {
        XRAY_DEFAULT_ISSUE_COUNT
    }
}

/// All four settings read together. No cross-field consistency is implied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettingsSnapshot {
    pub extension_enabled: bool,
    pub overlay_visible: bool,
    pub xray_enabled: bool,
    pub xray_issue_count: u32,
}

impl Default for SettingsSnapshot {
    fn default() -> Self {
        Self {
            extension_enabled: EXTENSION_DEFAULT_ENABLED,
            overlay_visible: OVERLAY_DEFAULT_VISIBLE,
            xray_enabled: XRAY_DEFAULT_ENABLED,
            xray_issue_count: XRAY_DEFAULT_ISSUE_COUNT,
        }
    }
}
