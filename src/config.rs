use std::{path::PathBuf, str::FromStr, time::Duration};

use log::warn;

pub const DEFAULT_GATEWAY_ENDPOINT: &str = "http://127.0.0.1:8000/ai/";

/// Delays for one overlay's hover intent. The close delay is longer so the
/// pointer can travel from the trigger to the menu content.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HoverTiming {
    pub open_delay: Duration,
    pub close_delay: Duration,
}

impl HoverTiming {
    pub const fn from_millis(open_ms: u64, close_ms: u64) -> Self {
        Self {
            open_delay: Duration::from_millis(open_ms),
            close_delay: Duration::from_millis(close_ms),
        }
    }

    pub fn bubble() -> Self {
        Self::from_millis(300, 500)
    }

    pub fn selection_label() -> Self {
        Self::from_millis(180, 300)
    }
}

/// Settle delays the tracker waits before re-probing after host events.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TrackerTiming {
    /// Focus moves before the browser has placed the caret.
    pub focus_settle: Duration,
    /// Keyup/mouseup/input fire before the input selection is final.
    pub input_settle: Duration,
    /// Periodic re-probe while the overlay is closed; `None` disables it.
    pub idle_refresh: Option<Duration>,
}

impl Default for TrackerTiming {
    fn default() -> Self {
        Self {
            focus_settle: Duration::from_millis(100),
            input_settle: Duration::from_millis(50),
            idle_refresh: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    pub endpoint: String,
    pub timeout: Duration,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_GATEWAY_ENDPOINT.to_string(),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tunables for one tab's overlay surface and its collaborators.
#[derive(Debug, Clone)]
pub struct AssistantConfig {
    pub bubble_timing: HoverTiming,
    pub label_timing: HoverTiming,

    /// Pointer travel (px) below which a press on the bubble stays a click
    pub drag_threshold_px: f64,

    pub tracker: TrackerTiming,
    pub gateway: GatewayConfig,

    /// SQLite file backing shared settings; `None` keeps them in memory
    pub settings_path: Option<PathBuf>,
}

impl Default for AssistantConfig {
    fn default() -> Self {
        Self {
            bubble_timing: HoverTiming::bubble(),
            label_timing: HoverTiming::selection_label(),
            drag_threshold_px: 3.0,
            tracker: TrackerTiming::default(),
            gateway: GatewayConfig::default(),
            settings_path: None,
        }
    }
}

impl AssistantConfig {
    /// Defaults overlaid with `CLIRO_*` environment variables.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(url) = lookup("CLIRO_GATEWAY_URL").filter(|v| !v.trim().is_empty()) {
            config.gateway.endpoint = url.trim().to_string();
        }
        if let Some(secs) = parse_var::<u64, _>(&lookup, "CLIRO_GATEWAY_TIMEOUT_SECS") {
            config.gateway.timeout = Duration::from_secs(secs);
        }
        if let Some(path) = lookup("CLIRO_SETTINGS_PATH").filter(|v| !v.trim().is_empty()) {
            config.settings_path = Some(PathBuf::from(path));
        }
        if let Some(ms) = parse_var::<u64, _>(&lookup, "CLIRO_IDLE_REFRESH_MS") {
            config.tracker.idle_refresh = (ms > 0).then(|| Duration::from_millis(ms));
        }

        let debug_mode = lookup("CLIRO_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);
        if debug_mode {
            config.bubble_timing = HoverTiming::from_millis(50, 100);
            config.label_timing = HoverTiming::from_millis(50, 100);
        }

        config
    }
}

fn parse_var<T, F>(lookup: &F, key: &str) -> Option<T>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    let raw = lookup(key)?;
    match raw.trim().parse::<T>() {
        Ok(value) => Some(value),
        Err(_) => {
            warn!("ignoring {key}={raw:?}: not a valid value");
            None
        }
    }
}
