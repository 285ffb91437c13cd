//! Interaction core of the Cliro in-page assistant.
//!
//! A host shell (browser extension content script, popup, or a test fake)
//! implements [`context::HostPage`], forwards DOM events, and renders from
//! the snapshots the controllers and menus publish. Settings are shared
//! between every surface through a [`settings::SettingsHub`].

pub mod config;
pub mod context;
pub mod db;
pub mod gateway;
pub mod interaction;
pub mod menu;
pub mod settings;
pub mod surface;
pub mod utils;

pub use config::AssistantConfig;
pub use context::{Context, ContextTracker, HostEvent, HostPage};
pub use gateway::{ActionGateway, ActionRequest, GatewayError, HttpActionGateway};
pub use interaction::{InteractionController, InteractionState, OverlayKind, OverlayPhase};
pub use menu::{MenuSession, MenuView};
pub use settings::{SettingsHub, SettingsSurface, SharedSettingsStore, SettingsSyncChannel, SurfaceKind};
pub use surface::OverlaySurface;
pub use utils::{init_logging, Subscription, SubscriptionSet};
