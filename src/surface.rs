use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::{
    config::AssistantConfig,
    context::{ContextTracker, HostEvent, HostPage},
    gateway::ActionGateway,
    interaction::{InteractionController, OverlayKind},
    menu::MenuSession,
    settings::SettingsSurface,
    utils::SubscriptionSet,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_info};

/// Everything one tab runs: the context tracker, the bubble and selection
/// label controllers, their menus, and the settings connection.
pub struct OverlaySurface {
    tracker: Arc<ContextTracker>,
    bubble: Arc<InteractionController>,
    label: Arc<InteractionController>,
    bubble_menu: Arc<MenuSession>,
    label_menu: Arc<MenuSession>,
    settings: Option<SettingsSurface>,
    subscriptions: SubscriptionSet,
    idle_refresh: Option<JoinHandle<()>>,
}

impl OverlaySurface {
    pub async fn mount(
        page: Arc<dyn HostPage>,
        settings: SettingsSurface,
        gateway: Arc<dyn ActionGateway>,
        config: &AssistantConfig,
    ) -> Self {
        let tracker = ContextTracker::new(page, config.tracker);
        let bubble = InteractionController::new(
            OverlayKind::Bubble,
            config.bubble_timing,
            config.drag_threshold_px,
        );
        let label = InteractionController::new(
            OverlayKind::SelectionLabel,
            config.label_timing,
            config.drag_threshold_px,
        );
        let bubble_menu = MenuSession::new(
            bubble.clone(),
            tracker.clone(),
            gateway.clone(),
            settings.store().clone(),
        );
        let label_menu = MenuSession::new(
            label.clone(),
            tracker.clone(),
            gateway,
            settings.store().clone(),
        );

        let mut subscriptions = SubscriptionSet::new();

        {
            let bubble = Arc::downgrade(&bubble);
            let label = Arc::downgrade(&label);
            subscriptions.add(tracker.subscribe(move |context| {
                if let Some(bubble) = bubble.upgrade() {
                    bubble.apply_context(context);
                }
                if let Some(label) = label.upgrade() {
                    label.apply_context(context);
                }
            }));
        }

        // Only the bubble pauses idle refresh; the label follows the selection.
        {
            let tracker = Arc::downgrade(&tracker);
            let menu = Arc::downgrade(&bubble_menu);
            subscriptions.add(bubble.on_open_change(move |open| {
                if let Some(tracker) = tracker.upgrade() {
                    tracker.set_overlay_suppressed(open);
                }
                if !open {
                    if let Some(menu) = menu.upgrade() {
                        menu.reset();
                    }
                }
            }));
        }

        {
            let menu = Arc::downgrade(&label_menu);
            subscriptions.add(label.on_open_change(move |open| {
                if !open {
                    if let Some(menu) = menu.upgrade() {
                        menu.reset();
                    }
                }
            }));
        }

        subscriptions.merge(bubble.bind_settings(&settings).await);
        subscriptions.merge(label.bind_settings(&settings).await);
        subscriptions.merge(bubble_menu.bind_settings(&settings).await);
        subscriptions.merge(label_menu.bind_settings(&settings).await);

        tracker.update();
        let idle_refresh = tracker.spawn_idle_refresh();

        log_info!(
            "overlay surface mounted for settings surface {} ({} subscriptions)",
            settings.id(),
            subscriptions.len()
        );

        Self {
            tracker,
            bubble,
            label,
            bubble_menu,
            label_menu,
            settings: Some(settings),
            subscriptions,
            idle_refresh,
        }
    }

    pub fn tracker(&self) -> &Arc<ContextTracker> {
        &self.tracker
    }

    pub fn bubble(&self) -> &Arc<InteractionController> {
        &self.bubble
    }

    pub fn label(&self) -> &Arc<InteractionController> {
        &self.label
    }

    pub fn bubble_menu(&self) -> &Arc<MenuSession> {
        &self.bubble_menu
    }

    pub fn label_menu(&self) -> &Arc<MenuSession> {
        &self.label_menu
    }

    pub fn settings(&self) -> Option<&SettingsSurface> {
        self.settings.as_ref()
    }

    pub fn is_mounted(&self) -> bool {
        self.settings.is_some()
    }

    pub fn handle_event(&self, event: HostEvent) {
        if self.is_mounted() {
            self.tracker.handle_event(event);
        }
    }

    /// Tears everything down: listeners, hover timers, pending probes, the
    /// idle loop and the hub connection. Safe to call more than once.
    pub fn unmount(&mut self) {
        let Some(settings) = self.settings.take() else {
            return;
        };

        self.subscriptions.dispose_all();
        self.bubble.unmount();
        self.label.unmount();
        self.bubble_menu.reset();
        self.label_menu.reset();
        self.tracker.shutdown();
        if let Some(handle) = self.idle_refresh.take() {
            handle.abort();
        }

        log_debug!("overlay surface for {} unmounted", settings.id());
        settings.disconnect();
    }
}

impl Drop for OverlaySurface {
    fn drop(&mut self) {
        self.unmount();
    }
}
