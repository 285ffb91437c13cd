use std::sync::{Arc, Mutex};

use serde::Serialize;
use serde_json::Value;
use tokio::sync::watch;

use crate::{
    context::ContextTracker,
    gateway::{display_text, ActionGateway, ActionRequest},
    interaction::InteractionController,
    settings::{
        ExtensionEnabled, OverlayVisible, SettingsSurface, SharedSettingsStore, XrayEnabled,
        XrayIssueCount, XRAY_DEFAULT_ENABLED, XRAY_DEFAULT_ISSUE_COUNT,
    },
    utils::{lock, SubscriptionSet},
};

use super::catalog::{MenuAction, MenuCommand};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum Submenu {
    Rewrite,
    Translate,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "view", rename_all = "camelCase")]
pub enum MenuView {
    Root,
    Submenu { submenu: Submenu },
    Loading { action: MenuAction },
    Response { action: MenuAction, text: String },
    Failed { action: MenuAction, message: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MenuSnapshot {
    pub view: MenuView,
    pub xray_enabled: bool,
    pub xray_issue_count: u32,
}

struct MenuState {
    snapshot: MenuSnapshot,
    /// Bumped by every navigation; a reply tagged with an older value is stale.
    request_seq: u64,
    /// Bumped by every live x-ray update; an initial load that straddles one is dropped.
    xray_enabled_writes: u64,
    issue_count_writes: u64,
}

/// Content shown inside an open overlay: the action menu, its submenus,
/// and the loading/response views of the last action.
pub struct MenuSession {
    controller: Arc<InteractionController>,
    tracker: Arc<ContextTracker>,
    gateway: Arc<dyn ActionGateway>,
    store: SharedSettingsStore,
    state: Mutex<MenuState>,
    snapshots: watch::Sender<MenuSnapshot>,
}

impl MenuSession {
    pub fn new(
        controller: Arc<InteractionController>,
        tracker: Arc<ContextTracker>,
        gateway: Arc<dyn ActionGateway>,
        store: SharedSettingsStore,
    ) -> Arc<Self> {
        let snapshot = MenuSnapshot {
            view: MenuView::Root,
            xray_enabled: XRAY_DEFAULT_ENABLED,
            xray_issue_count: XRAY_DEFAULT_ISSUE_COUNT,
        };
        let (snapshots, _) = watch::channel(snapshot.clone());

        Arc::new(Self {
            controller,
            tracker,
            gateway,
            store,
            state: Mutex::new(MenuState {
                snapshot,
                request_seq: 0,
                xray_enabled_writes: 0,
                issue_count_writes: 0,
            }),
            snapshots,
        })
    }

    pub fn snapshot(&self) -> MenuSnapshot {
        lock(&self.state).snapshot.clone()
    }

    pub fn view(&self) -> MenuView {
        lock(&self.state).snapshot.view.clone()
    }

    pub fn watch(&self) -> watch::Receiver<MenuSnapshot> {
        self.snapshots.subscribe()
    }

    pub fn open_submenu(&self, submenu: Submenu) {
        self.update(|state| {
            state.request_seq += 1;
            state.snapshot.view = MenuView::Submenu { submenu };
        });
    }

    /// Leaves a submenu or response view; the overlay stays open.
    pub fn back_to_menu(&self) {
        self.reset();
    }

    /// Closes the owning overlay entirely.
    pub fn close_overlay(&self) {
        self.reset();
        self.controller.close();
    }

    /// Returns to the root view and orphans any in-flight request.
    pub fn reset(&self) {
        self.update(|state| {
            state.request_seq += 1;
            state.snapshot.view = MenuView::Root;
        });
    }

    pub async fn run(&self, command: MenuCommand) -> Option<MenuView> {
        self.run_action(command.action(), command.payload()).await
    }

    /// Sends `action` with the tracked text as `userText` and shows the
    /// outcome. Returns `None` if the user navigated away before the reply.
    pub async fn run_action(&self, action: MenuAction, payload: Value) -> Option<MenuView> {
        let user_text = self.tracker.current().text;
        let seq = self.update(|state| {
            state.request_seq += 1;
            state.snapshot.view = MenuView::Loading { action };
            state.request_seq
        });

        let result = self
            .gateway
            .send(ActionRequest::new(action.wire_name(), payload, user_text))
            .await;

        let view = match result {
            Ok(reply) => MenuView::Response {
                action,
                text: display_text(&reply),
            },
            Err(err) => {
                log_warn!("action {} failed: {err}", action.wire_name());
                MenuView::Failed {
                    action,
                    message: err.to_string(),
                }
            }
        };

        self.update(|state| {
            if state.request_seq != seq {
                log_debug!("discarding stale {} reply", action.wire_name());
                return None;
            }
            state.snapshot.view = view.clone();
            Some(view)
        })
    }

    /// Hides the bubble on every tab, then closes this overlay either way.
    pub async fn hide_overlay(&self) -> bool {
        let saved = self.store.set::<OverlayVisible>(false).await;
        self.close_overlay();
        saved
    }

    pub async fn toggle_xray(&self) -> bool {
        let next = !self.snapshot().xray_enabled;
        let saved = self.store.set::<XrayEnabled>(next).await;
        if saved {
            self.set_xray_enabled(next);
        }
        saved
    }

    /// Turns the whole extension off; every surface closes through its
    /// settings subscription, this one immediately.
    pub async fn power_off(&self) -> bool {
        let saved = self.store.set::<ExtensionEnabled>(false).await;
        if saved {
            self.close_overlay();
        }
        saved
    }

    /// Mirrors the x-ray settings. Subscribes first, then loads current values.
    pub async fn bind_settings(self: &Arc<Self>, surface: &SettingsSurface) -> SubscriptionSet {
        let mut subscriptions = SubscriptionSet::new();

        let session = Arc::downgrade(self);
        subscriptions.add(surface.channel().subscribe::<XrayEnabled, _>(move |enabled| {
            if let Some(session) = session.upgrade() {
                session.set_xray_enabled(enabled);
            }
        }));

        let session = Arc::downgrade(self);
        subscriptions.add(surface.channel().subscribe::<XrayIssueCount, _>(move |count| {
            if let Some(session) = session.upgrade() {
                session.set_xray_issue_count(count);
            }
        }));

        let (enabled_seen, count_seen) = {
            let state = lock(&self.state);
            (state.xray_enabled_writes, state.issue_count_writes)
        };
        let store = surface.store();
        let enabled = store.get::<XrayEnabled>().await;
        let count = store.get::<XrayIssueCount>().await;

        self.update(|state| {
            if state.xray_enabled_writes == enabled_seen {
                state.snapshot.xray_enabled = enabled;
            }
            if state.issue_count_writes == count_seen {
                state.snapshot.xray_issue_count = count;
            }
        });

        subscriptions
    }

    fn set_xray_enabled(&self, enabled: bool) {
        self.update(|state| {
            state.xray_enabled_writes += 1;
            state.snapshot.xray_enabled = enabled;
        });
    }

    fn set_xray_issue_count(&self, count: u32) {
        self.update(|state| {
            state.issue_count_writes += 1;
            state.snapshot.xray_issue_count = count;
        });
    }

    fn update<R>(&self, change: impl FnOnce(&mut MenuState) -> R) -> R {
        let mut state = lock(&self.state);
        let result = change(&mut *state);
        let next = &state.snapshot;
        self.snapshots.send_if_modified(|current| {
            if current == next {
                false
            } else {
                *current = next.clone();
                true
            }
        });
        result
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;

    use super::*;
    use crate::{
        config::{HoverTiming, TrackerTiming},
        context::{probe::fake::FakePage, Rect},
        gateway::{fake::ScriptedGateway, GatewayError},
        interaction::{OverlayKind, OverlayPhase},
        menu::{language_by_code, RewriteStyle},
        settings::{store::failing::SlowReadBackend, SettingsHub, SurfaceKind},
    };

    struct Fixture {
        session: Arc<MenuSession>,
        controller: Arc<InteractionController>,
        gateway: Arc<ScriptedGateway>,
        hub: Arc<SettingsHub>,
        tab: SettingsSurface,
    }

    fn fixture(latency_ms: u64) -> Fixture {
        let page = Arc::new(FakePage::with_body("Whole page"));
        page.select("Hello world", Rect::new(10.0, 10.0, 80.0, 12.0));
        let tracker = ContextTracker::new(page, TrackerTiming::default());
        tracker.update();

        let controller =
            InteractionController::new(OverlayKind::Bubble, HoverTiming::bubble(), 3.0);
        controller.set_extension_enabled(true);
        controller.set_overlay_visible(true);
        controller.click();

        let gateway = Arc::new(ScriptedGateway::with_latency(Duration::from_millis(latency_ms)));
        let hub = SettingsHub::in_memory();
        let tab = hub.connect(SurfaceKind::Tab(1));
        let session = MenuSession::new(
            controller.clone(),
            tracker,
            gateway.clone(),
            tab.store().clone(),
        );

        Fixture {
            session,
            controller,
            gateway,
            hub,
            tab,
        }
    }

    #[tokio::test]
    async fn action_reply_becomes_response_view() {
        let fx = fixture(0);
        fx.gateway.push_reply(Ok(json!({"text": "  A short summary.  "})));

        let view = fx.session.run(MenuCommand::Summarize).await;
        let expected = MenuView::Response {
            action: MenuAction::Summarize,
            text: "A short summary.".into(),
        };
        assert_eq!(view, Some(expected.clone()));
        assert_eq!(fx.session.view(), expected);

        let sent = fx.gateway.requests();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].action, "SUMMARIZE");
        assert_eq!(sent[0].payload, json!("summary"));
        assert_eq!(sent[0].user_text, "Hello world");
    }

    #[tokio::test]
    async fn backend_error_becomes_failed_view() {
        let fx = fixture(0);
        fx.gateway
            .push_reply(Err(GatewayError::Backend("quota exhausted".into())));

        let view = fx.session.run(MenuCommand::Rewrite(RewriteStyle::Formal)).await;
        assert_eq!(
            view,
            Some(MenuView::Failed {
                action: MenuAction::Rewrite,
                message: "quota exhausted".into(),
            })
        );
        assert!(fx.controller.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn reply_after_back_to_menu_is_discarded() {
        let fx = fixture(200);
        let session = fx.session.clone();
        let spanish = language_by_code("ES").unwrap();
        let pending = tokio::spawn(async move { session.run(MenuCommand::Translate(spanish)).await });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(
            fx.session.view(),
            MenuView::Loading {
                action: MenuAction::Translate
            }
        );
        fx.session.back_to_menu();

        assert_eq!(pending.await.unwrap(), None);
        assert_eq!(fx.session.view(), MenuView::Root);
        assert!(fx.controller.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn newer_action_wins_over_older_one() {
        let fx = fixture(100);
        let first = {
            let session = fx.session.clone();
            tokio::spawn(async move { session.run(MenuCommand::Explain).await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;
        let second = fx.session.run(MenuCommand::Summarize).await;

        assert_eq!(first.await.unwrap(), None);
        assert!(matches!(
            second,
            Some(MenuView::Response {
                action: MenuAction::Summarize,
                ..
            })
        ));
    }

    #[tokio::test]
    async fn close_overlay_closes_controller_and_resets() {
        let fx = fixture(0);
        fx.session.open_submenu(Submenu::Translate);
        fx.session.close_overlay();

        assert_eq!(fx.controller.phase(), OverlayPhase::Closed);
        assert_eq!(fx.session.view(), MenuView::Root);
    }

    #[tokio::test]
    async fn back_to_menu_keeps_overlay_open() {
        let fx = fixture(0);
        fx.session.open_submenu(Submenu::Rewrite);
        assert_eq!(
            fx.session.view(),
            MenuView::Submenu {
                submenu: Submenu::Rewrite
            }
        );

        fx.session.back_to_menu();
        assert_eq!(fx.session.view(), MenuView::Root);
        assert!(fx.controller.is_open());
    }

    #[tokio::test]
    async fn hide_overlay_persists_and_closes() {
        let fx = fixture(0);
        assert!(fx.session.hide_overlay().await);

        assert!(!fx.tab.store().get::<OverlayVisible>().await);
        assert_eq!(fx.controller.phase(), OverlayPhase::Closed);
    }

    #[tokio::test]
    async fn power_off_disables_extension() {
        let fx = fixture(0);
        assert!(fx.session.power_off().await);

        let popup = fx.hub.connect(SurfaceKind::Popup);
        assert!(!popup.store().get::<ExtensionEnabled>().await);
        assert!(!fx.controller.is_open());
    }

    #[tokio::test(start_paused = true)]
    async fn xray_settings_are_mirrored() {
        let fx = fixture(0);
        let _subs = fx.session.bind_settings(&fx.tab).await;
        assert!(!fx.session.snapshot().xray_enabled);

        assert!(fx.session.toggle_xray().await);
        assert!(fx.session.snapshot().xray_enabled);
        assert!(fx.tab.store().get::<XrayEnabled>().await);

        let popup = fx.hub.connect(SurfaceKind::Popup);
        popup.store().set::<XrayIssueCount>(3).await;
        popup.store().set::<XrayEnabled>(false).await;
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snapshot = fx.session.snapshot();
        assert_eq!(snapshot.xray_issue_count, 3);
        assert!(!snapshot.xray_enabled);
    }

    #[tokio::test(start_paused = true)]
    async fn xray_change_during_initial_read_wins() {
        let hub = SettingsHub::new(Arc::new(SlowReadBackend::new(Duration::from_millis(50))));
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(1));

        let page = Arc::new(FakePage::with_body("Whole page"));
        let tracker = ContextTracker::new(page, TrackerTiming::default());
        let controller =
            InteractionController::new(OverlayKind::Bubble, HoverTiming::bubble(), 3.0);
        let session = MenuSession::new(
            controller,
            tracker,
            Arc::new(ScriptedGateway::default()),
            tab.store().clone(),
        );

        let (_subs, saved) = tokio::join!(session.bind_settings(&tab), async {
            tokio::time::sleep(Duration::from_millis(10)).await;
            popup.store().set::<XrayEnabled>(true).await
        });
        assert!(saved);
        tokio::time::sleep(Duration::from_millis(1)).await;

        let snapshot = session.snapshot();
        assert!(snapshot.xray_enabled);
        assert_eq!(snapshot.xray_issue_count, XRAY_DEFAULT_ISSUE_COUNT);
    }

    #[test]
    fn view_serializes_with_tag() {
        let view = MenuView::Response {
            action: MenuAction::Explain,
            text: "Because.".into(),
        };
        let wire = serde_json::to_value(&view).unwrap();
        assert_eq!(wire["view"], "response");
        assert_eq!(wire["action"], "EXPLAIN");
    }
}
