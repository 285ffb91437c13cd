use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use serde::Serialize;
use tokio::{runtime::Handle, sync::watch, task::JoinHandle};

use crate::{
    config::HoverTiming,
    context::{Context, Point},
    settings::{ExtensionEnabled, OverlayVisible, SettingsSurface},
    utils::{lock, NoticeQueue, Subscription, SubscriptionSet},
};

use super::state::{DragState, InteractionState, OverlayKind, OverlayPhase};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub type OpenChangeListener = Arc<dyn Fn(bool) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum HoverTimerKind {
    Open,
    Close,
}

struct HoverTimer {
    kind: HoverTimerKind,
    seq: u64,
    handle: JoinHandle<()>,
}

struct ControllerInner {
    state: InteractionState,
    /// The single pending hover timer; starting one replaces the other.
    timer: Option<HoverTimer>,
    mounted: bool,
    open_notices: NoticeQueue<bool>,
    /// Bumped by every explicit write to the switch, so an initial load
    /// that was in flight across one can tell it is stale.
    extension_writes: u64,
    visibility_writes: u64,
}

impl ControllerInner {
    fn cancel_timer(&mut self) {
        if let Some(timer) = self.timer.take() {
            timer.handle.abort();
        }
    }

    fn force_close(&mut self) {
        self.cancel_timer();
        self.state.close();
    }

    /// Closes and stops dragging if settings or anchor no longer allow the trigger.
    fn enforce_availability(&mut self) {
        if self.state.is_available() {
            return;
        }
        self.state.end_drag();
        if self.state.phase != OverlayPhase::Closed {
            log_info!("{:?} overlay no longer available, closing", self.state.kind);
            self.force_close();
        }
    }

    fn expire(&mut self, kind: HoverTimerKind) {
        match (kind, self.state.phase) {
            (HoverTimerKind::Open, OverlayPhase::Opening) => {
                if self.state.hovered && self.state.is_available() {
                    self.state.open(false);
                } else {
                    self.state.close();
                }
            }
            (HoverTimerKind::Close, OverlayPhase::Closing) => {
                if self.state.hovered {
                    self.state.phase = OverlayPhase::Open;
                } else {
                    self.state.close();
                }
            }
            _ => {}
        }
    }
}

/// Hover/click/drag/outside-press state machine for one overlay trigger.
///
/// Phases run `Closed -> Opening -> Open -> Closing -> Closed`; `Opening`
/// and `Closing` exist exactly while the matching delay timer is pending,
/// so at most one timer is ever outstanding. Every entry point is
/// synchronous and takes effect before it returns; renderers follow
/// along through [`InteractionController::watch`].
pub struct InteractionController {
    timing: HoverTiming,
    drag_threshold_px: f64,
    inner: Mutex<ControllerInner>,
    snapshots: watch::Sender<InteractionState>,
    open_listeners: Mutex<Vec<(u64, OpenChangeListener)>>,
    next_listener_id: AtomicU64,
    next_timer_seq: AtomicU64,
}

impl InteractionController {
    pub fn new(kind: OverlayKind, timing: HoverTiming, drag_threshold_px: f64) -> Arc<Self> {
        let state = InteractionState::new(kind);
        let (snapshots, _) = watch::channel(state.clone());
        Arc::new(Self {
            timing,
            drag_threshold_px,
            inner: Mutex::new(ControllerInner {
                state,
                timer: None,
                mounted: true,
                open_notices: NoticeQueue::default(),
                extension_writes: 0,
                visibility_writes: 0,
            }),
            snapshots,
            open_listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            next_timer_seq: AtomicU64::new(1),
        })
    }

    pub fn snapshot(&self) -> InteractionState {
        lock(&self.inner).state.clone()
    }

    pub fn phase(&self) -> OverlayPhase {
        lock(&self.inner).state.phase
    }

    pub fn is_open(&self) -> bool {
        self.phase().is_shown()
    }

    pub fn pending_timer(&self) -> Option<HoverTimerKind> {
        lock(&self.inner).timer.as_ref().map(|timer| timer.kind)
    }

    pub fn is_mounted(&self) -> bool {
        lock(&self.inner).mounted
    }

    pub fn watch(&self) -> watch::Receiver<InteractionState> {
        self.snapshots.subscribe()
    }

    /// `listener(true)` when content appears, `listener(false)` when it goes away.
    pub fn on_open_change<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(bool) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.open_listeners).push((id, Arc::new(listener)));

        let controller = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(controller) = controller.upgrade() {
                lock(&controller.open_listeners).retain(|(existing, _)| *existing != id);
            }
        })
    }

    pub fn pointer_enter(self: &Arc<Self>) {
        self.apply(|inner| {
            inner.state.hovered = true;
            match inner.state.phase {
                OverlayPhase::Closed if inner.state.is_available() => {
                    inner.state.phase = OverlayPhase::Opening;
                    self.start_timer(inner, HoverTimerKind::Open);
                }
                OverlayPhase::Closing => {
                    inner.cancel_timer();
                    inner.state.phase = OverlayPhase::Open;
                }
                _ => {}
            }
        });
    }

    pub fn pointer_leave(self: &Arc<Self>) {
        self.apply(|inner| {
            inner.state.hovered = false;
            match inner.state.phase {
                OverlayPhase::Opening => {
                    inner.cancel_timer();
                    inner.state.phase = OverlayPhase::Closed;
                }
                OverlayPhase::Open if !inner.state.pinned => {
                    inner.state.phase = OverlayPhase::Closing;
                    self.start_timer(inner, HoverTimerKind::Close);
                }
                _ => {}
            }
        });
    }

    /// Click on the trigger. Opens and pins from `Closed`/`Opening`; a click
    /// on already-open content is left to the content.
    pub fn click(&self) {
        self.apply(|inner| {
            if std::mem::take(&mut inner.state.swallow_click) {
                log_debug!("click after drag ignored");
                return;
            }
            if !inner.state.is_available() {
                return;
            }
            if matches!(inner.state.phase, OverlayPhase::Closed | OverlayPhase::Opening) {
                inner.cancel_timer();
                inner.state.open(true);
            }
        });
    }

    /// Press anywhere outside the overlay. Beats pinning and pending timers.
    pub fn pointer_down_outside(&self) {
        self.apply(|inner| {
            if inner.state.phase != OverlayPhase::Closed {
                inner.force_close();
            }
        });
    }

    /// Explicit close requested by the overlay content.
    pub fn close(&self) {
        self.apply(ControllerInner::force_close);
    }

    pub fn set_extension_enabled(&self, enabled: bool) {
        self.apply(|inner| {
            inner.extension_writes += 1;
            inner.state.extension_enabled = enabled;
            inner.enforce_availability();
        });
    }

    pub fn set_overlay_visible(&self, visible: bool) {
        self.apply(|inner| {
            inner.visibility_writes += 1;
            inner.state.overlay_visible = visible;
            inner.enforce_availability();
        });
    }

    /// Follows the tracker: selection state for rendering and, for the
    /// selection label, the anchor it is pinned to.
    pub fn apply_context(&self, context: &Context) {
        self.apply(|inner| {
            inner.state.context_selected = context.is_selected();
            inner.state.anchor = context.anchor_position.filter(Point::is_finite);
            inner.enforce_availability();
        });
    }

    /// Anything that went wrong while positioning or reading the host page.
    pub fn report_fault(&self, err: &anyhow::Error) {
        log_warn!("overlay fault, closing: {err:#}");
        self.apply(|inner| {
            inner.state.end_drag();
            inner.force_close();
        });
    }

    /// Press on the trigger surface. Presses on interactive children (menu
    /// items, submenus, controls) never start a drag.
    pub fn pointer_down(&self, at: Point, on_interactive: bool) {
        self.apply(|inner| {
            inner.state.swallow_click = false;
            if on_interactive || !inner.state.is_draggable() || !at.is_finite() {
                return;
            }
            let position = inner.state.position;
            inner.state.drag = Some(DragState {
                start: at,
                offset: Point::new(at.x - position.x, at.y - position.y),
                moved: false,
            });
            inner.state.dragging = true;
        });
    }

    pub fn pointer_move(&self, at: Point) {
        let threshold = self.drag_threshold_px;
        self.apply(|inner| {
            let Some(drag) = inner.state.drag.as_mut() else {
                return;
            };
            if !at.is_finite() {
                log_warn!("ignoring non-finite pointer position {at:?}");
                return;
            }
            if !drag.moved && drag.start.distance_to(at) < threshold {
                return;
            }
            drag.moved = true;
            let offset = drag.offset;
            inner.state.position = Point::new(at.x - offset.x, at.y - offset.y);
        });
    }

    pub fn pointer_up(&self) {
        self.apply(|inner| {
            inner.state.swallow_click = inner.state.end_drag();
        });
    }

    /// Subscribes to the enable switches, then loads their current values.
    /// Subscribing first means a change racing the initial read is not lost;
    /// a loaded value is dropped if a notification landed while it was read.
    pub async fn bind_settings(self: &Arc<Self>, surface: &SettingsSurface) -> SubscriptionSet {
        let mut subscriptions = SubscriptionSet::new();

        let controller = Arc::downgrade(self);
        subscriptions.add(surface.channel().subscribe::<ExtensionEnabled, _>(move |enabled| {
            if let Some(controller) = controller.upgrade() {
                controller.set_extension_enabled(enabled);
            }
        }));

        let controller = Arc::downgrade(self);
        subscriptions.add(surface.channel().subscribe::<OverlayVisible, _>(move |visible| {
            if let Some(controller) = controller.upgrade() {
                controller.set_overlay_visible(visible);
            }
        }));

        let (extension_seen, visibility_seen) = {
            let inner = lock(&self.inner);
            (inner.extension_writes, inner.visibility_writes)
        };
        let store = surface.store();
        let enabled = store.get::<ExtensionEnabled>().await;
        let visible = store.get::<OverlayVisible>().await;

        self.apply(|inner| {
            if inner.extension_writes == extension_seen {
                inner.state.extension_enabled = enabled;
            } else {
                log_debug!("initial extension switch superseded by a newer write");
            }
            if inner.visibility_writes == visibility_seen {
                inner.state.overlay_visible = visible;
            } else {
                log_debug!("initial overlay visibility superseded by a newer write");
            }
            inner.enforce_availability();
        });

        subscriptions
    }

    /// Cancels every timer, closes, and turns every later call into a no-op.
    pub fn unmount(&self) {
        self.apply(|inner| {
            inner.state.end_drag();
            inner.state.hovered = false;
            inner.force_close();
        });
        lock(&self.inner).mounted = false;
        lock(&self.open_listeners).clear();
    }

    fn start_timer(self: &Arc<Self>, inner: &mut ControllerInner, kind: HoverTimerKind) {
        inner.cancel_timer();

        let delay = match kind {
            HoverTimerKind::Open => self.timing.open_delay,
            HoverTimerKind::Close => self.timing.close_delay,
        };
        let runtime = match Handle::try_current() {
            Ok(runtime) if !delay.is_zero() => runtime,
            _ => {
                inner.expire(kind);
                return;
            }
        };

        let seq = self.next_timer_seq.fetch_add(1, Ordering::Relaxed);
        let controller = Arc::downgrade(self);
        let handle = runtime.spawn(async move {
            tokio::time::sleep(delay).await;
            if let Some(controller) = controller.upgrade() {
                controller.timer_fired(seq);
            }
        });

        inner.timer = Some(HoverTimer { kind, seq, handle });
    }

    fn timer_fired(&self, seq: u64) {
        self.apply(|inner| {
            let kind = match &inner.timer {
                Some(timer) if timer.seq == seq => timer.kind,
                _ => return,
            };
            inner.timer = None;
            inner.expire(kind);
        });
    }

    /// Runs `change` under the lock, publishes the new snapshot, and tells
    /// open-change listeners (outside the lock) if content appeared or vanished.
    /// Listeners see open/close notices in the order the changes were made.
    fn apply(&self, change: impl FnOnce(&mut ControllerInner)) {
        {
            let mut inner = lock(&self.inner);
            if !inner.mounted {
                return;
            }
            let was_shown = inner.state.phase.is_shown();
            change(&mut *inner);

            let next = &inner.state;
            self.snapshots.send_if_modified(|current| {
                if current == next {
                    false
                } else {
                    *current = next.clone();
                    true
                }
            });

            let shown = next.phase.is_shown();
            if shown != was_shown {
                log_debug!("{:?} overlay {}", next.kind, if shown { "opened" } else { "closed" });
                inner.open_notices.push(shown);
            }
            if !inner.open_notices.begin() {
                return;
            }
        }

        loop {
            let Some(shown) = lock(&self.inner).open_notices.next() else {
                break;
            };
            self.notify_open_change(shown);
        }
    }

    fn notify_open_change(&self, shown: bool) {
        let listeners: Vec<OpenChangeListener> = lock(&self.open_listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(shown))).is_err() {
                log_error!("open-change listener panicked; continuing with remaining listeners");
            }
        }
    }
}

impl Drop for InteractionController {
    fn drop(&mut self) {
        let inner = self.inner.get_mut().unwrap_or_else(|p| p.into_inner());
        inner.cancel_timer();
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::atomic::AtomicUsize, time::Duration};

    use anyhow::anyhow;

    use super::*;
    use crate::settings::{store::failing::SlowReadBackend, SettingsHub, SurfaceKind};

    const TIMING: HoverTiming = HoverTiming::from_millis(300, 500);

    fn ready(kind: OverlayKind) -> Arc<InteractionController> {
        let controller = InteractionController::new(kind, TIMING, 3.0);
        controller.set_extension_enabled(true);
        controller.set_overlay_visible(true);
        controller
    }

    fn anchored_label() -> Arc<InteractionController> {
        let label = ready(OverlayKind::SelectionLabel);
        label.apply_context(&Context::selected("Hello world", Some(Point::new(40.0, 12.0))));
        label
    }

    async fn wait(ms: u64) {
        tokio::time::sleep(Duration::from_millis(ms)).await;
    }

    fn assert_timer_matches_phase(controller: &InteractionController) {
        let expected = match controller.phase() {
            OverlayPhase::Opening => Some(HoverTimerKind::Open),
            OverlayPhase::Closing => Some(HoverTimerKind::Close),
            OverlayPhase::Closed | OverlayPhase::Open => None,
        };
        assert_eq!(controller.pending_timer(), expected);
    }

    fn open_counter(controller: &Arc<InteractionController>) -> (Arc<AtomicUsize>, Subscription) {
        let opens = Arc::new(AtomicUsize::new(0));
        let seen = opens.clone();
        let sub = controller.on_open_change(move |shown| {
            if shown {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });
        (opens, sub)
    }

    #[tokio::test(start_paused = true)]
    async fn hover_opens_after_open_delay() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_enter();
        wait(299).await;
        assert_eq!(bubble.phase(), OverlayPhase::Opening);

        wait(2).await;
        let state = bubble.snapshot();
        assert_eq!(state.phase, OverlayPhase::Open);
        assert!(!state.pinned);
        assert_eq!(bubble.pending_timer(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn click_during_open_delay_opens_pinned_once() {
        let bubble = ready(OverlayKind::Bubble);
        let (opens, _sub) = open_counter(&bubble);

        bubble.pointer_enter();
        wait(50).await;
        bubble.click();

        let state = bubble.snapshot();
        assert_eq!(state.phase, OverlayPhase::Open);
        assert!(state.pinned);
        assert_eq!(bubble.pending_timer(), None);

        wait(1_000).await;
        assert!(bubble.snapshot().pinned);
        assert_eq!(opens.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn outside_press_closes_pinned_overlay() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.click();
        assert!(bubble.snapshot().pinned);

        bubble.pointer_down_outside();
        let state = bubble.snapshot();
        assert_eq!(state.phase, OverlayPhase::Closed);
        assert!(!state.pinned);
    }

    #[tokio::test(start_paused = true)]
    async fn outside_press_cancels_pending_open() {
        let label = anchored_label();
        label.pointer_enter();
        label.pointer_down_outside();
        assert_eq!(label.phase(), OverlayPhase::Closed);
        assert_eq!(label.pending_timer(), None);

        wait(1_000).await;
        assert_eq!(label.phase(), OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_closes_after_close_delay() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_enter();
        wait(301).await;
        bubble.pointer_leave();
        assert_eq!(bubble.phase(), OverlayPhase::Closing);
        assert_eq!(bubble.pending_timer(), Some(HoverTimerKind::Close));

        wait(499).await;
        assert_eq!(bubble.phase(), OverlayPhase::Closing);
        wait(2).await;
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn returning_during_close_delay_keeps_it_open() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_enter();
        wait(301).await;
        bubble.pointer_leave();
        wait(200).await;
        bubble.pointer_enter();

        assert_eq!(bubble.phase(), OverlayPhase::Open);
        assert_eq!(bubble.pending_timer(), None);
        wait(1_000).await;
        assert_eq!(bubble.phase(), OverlayPhase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn pinned_overlay_ignores_pointer_leave() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.click();
        bubble.pointer_leave();
        assert_eq!(bubble.phase(), OverlayPhase::Open);
        assert_eq!(bubble.pending_timer(), None);
        wait(1_000).await;
        assert_eq!(bubble.phase(), OverlayPhase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn leaving_before_open_delay_cancels_open() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_enter();
        wait(100).await;
        bubble.pointer_leave();
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        wait(1_000).await;
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn at_most_one_timer_pending() {
        let bubble = ready(OverlayKind::Bubble);
        let steps: [(bool, u64); 8] = [
            (true, 100),
            (false, 50),
            (true, 350),
            (false, 100),
            (true, 10),
            (false, 499),
            (true, 0),
            (false, 600),
        ];
        for (enter, pause) in steps {
            if enter {
                bubble.pointer_enter();
            } else {
                bubble.pointer_leave();
            }
            assert_timer_matches_phase(&bubble);
            wait(pause).await;
            assert_timer_matches_phase(&bubble);
        }
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn disabling_extension_force_closes_pinned() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.click();
        bubble.set_extension_enabled(false);
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        assert!(!bubble.snapshot().pinned);

        bubble.pointer_enter();
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        assert_eq!(bubble.pending_timer(), None);
        bubble.click();
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn hiding_overlay_cancels_pending_open() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_enter();
        bubble.set_overlay_visible(false);
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        assert_eq!(bubble.pending_timer(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn label_ignores_overlay_visibility() {
        let label = anchored_label();
        label.set_overlay_visible(false);
        label.click();
        assert_eq!(label.phase(), OverlayPhase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn label_closes_when_selection_goes_away() {
        let label = anchored_label();
        label.click();
        label.apply_context(&Context::page("just the page"));

        let state = label.snapshot();
        assert_eq!(state.phase, OverlayPhase::Closed);
        assert!(!state.context_selected);
        assert_eq!(state.render_position(), None);

        label.pointer_enter();
        assert_eq!(label.pending_timer(), None);
    }

    #[tokio::test(start_paused = true)]
    async fn unmount_cancels_timers_and_goes_inert() {
        let bubble = ready(OverlayKind::Bubble);
        let closes = Arc::new(AtomicUsize::new(0));
        let seen = closes.clone();
        let _sub = bubble.on_open_change(move |shown| {
            if !shown {
                seen.fetch_add(1, Ordering::SeqCst);
            }
        });

        bubble.pointer_enter();
        wait(301).await;
        bubble.pointer_leave();
        bubble.unmount();

        assert_eq!(bubble.pending_timer(), None);
        assert_eq!(closes.load(Ordering::SeqCst), 1);
        wait(1_000).await;

        bubble.click();
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        assert!(!bubble.is_mounted());
    }

    #[tokio::test(start_paused = true)]
    async fn drag_moves_bubble_and_swallows_click() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_down(Point::new(210.0, 210.0), false);
        assert!(bubble.snapshot().dragging);

        bubble.pointer_move(Point::new(260.0, 240.0));
        bubble.pointer_up();
        bubble.click();

        let state = bubble.snapshot();
        assert_eq!(state.position, Point::new(250.0, 230.0));
        assert!(!state.dragging);
        assert_eq!(state.phase, OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_below_threshold_is_still_a_click() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_down(Point::new(210.0, 210.0), false);
        bubble.pointer_move(Point::new(211.0, 211.0));
        bubble.pointer_up();
        bubble.click();

        let state = bubble.snapshot();
        assert_eq!(state.position, Point::new(200.0, 200.0));
        assert_eq!(state.phase, OverlayPhase::Open);
        assert!(state.pinned);
    }

    #[tokio::test(start_paused = true)]
    async fn press_on_interactive_child_never_drags() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_down(Point::new(210.0, 210.0), true);
        bubble.pointer_move(Point::new(400.0, 400.0));
        assert!(!bubble.snapshot().dragging);
        assert_eq!(bubble.snapshot().position, Point::new(200.0, 200.0));
    }

    #[tokio::test(start_paused = true)]
    async fn drag_does_not_change_phase() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.click();
        bubble.pointer_down(Point::new(205.0, 205.0), false);
        bubble.pointer_move(Point::new(305.0, 205.0));
        bubble.pointer_up();
        assert_eq!(bubble.phase(), OverlayPhase::Open);
        assert_eq!(bubble.snapshot().position, Point::new(300.0, 200.0));
    }

    #[tokio::test(start_paused = true)]
    async fn fault_degrades_to_closed() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.click();
        bubble.report_fault(&anyhow!("anchor node detached"));
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_listener_is_isolated() {
        let bubble = ready(OverlayKind::Bubble);
        let _bad = bubble.on_open_change(|_| panic!("render blew up"));
        let (opens, _good) = open_counter(&bubble);

        bubble.click();
        assert_eq!(opens.load(Ordering::SeqCst), 1);
        assert_eq!(bubble.phase(), OverlayPhase::Open);
    }

    #[tokio::test(start_paused = true)]
    async fn watchers_see_each_transition() {
        let bubble = ready(OverlayKind::Bubble);
        let mut rx = bubble.watch();
        bubble.click();
        assert!(rx.has_changed().unwrap());
        assert_eq!(rx.borrow_and_update().phase, OverlayPhase::Open);

        bubble.click();
        assert!(!rx.has_changed().unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn popup_hiding_overlay_closes_open_tab_bubble() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(4));

        let bubble = InteractionController::new(OverlayKind::Bubble, TIMING, 3.0);
        let _subs = bubble.bind_settings(&tab).await;
        assert!(bubble.snapshot().is_available());

        bubble.click();
        assert!(bubble.is_open());

        assert!(popup.store().set::<OverlayVisible>(false).await);
        wait(1).await;
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        assert!(!bubble.snapshot().overlay_visible);
    }

    #[tokio::test(start_paused = true)]
    async fn bound_settings_start_from_storage() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        popup.store().set::<ExtensionEnabled>(false).await;

        let tab = hub.connect(SurfaceKind::Tab(1));
        let bubble = InteractionController::new(OverlayKind::Bubble, TIMING, 3.0);
        let _subs = bubble.bind_settings(&tab).await;
        assert!(!bubble.snapshot().extension_enabled);

        popup.store().set::<ExtensionEnabled>(true).await;
        wait(1).await;
        assert!(bubble.snapshot().is_available());
    }

    #[tokio::test(start_paused = true)]
    async fn switch_change_during_initial_read_wins() {
        let hub = SettingsHub::new(Arc::new(SlowReadBackend::new(Duration::from_millis(50))));
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(1));
        let bubble = InteractionController::new(OverlayKind::Bubble, TIMING, 3.0);

        let (_subs, saved) = tokio::join!(bubble.bind_settings(&tab), async {
            wait(10).await;
            popup.store().set::<ExtensionEnabled>(false).await
        });
        assert!(saved);
        wait(1).await;

        let state = bubble.snapshot();
        assert!(!state.extension_enabled);
        assert!(!state.is_available());
        // The untouched switch still takes its loaded value.
        assert!(state.overlay_visible);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn open_change_listeners_hear_changes_in_order() {
        let bubble = InteractionController::new(
            OverlayKind::Bubble,
            HoverTiming::from_millis(20, 500),
            3.0,
        );
        bubble.set_extension_enabled(true);
        bubble.set_overlay_visible(true);

        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let _slow = bubble.on_open_change(move |shown| {
            if shown {
                std::thread::sleep(Duration::from_millis(100));
            }
            lock(&sink).push(shown);
        });

        // The open timer fires on a worker and blocks in the slow listener
        // while the close lands from this thread.
        bubble.pointer_enter();
        tokio::time::sleep(Duration::from_millis(60)).await;
        bubble.pointer_down_outside();
        tokio::time::sleep(Duration::from_millis(150)).await;

        assert_eq!(bubble.phase(), OverlayPhase::Closed);
        assert_eq!(*lock(&seen), vec![true, false]);
    }

    #[test]
    fn without_runtime_hover_applies_immediately() {
        let bubble = ready(OverlayKind::Bubble);
        bubble.pointer_enter();
        assert_eq!(bubble.phase(), OverlayPhase::Open);
        bubble.pointer_leave();
        assert_eq!(bubble.phase(), OverlayPhase::Closed);
    }
}
