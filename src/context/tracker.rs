use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use chrono::Utc;
use tokio::{runtime::Handle, task::JoinHandle, time::MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use crate::{
    config::TrackerTiming,
    utils::{lock, NoticeQueue, Subscription},
};

use super::{
    model::Context,
    probe::{probe, HostPage},
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info};

pub type ContextListener = Arc<dyn Fn(&Context) + Send + Sync>;

/// Host notifications that may have moved the selection or focus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostEvent {
    SelectionChange,
    FocusIn,
    /// keyup / mouseup / select / input on a text-input-like element
    InputActivity,
    /// New input-capable elements appeared
    DomMutation,
}

struct TrackerState {
    current: Context,
    overlay_suppressed: bool,
    changes: NoticeQueue<Context>,
}

/// Owns the current `Context` and tells subscribers when it meaningfully changes.
pub struct ContextTracker {
    page: Arc<dyn HostPage>,
    timing: TrackerTiming,
    state: Mutex<TrackerState>,
    listeners: Mutex<Vec<(u64, ContextListener)>>,
    next_listener_id: AtomicU64,
    pending_probe: Mutex<Option<JoinHandle<()>>>,
    shutdown: CancellationToken,
}

impl ContextTracker {
    pub fn new(page: Arc<dyn HostPage>, timing: TrackerTiming) -> Arc<Self> {
        Arc::new(Self {
            page,
            timing,
            state: Mutex::new(TrackerState {
                current: Context::default(),
                overlay_suppressed: false,
                changes: NoticeQueue::default(),
            }),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            pending_probe: Mutex::new(None),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn current(&self) -> Context {
        lock(&self.state).current.clone()
    }

    pub fn subscribe<F>(self: &Arc<Self>, listener: F) -> Subscription
    where
        F: Fn(&Context) + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        lock(&self.listeners).push((id, Arc::new(listener)));

        let tracker = Arc::downgrade(self);
        Subscription::new(move || {
            if let Some(tracker) = tracker.upgrade() {
                lock(&tracker.listeners).retain(|(existing, _)| *existing != id);
            }
        })
    }

    /// Re-probes the page; publishes and returns the new context only if it
    /// differs from the held one, otherwise returns the held one untouched.
    /// Probe and commit share one critical section, and subscribers hear
    /// changes in commit order.
    pub fn update(&self) -> Context {
        let published = {
            let mut state = lock(&self.state);
            let next = probe(self.page.as_ref());
            if next.same_as(&state.current) {
                return state.current.clone();
            }
            let timestamp = Utc::now().timestamp_millis().max(state.current.timestamp);
            state.current = next.with_timestamp(timestamp);

            let published = state.current.clone();
            log_debug!(
                "context changed: selected={} anchor={:?} text_len={}",
                published.is_selected(),
                published.anchor_position,
                published.text.len()
            );
            state.changes.push(published.clone());
            if !state.changes.begin() {
                return published;
            }
            published
        };

        loop {
            let Some(context) = lock(&self.state).changes.next() else {
                break;
            };
            self.notify(&context);
        }
        published
    }

    pub fn is_overlay_suppressed(&self) -> bool {
        lock(&self.state).overlay_suppressed
    }

    /// Marks the host's overlay as open (suppressing idle refresh). Lifting
    /// the suppression re-probes immediately.
    pub fn set_overlay_suppressed(&self, suppressed: bool) {
        let was_suppressed = {
            let mut state = lock(&self.state);
            std::mem::replace(&mut state.overlay_suppressed, suppressed)
        };

        if was_suppressed && !suppressed {
            self.update();
        }
    }

    /// Entry point for host DOM events. Selection changes re-probe at once;
    /// the rest wait for the browser to settle, newest request winning.
    pub fn handle_event(self: &Arc<Self>, event: HostEvent) {
        let delay = match event {
            HostEvent::SelectionChange => None,
            HostEvent::FocusIn => Some(self.timing.focus_settle),
            HostEvent::InputActivity | HostEvent::DomMutation => Some(self.timing.input_settle),
        };

        match (delay, Handle::try_current()) {
            (Some(delay), Ok(runtime)) if !delay.is_zero() => self.schedule_probe(&runtime, delay),
            _ => {
                self.update();
            }
        }
    }

    fn schedule_probe(self: &Arc<Self>, runtime: &Handle, delay: Duration) {
        let tracker = Arc::downgrade(self);
        let token = self.shutdown.clone();

        let handle = runtime.spawn(async move {
            tokio::select! {
                _ = token.cancelled() => {}
                _ = tokio::time::sleep(delay) => {
                    if let Some(tracker) = tracker.upgrade() {
                        tracker.update();
                    }
                }
            }
        });

        if let Some(previous) = lock(&self.pending_probe).replace(handle) {
            previous.abort();
        }
    }

    /// Starts the periodic re-probe configured by `TrackerTiming::idle_refresh`.
    /// Must be called from within a tokio runtime.
    pub fn spawn_idle_refresh(self: &Arc<Self>) -> Option<JoinHandle<()>> {
        let period = self.timing.idle_refresh?;
        let tracker = Arc::downgrade(self);
        let token = self.shutdown.clone();

        Some(tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let Some(tracker) = tracker.upgrade() else {
                            break;
                        };
                        if !tracker.is_overlay_suppressed() {
                            tracker.update();
                        }
                    }
                    _ = token.cancelled() => {
                        log_info!("idle refresh loop shutting down");
                        break;
                    }
                }
            }
        }))
    }

    /// Stops pending and periodic probes and drops every listener.
    pub fn shutdown(&self) {
        self.shutdown.cancel();
        if let Some(pending) = lock(&self.pending_probe).take() {
            pending.abort();
        }
        lock(&self.listeners).clear();
    }

    fn notify(&self, context: &Context) {
        let listeners: Vec<ContextListener> = lock(&self.listeners)
            .iter()
            .map(|(_, listener)| listener.clone())
            .collect();

        for listener in listeners {
            if catch_unwind(AssertUnwindSafe(|| listener(context))).is_err() {
                log_error!("context listener panicked; continuing with remaining listeners");
            }
        }
    }
}

impl Drop for ContextTracker {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}
