use std::{
    panic::{catch_unwind, AssertUnwindSafe},
    sync::Arc,
};

use serde_json::Value;
use tokio::{runtime::Handle, sync::broadcast::error::RecvError};

use crate::utils::Subscription;

use super::{
    hub::{SettingsHub, SurfaceId},
    keys::SettingField,
};

// Set to true to enable verbose logging in this module
const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeliveryPath {
    Storage,
    Message,
}

/// Subscribe side of settings sync for one surface.
///
/// Every subscription listens on two independent paths: persisted-storage
/// changes (seen by all surfaces, writer included) and direct messages
/// (sent by a writer to every other surface). A change can therefore be
/// delivered twice; callbacks must tolerate seeing the same value again.
/// Each path delivers writes to one key in the order they were made.
#[derive(Clone)]
pub struct SettingsSyncChannel {
    hub: Arc<SettingsHub>,
    surface: SurfaceId,
}

impl SettingsSyncChannel {
    pub(crate) fn new(hub: Arc<SettingsHub>, surface: SurfaceId) -> Self {
        Self { hub, surface }
    }

    /// Registers `callback` for changes to field `F`. Both receivers exist
    /// before this returns, so no later write is missed. Needs a tokio
    /// runtime; without one the subscription is inert.
    pub fn subscribe<F, C>(&self, callback: C) -> Subscription
    where
        F: SettingField,
        C: Fn(F::Value) + Send + Sync + 'static,
    {
        let runtime = match Handle::try_current() {
            Ok(runtime) => runtime,
            Err(_) => {
                log_error!(
                    "cannot subscribe to {} outside a tokio runtime",
                    F::KEY.storage_key()
                );
                return Subscription::noop();
            }
        };

        let callback: Arc<dyn Fn(F::Value) + Send + Sync> = Arc::new(callback);

        let mut storage_rx = self.hub.storage_events();
        let storage_cb = callback.clone();
        let storage_task = runtime.spawn(async move {
            loop {
                match storage_rx.recv().await {
                    Ok(change) if change.key == F::KEY => {
                        deliver::<F>(storage_cb.as_ref(), &change.new_value, DeliveryPath::Storage);
                    }
                    Ok(_) => {}
                    Err(RecvError::Lagged(skipped)) => {
                        log_warn!("storage listener for {} lagged by {skipped}", F::KEY.storage_key());
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });

        let message_task = self.hub.mailbox(self.surface).map(|mut mailbox| {
            let message_cb = callback.clone();
            runtime.spawn(async move {
                loop {
                    match mailbox.recv().await {
                        Ok(message) if message.key == F::KEY => {
                            deliver::<F>(message_cb.as_ref(), &message.value, DeliveryPath::Message);
                        }
                        Ok(_) => {}
                        Err(RecvError::Lagged(skipped)) => {
                            log_warn!("message listener for {} lagged by {skipped}", F::KEY.message_type());
                        }
                        Err(RecvError::Closed) => break,
                    }
                }
            })
        });
        if message_task.is_none() {
            log_debug!(
                "surface {} is disconnected; {} relies on storage events only",
                self.surface,
                F::KEY.storage_key()
            );
        }

        Subscription::new(move || {
            storage_task.abort();
            if let Some(task) = message_task {
                task.abort();
            }
        })
    }
}

fn deliver<F: SettingField>(
    callback: &(dyn Fn(F::Value) + Send + Sync),
    raw: &Value,
    path: DeliveryPath,
) {
    let Some(value) = F::decode(raw) else {
        log_warn!("ignoring undecodable {} value {raw} ({path:?})", F::KEY.storage_key());
        return;
    };

    log_debug!("{} -> {value:?} via {path:?}", F::KEY.storage_key());
    if catch_unwind(AssertUnwindSafe(|| callback(value))).is_err() {
        log_error!("settings listener for {} panicked", F::KEY.storage_key());
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Mutex, time::Duration};

    use super::*;
    use crate::settings::{
        ExtensionEnabled, OverlayVisible, SettingsHub, SurfaceKind, XrayIssueCount,
    };

    fn recorder<T: Send + 'static>() -> (Arc<Mutex<Vec<T>>>, impl Fn(T) + Send + Sync + 'static) {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        (seen, move |value| sink.lock().unwrap().push(value))
    }

    async fn settle() {
        tokio::time::sleep(Duration::from_millis(1)).await;
    }

    #[tokio::test(start_paused = true)]
    async fn other_surface_hears_both_paths() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(1));
        let (seen, callback) = recorder::<bool>();
        let _sub = tab.channel().subscribe::<OverlayVisible, _>(callback);

        assert!(popup.store().set::<OverlayVisible>(false).await);
        settle().await;

        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen, vec![false, false]);
    }

    #[tokio::test(start_paused = true)]
    async fn writer_converges_through_storage_alone() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let (seen, callback) = recorder::<bool>();
        let _sub = popup.channel().subscribe::<ExtensionEnabled, _>(callback);

        assert!(popup.store().set::<ExtensionEnabled>(false).await);
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![false]);
    }

    #[tokio::test(start_paused = true)]
    async fn same_key_writes_arrive_in_order() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(9));
        let (seen, callback) = recorder::<u32>();
        let _sub = tab.channel().subscribe::<XrayIssueCount, _>(callback);

        for count in 1..=5 {
            assert!(popup.store().set::<XrayIssueCount>(count).await);
        }
        settle().await;

        // The two paths interleave freely, but each one alone must replay
        // 1..=5 in order.
        let seen = seen.lock().unwrap().clone();
        assert_eq!(seen.len(), 10);
        assert!(is_merge_of_two_runs(&seen, 5));
    }

    fn is_merge_of_two_runs(seen: &[u32], last: u32) -> bool {
        let (mut a, mut b) = (0, 0);
        for &value in seen {
            if value == a + 1 {
                a = value;
            } else if value == b + 1 {
                b = value;
            } else {
                return false;
            }
        }
        a == last && b == last
    }

    #[tokio::test(start_paused = true)]
    async fn other_fields_are_filtered() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(1));
        let (seen, callback) = recorder::<bool>();
        let _sub = tab.channel().subscribe::<ExtensionEnabled, _>(callback);

        popup.store().set::<OverlayVisible>(false).await;
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn disposed_subscription_goes_quiet() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let tab = hub.connect(SurfaceKind::Tab(1));
        let (seen, callback) = recorder::<bool>();
        let mut sub = tab.channel().subscribe::<ExtensionEnabled, _>(callback);

        sub.dispose();
        popup.store().set::<ExtensionEnabled>(false).await;
        settle().await;
        assert!(seen.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_callback_does_not_kill_the_listener() {
        let hub = SettingsHub::in_memory();
        let popup = hub.connect(SurfaceKind::Popup);
        let (seen, record) = recorder::<u32>();
        let _sub = popup.channel().subscribe::<XrayIssueCount, _>(move |count| {
            record(count);
            if count == 1 {
                panic!("render failed");
            }
        });

        popup.store().set::<XrayIssueCount>(1).await;
        settle().await;
        popup.store().set::<XrayIssueCount>(2).await;
        settle().await;

        assert_eq!(*seen.lock().unwrap(), vec![1, 2]);
    }

    #[test]
    fn subscribe_outside_runtime_is_inert() {
        let hub = SettingsHub::in_memory();
        let tab = hub.connect(SurfaceKind::Tab(1));
        let sub = tab.channel().subscribe::<ExtensionEnabled, _>(|_| {});
        assert!(!sub.is_active());
    }
}
