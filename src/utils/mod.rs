use std::sync::{Mutex, MutexGuard};

pub mod logging;
pub(crate) mod notices;
pub mod subscription;

pub use logging::init_logging;
pub(crate) use notices::NoticeQueue;
pub use subscription::{Subscription, SubscriptionSet};

/// Locks a std mutex, recovering the guard if a panicking holder poisoned it.
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}
