use std::fmt;

type Disposer = Box<dyn FnOnce() + Send + 'static>;

/// Handle returned by every `subscribe`-style call in the crate.
///
/// Disposing runs the registered teardown exactly once; dropping an
/// undisposed subscription disposes it.
#[must_use = "dropping a Subscription immediately unsubscribes"]
pub struct Subscription {
    disposer: Option<Disposer>,
}

impl Subscription {
    pub fn new<F>(disposer: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            disposer: Some(Box::new(disposer)),
        }
    }

    /// A subscription with nothing to tear down.
    pub fn noop() -> Self {
        Self { disposer: None }
    }

    pub fn is_active(&self) -> bool {
        self.disposer.is_some()
    }

    pub fn dispose(&mut self) {
        if let Some(disposer) = self.disposer.take() {
            disposer();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("active", &self.is_active())
            .finish()
    }
}

/// Owns every subscription a component made so teardown is one call.
#[derive(Debug, Default)]
pub struct SubscriptionSet {
    subscriptions: Vec<Subscription>,
}

impl SubscriptionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, subscription: Subscription) {
        self.subscriptions.push(subscription);
    }

    /// Takes ownership of everything `other` holds.
    pub fn merge(&mut self, mut other: SubscriptionSet) {
        self.subscriptions.append(&mut other.subscriptions);
    }

    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Disposes in reverse registration order.
    pub fn dispose_all(&mut self) {
        while let Some(mut subscription) = self.subscriptions.pop() {
            subscription.dispose();
        }
    }
}

impl Drop for SubscriptionSet {
    fn drop(&mut self) {
        self.dispose_all();
    }
}
