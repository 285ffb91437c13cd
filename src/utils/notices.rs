use std::collections::VecDeque;

/// Listener notifications committed under an owner's state lock and
/// delivered outside it, one drainer at a time, in commit order.
///
/// The owner pushes while holding its lock, then calls `begin`. Whoever
/// gets `true` drains with `next`, re-taking the lock for each item,
/// until it returns `None`. Notices pushed meanwhile (from other threads
/// or from inside a listener) are delivered by that same drain.
#[derive(Debug)]
pub(crate) struct NoticeQueue<T> {
    pending: VecDeque<T>,
    draining: bool,
}

impl<T> Default for NoticeQueue<T> {
    fn default() -> Self {
        Self {
            pending: VecDeque::new(),
            draining: false,
        }
    }
}

impl<T> NoticeQueue<T> {
    pub(crate) fn push(&mut self, notice: T) {
        self.pending.push_back(notice);
    }

    /// Claims the drain. `false` if nothing is queued or someone else holds it.
    pub(crate) fn begin(&mut self) -> bool {
        if self.draining || self.pending.is_empty() {
            return false;
        }
        self.draining = true;
        true
    }

    /// Next notice for the current drainer; releases the claim once empty.
    pub(crate) fn next(&mut self) -> Option<T> {
        let next = self.pending.pop_front();
        if next.is_none() {
            self.draining = false;
        }
        next
    }
}
