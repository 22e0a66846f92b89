//! Transaction-scoped change notification queue.
//!
//! A queue is either idle or inside a batch of some nesting depth. While a
//! batch is active, changed identifiers accumulate and coalesce. When the
//! outermost batch ends, the set is delivered to the sink exactly once, and
//! only if every level reported success.
//!
//! A queue belongs to the call frame that opened the outer transaction and
//! is never shared between threads.

use std::collections::BTreeSet;
use std::sync::Arc;

use super::notify::NotificationSink;

/// Nesting-aware change buffer for one outer transaction.
pub struct NotificationQueue {
    sink: Arc<dyn NotificationSink>,
    pending: BTreeSet<String>,
    depth: usize,
    success: bool,
}

impl NotificationQueue {
    pub fn new(sink: Arc<dyn NotificationSink>) -> Self {
        Self {
            sink,
            pending: BTreeSet::new(),
            depth: 0,
            success: true,
        }
    }

    /// True while any batch level is active.
    pub fn is_batch(&self) -> bool {
        self.depth > 0
    }

    pub fn depth(&self) -> usize {
        self.depth
    }

    /// Identifiers queued so far.
    pub fn pending(&self) -> &BTreeSet<String> {
        &self.pending
    }

    /// Enter a batch level. The outermost level starts from an empty set.
    pub fn start_batch(&mut self) {
        if self.depth == 0 {
            self.pending.clear();
            self.success = true;
        }
        self.depth += 1;
        tracing::trace!(depth = self.depth, "Notification batch started");
    }

    /// Record changed identifiers. Duplicates are absorbed.
    pub fn notify_changed<I, S>(&mut self, targets: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        if self.depth == 0 {
            let dropped: Vec<String> = targets.into_iter().map(Into::into).collect();
            tracing::warn!(?dropped, "Change notified outside a batch; dropping");
            return;
        }

        for target in targets {
            let target = target.into();
            tracing::trace!(%target, "Content changed");
            self.pending.insert(target);
        }
    }

    /// Leave a batch level.
    ///
    /// A failed level poisons the whole outer batch. Leaving the outermost
    /// level delivers the coalesced set unless poisoned or empty.
    pub fn end_batch(&mut self, success: bool) {
        if self.depth == 0 {
            tracing::warn!("end_batch called without an active batch; ignoring");
            return;
        }

        self.depth -= 1;
        if !success {
            self.success = false;
        }

        if self.depth > 0 {
            return;
        }

        let pending = std::mem::take(&mut self.pending);
        if self.success && !pending.is_empty() {
            tracing::debug!(targets = ?pending, "Sending content change notifications");
            self.sink.deliver(&pending);
        } else if !pending.is_empty() {
            tracing::debug!(discarded = pending.len(), "Batch failed; discarding change notifications");
        }
        self.success = true;
    }
}

impl Drop for NotificationQueue {
    fn drop(&mut self) {
        if self.depth > 0 {
            tracing::warn!(
                depth = self.depth,
                discarded = self.pending.len(),
                "Notification queue dropped inside a batch; discarding"
            );
        }
    }
}

impl std::fmt::Debug for NotificationQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NotificationQueue")
            .field("pending", &self.pending)
            .field("depth", &self.depth)
            .field("success", &self.success)
            .finish_non_exhaustive()
    }
}
