//! Change notification delivery.
//!
//! - [`NotificationSink`]: where committed change sets go
//! - [`NotificationBus`]: a `tokio::sync::broadcast` fan-out sink
//!
//! Observers subscribe to the bus and wake when a committed transaction
//! touched an identifier they watch.

use std::collections::BTreeSet;

use tokio::sync::broadcast::{self, Receiver, Sender};

/// Receives the coalesced set of changed identifiers for one committed
/// transaction.
///
/// `deliver` is called at most once per committed transaction, never for an
/// aborted one and never with an empty set. It may be called concurrently
/// from every thread that commits.
pub trait NotificationSink: Send + Sync {
    fn deliver(&self, targets: &BTreeSet<String>);
}

/// Sink that drops every notification.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl NotificationSink for NullSink {
    fn deliver(&self, _targets: &BTreeSet<String>) {}
}

/// One committed change set.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotification {
    pub targets: BTreeSet<String>,
}

impl ChangeNotification {
    pub fn contains(&self, target: &str) -> bool {
        self.targets.contains(target)
    }
}

/// Notification bus for observers of committed changes.
#[derive(Clone)]
pub struct NotificationBus {
    sender: Sender<ChangeNotification>,
}

impl NotificationBus {
    /// Create a new notification bus with the given capacity.
    ///
    /// # Arguments
    ///
    /// * `capacity` - Maximum number of buffered notifications.
    ///   Older notifications are dropped if observers fall behind.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Subscribe to notifications committed from now on.
    pub fn subscribe(&self) -> Receiver<ChangeNotification> {
        self.sender.subscribe()
    }

    /// Get the number of active receivers.
    #[must_use]
    pub fn receiver_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

impl NotificationSink for NotificationBus {
    fn deliver(&self, targets: &BTreeSet<String>) {
        // send() fails only when nobody is listening, which is fine
        let receivers = self
            .sender
            .send(ChangeNotification {
                targets: targets.clone(),
            })
            .unwrap_or(0);
        tracing::debug!(targets = targets.len(), receivers, "Delivered change notification");
    }
}
