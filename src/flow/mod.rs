//! Change notification infrastructure.
//!
//! Provides:
//! - Transaction-scoped notification queue with nesting and coalescing
//! - Notification sinks, including a broadcast bus for observers

pub mod notify;
pub mod queue;

pub use notify::{ChangeNotification, NotificationBus, NotificationSink, NullSink};
pub use queue::NotificationQueue;
