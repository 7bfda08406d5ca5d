//! Fire-and-forget notifications.
//!
//! A thin wrapper over a tokio broadcast channel. Publishing never fails
//! and never blocks; slow subscribers lose old messages.

use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::sync::broadcast;

const DEFAULT_CAPACITY: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NotificationLevel {
    Info,
    Success,
    Warning,
    Error,
}

/// A transient message for the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub level: NotificationLevel,
    pub message: String,
    /// How long the message should stay visible.
    pub duration: Duration,
}

/// Broadcasts notifications to any number of subscribers.
#[derive(Debug, Clone)]
pub struct NotificationBus {
    sender: broadcast::Sender<Notification>,
}

impl Default for NotificationBus {
    fn default() -> Self {
        Self::new()
    }
}

impl NotificationBus {
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender }
    }

    /// Subscribes to notifications published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    pub fn publish(
        &self,
        level: NotificationLevel,
        message: impl Into<String>,
        duration: Duration,
    ) {
        let notification = Notification {
            level,
            message: message.into(),
            duration,
        };
        // No subscribers is fine.
        let _ = self.sender.send(notification);
    }

    pub fn info(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Info, message, Duration::from_millis(3000));
    }

    pub fn success(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Success, message, Duration::from_millis(3000));
    }

    pub fn warning(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Warning, message, Duration::from_millis(4000));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.publish(NotificationLevel::Error, message, Duration::from_millis(5000));
    }
}
