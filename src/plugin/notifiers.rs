//! Notifier implementations

use super::{Notification, NotificationLevel, Notifier};
use tracing::{error, info, warn};

/// Writes notifications to the log
#[derive(Debug, Clone, Default)]
pub struct LogNotifier {
    channel: String,
}

impl LogNotifier {
    pub fn new(channel: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
        }
    }
}

impl Notifier for LogNotifier {
    fn notify(&self, notification: &Notification) {
        let mut details: Vec<String> = notification
            .metadata
            .iter()
            .map(|(k, v)| format!("{}={}", k, v))
            .collect();
        details.sort();
        let details = details.join(" ");

        match notification.level {
            NotificationLevel::Info => info!(
                "[{}] {}: {} {}",
                self.channel, notification.title, notification.message, details
            ),
            NotificationLevel::Warning => warn!(
                "[{}] {}: {} {}",
                self.channel, notification.title, notification.message, details
            ),
            NotificationLevel::Error => error!(
                "[{}] {}: {} {}",
                self.channel, notification.title, notification.message, details
            ),
        }
    }
}
