//! Notification bridge
//!
//! Status narration only. The coordinator never depends on how (or whether)
//! a notification is rendered.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::{error, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationKind {
    Info,
    Success,
    Warning,
    Error,
}

/// Identifies an actionable notification so it can be dismissed later
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NotificationId(pub u64);

/// Buttons offered on an actionable notification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum NotificationAction {
    Publish,
    Dismiss,
}

impl fmt::Display for NotificationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotificationAction::Publish => write!(f, "Publish"),
            NotificationAction::Dismiss => write!(f, "Dismiss"),
        }
    }
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, kind: NotificationKind);
    fn notify_with_actions(&self, message: &str, actions: &[NotificationAction]) -> NotificationId;
    fn dismiss(&self, id: NotificationId);
}

/// Narrates notifications through `tracing`
#[derive(Debug, Default)]
pub struct TracingNotifier {
    next_id: AtomicU64,
}

impl TracingNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, kind: NotificationKind) {
        match kind {
            NotificationKind::Info | NotificationKind::Success => info!(?kind, "{}", message),
            NotificationKind::Warning => warn!("{}", message),
            NotificationKind::Error => error!("{}", message),
        }
    }

    fn notify_with_actions(&self, message: &str, actions: &[NotificationAction]) -> NotificationId {
        let id = NotificationId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let labels: Vec<String> = actions.iter().map(|a| a.to_string()).collect();
        info!(id = id.0, actions = ?labels, "{}", message);
        id
    }

    fn dismiss(&self, id: NotificationId) {
        info!(id = id.0, "Notification dismissed");
    }
}
