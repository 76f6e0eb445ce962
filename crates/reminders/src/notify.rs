use {
    async_trait::async_trait,
    chrono::{DateTime, Utc},
    serde::{Deserialize, Serialize},
    tracing::info,
};

use crate::{error::ReminderError, types::ReminderKind};

/// Host permission to show notifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Permission {
    Granted,
    Denied,
    /// Not decided yet; asking is allowed.
    Default,
}

/// A notification ready to display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    pub kind: ReminderKind,
    pub title: String,
    pub body: String,
    pub fired_at: DateTime<Utc>,
}

impl Notification {
    pub fn reminder(kind: ReminderKind, fired_at: DateTime<Utc>) -> Self {
        Self {
            kind,
            title: kind.title().to_string(),
            body: kind.body().to_string(),
            fired_at,
        }
    }
}

/// Displays notifications on behalf of the reminder loop.
#[async_trait]
pub trait Notifier: Send + Sync {
    fn permission(&self) -> Permission;

    /// Ask the host for permission; returns the resulting state.
    async fn request_permission(&self) -> Permission;

    async fn notify(&self, notification: &Notification) -> Result<(), ReminderError>;
}

/// Writes notifications to the log. Always permitted.
#[derive(Debug, Default)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    fn permission(&self) -> Permission {
        Permission::Granted
    }

    async fn request_permission(&self) -> Permission {
        Permission::Granted
    }

    async fn notify(&self, notification: &Notification) -> Result<(), ReminderError> {
        info!(
            kind = %notification.kind,
            title = %notification.title,
            body = %notification.body,
            "reminder"
        );
        Ok(())
    }
}
