use std::{
    convert::Infallible,
    sync::{Arc, PoisonError, RwLock},
};

use {
    async_trait::async_trait,
    axum::{
        extract::State,
        response::sse::{Event, KeepAlive, Sse},
    },
    fittrack_reminders::{Notification, Notifier, Permission, ReminderError},
    tokio::sync::broadcast,
    tokio_stream::{
        Stream, StreamExt,
        wrappers::{BroadcastStream, errors::BroadcastStreamRecvError},
    },
    tracing::{debug, warn},
};

use crate::state::GatewayState;

/// Fans reminder notifications out to connected SSE clients. Permission
/// stays `Default` until a client grants or denies it.
pub struct BroadcastNotifier {
    tx: broadcast::Sender<Notification>,
    permission: RwLock<Permission>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (tx, _rx) = broadcast::channel(capacity);
        Self {
            tx,
            permission: RwLock::new(Permission::Default),
        }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.tx.subscribe()
    }

    pub fn set_permission(&self, permission: Permission) {
        *self
            .permission
            .write()
            .unwrap_or_else(PoisonError::into_inner) = permission;
    }
}

#[async_trait]
impl Notifier for BroadcastNotifier {
    fn permission(&self) -> Permission {
        *self
            .permission
            .read()
            .unwrap_or_else(PoisonError::into_inner)
    }

    async fn request_permission(&self) -> Permission {
        // The browser answers through the permission endpoint; nothing to prompt here.
        self.permission()
    }

    async fn notify(&self, notification: &Notification) -> Result<(), ReminderError> {
        match self.tx.send(notification.clone()) {
            Ok(receivers) => {
                debug!(receivers, kind = %notification.kind, "notification broadcast");
                Ok(())
            },
            Err(_) => Err(ReminderError::Delivery("no connected clients".into())),
        }
    }
}

/// `GET /api/notifications/stream`
pub async fn stream(
    State(state): State<Arc<GatewayState>>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let events = BroadcastStream::new(state.notifier.subscribe()).filter_map(|item| match item {
        Ok(notification) => Event::default()
            .event("reminder")
            .json_data(&notification)
            .ok()
            .map(Ok),
        Err(BroadcastStreamRecvError::Lagged(skipped)) => {
            warn!(skipped, "notification stream lagged");
            None
        },
    });
    Sse::new(events).keep_alive(KeepAlive::default())
}
