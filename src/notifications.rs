//! Alert inbox with optimistic local updates.
//!
//! Realtime alerts and read marks are applied locally right away. The next
//! [`NotificationFeed::refresh`] replaces the list with the server's copy,
//! which is the only reconciliation step.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::Error;
use crate::transport::Transport;
use crate::types::{AlertPayload, Notification, NotificationId};

const MY_NOTIFICATIONS_PATH: &str = "/notifications/my";

#[derive(Default)]
struct Inbox {
    items: Vec<Notification>,
    unread: usize,
}

/// Alert inbox of the logged-in user.
pub struct NotificationFeed {
    transport: Arc<Transport>,
    inbox: Mutex<Inbox>,
    local_seq: AtomicU64,
}

impl NotificationFeed {
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            inbox: Mutex::new(Inbox::default()),
            local_seq: AtomicU64::new(0),
        })
    }

    /// Newest first.
    #[must_use]
    pub fn notifications(&self) -> Vec<Notification> {
        self.inbox().items.clone()
    }

    /// Number of unread notifications.
    #[must_use]
    pub fn unread_count(&self) -> usize {
        self.inbox().unread
    }

    fn inbox(&self) -> std::sync::MutexGuard<'_, Inbox> {
        self.inbox.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Replace the inbox with the server's list.
    ///
    /// # Errors
    ///
    /// Transport or decode errors; the local inbox is left as it was.
    pub async fn refresh(&self) -> Result<(), Error> {
        let items: Vec<Notification> = self
            .transport
            .get(MY_NOTIFICATIONS_PATH)
            .await
            .and_then(|response| response.data())
            .inspect_err(|e| tracing::error!(error = %e, "Failed to fetch notifications"))?;
        let unread = items.iter().filter(|n| !n.is_read).count();

        let mut inbox = self.inbox();
        let pending_local = inbox.items.iter().filter(|n| n.id.is_local()).count();
        if pending_local > 0 || inbox.unread != unread {
            tracing::debug!(
                pending_local,
                local_unread = inbox.unread,
                server_unread = unread,
                "Notification inbox reconciled with server"
            );
        }
        inbox.items = items;
        inbox.unread = unread;
        Ok(())
    }

    /// Record an alert pushed over the realtime channel.
    pub fn apply_alert(&self, alert: AlertPayload) -> NotificationId {
        let id = NotificationId::local(self.local_seq.fetch_add(1, Ordering::Relaxed) + 1);
        let notification = Notification {
            id: id.clone(),
            message: alert.message,
            is_read: false,
            created_at: time::OffsetDateTime::now_utc(),
        };

        let mut inbox = self.inbox();
        inbox.items.insert(0, notification);
        inbox.unread += 1;
        id
    }

    /// Mark one notification read, locally first, then on the server.
    ///
    /// Ids that only exist locally are not sent; the next refresh brings the
    /// server's id and read state.
    ///
    /// # Errors
    ///
    /// Transport errors from the server call. The local mark is kept until the
    /// next refresh.
    pub async fn mark_read(&self, id: &NotificationId) -> Result<(), Error> {
        {
            let mut inbox = self.inbox();
            let Some(item) = inbox.items.iter_mut().find(|n| n.id == *id) else {
                return Ok(());
            };
            if item.is_read {
                return Ok(());
            }
            item.is_read = true;
            inbox.unread = inbox.unread.saturating_sub(1);
        }

        if id.is_local() {
            return Ok(());
        }

        let path = format!("/notifications/{}/read", urlencoding::encode(&id.0));
        self.transport
            .put_empty(&path)
            .await
            .inspect_err(|e| tracing::error!(id = %id, error = %e, "Failed to mark notification read"))?;
        Ok(())
    }

    /// Feed `NEW_ALERT` events from `connection` into this inbox.
    #[cfg(feature = "realtime")]
    pub fn attach(
        self: &Arc<Self>,
        connection: &crate::realtime::RealtimeConnection,
    ) -> crate::realtime::SubscriptionId {
        let feed = Arc::downgrade(self);
        connection.on(crate::realtime::NEW_ALERT, move |payload| {
            let Some(feed) = feed.upgrade() else { return };
            match serde_json::from_value::<AlertPayload>(payload.clone()) {
                Ok(alert) => {
                    feed.apply_alert(alert);
                }
                Err(e) => tracing::warn!(error = %e, "Malformed alert payload"),
            }
        })
    }

    /// Stop feeding `NEW_ALERT` events from `connection`.
    #[cfg(feature = "realtime")]
    pub fn detach(
        &self,
        connection: &crate::realtime::RealtimeConnection,
        subscription: crate::realtime::SubscriptionId,
    ) -> bool {
        connection.off(crate::realtime::NEW_ALERT, subscription)
    }
}
