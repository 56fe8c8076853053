use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use reqwest::cookie::CookieStore;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use super::connection::{ReconnectPolicy, RealtimeConnection};
use crate::session::SessionState;
use crate::transport::Transport;
use crate::types::UserId;

struct Bound {
    user_id: UserId,
    connection: Arc<RealtimeConnection>,
}

/// Keeps exactly one realtime connection alive while a session exists.
///
/// The connection presents the same cookie the [`Transport`] uses; no
/// credential is handed over explicitly.
pub struct RealtimeBinder {
    transport: Arc<Transport>,
    current: Mutex<Option<Bound>>,
    serial: AtomicU64,
}

impl RealtimeBinder {
    /// Binder with no connection.
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Arc<Self> {
        Arc::new(Self {
            transport,
            current: Mutex::new(None),
            serial: AtomicU64::new(0),
        })
    }

    /// The live connection, if a session is bound.
    #[must_use]
    pub fn connection(&self) -> Option<Arc<RealtimeConnection>> {
        self.current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .map(|bound| Arc::clone(&bound.connection))
    }

    /// Bring the connection in line with `state`.
    pub fn sync(&self, state: &SessionState) {
        match &state.user {
            Some(session) => {
                self.connect(&session.id);
            }
            None => self.disconnect(),
        }
    }

    /// Open a connection for `user_id`. Returns `true` if a new connection was
    /// opened, `false` if one was already live for the same user.
    ///
    /// A connection bound to a different user is closed first. One whose driver
    /// gave up after exhausting its retries is replaced.
    pub fn connect(&self, user_id: &UserId) -> bool {
        let mut current = self.current.lock().unwrap_or_else(PoisonError::into_inner);

        if let Some(bound) = current.as_ref() {
            if bound.user_id == *user_id && !bound.connection.is_closed() {
                return false;
            }
        }
        if let Some(stale) = current.take() {
            stale.connection.close();
        }

        let config = self.transport.config();
        let url = match config.realtime_url() {
            Ok(url) => url,
            Err(e) => {
                tracing::error!(error = %e, "Realtime address unavailable");
                return false;
            }
        };
        let cookie = self.transport.cookie_jar().cookies(config.api_url());
        let policy = ReconnectPolicy {
            attempts: config.reconnect_attempts(),
            delay: config.reconnect_delay(),
        };

        let serial = self.serial.fetch_add(1, Ordering::Relaxed) + 1;
        tracing::info!(serial, user_id = %user_id, url = %url, "Opening realtime connection");
        *current = Some(Bound {
            user_id: user_id.clone(),
            connection: RealtimeConnection::open(serial, url, cookie, policy),
        });
        true
    }

    /// Close and drop the connection, if any.
    pub fn disconnect(&self) {
        let bound = self
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(bound) = bound {
            tracing::info!(serial = bound.connection.serial(), "Closing realtime connection");
            bound.connection.close();
        }
    }

    /// Follow session changes until the store goes away.
    #[must_use]
    pub fn bind(self: &Arc<Self>, mut sessions: watch::Receiver<SessionState>) -> JoinHandle<()> {
        let binder = Arc::clone(self);
        tokio::spawn(async move {
            loop {
                let state = sessions.borrow_and_update().clone();
                binder.sync(&state);
                if sessions.changed().await.is_err() {
                    break;
                }
            }
        })
    }
}
