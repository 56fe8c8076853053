use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};
use std::time::Duration;

use derive_more::Display;
use futures_util::{SinkExt, StreamExt};
use reqwest::header::{COOKIE, HeaderValue};
use serde_json::Value as JsonValue;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use url::Url;

use super::packet::Packet;
use crate::error::Error;

type Handler = Arc<dyn Fn(&JsonValue) + Send + Sync>;

/// Handle returned by [`RealtimeConnection::on`], used to unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
pub struct SubscriptionId(u64);

/// Lifecycle of a [`RealtimeConnection`]. `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    Reconnecting,
    Closed,
}

/// Bounded reconnection: `attempts` retries after the first failure, each
/// after the same fixed `delay`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectPolicy {
    pub attempts: u32,
    pub delay: Duration,
}

/// A live Socket.IO connection.
///
/// Only the [`RealtimeBinder`](super::RealtimeBinder) creates or closes one;
/// consumers hold an `Arc` to subscribe to events. A new object is issued for
/// every login, so subscriptions never carry over a logout.
pub struct RealtimeConnection {
    serial: u64,
    handlers: Mutex<HashMap<String, Vec<(SubscriptionId, Handler)>>>,
    // Held shared while handlers run; `close` takes it exclusively.
    dispatching: RwLock<()>,
    next_subscription: AtomicU64,
    status: watch::Sender<ConnectionStatus>,
    driver: Mutex<Option<JoinHandle<()>>>,
}

impl std::fmt::Debug for RealtimeConnection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeConnection")
            .field("serial", &self.serial)
            .field("status", &self.status())
            .finish_non_exhaustive()
    }
}

impl RealtimeConnection {
    /// Create the connection object and start its background driver.
    /// Must be called inside a Tokio runtime.
    pub(crate) fn open(
        serial: u64,
        url: Url,
        cookie: Option<HeaderValue>,
        policy: ReconnectPolicy,
    ) -> Arc<Self> {
        let (status, _) = watch::channel(ConnectionStatus::Connecting);
        let connection = Arc::new(Self {
            serial,
            handlers: Mutex::new(HashMap::new()),
            dispatching: RwLock::new(()),
            next_subscription: AtomicU64::new(1),
            status,
            driver: Mutex::new(None),
        });

        let driver = Driver {
            connection: Arc::downgrade(&connection),
            url,
            cookie,
            policy,
        };
        let handle = tokio::spawn(driver.run());
        *connection.driver.lock().unwrap_or_else(PoisonError::into_inner) = Some(handle);

        connection
    }

    /// Distinguishes connection objects across logout/login cycles.
    #[must_use]
    pub fn serial(&self) -> u64 {
        self.serial
    }

    /// Current status.
    #[must_use]
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Whether the connection was closed or gave up reconnecting.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.status() == ConnectionStatus::Closed
    }

    /// Observe status changes.
    #[must_use]
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    /// Register `handler` for `event`.
    ///
    /// Handlers run synchronously on the connection's driver task. A handler
    /// must not call back into the [`RealtimeBinder`](super::RealtimeBinder)
    /// or end the session; closing waits for running handlers and would never
    /// complete.
    pub fn on<F>(&self, event: &str, handler: F) -> SubscriptionId
    where
        F: Fn(&JsonValue) + Send + Sync + 'static,
    {
        let id = SubscriptionId(self.next_subscription.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(event.to_string())
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    /// Remove a handler. Returns `false` if it was not registered.
    pub fn off(&self, event: &str, id: SubscriptionId) -> bool {
        let mut handlers = self.handlers.lock().unwrap_or_else(PoisonError::into_inner);
        let Some(list) = handlers.get_mut(event) else {
            return false;
        };
        let before = list.len();
        list.retain(|(sub, _)| *sub != id);
        let removed = list.len() != before;
        if list.is_empty() {
            handlers.remove(event);
        }
        removed
    }

    /// Number of handlers registered for `event`.
    #[must_use]
    pub fn handler_count(&self, event: &str) -> usize {
        self.handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map_or(0, Vec::len)
    }

    /// Stop the driver. No handler runs after this returns.
    ///
    /// Blocks until a dispatch already running on another thread has finished
    /// its current handler.
    pub(crate) fn close(&self) {
        self.status.send_replace(ConnectionStatus::Closed);
        drop(
            self.dispatching
                .write()
                .unwrap_or_else(PoisonError::into_inner),
        );
        if let Some(handle) = self
            .driver
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
        tracing::debug!(serial = self.serial, "Realtime connection closed");
    }

    fn set_status(&self, status: ConnectionStatus) {
        self.status.send_if_modified(|current| {
            // Closed is terminal.
            if *current == ConnectionStatus::Closed || *current == status {
                return false;
            }
            *current = status;
            true
        });
    }

    pub(crate) fn dispatch(&self, event: &str, payload: &JsonValue) {
        let _running = self
            .dispatching
            .read()
            .unwrap_or_else(PoisonError::into_inner);
        if self.is_closed() {
            return;
        }
        let handlers: Vec<Handler> = self
            .handlers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(event)
            .map(|list| list.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::trace!(event = %event, "Realtime event without subscribers");
        }
        for handler in handlers {
            if self.is_closed() {
                tracing::debug!(serial = self.serial, event = %event, "Dropping event after close");
                break;
            }
            handler(payload);
        }
    }
}

impl Drop for RealtimeConnection {
    fn drop(&mut self) {
        if let Some(handle) = self
            .driver
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            handle.abort();
        }
    }
}

enum Exit {
    /// Server sent a namespace disconnect; do not reconnect.
    ServerDisconnect,
    /// An established connection dropped; reconnect with a fresh budget.
    Dropped,
    /// The connection object is gone.
    Released,
}

struct Driver {
    connection: Weak<RealtimeConnection>,
    url: Url,
    cookie: Option<HeaderValue>,
    policy: ReconnectPolicy,
}

impl Driver {
    async fn run(self) {
        let mut failures = 0u32;

        loop {
            match self.connect_and_listen().await {
                Ok(Exit::ServerDisconnect) => {
                    tracing::info!(url = %self.url, "Server closed realtime namespace");
                    break;
                }
                Ok(Exit::Released) => return,
                Ok(Exit::Dropped) => {
                    failures = 0;
                    tracing::warn!(url = %self.url, "Realtime connection lost");
                }
                Err(e) => {
                    failures += 1;
                    if failures > self.policy.attempts {
                        tracing::error!(
                            error = %e,
                            attempts = self.policy.attempts,
                            "Realtime reconnection attempts exhausted"
                        );
                        break;
                    }
                    tracing::warn!(error = %e, attempt = failures, "Realtime connect failed");
                }
            }

            if !self.set_status(ConnectionStatus::Reconnecting) {
                return;
            }
            sleep(self.policy.delay).await;
        }

        self.set_status(ConnectionStatus::Closed);
    }

    /// Returns `false` once the connection object has been dropped.
    fn set_status(&self, status: ConnectionStatus) -> bool {
        match self.connection.upgrade() {
            Some(connection) => {
                connection.set_status(status);
                true
            }
            None => false,
        }
    }

    async fn connect_and_listen(&self) -> Result<Exit, Error> {
        let mut request = self
            .url
            .as_str()
            .into_client_request()
            .map_err(|e| Error::Realtime(format!("bad realtime URL: {e}")))?;
        if let Some(cookie) = &self.cookie {
            request.headers_mut().insert(COOKIE, cookie.clone());
        }

        let (stream, _) = connect_async(request)
            .await
            .map_err(|e| Error::Realtime(format!("WebSocket connect failed: {e}")))?;
        let (mut write, mut read) = stream.split();
        let mut connected = false;

        while let Some(message) = read.next().await {
            let message = match message {
                Ok(message) => message,
                Err(e) => return lost(connected, format!("WebSocket error: {e}")),
            };

            let text = match message {
                Message::Text(text) => text,
                Message::Close(_) => return lost(connected, "closed by server".into()),
                _ => continue,
            };

            match Packet::decode(&text) {
                Ok(Packet::Open(handshake)) => {
                    tracing::debug!(sid = %handshake.sid, "Engine.IO handshake");
                    write
                        .send(Message::Text(Packet::Connect.encode()))
                        .await
                        .map_err(|e| Error::Realtime(format!("namespace connect failed: {e}")))?;
                }
                Ok(Packet::Ping) => {
                    if let Err(e) = write.send(Message::Text(Packet::Pong.encode())).await {
                        return lost(connected, format!("pong failed: {e}"));
                    }
                }
                Ok(Packet::Connect) => {
                    connected = true;
                    if !self.set_status(ConnectionStatus::Connected) {
                        return Ok(Exit::Released);
                    }
                    tracing::info!(url = %self.url, "Realtime connected");
                }
                Ok(Packet::Event { name, payload }) => {
                    let Some(connection) = self.connection.upgrade() else {
                        return Ok(Exit::Released);
                    };
                    connection.dispatch(&name, &payload);
                }
                Ok(Packet::Disconnect) => return Ok(Exit::ServerDisconnect),
                Ok(Packet::Close) => return lost(connected, "transport closed".into()),
                Ok(Packet::ConnectError(detail)) => {
                    return Err(Error::Realtime(format!("connect rejected: {detail}")));
                }
                Ok(Packet::Pong | Packet::Noop | Packet::Ack) => {}
                Err(e) => tracing::debug!(error = %e, "Ignoring realtime frame"),
            }
        }

        lost(connected, "stream ended".into())
    }
}

fn lost(connected: bool, reason: String) -> Result<Exit, Error> {
    if connected {
        tracing::debug!(reason = %reason, "Realtime stream ended");
        Ok(Exit::Dropped)
    } else {
        Err(Error::Realtime(reason))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    fn unreachable_connection(attempts: u32, delay: Duration) -> Arc<RealtimeConnection> {
        RealtimeConnection::open(
            1,
            "ws://127.0.0.1:9/socket.io/?EIO=4&transport=websocket".parse().unwrap(),
            None,
            ReconnectPolicy { attempts, delay },
        )
    }

    #[tokio::test]
    async fn on_and_off_manage_handlers() {
        let connection = unreachable_connection(100, Duration::from_secs(60));
        let first = connection.on("NEW_ALERT", |_| {});
        let second = connection.on("NEW_ALERT", |_| {});
        assert_ne!(first, second);
        assert_eq!(connection.handler_count("NEW_ALERT"), 2);

        assert!(connection.off("NEW_ALERT", first));
        assert!(!connection.off("NEW_ALERT", first));
        assert!(!connection.off("OTHER", second));
        assert_eq!(connection.handler_count("NEW_ALERT"), 1);
        connection.close();
    }

    #[tokio::test]
    async fn dispatch_stops_after_close() {
        let connection = unreachable_connection(100, Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        connection.on("NEW_ALERT", {
            let calls = Arc::clone(&calls);
            move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        connection.dispatch("NEW_ALERT", &JsonValue::Null);
        connection.close();
        connection.dispatch("NEW_ALERT", &JsonValue::Null);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(connection.is_closed());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn close_waits_for_running_handler_and_skips_the_rest() {
        let connection = unreachable_connection(100, Duration::from_secs(60));
        let started = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));
        let late_calls = Arc::new(AtomicUsize::new(0));

        connection.on("NEW_ALERT", {
            let started = Arc::clone(&started);
            let finished = Arc::clone(&finished);
            move |_| {
                started.store(true, Ordering::SeqCst);
                std::thread::sleep(Duration::from_millis(200));
                finished.store(true, Ordering::SeqCst);
            }
        });
        connection.on("NEW_ALERT", {
            let late_calls = Arc::clone(&late_calls);
            move |_| {
                late_calls.fetch_add(1, Ordering::SeqCst);
            }
        });

        let dispatcher = {
            let connection = Arc::clone(&connection);
            tokio::task::spawn_blocking(move || {
                connection.dispatch("NEW_ALERT", &JsonValue::Null);
            })
        };
        while !started.load(Ordering::SeqCst) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        connection.close();
        assert!(finished.load(Ordering::SeqCst));

        dispatcher.await.unwrap();
        assert_eq!(late_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn gives_up_after_policy_exhausted() {
        let connection = unreachable_connection(2, Duration::from_millis(10));
        let mut status = connection.watch_status();
        tokio::time::timeout(
            Duration::from_secs(5),
            status.wait_for(|s| *s == ConnectionStatus::Closed),
        )
        .await
        .expect("driver stops")
        .expect("status channel open");
    }
}
