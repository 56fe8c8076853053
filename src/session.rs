//! Process-wide authentication state.
//!
//! [`SessionStore`] is the single source of truth for who is logged in. State
//! changes are published on a `watch` channel so observers (the realtime
//! binder, the embedding UI) react to transitions instead of polling.
//!
//! ```text
//! Initializing ──bootstrap──▶ Authenticated ◀──login── Anonymous
//!              └────────────▶ Anonymous     ──logout/expiry──▶
//! ```

use std::sync::{Arc, Weak};

use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{Mutex, OnceCell, watch};
use tokio::task::JoinHandle;

use crate::artifacts;
use crate::config::{LOGIN_PATH, LOGOUT_PATH, PROFILE_PATH};
use crate::error::Error;
use crate::transport::{Transport, TransportEvent};
use crate::types::{LoginOutcome, PendingReset, Role, Session, UserId};

/// Snapshot of the store. `loading` is true until the bootstrap probe settles.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionState {
    pub user: Option<Session>,
    pub loading: bool,
}

impl SessionState {
    #[must_use]
    pub fn phase(&self) -> Phase {
        match (&self.user, self.loading) {
            (Some(_), _) => Phase::Authenticated,
            (None, true) => Phase::Initializing,
            (None, false) => Phase::Anonymous,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Initializing,
    Authenticated,
    Anonymous,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginRequest<'a> {
    email: &'a str,
    password: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role_hint: Option<Role>,
}

#[derive(Deserialize)]
struct LooseEnvelope {
    #[serde(default)]
    data: Option<JsonValue>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResetRequired {
    user_id: Option<String>,
}

/// Holds the current session and serializes its transitions.
pub struct SessionStore {
    transport: Arc<Transport>,
    state: watch::Sender<SessionState>,
    bootstrapped: OnceCell<()>,
    // Serializes transitions so overlapping login/logout responses cannot
    // overwrite each other.
    transition: Mutex<()>,
}

impl SessionStore {
    /// Create the store in `Initializing`. No request is sent until
    /// [`bootstrap`](Self::bootstrap).
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Arc<Self> {
        let (state, _) = watch::channel(SessionState {
            user: None,
            loading: true,
        });
        Arc::new(Self {
            transport,
            state,
            bootstrapped: OnceCell::new(),
            transition: Mutex::new(()),
        })
    }

    /// Transport the store talks through.
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// Current snapshot.
    #[must_use]
    pub fn state(&self) -> SessionState {
        self.state.borrow().clone()
    }

    /// The logged-in user, if any.
    #[must_use]
    pub fn user(&self) -> Option<Session> {
        self.state.borrow().user.clone()
    }

    /// True until bootstrap has settled.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state.borrow().loading
    }

    /// Current phase.
    #[must_use]
    pub fn phase(&self) -> Phase {
        self.state.borrow().phase()
    }

    /// Observe state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<SessionState> {
        self.state.subscribe()
    }

    /// Probe `GET /users/profile` to restore an existing session.
    ///
    /// The request is issued at most once per store, however many callers race
    /// here; later callers wait for the first probe to settle. A `401` is the
    /// normal "not logged in" answer and is not reported as an error.
    pub async fn bootstrap(&self) {
        self.bootstrapped
            .get_or_init(|| async {
                let _guard = self.transition.lock().await;
                let user = self.probe_profile().await;
                self.state.send_replace(SessionState {
                    user,
                    loading: false,
                });
            })
            .await;
    }

    /// Wait until the store has left `Initializing`.
    pub async fn ready(&self) {
        let mut rx = self.state.subscribe();
        // The sender lives in `self`, so the channel outlives this wait.
        let _ = rx.wait_for(|state| !state.loading).await;
    }

    async fn probe_profile(&self) -> Option<Session> {
        match self.transport.get(PROFILE_PATH).await {
            Ok(response) => match response.data::<Session>() {
                Ok(session) => {
                    tracing::info!(user_id = %session.id, role = %session.role, "Session restored");
                    Some(session)
                }
                Err(e) => {
                    tracing::error!(error = %e, "Profile response did not contain a valid session");
                    None
                }
            },
            Err(Error::Http { status: 401, .. }) => {
                tracing::debug!("No active session");
                None
            }
            Err(e) => {
                tracing::error!(error = %e, "Profile bootstrap failed");
                None
            }
        }
    }

    /// Authenticate with email and password.
    ///
    /// `role_hint` lets the backend narrow which operator table it searches; it
    /// grants nothing by itself.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Auth`] with a user-facing message for every failure:
    /// rejected credentials, incomplete responses, or transport faults. The
    /// state is left unchanged on error.
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        role_hint: Option<Role>,
    ) -> Result<LoginOutcome, Error> {
        let _guard = self.transition.lock().await;

        artifacts::purge_legacy(self.transport.host().as_ref(), self.transport.config());

        let request = LoginRequest {
            email,
            password,
            role_hint,
        };
        let response = match self.transport.post(LOGIN_PATH, &request).await {
            Ok(response) => response,
            Err(e) => {
                let message = match &e {
                    Error::Http { .. } => e
                        .server_message()
                        .unwrap_or_else(|| "Login failed.".to_string()),
                    other => other.to_string(),
                };
                tracing::warn!(error = %e, "Login rejected");
                return Err(Error::auth(message));
            }
        };

        let data = response
            .json::<LooseEnvelope>()
            .ok()
            .and_then(|envelope| envelope.data);

        match response.status() {
            200 => {
                let session = data
                    .and_then(|data| serde_json::from_value::<Session>(data).ok())
                    .filter(|s| !s.id.0.is_empty() && !s.username.is_empty())
                    .ok_or_else(|| Error::auth("Login successful but user data is incomplete."))?;
                let session = Session {
                    needs_password_reset: false,
                    ..session
                };

                tracing::info!(user_id = %session.id, role = %session.role, "Login successful");
                self.state.send_replace(SessionState {
                    user: Some(session.clone()),
                    loading: false,
                });
                Ok(LoginOutcome::Authenticated(session))
            }
            202 => {
                let user_id = data
                    .and_then(|data| serde_json::from_value::<ResetRequired>(data).ok())
                    .and_then(|reset| reset.user_id)
                    .filter(|id| !id.is_empty())
                    .ok_or_else(|| {
                        Error::auth("Password reset required, but user ID is missing.")
                    })?;

                tracing::info!(user_id = %user_id, "Password reset required before login");
                Ok(LoginOutcome::PasswordResetRequired(PendingReset::new(
                    UserId(user_id),
                )))
            }
            status => Err(Error::auth(format!(
                "Unexpected server response: {status}"
            ))),
        }
    }

    /// End the session. Safe to call when already anonymous.
    ///
    /// The server call is best-effort; local cleanup and the transition to
    /// `Anonymous` happen regardless of its outcome.
    pub async fn logout(&self) {
        let _guard = self.transition.lock().await;

        if let Err(e) = self.transport.post_empty(LOGOUT_PATH).await {
            tracing::warn!(error = %e, "Logout request failed");
        }

        artifacts::purge_all(self.transport.host().as_ref(), self.transport.config());
        self.state.send_replace(SessionState {
            user: None,
            loading: false,
        });
    }

    /// Drop the session after the server reported it expired.
    ///
    /// Skipped while a login or logout is in flight; that transition decides
    /// the resulting state.
    pub(crate) fn expire(&self, path: &str) {
        let Ok(_guard) = self.transition.try_lock() else {
            tracing::debug!(path = %path, "Expiry ignored during session transition");
            return;
        };

        self.state.send_if_modified(|state| {
            let changed = state.user.is_some() || state.loading;
            if changed {
                tracing::info!(path = %path, "Session cleared after expiry");
            }
            state.user = None;
            state.loading = false;
            changed
        });
    }

    /// Spawn a task that clears the session whenever the transport reports
    /// expiry. The task ends when the store is dropped or the transport goes
    /// away.
    #[must_use]
    pub fn watch_expiry(self: &Arc<Self>) -> JoinHandle<()> {
        let mut events = self.transport.subscribe();
        let store: Weak<Self> = Arc::downgrade(self);

        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(TransportEvent::SessionExpired { path }) => {
                        let Some(store) = store.upgrade() else { break };
                        store.expire(&path);
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::debug!(skipped, "Expiry watcher lagged");
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(role: Role) -> Session {
        Session {
            id: UserId("u1".into()),
            username: "asha".into(),
            role,
            needs_password_reset: false,
        }
    }

    #[test]
    fn phase_follows_state() {
        let mut state = SessionState {
            user: None,
            loading: true,
        };
        assert_eq!(state.phase(), Phase::Initializing);
        state.loading = false;
        assert_eq!(state.phase(), Phase::Anonymous);
        state.user = Some(session(Role::Hotel));
        assert_eq!(state.phase(), Phase::Authenticated);
    }

    #[test]
    fn login_request_uses_camel_case_hint() {
        let body = serde_json::to_value(LoginRequest {
            email: "a@b.c",
            password: "pw",
            role_hint: Some(Role::RegionalAdmin),
        })
        .unwrap();
        assert_eq!(body["roleHint"], "Regional Admin");

        let body = serde_json::to_value(LoginRequest {
            email: "a@b.c",
            password: "pw",
            role_hint: None,
        })
        .unwrap();
        assert!(body.get("roleHint").is_none());
    }

    #[tokio::test]
    async fn expire_is_skipped_while_transition_held() {
        let transport = Arc::new(
            Transport::new(
                crate::config::ClientConfig::default(),
                Arc::new(crate::traits::HeadlessHost::new()),
            )
            .unwrap(),
        );
        let store = SessionStore::new(transport);
        store.state.send_replace(SessionState {
            user: Some(session(Role::Police)),
            loading: false,
        });

        let guard = store.transition.lock().await;
        store.expire("/rooms/dashboard");
        assert_eq!(store.phase(), Phase::Authenticated);
        drop(guard);

        store.expire("/rooms/dashboard");
        assert_eq!(store.phase(), Phase::Anonymous);
    }
}
