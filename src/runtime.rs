use std::sync::Arc;

use tokio::task::JoinHandle;

use crate::account::Account;
use crate::config::ClientConfig;
use crate::error::Error;
use crate::notifications::NotificationFeed;
use crate::police::GuestSearch;
#[cfg(feature = "realtime")]
use crate::realtime::RealtimeBinder;
use crate::session::SessionStore;
use crate::traits::Host;
use crate::transport::Transport;

/// The wired-up client: one transport, one session store and, with the
/// `realtime` feature, the binder that keeps the socket in step with the
/// session.
///
/// # Example
///
/// ```rust,ignore
/// use std::sync::Arc;
/// use apnamanager_client::{ClientConfig, ClientRuntime, HeadlessHost};
///
/// let runtime = ClientRuntime::start(ClientConfig::from_env()?, Arc::new(HeadlessHost::new())).await?;
/// if runtime.session().user().is_none() {
///     runtime.session().login("desk@hotel.in", "secret", None).await?;
/// }
/// ```
pub struct ClientRuntime {
    transport: Arc<Transport>,
    store: Arc<SessionStore>,
    #[cfg(feature = "realtime")]
    binder: Arc<RealtimeBinder>,
    tasks: Vec<JoinHandle<()>>,
}

impl ClientRuntime {
    /// Build the client, restore any existing session and return once the
    /// store has left `Initializing`.
    ///
    /// Must be called from within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built. Bootstrap failures
    /// are not errors; they leave the store anonymous.
    pub async fn start(config: ClientConfig, host: Arc<dyn Host>) -> Result<Self, Error> {
        let transport = Arc::new(Transport::new(config, host)?);
        let store = SessionStore::new(Arc::clone(&transport));

        let mut tasks = vec![store.watch_expiry()];

        #[cfg(feature = "realtime")]
        let binder = {
            let binder = RealtimeBinder::new(Arc::clone(&transport));
            tasks.push(binder.bind(store.subscribe()));
            binder
        };

        store.bootstrap().await;
        store.ready().await;
        tracing::info!(phase = ?store.phase(), "Client started");

        Ok(Self {
            transport,
            store,
            #[cfg(feature = "realtime")]
            binder,
            tasks,
        })
    }

    /// Transport shared by every component.
    #[must_use]
    pub fn transport(&self) -> &Arc<Transport> {
        &self.transport
    }

    /// The session store.
    #[must_use]
    pub fn session(&self) -> &Arc<SessionStore> {
        &self.store
    }

    /// Binder owning the realtime connection.
    #[cfg(feature = "realtime")]
    #[must_use]
    pub fn realtime(&self) -> &Arc<RealtimeBinder> {
        &self.binder
    }

    /// Password operations over this runtime's transport.
    #[must_use]
    pub fn account(&self) -> Account {
        Account::new(Arc::clone(&self.transport))
    }

    /// A new, empty alert inbox. Call `refresh` and `attach` to fill it.
    #[must_use]
    pub fn notifications(&self) -> Arc<NotificationFeed> {
        NotificationFeed::new(Arc::clone(&self.transport))
    }

    /// A new guest search with no results.
    #[must_use]
    pub fn guest_search(&self) -> GuestSearch {
        GuestSearch::new(Arc::clone(&self.transport))
    }

    /// Stop background tasks and close the realtime connection. The session
    /// itself is left as is; call [`SessionStore::logout`] first to end it.
    pub fn shutdown(mut self) {
        for task in self.tasks.drain(..) {
            task.abort();
        }
        #[cfg(feature = "realtime")]
        self.binder.disconnect();
        tracing::info!("Client shut down");
    }
}

impl Drop for ClientRuntime {
    fn drop(&mut self) {
        for task in &self.tasks {
            task.abort();
        }
    }
}
