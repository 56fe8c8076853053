#![doc = include_str!("../README.md")]

pub mod account;
mod artifacts;
pub mod config;
pub mod error;
pub mod notifications;
pub mod police;
#[cfg(feature = "realtime")]
pub mod realtime;
pub mod runtime;
pub mod session;
pub mod traits;
pub mod transport;
pub mod types;

// Re-exports for convenient access
pub use account::{Account, MIN_PASSWORD_LEN, validate_new_password};
pub use config::{ClientConfig, DEFAULT_API_URL};
pub use error::Error;
pub use notifications::NotificationFeed;
pub use police::{GuestSearch, PAGE_LIMIT, SearchForm, SearchOutcome, SearchResults};
#[cfg(feature = "realtime")]
pub use realtime::{ConnectionStatus, NEW_ALERT, RealtimeBinder, RealtimeConnection};
pub use runtime::ClientRuntime;
pub use session::{Phase, SessionState, SessionStore};
pub use traits::{HeadlessHost, Host};
pub use transport::{ApiResponse, CancelToken, RequestOptions, Transport, TransportEvent};
pub use types::{
    AlertPayload, Guest, GuestId, LoginOutcome, Notification, NotificationId, Pagination,
    PendingReset, PrimaryGuest, Role, SearchBy, Session, UserId,
};
