//! Socket.IO channel whose lifetime follows the session.
//!
//! [`RealtimeBinder`] observes the [`SessionStore`](crate::SessionStore):
//! a session appearing opens a connection, a session disappearing closes it.
//! Consumers subscribe to named events on the [`RealtimeConnection`] they get
//! from [`RealtimeBinder::connection`].

mod binder;
mod connection;
mod packet;

pub use binder::RealtimeBinder;
pub use connection::{ConnectionStatus, RealtimeConnection, ReconnectPolicy, SubscriptionId};
pub use packet::{Handshake, Packet};

/// Event pushed when a guest is flagged. Payload: [`AlertPayload`](crate::AlertPayload).
pub const NEW_ALERT: &str = "NEW_ALERT";
