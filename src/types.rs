use derive_more::{Display, From, Into};
use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use crate::error::Error;

/// Backend user identifier (Mongo `_id`, opaque string).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct UserId(pub String);

/// Guest record identifier.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct GuestId(pub String);

/// Notification identifier.
///
/// Server-issued ids are opaque strings. Notifications created locally from a
/// realtime alert carry a `local-` prefixed id until the next refresh.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Display, From, Into)]
#[serde(transparent)]
pub struct NotificationId(pub String);

impl NotificationId {
    pub(crate) fn local(seq: u64) -> Self {
        Self(format!("local-{seq}"))
    }

    /// True for ids minted client-side that the server has never seen.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.0.starts_with("local-")
    }
}

/// Operator role. Closed set; an unknown role fails to deserialize.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    Hotel,
    Police,
    #[serde(rename = "Regional Admin")]
    RegionalAdmin,
}

impl Role {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Hotel => "Hotel",
            Self::Police => "Police",
            Self::RegionalAdmin => "Regional Admin",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Hotel" => Ok(Self::Hotel),
            "Police" => Ok(Self::Police),
            "Regional Admin" => Ok(Self::RegionalAdmin),
            other => Err(Error::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// The authenticated identity known to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(rename = "_id")]
    pub id: UserId,
    pub username: String,
    pub role: Role,
    #[serde(rename = "needsPasswordReset", default)]
    pub needs_password_reset: bool,
}

/// Login succeeded but the password must be changed before a session exists.
///
/// Consumed by [`Account::complete_password_reset`](crate::Account::complete_password_reset).
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub struct PendingReset {
    pub user_id: UserId,
    pub needs_password_reset: bool,
}

impl PendingReset {
    pub(crate) fn new(user_id: UserId) -> Self {
        Self {
            user_id,
            needs_password_reset: true,
        }
    }
}

/// Result of [`SessionStore::login`](crate::SessionStore::login).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoginOutcome {
    Authenticated(Session),
    PasswordResetRequired(PendingReset),
}

/// Standard `{ "data": ..., "message": ... }` envelope returned by the API.
#[derive(Debug, Clone, Deserialize)]
pub struct Envelope<T> {
    pub data: T,
    #[serde(default)]
    pub message: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notification {
    #[serde(rename = "_id")]
    pub id: NotificationId,
    pub message: String,
    #[serde(rename = "isRead", default)]
    pub is_read: bool,
    #[serde(rename = "createdAt", with = "time::serde::rfc3339")]
    pub created_at: time::OffsetDateTime,
}

/// Payload of the `NEW_ALERT` realtime event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AlertPayload {
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchBy {
    #[default]
    Name,
    Phone,
    Id,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrimaryGuest {
    pub name: String,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

/// Guest record as returned by the police search. Fields beyond the id and
/// primary guest are kept as raw JSON for the embedding UI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Guest {
    #[serde(rename = "_id")]
    pub id: GuestId,
    #[serde(rename = "primaryGuest")]
    pub primary_guest: PrimaryGuest,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, JsonValue>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Pagination {
    pub page: u32,
    #[serde(default)]
    pub has_next_page: bool,
    #[serde(default)]
    pub total_docs: u64,
}

impl Default for Pagination {
    fn default() -> Self {
        Self {
            page: 1,
            has_next_page: false,
            total_docs: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn session_from_profile_json() {
        let json = r#"{"_id":"u1","username":"asha","role":"Regional Admin","email":"a@b.c"}"#;
        let session: Session = serde_json::from_str(json).unwrap();
        assert_eq!(session.id, UserId::from("u1".to_string()));
        assert_eq!(session.role, Role::RegionalAdmin);
        assert!(!session.needs_password_reset);
    }

    #[test]
    fn unknown_role_rejected() {
        let json = r#"{"_id":"u1","username":"x","role":"Janitor"}"#;
        assert!(serde_json::from_str::<Session>(json).is_err());
        assert!("Janitor".parse::<Role>().is_err());
    }

    #[test]
    fn role_display_matches_wire_name() {
        for role in [Role::Hotel, Role::Police, Role::RegionalAdmin] {
            let wire = serde_json::to_string(&role).unwrap();
            assert_eq!(wire, format!("\"{role}\""));
            assert_eq!(role.as_str().parse::<Role>().unwrap(), role);
        }
    }

    #[test]
    fn notification_ids() {
        let local = NotificationId::local(7);
        assert_eq!(local.to_string(), "local-7");
        assert!(local.is_local());
        assert!(!NotificationId::from("65f0c1".to_string()).is_local());
    }

    #[test]
    fn notification_from_json() {
        let json = r#"{"_id":"n1","message":"Flagged","isRead":true,"createdAt":"2024-05-01T10:00:00Z"}"#;
        let n: Notification = serde_json::from_str(json).unwrap();
        assert!(n.is_read);
        assert_eq!(n.created_at.year(), 2024);
    }

    #[test]
    fn guest_keeps_extra_fields() {
        let json = r#"{"_id":"g1","primaryGuest":{"name":"Ravi","phone":"99"},"roomNumber":"101"}"#;
        let guest: Guest = serde_json::from_str(json).unwrap();
        assert_eq!(guest.primary_guest.name, "Ravi");
        assert_eq!(guest.extra.get("roomNumber").and_then(|v| v.as_str()), Some("101"));
    }

    #[test]
    fn search_by_wire_names() {
        assert_eq!(serde_json::to_string(&SearchBy::Phone).unwrap(), "\"phone\"");
        assert_eq!(SearchBy::default(), SearchBy::Name);
    }

    #[test]
    fn newtypes_prevent_mixing() {
        fn takes_user_id(_: &UserId) {}
        fn takes_guest_id(_: &GuestId) {}

        takes_user_id(&UserId::from("id".to_string()));
        takes_guest_id(&GuestId::from("id".to_string()));
    }
}
