use serde::Deserialize;

#[derive(Debug, thiserror::Error)]
#[non_exhaustive]
pub enum Error {
    /// No response reached the client (connect failure, timeout, truncated body).
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),
    /// The server answered with a non-2xx status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },
    /// Login failed for a domain reason; `message` is meant for the user.
    #[error("{message}")]
    Auth { message: String },
    /// A newer request of the same kind superseded this one.
    #[error("Request canceled")]
    Canceled,
    #[error("Invalid input: {0}")]
    Validation(String),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
    #[cfg(feature = "realtime")]
    #[error("Realtime error: {0}")]
    Realtime(String),
}

#[derive(Deserialize)]
struct MessageBody {
    message: Option<String>,
}

impl Error {
    pub(crate) fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
        }
    }

    /// HTTP status of the failed response, if the server answered at all.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// `message` field of a JSON error body (`{"message": "..."}`).
    #[must_use]
    pub fn server_message(&self) -> Option<String> {
        let Self::Http { body, .. } = self else {
            return None;
        };
        serde_json::from_str::<MessageBody>(body)
            .ok()
            .and_then(|b| b.message)
            .filter(|m| !m.trim().is_empty())
    }

    #[must_use]
    pub fn is_canceled(&self) -> bool {
        matches!(self, Self::Canceled)
    }
}
