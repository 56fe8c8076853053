use std::sync::Arc;

use serde::Serialize;

use crate::error::Error;
use crate::transport::Transport;
use crate::types::{PendingReset, UserId};

/// Shortest accepted password, in characters.
pub const MIN_PASSWORD_LEN: usize = 6;

const FORCED_RESET_PATH: &str = "/auth/change-password";
const CHANGE_PASSWORD_PATH: &str = "/users/change-password";

/// Checks a new password and its confirmation before anything is sent.
///
/// # Errors
///
/// Returns [`Error::Validation`] if the two differ or the password is shorter
/// than [`MIN_PASSWORD_LEN`] characters.
pub fn validate_new_password(new_password: &str, confirmation: &str) -> Result<(), Error> {
    if new_password != confirmation {
        return Err(Error::Validation("Passwords do not match.".into()));
    }
    if new_password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::Validation(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters long."
        )));
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ForcedReset<'a> {
    user_id: &'a UserId,
    new_password: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct ChangePassword<'a> {
    old_password: &'a str,
    new_password: &'a str,
}

/// Password management for the current or pending user.
pub struct Account {
    transport: Arc<Transport>,
}

impl Account {
    #[must_use]
    pub fn new(transport: Arc<Transport>) -> Self {
        Self { transport }
    }

    /// Set a new password for a user whose login returned a
    /// [`PendingReset`]. The ticket is consumed; no session is created, so the
    /// user has to log in again with the new password.
    ///
    /// # Errors
    ///
    /// [`Error::Validation`] for a rejected password, otherwise any transport
    /// error. Use [`Error::server_message`] for the text to show.
    pub async fn complete_password_reset(
        &self,
        ticket: PendingReset,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), Error> {
        validate_new_password(new_password, confirmation)?;

        let body = ForcedReset {
            user_id: &ticket.user_id,
            new_password,
        };
        self.transport
            .put(FORCED_RESET_PATH, &body)
            .await
            .inspect_err(|e| tracing::error!(user_id = %ticket.user_id, error = %e, "Forced password reset failed"))?;

        tracing::info!(user_id = %ticket.user_id, "Password reset completed; login required");
        Ok(())
    }

    /// Change the logged-in user's password.
    ///
    /// # Errors
    ///
    /// Same as [`complete_password_reset`](Self::complete_password_reset).
    pub async fn change_password(
        &self,
        old_password: &str,
        new_password: &str,
        confirmation: &str,
    ) -> Result<(), Error> {
        validate_new_password(new_password, confirmation)?;

        let body = ChangePassword {
            old_password,
            new_password,
        };
        self.transport.put(CHANGE_PASSWORD_PATH, &body).await?;
        tracing::info!("Password changed");
        Ok(())
    }
}
