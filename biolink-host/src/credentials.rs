//! Notification channel credentials
//!
//! Loaded from the environment at startup. A missing credential is not
//! fatal to the host; the caller falls back to log-only alerting.

use std::env;

use crate::notify::NotifyError;

/// Environment variable holding the messaging bot token.
pub const BOT_TOKEN_VAR: &str = "BIOLINK_BOT_TOKEN";
/// Environment variable holding the destination chat id.
pub const CHAT_ID_VAR: &str = "BIOLINK_CHAT_ID";

/// Secrets for the external messaging API.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Bot API token.
    pub bot_token: String,
    /// Chat to deliver alerts to.
    pub chat_id: String,
}

impl Credentials {
    /// Load both secrets from the environment.
    pub fn from_env() -> Result<Self, NotifyError> {
        let bot_token = env::var(BOT_TOKEN_VAR)
            .map_err(|_| NotifyError::CredentialUnavailable(BOT_TOKEN_VAR))?;
        let chat_id =
            env::var(CHAT_ID_VAR).map_err(|_| NotifyError::CredentialUnavailable(CHAT_ID_VAR))?;
        Ok(Self { bot_token, chat_id })
    }
}
