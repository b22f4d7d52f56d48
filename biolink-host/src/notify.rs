//! External notification channel
//!
//! The alert path owes no retry contract: a failed delivery is logged
//! and the event is spent. [`TelegramNotifier`] is the deployed
//! implementation; [`LogNotifier`] stands in when credentials are
//! absent so alerts still land somewhere visible.

use async_trait::async_trait;
use thiserror::Error;

use crate::credentials::Credentials;

/// Alert delivery failures. Never fatal to the host.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// A required secret is not present in the environment.
    #[error("credential {0} unavailable")]
    CredentialUnavailable(&'static str),

    /// The request never reached the API.
    #[error("notification transport failed: {0}")]
    Request(String),

    /// The API answered with a non-success status.
    #[error("notification rejected with status {0}")]
    Status(u16),
}

/// Something that can push one text message to the operator.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver `text`, returning whether the channel accepted it.
    async fn notify(&self, text: &str) -> Result<(), NotifyError>;
}

/// Telegram Bot API delivery over HTTPS.
pub struct TelegramNotifier {
    agent: ureq::Agent,
    url: String,
    chat_id: String,
}

impl TelegramNotifier {
    /// Notifier bound to one bot and chat.
    pub fn new(credentials: Credentials) -> Self {
        Self {
            agent: ureq::Agent::new(),
            url: format!(
                "https://api.telegram.org/bot{}/sendMessage",
                credentials.bot_token
            ),
            chat_id: credentials.chat_id,
        }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        let agent = self.agent.clone();
        let url = self.url.clone();
        let body = serde_json::json!({ "chat_id": self.chat_id, "text": text });

        // ureq blocks; keep the frame router responsive meanwhile.
        let result = tokio::task::spawn_blocking(move || agent.post(&url).send_json(body)).await;
        match result {
            Ok(Ok(_response)) => Ok(()),
            Ok(Err(ureq::Error::Status(code, _))) => Err(NotifyError::Status(code)),
            Ok(Err(e)) => Err(NotifyError::Request(e.to_string())),
            Err(e) => Err(NotifyError::Request(e.to_string())),
        }
    }
}

/// Fallback notifier that records alerts in the host log.
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn notify(&self, text: &str) -> Result<(), NotifyError> {
        log::warn!("ALERT (no notification channel configured): {text}");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Notifier capturing delivered messages.
    struct RecordingNotifier(Mutex<Vec<String>>);

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn notify(&self, text: &str) -> Result<(), NotifyError> {
            self.0.lock().unwrap().push(text.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn unreachable_endpoint_surfaces_transport_error() {
        // Port 9 refuses connections; this exercises the real JSON
        // request path without a live API.
        let notifier = TelegramNotifier {
            agent: ureq::Agent::new(),
            url: "http://127.0.0.1:9/botTEST/sendMessage".to_string(),
            chat_id: "42".to_string(),
        };
        let err = notifier.notify("hello").await.unwrap_err();
        assert!(matches!(err, NotifyError::Request(_)));
    }

    #[tokio::test]
    async fn log_notifier_always_accepts() {
        assert!(LogNotifier.notify("hello").await.is_ok());
    }

    #[tokio::test]
    async fn recording_notifier_captures_text() {
        let recorder = RecordingNotifier(Mutex::new(Vec::new()));
        recorder.notify("one").await.unwrap();
        recorder.notify("two").await.unwrap();
        assert_eq!(*recorder.0.lock().unwrap(), vec!["one", "two"]);
    }
}
