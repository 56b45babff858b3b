//! Notification sender interface.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Transport-level failure of a notifier call.
#[derive(Debug, Error)]
pub enum NotifierError {
    /// Connection reset, DNS failure, 5xx or rate limiting
    #[error("Network error: {0}")]
    Network(String),

    /// The call did not finish within its deadline
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// The request could not be built or the reply could not be read
    #[error("Invalid request: {0}")]
    Invalid(String),
}

impl NotifierError {
    /// Only network-level failures are worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_))
    }
}

/// What the remote API answered.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NotifierResponse {
    pub ok: bool,
    pub detail: Option<String>,
}

impl NotifierResponse {
    #[must_use]
    pub const fn success() -> Self {
        Self {
            ok: true,
            detail: None,
        }
    }

    #[must_use]
    pub const fn failure(detail: String) -> Self {
        Self {
            ok: false,
            detail: Some(detail),
        }
    }
}

/// One file in an album.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlbumItem {
    pub file_name: String,
    pub bytes: Vec<u8>,
    pub caption: Option<String>,
}

/// Payload of a notifier call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notification {
    /// Plain text message
    Text(String),
    /// A single file with a caption
    Document {
        file_name: String,
        bytes: Vec<u8>,
        caption: String,
    },
    /// Up to ten files delivered as one grouped message
    Album(Vec<AlbumItem>),
}

impl Notification {
    /// Short name for logs.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Text(_) => "text",
            Self::Document { .. } => "document",
            Self::Album(_) => "album",
        }
    }
}

/// Delivers messages to a chat.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Sends one notification to `target` (a chat id).
    async fn send(
        &self,
        target: &str,
        notification: &Notification,
    ) -> Result<NotifierResponse, NotifierError>;

    /// Verifies the credentials, returning the bot's display name.
    async fn health_check(&self) -> Result<String, NotifierError>;
}
