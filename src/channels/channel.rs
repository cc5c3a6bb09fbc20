//! Channel trait and the message types that cross it.

use std::pin::Pin;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;

use crate::error::ChannelError;

/// Stream of inbound messages produced by a channel.
pub type MessageStream = Pin<Box<dyn Stream<Item = IncomingMessage> + Send>>;

/// A text message received from a chat.
#[derive(Debug, Clone)]
pub struct IncomingMessage {
    /// Channel that produced the message ("telegram", "cli").
    pub channel: String,
    /// Stable per-chat identifier; replies go back to this chat.
    pub chat_id: String,
    /// Display name of the sender, if the platform provides one.
    pub user_name: Option<String>,
    /// UTF-8 text payload.
    pub content: String,
    pub received_at: DateTime<Utc>,
}

impl IncomingMessage {
    pub fn new(
        channel: impl Into<String>,
        chat_id: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            channel: channel.into(),
            chat_id: chat_id.into(),
            user_name: None,
            content: content.into(),
            received_at: Utc::now(),
        }
    }

    pub fn with_user_name(mut self, name: impl Into<String>) -> Self {
        self.user_name = Some(name.into());
        self
    }

    /// Time since the message was received.
    pub fn age(&self) -> chrono::Duration {
        Utc::now() - self.received_at
    }
}

/// A text message to deliver to a chat.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutgoingResponse {
    pub content: String,
}

impl OutgoingResponse {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

/// A messaging platform the survey runs on.
///
/// Implementations are pure I/O: they turn platform updates into
/// [`IncomingMessage`]s and deliver text back. Conversation logic lives in
/// [`crate::survey::SurveyBot`].
#[async_trait]
pub trait Channel: Send + Sync {
    /// Channel name (e.g. "telegram").
    fn name(&self) -> &str;

    /// Start receiving messages.
    async fn start(&self) -> Result<MessageStream, ChannelError>;

    /// Send a text message to a chat.
    async fn respond(&self, chat_id: &str, response: OutgoingResponse)
    -> Result<(), ChannelError>;

    /// Verify the channel can reach its platform.
    async fn health_check(&self) -> Result<(), ChannelError>;

    /// Stop receiving messages.
    async fn shutdown(&self) -> Result<(), ChannelError>;
}
