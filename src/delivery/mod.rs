pub mod chunk;
pub mod telegram;

use anyhow::Result;
use async_trait::async_trait;

use crate::types::{ChatId, Outgoing};

/// Outbound side of the chat platform.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn send(&self, chat: ChatId, msg: &Outgoing) -> Result<()>;

    /// Largest text the platform accepts in one message, in characters.
    fn max_message_len(&self) -> usize;
}
