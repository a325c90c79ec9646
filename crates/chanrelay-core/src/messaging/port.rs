use async_trait::async_trait;

use crate::{
    domain::{ChatId, MessageRef},
    Result,
};

/// Outbound transport port the relay engine delivers through.
///
/// Every call is a single network round trip; implementations must not retry
/// indefinitely. Returned [`MessageRef`]s identify the message in the
/// destination chat.
#[async_trait]
pub trait MessagingPort: Send + Sync {
    /// Send a plain-text message (no markup parsing).
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef>;

    /// Copy an existing message into `target`, optionally replacing its caption.
    async fn copy_message(
        &self,
        source: MessageRef,
        target: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageRef>;

    async fn send_sticker(&self, chat_id: ChatId, file_id: &str) -> Result<MessageRef>;

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()>;

    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()>;
}
