//! Telegram adapter (teloxide).
//!
//! This crate implements the `chanrelay-core` MessagingPort over Telegram Bot API
//! and turns Telegram updates into relay events and admin commands.

use async_trait::async_trait;

use teloxide::{prelude::*, types::InputFile};

use tokio::time::sleep;
use tracing::warn;

pub mod convert;
pub mod handlers;
pub mod router;

use chanrelay_core::{
    domain::{ChatId, MessageId, MessageRef},
    errors::Error,
    messaging::port::MessagingPort,
    Result,
};

#[derive(Clone)]
pub struct TelegramMessenger {
    bot: Bot,
}

impl TelegramMessenger {
    pub fn new(bot: Bot) -> Self {
        Self { bot }
    }

    fn tg_chat(chat_id: ChatId) -> teloxide::types::ChatId {
        teloxide::types::ChatId(chat_id.0)
    }

    fn tg_msg_id(message_id: MessageId) -> teloxide::types::MessageId {
        teloxide::types::MessageId(message_id.0)
    }

    fn map_err(e: teloxide::RequestError) -> Error {
        Error::External(format!("telegram error: {e}"))
    }

    async fn with_retry<T, Fut>(&self, mut op: impl FnMut() -> Fut) -> Result<T>
    where
        Fut: std::future::IntoFuture<Output = std::result::Result<T, teloxide::RequestError>>,
        Fut::IntoFuture: Send,
    {
        const MAX_RETRIES: usize = 1;
        let mut attempts = 0usize;
        loop {
            match op().await {
                Ok(v) => return Ok(v),
                Err(e) => match e {
                    teloxide::RequestError::RetryAfter(d) if attempts < MAX_RETRIES => {
                        attempts += 1;
                        warn!(retry_after = ?d, "telegram flood control, retrying once");
                        sleep(d).await;
                        continue;
                    }
                    other => return Err(Self::map_err(other)),
                },
            }
        }
    }
}

#[async_trait]
impl MessagingPort for TelegramMessenger {
    async fn send_text(&self, chat_id: ChatId, text: &str) -> Result<MessageRef> {
        // No parse mode: relayed text must not be interpreted as markup.
        let msg = self
            .with_retry(|| self.bot.send_message(Self::tg_chat(chat_id), text.to_string()))
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn copy_message(
        &self,
        source: MessageRef,
        target: ChatId,
        caption: Option<&str>,
    ) -> Result<MessageRef> {
        let id = self
            .with_retry(|| {
                let mut req = self.bot.copy_message(
                    Self::tg_chat(target),
                    Self::tg_chat(source.chat_id),
                    Self::tg_msg_id(source.message_id),
                );
                if let Some(c) = caption {
                    req = req.caption(c.to_string());
                }
                req
            })
            .await?;

        Ok(MessageRef {
            chat_id: target,
            message_id: MessageId(id.0),
        })
    }

    async fn send_sticker(&self, chat_id: ChatId, file_id: &str) -> Result<MessageRef> {
        let msg = self
            .with_retry(|| {
                self.bot.send_sticker(
                    Self::tg_chat(chat_id),
                    InputFile::file_id(file_id.to_string()),
                )
            })
            .await?;

        Ok(MessageRef {
            chat_id,
            message_id: MessageId(msg.id.0),
        })
    }

    async fn edit_text(&self, msg: MessageRef, text: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot.edit_message_text(
                Self::tg_chat(msg.chat_id),
                Self::tg_msg_id(msg.message_id),
                text.to_string(),
            )
        })
        .await?;
        Ok(())
    }

    async fn edit_caption(&self, msg: MessageRef, caption: &str) -> Result<()> {
        self.with_retry(|| {
            self.bot
                .edit_message_caption(Self::tg_chat(msg.chat_id), Self::tg_msg_id(msg.message_id))
                .caption(caption.to_string())
        })
        .await?;
        Ok(())
    }
}
