use std::fmt;

use serde::{Deserialize, Serialize};

/// Telegram user id (numeric).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UserId(pub i64);

/// Telegram chat id (numeric). Channels and supergroups are negative.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChatId(pub i64);

/// Telegram message id (numeric, unique within a chat).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MessageId(pub i32);

/// A stable reference to a Telegram message.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct MessageRef {
    pub chat_id: ChatId,
    pub message_id: MessageId,
}

impl fmt::Display for ChatId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for MessageRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.chat_id, self.message_id)
    }
}

/// Kind of a non-text content item. Only used for block matching and logs;
/// delivery always copies the original item.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MediaKind {
    Photo,
    Video,
    Animation,
    Document,
    Audio,
    Voice,
    Other,
}

/// Content carried by an inbound event.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    Media {
        kind: MediaKind,
        caption: Option<String>,
        /// Stable file identity used for content blocking (Telegram `file_unique_id`).
        fingerprint: Option<String>,
    },
    Sticker {
        file_id: String,
    },
}

impl MessageContent {
    /// The text the transformer works on: the message text or the caption.
    pub fn text(&self) -> &str {
        match self {
            MessageContent::Text(t) => t,
            MessageContent::Media { caption, .. } => caption.as_deref().unwrap_or(""),
            MessageContent::Sticker { .. } => "",
        }
    }

    pub fn kind_label(&self) -> &'static str {
        match self {
            MessageContent::Text(_) => "text",
            MessageContent::Media { kind, .. } => match kind {
                MediaKind::Photo => "photo",
                MediaKind::Video => "video",
                MediaKind::Animation => "animation",
                MediaKind::Document => "document",
                MediaKind::Audio => "audio",
                MediaKind::Voice => "voice",
                MediaKind::Other => "media",
            },
            MessageContent::Sticker { .. } => "sticker",
        }
    }
}

/// Whether an inbound event is a new message or an edit of an existing one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventKind {
    New,
    Edit,
}

/// One inbound event, transport-agnostic. Not persisted.
#[derive(Clone, Debug)]
pub struct RelayedMessage {
    pub chat_id: ChatId,
    pub message_id: MessageId,
    pub sender_id: Option<UserId>,
    pub content: MessageContent,
    pub kind: EventKind,
}

impl RelayedMessage {
    pub fn source(&self) -> MessageRef {
        MessageRef {
            chat_id: self.chat_id,
            message_id: self.message_id,
        }
    }
}
