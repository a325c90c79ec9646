//! Telegram `Message` -> relay event.

use teloxide::types::Message;

use chanrelay_core::domain::{
    ChatId, EventKind, MediaKind, MessageContent, MessageId, RelayedMessage, UserId,
};

/// Build a relay event from a Telegram message.
///
/// Returns `None` for service messages (joins, pins, ...) that cannot be
/// relayed.
pub fn relayed_message(msg: &Message, kind: EventKind) -> Option<RelayedMessage> {
    let content = message_content(msg)?;
    Some(RelayedMessage {
        chat_id: ChatId(msg.chat.id.0),
        message_id: MessageId(msg.id.0),
        sender_id: msg.from().map(|u| UserId(u.id.0 as i64)),
        content,
        kind,
    })
}

fn message_content(msg: &Message) -> Option<MessageContent> {
    if let Some(text) = msg.text() {
        return Some(MessageContent::Text(text.to_string()));
    }
    if let Some(sticker) = msg.sticker() {
        return Some(MessageContent::Sticker {
            file_id: sticker.file.id.clone(),
        });
    }

    // Animations also carry a `document`; check them first.
    let (kind, fingerprint) = if let Some(sizes) = msg.photo() {
        // Sizes are ascending; the largest identifies the image.
        (MediaKind::Photo, sizes.last().map(|p| p.file.unique_id.clone()))
    } else if let Some(v) = msg.video() {
        (MediaKind::Video, Some(v.file.unique_id.clone()))
    } else if let Some(a) = msg.animation() {
        (MediaKind::Animation, Some(a.file.unique_id.clone()))
    } else if let Some(d) = msg.document() {
        (MediaKind::Document, Some(d.file.unique_id.clone()))
    } else if let Some(a) = msg.audio() {
        (MediaKind::Audio, Some(a.file.unique_id.clone()))
    } else if let Some(v) = msg.voice() {
        (MediaKind::Voice, Some(v.file.unique_id.clone()))
    } else if msg.video_note().is_some()
        || msg.poll().is_some()
        || msg.location().is_some()
        || msg.venue().is_some()
        || msg.contact().is_some()
        || msg.dice().is_some()
    {
        (MediaKind::Other, None)
    } else {
        return None;
    };

    Some(MessageContent::Media {
        kind,
        caption: msg.caption().map(str::to_string),
        fingerprint,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn message(extra: serde_json::Value) -> Message {
        let mut base = json!({
            "message_id": 5,
            "date": 1700000000,
            "chat": {"id": -1001, "type": "supergroup", "title": "src"},
            "from": {"id": 9, "is_bot": false, "first_name": "A"},
        });
        let obj = base.as_object_mut().unwrap();
        for (k, v) in extra.as_object().unwrap() {
            obj.insert(k.clone(), v.clone());
        }
        serde_json::from_value(base).unwrap()
    }

    #[test]
    fn text_message_becomes_text_event() {
        let ev = relayed_message(&message(json!({"text": "hi t.me/old"})), EventKind::New).unwrap();
        assert_eq!(ev.chat_id, ChatId(-1001));
        assert_eq!(ev.message_id, MessageId(5));
        assert_eq!(ev.sender_id, Some(UserId(9)));
        assert_eq!(ev.content, MessageContent::Text("hi t.me/old".into()));
    }

    #[test]
    fn photo_uses_largest_size_as_fingerprint() {
        let msg = message(json!({
            "caption": "look",
            "photo": [
                {"file_id": "s", "file_unique_id": "small", "width": 90, "height": 90, "file_size": 10},
                {"file_id": "l", "file_unique_id": "large", "width": 800, "height": 800, "file_size": 100}
            ]
        }));
        let ev = relayed_message(&msg, EventKind::Edit).unwrap();
        assert_eq!(ev.kind, EventKind::Edit);
        assert_eq!(
            ev.content,
            MessageContent::Media {
                kind: MediaKind::Photo,
                caption: Some("look".into()),
                fingerprint: Some("large".into()),
            }
        );
    }

    #[test]
    fn service_message_is_not_relayed() {
        let msg: Message = serde_json::from_value(json!({
            "message_id": 6,
            "date": 1700000000,
            "chat": {"id": -1001, "type": "supergroup", "title": "renamed"},
            "new_chat_title": "renamed"
        }))
        .unwrap();
        assert!(relayed_message(&msg, EventKind::New).is_none());
    }
}
