//! Rule-based text rewriting.
//!
//! Substitution categories are applied in a fixed order: `links`, then
//! `texts`, then `emojis`. Each category is a single left-to-right pass over
//! the output of the previous one, so an earlier category's replacement can be
//! matched by a later category but never by its own. Within a pass the longest
//! key matching at the current position wins; matches never overlap.

use std::collections::BTreeMap;

use crate::{
    domain::{MediaKind, MessageContent, RelayedMessage},
    rules::RuleSet,
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransformResult {
    Rewritten(String),
    Blocked(BlockReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum BlockReason {
    /// Chat or sender id is listed in `blocked`.
    BlockedId(i64),
    /// Text equals an entry of `blocked_content.texts`.
    Text,
    /// Text contains an entry of `blocked_content.paragraphs`.
    Paragraph,
    /// Media fingerprint listed in `blocked_content.images`.
    Image,
    /// Media fingerprint listed in `blocked_content.videos`.
    Video,
}

impl std::fmt::Display for BlockReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BlockReason::BlockedId(id) => write!(f, "blocked id {id}"),
            BlockReason::Text => f.write_str("blocked text"),
            BlockReason::Paragraph => f.write_str("blocked paragraph"),
            BlockReason::Image => f.write_str("blocked image"),
            BlockReason::Video => f.write_str("blocked video"),
        }
    }
}

/// Rewrite `raw` with `rules`, or report that it is blocked.
pub fn transform(raw: &str, rules: &RuleSet) -> TransformResult {
    if let Some(reason) = blocked_text(raw, rules) {
        return TransformResult::Blocked(reason);
    }

    let mut text = raw.to_string();
    for map in rules.substitution_passes() {
        text = substitute(&text, map);
    }
    TransformResult::Rewritten(text)
}

/// Block checks that need more than the text: sender/chat ids and media fingerprints.
pub fn blocked_message(msg: &RelayedMessage, rules: &RuleSet) -> Option<BlockReason> {
    if rules.is_blocked_id(msg.chat_id.0) {
        return Some(BlockReason::BlockedId(msg.chat_id.0));
    }
    if let Some(sender) = msg.sender_id.filter(|s| rules.is_blocked_id(s.0)) {
        return Some(BlockReason::BlockedId(sender.0));
    }

    let MessageContent::Media {
        kind,
        fingerprint: Some(fp),
        ..
    } = &msg.content
    else {
        return None;
    };
    match kind {
        MediaKind::Photo if rules.blocked_content.images.contains(fp) => Some(BlockReason::Image),
        MediaKind::Video | MediaKind::Animation if rules.blocked_content.videos.contains(fp) => {
            Some(BlockReason::Video)
        }
        _ => None,
    }
}

fn blocked_text(raw: &str, rules: &RuleSet) -> Option<BlockReason> {
    let blocked = &rules.blocked_content;
    if !raw.is_empty() && blocked.texts.contains(raw) {
        return Some(BlockReason::Text);
    }
    // An empty paragraph would match every message.
    if blocked
        .paragraphs
        .iter()
        .any(|p| !p.is_empty() && raw.contains(p.as_str()))
    {
        return Some(BlockReason::Paragraph);
    }
    None
}

/// One non-overlapping, leftmost-longest replacement pass.
fn substitute(input: &str, map: &BTreeMap<String, String>) -> String {
    let mut keys: Vec<(&str, &str)> = map
        .iter()
        .filter(|(k, _)| !k.is_empty())
        .map(|(k, v)| (k.as_str(), v.as_str()))
        .collect();
    if keys.is_empty() || input.is_empty() {
        return input.to_string();
    }
    // Longest first; equal-length keys cannot both match at one position.
    keys.sort_by(|a, b| b.0.len().cmp(&a.0.len()));

    let mut out = String::with_capacity(input.len());
    let mut rest = input;
    'scan: while !rest.is_empty() {
        for (key, replacement) in &keys {
            if let Some(tail) = rest.strip_prefix(key) {
                out.push_str(replacement);
                rest = tail;
                continue 'scan;
            }
        }
        let mut chars = rest.chars();
        if let Some(ch) = chars.next() {
            out.push(ch);
        }
        rest = chars.as_str();
    }
    out
}
