//! Relay engine: new messages are filtered, rewritten, delivered and mapped;
//! edits are filtered, rewritten, routed through the identity map and pushed
//! to the target.
//!
//! Each event is handled on its own. Registry and rule snapshots are read once
//! at the top of an event, no lock is held across a transport call, and the
//! identity map is written only after delivery is confirmed. Failures never
//! escape an event: every path ends in a [`RelayOutcome`].

use std::sync::Arc;

use tracing::{debug, info, warn};

use crate::{
    domain::{ChatId, EventKind, MediaKind, MessageContent, MessageRef, RelayedMessage},
    identity_map::IdentityMap,
    messaging::port::MessagingPort,
    ports::{RegistrySource, RuleSource},
    registry::RegistrySnapshot,
    rules::RuleSet,
    transform::{blocked_message, transform, BlockReason, TransformResult},
    utils::{AuditEvent, AuditLogger},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RelayOutcome {
    /// A new target message was created and mapped.
    Delivered(MessageRef),
    /// The mapped target message was edited.
    Edited(MessageRef),
    Dropped(DropReason),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum DropReason {
    /// Chat is not a registered source, no target is set, or the chat is the target.
    RegistryMiss,
    /// Content matched a block rule.
    RuleBlock(BlockReason),
    /// Edit for a message that was never relayed.
    MappingMiss,
    /// The transport cannot apply this edit (stickers, locations, polls, ...).
    Unsupported,
    /// Delivery or edit call failed.
    Transport(String),
}

impl DropReason {
    fn is_expected(&self) -> bool {
        !matches!(self, DropReason::Transport(_))
    }
}

impl std::fmt::Display for DropReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DropReason::RegistryMiss => f.write_str("registry miss"),
            DropReason::RuleBlock(r) => write!(f, "rule block ({r})"),
            DropReason::MappingMiss => f.write_str("mapping miss"),
            DropReason::Unsupported => f.write_str("unsupported edit"),
            DropReason::Transport(e) => write!(f, "transport error: {e}"),
        }
    }
}

pub struct RelayEngine {
    transport: Arc<dyn MessagingPort>,
    rules: Arc<dyn RuleSource>,
    registry: Arc<dyn RegistrySource>,
    map: Arc<IdentityMap>,
    audit: Option<Arc<AuditLogger>>,
}

impl RelayEngine {
    pub fn new(
        transport: Arc<dyn MessagingPort>,
        rules: Arc<dyn RuleSource>,
        registry: Arc<dyn RegistrySource>,
        map: Arc<IdentityMap>,
    ) -> Self {
        Self {
            transport,
            rules,
            registry,
            map,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: Arc<AuditLogger>) -> Self {
        self.audit = Some(audit);
        self
    }

    pub fn identity_map(&self) -> &Arc<IdentityMap> {
        &self.map
    }

    /// Route an event to the new-message or edit path.
    pub async fn handle(&self, event: &RelayedMessage) -> RelayOutcome {
        match event.kind {
            EventKind::New => self.on_new_message(event).await,
            EventKind::Edit => self.on_edited_message(event).await,
        }
    }

    pub async fn on_new_message(&self, event: &RelayedMessage) -> RelayOutcome {
        let registry = self.registry.current();
        let Some(target) = eligible_target(&registry, event.chat_id) else {
            return self.drop_event(event, DropReason::RegistryMiss);
        };

        let rules = self.rules.current();
        let text = match rewrite(event, &rules) {
            Ok(text) => text,
            Err(reason) => return self.drop_event(event, DropReason::RuleBlock(reason)),
        };

        let source = event.source();
        let delivered = match &event.content {
            MessageContent::Text(_) => self.transport.send_text(target, &text).await,
            MessageContent::Media { caption, .. } => {
                let caption = caption.as_ref().map(|_| text.as_str());
                self.transport.copy_message(source, target, caption).await
            }
            MessageContent::Sticker { file_id } => match rules.sticker_for(file_id) {
                Some(mapped) => self.transport.send_sticker(target, mapped).await,
                None => self.transport.copy_message(source, target, None).await,
            },
        };

        let target_ref = match delivered {
            Ok(r) => r,
            Err(e) => return self.drop_event(event, DropReason::Transport(e.to_string())),
        };

        self.map.record(source, target_ref.message_id);
        if let Err(e) = self.map.persist().await {
            warn!(source = %source, error = %e, "failed to save identity map");
        }

        info!(
            source = %source,
            target = %target_ref,
            kind = event.content.kind_label(),
            "relayed message"
        );
        self.audit(AuditEvent::relayed(
            source,
            target_ref,
            event.content.kind_label(),
            &text,
        ));
        RelayOutcome::Delivered(target_ref)
    }

    pub async fn on_edited_message(&self, event: &RelayedMessage) -> RelayOutcome {
        let registry = self.registry.current();
        let Some(target) = eligible_target(&registry, event.chat_id) else {
            return self.drop_event(event, DropReason::RegistryMiss);
        };

        let rules = self.rules.current();
        let text = match rewrite(event, &rules) {
            Ok(text) => text,
            Err(reason) => return self.drop_event(event, DropReason::RuleBlock(reason)),
        };

        let source = event.source();
        let Some(target_id) = self.map.lookup(source) else {
            return self.drop_event(event, DropReason::MappingMiss);
        };
        let target_ref = MessageRef {
            chat_id: target,
            message_id: target_id,
        };

        let edited = match &event.content {
            MessageContent::Text(_) => self.transport.edit_text(target_ref, &text).await,
            MessageContent::Media { kind, .. } if *kind != MediaKind::Other => {
                self.transport.edit_caption(target_ref, &text).await
            }
            MessageContent::Media { .. } | MessageContent::Sticker { .. } => {
                return self.drop_event(event, DropReason::Unsupported);
            }
        };

        if let Err(e) = edited {
            return self.drop_event(event, DropReason::Transport(e.to_string()));
        }

        info!(source = %source, target = %target_ref, "edited relayed message");
        self.audit(AuditEvent::edited(
            source,
            target_ref,
            event.content.kind_label(),
            &text,
        ));
        RelayOutcome::Edited(target_ref)
    }

    fn drop_event(&self, event: &RelayedMessage, reason: DropReason) -> RelayOutcome {
        let source = event.source();
        if reason.is_expected() {
            debug!(source = %source, kind = ?event.kind, %reason, "dropped event");
        } else {
            warn!(source = %source, kind = ?event.kind, %reason, "dropped event");
        }
        self.audit(AuditEvent::dropped(
            source,
            event.content.kind_label(),
            &reason.to_string(),
        ));
        RelayOutcome::Dropped(reason)
    }

    fn audit(&self, event: AuditEvent) {
        let Some(audit) = &self.audit else {
            return;
        };
        if let Err(e) = audit.write(event) {
            warn!(path = %audit.path().display(), error = %e, "audit write failed");
        }
    }
}

/// Target chat for an event from `chat_id`, if the chat may be relayed.
fn eligible_target(registry: &RegistrySnapshot, chat_id: ChatId) -> Option<ChatId> {
    if !registry.is_source(chat_id) {
        return None;
    }
    let target = registry.target_chat_id?;
    if target == chat_id {
        warn!(chat = %chat_id, "chat is configured as both source and target, ignoring");
        return None;
    }
    Some(target)
}

fn rewrite(event: &RelayedMessage, rules: &RuleSet) -> Result<String, BlockReason> {
    if let Some(reason) = blocked_message(event, rules) {
        return Err(reason);
    }
    match transform(event.content.text(), rules) {
        TransformResult::Rewritten(text) => Ok(text),
        TransformResult::Blocked(reason) => Err(reason),
    }
}
