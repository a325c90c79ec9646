use std::sync::Arc;

use teloxide::prelude::*;
use tracing::{error, info, warn};

use chanrelay_core::{
    domain::{ChatId, UserId},
    errors::Error,
    identity_map::IdentityMap,
    registry::ChannelRegistry,
    rules::RuleStore,
    security::is_authorized,
};

use crate::router::AppState;

const NOT_ADMIN: &str = "🚫 Only an admin can use this command.";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum AdminCommand {
    AddSource,
    RemoveSource,
    SetTarget,
    ClearTarget,
    Status,
    ReloadRules,
    Help,
}

impl AdminCommand {
    fn from_name(name: &str) -> Option<Self> {
        Some(match name {
            "addsource" => Self::AddSource,
            "removesource" => Self::RemoveSource,
            "settarget" => Self::SetTarget,
            "cleartarget" => Self::ClearTarget,
            "status" => Self::Status,
            "reloadrules" => Self::ReloadRules,
            "start" | "help" => Self::Help,
            _ => return None,
        })
    }
}

fn parse_command(text: &str) -> (String, String) {
    // Telegram may send `/cmd@botname arg1 ...`
    let mut parts = text.trim().splitn(2, char::is_whitespace);
    let first = parts.next().unwrap_or("").trim();
    let rest = parts.next().unwrap_or("").trim().to_string();

    let cmd = first
        .trim_start_matches('/')
        .split('@')
        .next()
        .unwrap_or("")
        .to_lowercase();

    (cmd, rest)
}

/// Whether `text` names one of the admin commands.
pub(super) fn is_admin_command(text: &str) -> bool {
    text.starts_with('/') && AdminCommand::from_name(&parse_command(text).0).is_some()
}

fn parse_chat_id(arg: &str) -> Option<ChatId> {
    let mut parts = arg.split_whitespace();
    let id = parts.next()?.parse::<i64>().ok()?;
    if id == 0 || parts.next().is_some() {
        return None;
    }
    Some(ChatId(id))
}

pub(super) async fn handle_command(
    bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    let Some(text) = msg.text() else {
        return Ok(());
    };
    let (cmd, arg) = parse_command(text);
    let Some(command) = AdminCommand::from_name(&cmd) else {
        return Ok(());
    };

    let user_id = msg.from().map(|u| UserId(u.id.0 as i64));
    let authorized = is_authorized(
        user_id,
        ChatId(msg.chat.id.0),
        ChatId(state.cfg.control_group_id),
        &state.admins.refresh(),
    );

    let reply = if authorized {
        info!(user = ?user_id, command = %cmd, arg = %arg, "admin command");
        run_command(
            command,
            &arg,
            &state.registry,
            &state.rules,
            state.engine.identity_map(),
        )
    } else {
        warn!(user = ?user_id, command = %cmd, "rejected command from non-admin");
        NOT_ADMIN.to_string()
    };

    if let Err(e) = bot.send_message(msg.chat.id, reply).await {
        warn!(chat = msg.chat.id.0, error = %e, "failed to send command reply");
    }
    Ok(())
}

fn run_command(
    command: AdminCommand,
    arg: &str,
    registry: &ChannelRegistry,
    rules: &RuleStore,
    identity_map: &IdentityMap,
) -> String {
    match command {
        AdminCommand::AddSource => {
            let Some(chat_id) = parse_chat_id(arg) else {
                return "⚠️ Invalid format! Use: /addsource <chat_id>".to_string();
            };
            match registry.add_source(chat_id) {
                Ok(true) => format!("✅ Source chat added: {chat_id}"),
                Ok(false) => format!("⚠️ Source chat {chat_id} already exists."),
                Err(e) => failure("adding the source chat", e),
            }
        }

        AdminCommand::RemoveSource => {
            let Some(chat_id) = parse_chat_id(arg) else {
                return "⚠️ Invalid format! Use: /removesource <chat_id>".to_string();
            };
            match registry.remove_source(chat_id) {
                Ok(true) => format!("✅ Source chat removed: {chat_id}"),
                Ok(false) => format!("⚠️ Source chat {chat_id} not found."),
                Err(e) => failure("removing the source chat", e),
            }
        }

        AdminCommand::SetTarget => {
            let Some(chat_id) = parse_chat_id(arg) else {
                return "⚠️ Invalid format! Use: /settarget <chat_id>".to_string();
            };
            match registry.set_target(chat_id) {
                Ok(_) => format!("✅ Target chat updated to {chat_id}"),
                Err(e) => failure("updating the target chat", e),
            }
        }

        AdminCommand::ClearTarget => match registry.clear_target() {
            Ok(Some(prev)) => format!("✅ Target chat {prev} cleared. Relaying is paused."),
            Ok(None) => "⚠️ No target chat is set.".to_string(),
            Err(e) => failure("clearing the target chat", e),
        },

        AdminCommand::Status => {
            let snapshot = registry.current();
            let r = rules.current();

            let sources = snapshot.sorted_sources();
            let sources = if sources.is_empty() {
                "none".to_string()
            } else {
                sources
                    .iter()
                    .map(ToString::to_string)
                    .collect::<Vec<_>>()
                    .join(", ")
            };
            let target = snapshot
                .target_chat_id
                .map(|t| t.to_string())
                .unwrap_or_else(|| "not set".to_string());
            let blocked_items = r.blocked_content.texts.len()
                + r.blocked_content.paragraphs.len()
                + r.blocked_content.images.len()
                + r.blocked_content.videos.len();

            format!(
                "📊 Relay status\n\n\
Sources: {sources}\n\
Target: {target}\n\
Rules: {} links, {} texts, {} emojis, {} stickers\n\
Blocked: {} ids, {blocked_items} content items\n\
Mapped messages: {}",
                r.links.len(),
                r.texts.len(),
                r.emojis.len(),
                r.stickers.len(),
                r.blocked.len(),
                identity_map.len(),
            )
        }

        AdminCommand::ReloadRules => match rules.reload() {
            Ok(r) => format!(
                "✅ Rules reloaded: {} links, {} texts, {} emojis.",
                r.links.len(),
                r.texts.len(),
                r.emojis.len()
            ),
            Err(e) => {
                warn!(error = %e, "manual rules reload failed");
                format!("⚠️ Failed to reload rules, keeping previous rules: {e}")
            }
        },

        AdminCommand::Help => "🤖 Channel relay\n\n\
/addsource <chat_id> - Relay messages from a chat\n\
/removesource <chat_id> - Stop relaying a chat\n\
/settarget <chat_id> - Set the chat messages are relayed to\n\
/cleartarget - Pause relaying\n\
/status - Show sources, target and rule counts\n\
/reloadrules - Re-read the replacement rules file\n\
/help - Show this message"
            .to_string(),
    }
}

fn failure(action: &str, e: Error) -> String {
    match e {
        Error::Registry(reason) => format!("⚠️ {reason}"),
        other => {
            error!(error = %other, "error while {action}");
            format!("⚠️ An error occurred while {action}.")
        }
    }
}
