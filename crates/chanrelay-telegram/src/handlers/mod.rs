//! Telegram update handlers.
//!
//! Admin commands sent in the control group go to the command handler;
//! everything else is converted into a relay event and handed to the relay
//! engine, which decides whether the chat is relayed.

use std::sync::Arc;

use teloxide::{prelude::*, types::Message};
use tracing::debug;

use chanrelay_core::domain::EventKind;

use crate::{convert::relayed_message, router::AppState};

mod commands;

pub async fn handle_message(bot: Bot, msg: Message, state: Arc<AppState>) -> ResponseResult<()> {
    if msg.chat.id.0 == state.cfg.control_group_id
        && msg.text().is_some_and(commands::is_admin_command)
    {
        return commands::handle_command(bot, msg, state).await;
    }

    relay(&msg, EventKind::New, &state).await;
    Ok(())
}

pub async fn handle_edited_message(
    _bot: Bot,
    msg: Message,
    state: Arc<AppState>,
) -> ResponseResult<()> {
    relay(&msg, EventKind::Edit, &state).await;
    Ok(())
}

async fn relay(msg: &Message, kind: EventKind, state: &AppState) {
    let Some(event) = relayed_message(msg, kind) else {
        debug!(chat = msg.chat.id.0, message = msg.id.0, "ignored service message");
        return;
    };
    // Outcomes are logged and audited by the engine.
    state.engine.handle(&event).await;
}
