use std::sync::Arc;

use teloxide::{dispatching::Dispatcher, dptree, prelude::*};
use tracing::info;

use chanrelay_core::messaging::throttled::{ThrottleConfig, ThrottledMessenger};
use chanrelay_core::{
    config::Config, identity_map::IdentityMap, messaging::port::MessagingPort,
    registry::ChannelRegistry, relay::RelayEngine, rules::RuleStore, security::AdminStore,
    utils::AuditLogger,
};

use crate::handlers;
use crate::TelegramMessenger;

#[derive(Clone)]
pub struct AppState {
    pub cfg: Arc<Config>,
    pub engine: Arc<RelayEngine>,
    pub registry: Arc<ChannelRegistry>,
    pub rules: Arc<RuleStore>,
    pub admins: Arc<AdminStore>,
}

/// Persistent state loaded at startup.
pub struct Stores {
    pub registry: Arc<ChannelRegistry>,
    pub rules: Arc<RuleStore>,
    pub admins: Arc<AdminStore>,
    pub identity_map: Arc<IdentityMap>,
}

pub async fn run_polling(cfg: Arc<Config>, stores: Stores) -> anyhow::Result<()> {
    let bot = Bot::new(cfg.telegram_bot_token.clone());

    match bot.get_me().await {
        Ok(me) => info!(username = %me.username(), "relay bot started"),
        Err(e) => anyhow::bail!("telegram getMe failed: {e}"),
    }
    let registry = stores.registry.current();
    info!(
        sources = registry.source_chat_ids.len(),
        target = ?registry.target_chat_id,
        control_group = cfg.control_group_id,
        admins = stores.admins.current().len(),
        "relay configuration"
    );

    // Every relayed message lands in the same target chat, so throttle outbound
    // calls here. The adapter still retries once on a 429 RetryAfter.
    let raw_messenger: Arc<dyn MessagingPort> = Arc::new(TelegramMessenger::new(bot.clone()));
    let messenger: Arc<dyn MessagingPort> = Arc::new(ThrottledMessenger::new(
        raw_messenger,
        ThrottleConfig::from(cfg.as_ref()),
    ));

    let engine = RelayEngine::new(
        messenger,
        stores.rules.clone(),
        stores.registry.clone(),
        stores.identity_map,
    )
    .with_audit(Arc::new(AuditLogger::new(
        cfg.audit_log_path.clone(),
        cfg.audit_log_json,
    )));

    let state = Arc::new(AppState {
        cfg,
        engine: Arc::new(engine),
        registry: stores.registry,
        rules: stores.rules,
        admins: stores.admins,
    });

    // Updates from one chat are dispatched in order; different chats run concurrently.
    let handler = dptree::entry()
        .branch(Update::filter_message().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_message().endpoint(handlers::handle_edited_message))
        .branch(Update::filter_channel_post().endpoint(handlers::handle_message))
        .branch(Update::filter_edited_channel_post().endpoint(handlers::handle_edited_message));

    Dispatcher::builder(bot, handler)
        .dependencies(dptree::deps![state])
        .enable_ctrlc_handler()
        .build()
        .dispatch()
        .await;

    info!("dispatcher stopped");
    Ok(())
}
