use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use chanrelay_core::{
    config::Config, identity_map::IdentityMap, registry::ChannelRegistry, rules::RuleStore,
    security::AdminStore,
};
use chanrelay_telegram::router::{run_polling, Stores};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    chanrelay_core::logging::init("chanrelay")?;

    let cfg = Arc::new(Config::load()?);

    // Corrupt state files abort startup instead of being overwritten.
    let admins = Arc::new(
        AdminStore::load(&cfg.admin_file, cfg.main_admin_id).context("loading admin list")?,
    );
    let rules = Arc::new(RuleStore::load(&cfg.replacement_file).context("loading rules")?);
    let registry = Arc::new(
        ChannelRegistry::load(&cfg.settings_file).context("loading channel registry")?,
    );
    let identity_map =
        Arc::new(IdentityMap::load(&cfg.message_map_file).context("loading message map")?);

    let watcher = cfg.rules_reload_interval.map(|interval| {
        info!(interval = ?interval, "watching rules file for changes");
        rules.spawn_watcher(interval)
    });

    let result = run_polling(
        cfg,
        Stores {
            registry,
            rules,
            admins,
            identity_map: identity_map.clone(),
        },
    )
    .await;

    if let Some(w) = watcher {
        w.stop().await;
    }
    identity_map
        .persist()
        .await
        .context("saving message map on shutdown")?;

    result
}
