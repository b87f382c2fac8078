mod config;
mod dispatch;
mod mentions;
mod message;
mod platform;
mod store;
mod translate;
mod window;
mod zulip;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use teloxide::Bot;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::dispatch::BridgeDispatcher;
use crate::mentions::MentionDirectory;
use crate::platform::telegram::{TelegramFileResolver, TelegramNotifier};
use crate::platform::BridgeState;
use crate::store::MappingStore;
use crate::translate::TranslateContext;
use crate::window::EditWindow;
use crate::zulip::ZulipClient;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tgzulip_bridge=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from("config.toml"));

    info!("Loading configuration from: {}", config_path.display());
    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path.display()))?;

    info!("Configuration loaded successfully");
    info!("  Zulip site: {}", config.zulip.site);
    info!("  Stream: {}", config.zulip.stream);
    info!("  Topic rule: {:?}", config.topic_rule());
    info!("  Time zone: {}", config.bridge.timezone);
    info!("  Edit window: {} minutes", config.bridge.edit_window_minutes);

    // Startup-time collaborators: all fatal if missing or broken.
    let mentions = MentionDirectory::load(&config.zulip.users_file)?;
    let store = MappingStore::open(&config.db.path)?;

    let bot = Bot::new(&config.telegram.bot_token);
    let zulip = ZulipClient::new(config.zulip.clone());

    let ctx = TranslateContext {
        stream: config.zulip.stream.clone(),
        topic_rule: config.topic_rule(),
        tz: config.timezone()?,
    };

    let dispatcher = BridgeDispatcher::new(
        zulip,
        TelegramFileResolver::new(bot.clone()),
        TelegramNotifier::new(bot.clone()),
        store,
        EditWindow::from_minutes(config.bridge.edit_window_minutes),
        ctx,
    );

    let state = Arc::new(BridgeState {
        dispatcher,
        mentions,
    });

    info!("Bridge is starting...");
    platform::telegram::run(state, bot).await?;

    Ok(())
}
