//! Application state

use std::sync::Arc;

use primebot_membership::{
    Clock, InMemoryStore, MembershipContext, MembershipResult, MembershipStore,
    PgMembershipStore, SystemClock,
};
use reqwest::Client;

use crate::{backup_webhook::WebhookBackup, config::Config, discord::DiscordClient};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub ctx: MembershipContext,
    pub config: Arc<Config>,
    /// Source of "now" for commands and manual sweeps
    pub clock: Arc<dyn Clock>,
}

impl AppState {
    pub fn new(ctx: MembershipContext, config: Config) -> Self {
        Self::with_clock(ctx, config, Arc::new(SystemClock))
    }

    pub fn with_clock(ctx: MembershipContext, config: Config, clock: Arc<dyn Clock>) -> Self {
        Self {
            ctx,
            config: Arc::new(config),
            clock,
        }
    }

    pub fn now(&self) -> i64 {
        self.clock.now_ms()
    }
}

/// Postgres when `DATABASE_URL` is set (migrations run on connect), in-memory otherwise
pub async fn open_store(config: &Config) -> MembershipResult<Arc<dyn MembershipStore>> {
    match config.database_url.as_deref() {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let store = PgMembershipStore::connect(url).await?;
            tracing::info!("Database connection established, migrations applied");
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set - using in-memory store, state is lost on restart");
            Ok(Arc::new(InMemoryStore::new()))
        }
    }
}

/// Wire the store and the Discord and backup adapters into one context
pub fn build_context(
    config: &Config,
    store: Arc<dyn MembershipStore>,
    http: Client,
) -> MembershipContext {
    let discord = Arc::new(DiscordClient::new(
        http.clone(),
        config.discord_api_base.clone(),
        config.discord_token.clone(),
        config.guild_id.clone(),
        config.prime_role_id.clone(),
    ));
    let backup = WebhookBackup::from_config(http, config.backup_webhook_url.as_deref());

    MembershipContext::new(
        store,
        discord.clone(),
        discord,
        Arc::new(backup),
        config.engine_settings(),
    )
}
