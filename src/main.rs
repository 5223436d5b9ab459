//! linkvault - Telegram file-share bot
//!
//! Admins turn messages of a private storage channel into deep links;
//! users open a link and the bot copies the files to them, optionally
//! deleting the copies after a while.
//!
//! ## Architecture
//!
//! - `config` - Environment configuration
//! - `database` - MongoDB integration (settings, users, channels, media index)
//! - `cache` - LRU-based caching with Moka
//! - `store` - Local JSON tables (tracked deliveries, offsets, audit log)
//! - `permissions` - Admin checks, command scopes, forced subscription
//! - `links` - Deep link payload codec
//! - `batch` - Collection sessions and the concurrent batch copier
//! - `caption` - Caption rewriting pipeline
//! - `delivery` - File delivery, cooldowns and auto-delete
//! - `search` - Relevance ranking of indexed media
//! - `backup` - JSON snapshots
//! - `tasks` - Background task registry
//! - `telegram` - Message operations seam over the Bot API
//! - `bot` - Dispatcher, runtime and health endpoint
//! - `plugins` - Command handlers
//! - `events` - Channel post indexing
//! - `utils` - Utility functions

mod backup;
mod batch;
mod bot;
mod cache;
mod caption;
mod config;
mod database;
mod delivery;
mod events;
mod links;
mod permissions;
mod plugins;
mod search;
mod store;
mod tasks;
mod telegram;
mod utils;

use std::sync::Arc;
use std::time::Duration;

use teloxide::adaptors::throttle::Limits;
use teloxide::prelude::*;
use tracing::info;
use tracing_subscriber::EnvFilter;

use backup::BackupService;
use batch::{BatchCopier, ChannelIdentity, CopierConfig, SessionHub};
use bot::AppState;
use cache::CacheRegistry;
use config::Config;
use database::{ChannelRepository, Database, MediaRepository, SettingsRepository, UserRepo};
use delivery::{CooldownGovernor, Deliverer, DeliveryTracker, Notices, NotifyPrefs};
use permissions::Permissions;
use search::SearchCache;
use store::{AuditLog, JsonStore, UpdateOffset};
use tasks::TaskRegistry;
use telegram::{BackoffPolicy, MessageOps};

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: tikv_jemallocator::Jemalloc = tikv_jemallocator::Jemalloc;

/// Flush interval of the update offset table.
const OFFSET_FLUSH_EVERY: Duration = Duration::from_secs(30);
/// Deletion notices go out at most once per chat in this window.
const NOTICE_WINDOW_MINUTES: i64 = 5;
/// How long background tasks get to stop on shutdown.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file first (before anything else)
    dotenvy::dotenv().ok();

    // If RUST_LOG is not set, default to "info" level for our crate
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("linkvault=info,teloxide=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .init();

    info!("Starting linkvault...");

    let config = Arc::new(Config::from_env());
    info!("Configuration loaded, bot mode: {:?}", config.bot_mode);

    // Connect to MongoDB
    info!("Connecting to MongoDB...");
    let db = Database::connect(&config.mongodb_uri, &config.mongodb_database).await?;
    info!("Database connected");

    let cache = Arc::new(CacheRegistry::new());

    // Throttle keeps us inside Telegram's global and per-chat limits
    let raw_bot = Bot::new(&config.bot_token);
    let bot = raw_bot.clone().throttle(Limits::default());

    let me = bot.get_me().await?;
    let bot_username = config
        .bot_username
        .clone()
        .unwrap_or_else(|| me.username().to_string());
    info!("Using bot username: @{}", bot_username);

    if config.owner_ids.is_empty() {
        info!("No owner IDs configured (OWNER_IDS is empty)");
    } else {
        info!("Bot owners: {:?}", config.owner_ids);
    }

    // Local JSON tables
    let store = JsonStore::new(config.data_dir.clone(), config.fallback_data_dir.clone());
    let tracker = Arc::new(DeliveryTracker::load(store.clone()).await);
    let notify_prefs = Arc::new(NotifyPrefs::load(store.clone()).await);
    let audit = Arc::new(AuditLog::load(store.clone()).await);
    let offset = Arc::new(UpdateOffset::load(store.clone()).await);
    info!(
        "Loaded {} tracked deliveries, last update {}",
        tracker.len(),
        offset.latest()
    );

    // Core services
    let channel_chat = ChatId(config.db_channel_id);
    let ops: Arc<dyn MessageOps> = Arc::new(bot.clone());

    let governor = Arc::new(CooldownGovernor::new());
    let deliverer = Arc::new(Deliverer::new(
        Arc::clone(&ops),
        channel_chat,
        Arc::clone(&tracker),
        Arc::clone(&governor),
        config.brand_button_text.clone(),
    ));
    let copier = Arc::new(BatchCopier::new(
        Arc::clone(&ops),
        channel_chat,
        CopierConfig {
            concurrency: config.copy_concurrency,
            copy: BackoffPolicy::new(config.copy_max_retries),
            attach: BackoffPolicy::new(config.attach_max_retries),
        },
    ));
    let notices = Arc::new(Notices::new(
        Arc::clone(&notify_prefs),
        chrono::Duration::minutes(NOTICE_WINDOW_MINUTES),
    ));
    let backup = Arc::new(BackupService::new(
        db.clone(),
        Arc::clone(&tracker),
        store.clone(),
        config.backup_keep,
    ));

    let state = AppState {
        permissions: Permissions::with_owners(raw_bot, &cache, config.owner_ids.clone()),
        users: Arc::new(UserRepo::new(&db, &cache)),
        settings: Arc::new(SettingsRepository::new(&db, &cache, store.clone())),
        media: Arc::new(MediaRepository::new(&db)),
        channels: Arc::new(ChannelRepository::new(&db, &cache)),
        deliverer,
        copier,
        sessions: SessionHub::new(),
        search: SearchCache::new(&cache),
        notify_prefs,
        audit,
        offset: Arc::clone(&offset),
        backup: Arc::clone(&backup),
        channel: ChannelIdentity {
            chat_id: config.db_channel_id,
            username: config.db_channel_username.clone(),
        },
        config: Arc::clone(&config),
        bot_username,
        cache,
    };

    // Background tasks
    let tasks = TaskRegistry::new();
    {
        let tracker = Arc::clone(&tracker);
        let interval = config.sweep_interval;
        tasks.spawn("auto-delete sweeper", move |token| {
            delivery::run_sweeper(tracker, ops, notices, governor, interval, token)
        });
    }
    if let Some(interval) = config.backup_interval {
        tasks.spawn("backup", move |token| backup.run_periodic(interval, token));
    }
    if let Some(port) = config.health_port {
        let tracker = Arc::clone(&tracker);
        let offset = Arc::clone(&offset);
        tasks.spawn("health", move |token| bot::serve_health(port, tracker, offset, token));
    }
    tasks.spawn("offset flusher", {
        let offset = Arc::clone(&offset);
        move |token| offset.run_flusher(OFFSET_FLUSH_EVERY, token)
    });

    let dispatcher = bot::build_dispatcher(bot.clone(), state);
    let result = bot::run(&config, bot, dispatcher).await;

    info!("Shutting down...");
    tasks.shutdown(SHUTDOWN_GRACE).await;
    offset.flush().await;
    tracker.persist().await;

    result
}
