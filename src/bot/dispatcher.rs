//! Message dispatcher setup.
//!
//! Builds the dispatcher with all command handlers and event handlers.

use std::sync::Arc;

use teloxide::adaptors::Throttle;
use teloxide::dispatching::UpdateHandler;
use teloxide::error_handlers::LoggingErrorHandler;
use teloxide::prelude::*;

use crate::backup::BackupService;
use crate::batch::{BatchCopier, ChannelIdentity, SessionHub};
use crate::cache::CacheRegistry;
use crate::config::Config;
use crate::database::{ChannelRepository, MediaRepository, SettingsRepository, UserRepo};
use crate::delivery::{Deliverer, NotifyPrefs};
use crate::events;
use crate::permissions::Permissions;
use crate::plugins::{self, SessionInput};
use crate::search::SearchCache;
use crate::store::{AuditLog, UpdateOffset};

/// Bot type with Throttle adaptor for automatic rate limiting.
pub type ThrottledBot = Throttle<Bot>;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    /// Cache registry for creating/accessing caches.
    pub cache: Arc<CacheRegistry>,

    /// Admin checks and forced-subscription membership.
    pub permissions: Permissions,

    /// Users who talked to the bot, and the ban list.
    pub users: Arc<UserRepo>,

    /// Global bot settings (captions, timer, toggles).
    pub settings: Arc<SettingsRepository>,

    /// Index of canonical channel messages.
    pub media: Arc<MediaRepository>,

    /// Forced-subscription channels.
    pub channels: Arc<ChannelRepository>,

    /// Copies files to users and tracks them for auto-delete.
    pub deliverer: Arc<Deliverer>,

    /// Copies collected batch items into the canonical channel.
    pub copier: Arc<BatchCopier>,

    /// Open batch collection sessions.
    pub sessions: Arc<SessionHub<SessionInput>>,

    pub search: SearchCache,
    pub notify_prefs: Arc<NotifyPrefs>,
    pub audit: Arc<AuditLog>,
    pub offset: Arc<UpdateOffset>,
    pub backup: Arc<BackupService>,

    /// The canonical channel.
    pub channel: ChannelIdentity,

    pub config: Arc<Config>,

    /// Bot username (without @) for deep link construction.
    pub bot_username: String,
}

impl AppState {
    /// Current settings plus the admin check for `user_id`.
    pub async fn is_admin(&self, user_id: u64) -> bool {
        if self.permissions.is_bot_owner(user_id) {
            return true;
        }
        let settings = self.settings.get().await;
        self.permissions.is_admin(user_id, &settings)
    }
}

/// Build the dispatcher with all handlers.
pub fn build_dispatcher(
    bot: ThrottledBot,
    state: AppState,
) -> Dispatcher<ThrottledBot, anyhow::Error, teloxide::dispatching::DefaultKey> {
    Dispatcher::builder(bot, schema())
        .dependencies(dptree::deps![state])
        .default_handler(|_| async {})
        .error_handler(LoggingErrorHandler::with_custom_text("Error in update handler"))
        .enable_ctrlc_handler()
        .build()
}

/// Build the handler schema.
fn schema() -> UpdateHandler<anyhow::Error> {
    use teloxide::dispatching::UpdateFilterExt;

    // Message handlers: user tracking first, then open sessions, then commands
    let message_handler = Update::filter_message()
        .inspect_async(track_user)
        .branch(plugins::session_handler())
        .branch(plugins::command_handler());

    // Posts in the canonical channel feed the media index
    let channel_handler = Update::filter_channel_post().branch(events::channel_post_handler());
    let edited_channel_handler =
        Update::filter_edited_channel_post().branch(events::channel_post_handler());

    // Callback query handler
    let callback_handler = plugins::callback_handler();

    dptree::filter(|update: Update, state: AppState| state.offset.observe(update.id.0))
        .branch(message_handler)
        .branch(channel_handler)
        .branch(edited_channel_handler)
        .branch(callback_handler)
}

/// Track user from message (runs before all handlers).
async fn track_user(msg: Message, state: AppState) {
    if let Some(user) = msg.from.as_ref()
        && !user.is_bot
    {
        state.users.clone().upsert_background(user.clone());
    }
}
