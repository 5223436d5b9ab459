//! Plugin system for command handlers.
//!
//! Add new commands by:
//! 1. Adding a variant to [`Command`]
//! 2. Giving it a scope in [`Command::scope`]
//! 3. Adding the handler to `command_handler()`

pub mod admin;
pub mod batch;
pub mod caption;
pub mod help;
pub mod search;
pub mod start;

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use teloxide::types::ReplyParameters;
use teloxide::utils::command::BotCommands;
use tracing::warn;

use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::permissions::{Scope, ScopeContext};

pub use batch::SessionInput;

/// All bot commands.
#[derive(BotCommands, Clone, Debug, PartialEq, Eq)]
#[command(rename_rule = "lowercase", description = "Available commands:")]
pub enum Command {
    #[command(description = "Start the bot or open a file link")]
    Start(String),

    #[command(description = "Show help")]
    Help,

    #[command(description = "Search shared files")]
    Search(String),

    #[command(description = "Toggle deletion notices")]
    Notify,

    // Link creation
    #[command(description = "Link for one message")]
    Genlink,

    #[command(description = "Range link from first and last channel message")]
    Batch,

    #[command(rename = "custom_batch", description = "Collect many messages into one link")]
    CustomBatch,

    #[command(description = "Finish the current collection")]
    Stop,

    #[command(description = "Abort the current collection")]
    Cancel,

    // Captions
    #[command(description = "Replace text in captions: old | new")]
    Replace(String),

    #[command(description = "Fallback caption: text | on | off")]
    Globalcap(String),

    #[command(description = "Replace a link in captions: old | new")]
    Linkreplace(String),

    #[command(description = "Point every link at one URL: url | on | off")]
    Replaceall(String),

    #[command(description = "Append a line to captions")]
    Append(String),

    #[command(description = "Strip links from captions: on | off")]
    Striplinks(String),

    #[command(description = "Protect delivered files from forwarding: on | off")]
    Protect(String),

    #[command(description = "Document caption template with {filename} and {previouscaption}")]
    Customcaption(String),

    #[command(description = "Show caption settings")]
    Caption,

    // Delivery
    #[command(description = "Auto-delete timer: 2h, 30m, 1d, off")]
    Settimer(String),

    #[command(description = "Re-copy policy for outside messages: allow | deny | ask")]
    Recopy(String),

    #[command(description = "Share button on batch copies: on | off")]
    Sharebutton(String),

    // Users and channels
    #[command(description = "Ban a user")]
    Ban(String),

    #[command(description = "Unban a user")]
    Unban(String),

    #[command(description = "Require joining a channel")]
    Addchannel(String),

    #[command(description = "Stop requiring a channel")]
    Delchannel(String),

    #[command(description = "List required channels")]
    Channels,

    // Maintenance
    #[command(description = "Take a backup now")]
    Backup,

    #[command(description = "Bot statistics")]
    Stats,
}

impl Command {
    /// Who may run the command.
    pub fn scope(&self) -> Scope {
        match self {
            Self::Start(_) | Self::Help | Self::Search(_) | Self::Notify => Scope::Any,
            Self::Genlink | Self::Batch | Self::CustomBatch | Self::Stop | Self::Cancel => {
                Scope::private_admin()
            }
            _ => Scope::Admin,
        }
    }
}

/// Build the combined command handler.
pub fn command_handler() -> UpdateHandler<anyhow::Error> {
    use dptree::case;

    teloxide::filter_command::<Command, _>()
        .filter_async(scope_allows)
        .branch(case![Command::Start(args)].endpoint(start::start_command))
        .branch(case![Command::Help].endpoint(help::help_command))
        .branch(case![Command::Search(query)].endpoint(search::search_command))
        .branch(case![Command::Notify].endpoint(start::notify_command))
        // Link creation
        .branch(case![Command::Genlink].endpoint(batch::genlink_command))
        .branch(case![Command::Batch].endpoint(batch::batch_command))
        .branch(case![Command::CustomBatch].endpoint(batch::custom_batch_command))
        .branch(case![Command::Stop].endpoint(batch::no_session_command))
        .branch(case![Command::Cancel].endpoint(batch::no_session_command))
        // Captions
        .branch(case![Command::Replace(args)].endpoint(caption::replace_command))
        .branch(case![Command::Globalcap(args)].endpoint(caption::globalcap_command))
        .branch(case![Command::Linkreplace(args)].endpoint(caption::linkreplace_command))
        .branch(case![Command::Replaceall(args)].endpoint(caption::replaceall_command))
        .branch(case![Command::Append(args)].endpoint(caption::append_command))
        .branch(case![Command::Striplinks(args)].endpoint(caption::striplinks_command))
        .branch(case![Command::Protect(args)].endpoint(caption::protect_command))
        .branch(case![Command::Customcaption(args)].endpoint(caption::customcaption_command))
        .branch(case![Command::Caption].endpoint(caption::caption_command))
        // Delivery
        .branch(case![Command::Settimer(args)].endpoint(admin::settimer_command))
        .branch(case![Command::Recopy(args)].endpoint(admin::recopy_command))
        .branch(case![Command::Sharebutton(args)].endpoint(admin::sharebutton_command))
        // Users and channels
        .branch(case![Command::Ban(args)].endpoint(admin::ban_command))
        .branch(case![Command::Unban(args)].endpoint(admin::unban_command))
        .branch(case![Command::Addchannel(args)].endpoint(admin::addchannel_command))
        .branch(case![Command::Delchannel(args)].endpoint(admin::delchannel_command))
        .branch(case![Command::Channels].endpoint(admin::channels_command))
        // Maintenance
        .branch(case![Command::Backup].endpoint(admin::backup_command))
        .branch(case![Command::Stats].endpoint(admin::stats_command))
}

/// Evaluate the command's scope, telling the caller when it fails.
async fn scope_allows(bot: ThrottledBot, msg: Message, cmd: Command, state: AppState) -> bool {
    let scope = cmd.scope();
    let user_id = msg.from.as_ref().map(|u| u.id.0);

    let is_admin = match (scope.needs_admin(), user_id) {
        (true, Some(user_id)) => state.is_admin(user_id).await,
        _ => false,
    };
    let ctx = ScopeContext {
        is_private: msg.chat.is_private(),
        is_admin,
    };

    match scope.check(&ctx) {
        Ok(()) => true,
        Err(denied) => {
            if let Err(e) = bot
                .send_message(msg.chat.id, denied.message())
                .reply_parameters(ReplyParameters::new(msg.id))
                .await
            {
                warn!("Failed to send scope denial: {}", e);
            }
            false
        }
    }
}

/// Route private messages of admins with an open collection session.
pub fn session_handler() -> UpdateHandler<anyhow::Error> {
    dptree::filter_map(|msg: Message, state: AppState| {
        let user_id = msg.from.as_ref()?.id.0;
        if !msg.chat.is_private() || !state.sessions.is_open(user_id) {
            return None;
        }
        SessionInput::from_message(msg)
    })
    .endpoint(batch::route_session_input)
}

/// Build the callback query handler.
pub fn callback_handler() -> UpdateHandler<anyhow::Error> {
    Update::filter_callback_query()
        .branch(dptree::filter(|q: CallbackQuery| has_prefix(&q, search::PAGE_PREFIX)).endpoint(search::page_callback))
        .branch(dptree::filter(|q: CallbackQuery| has_prefix(&q, search::GET_PREFIX)).endpoint(search::get_callback))
        .branch(dptree::filter(|q: CallbackQuery| has_prefix(&q, batch::RECOPY_PREFIX)).endpoint(batch::recopy_callback))
        .branch(dptree::endpoint(start::about_callback))
}

fn has_prefix(q: &CallbackQuery, prefix: &str) -> bool {
    q.data.as_deref().is_some_and(|d| d.starts_with(prefix))
}

/// Reply to `msg` with HTML text.
pub(crate) async fn reply_html(bot: &ThrottledBot, msg: &Message, text: impl Into<String>) -> anyhow::Result<Message> {
    Ok(bot
        .send_message(msg.chat.id, text)
        .parse_mode(teloxide::types::ParseMode::Html)
        .reply_parameters(ReplyParameters::new(msg.id))
        .await?)
}
