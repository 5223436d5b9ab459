//! Link creation: /genlink, /batch and /custom_batch.
//!
//! Each command opens a collection session for the admin and spawns a
//! collector task that owns it. While the session is open the admin's
//! private messages are routed to the collector instead of the command
//! router. The dispatcher handles one chat's updates in order, so the
//! collector must run outside the handler that opened it.

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, MessageOrigin, ParseMode};
use tracing::{debug, error, info, warn};
use url::Url;

use super::reply_html;
use crate::batch::{
    BatchItem, BatchSession, Classification, PendingMessage, SessionInbox, SessionOutcome, SessionState,
    Submission, classify, range_anchors,
};
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::{MediaEntry, RecopyPolicy};
use crate::links::{self, LinkPayload};

/// Callback prefix of the re-copy prompt, followed by `yes` or `no`.
pub const RECOPY_PREFIX: &str = "recopy:";

/// Input for an open collection session.
#[derive(Debug, Clone)]
pub enum SessionInput {
    Submit(Message),
    Stop,
    Cancel,
    /// Answer to the re-copy prompt.
    Recopy(bool),
}

impl SessionInput {
    /// `None` for commands other than /stop and /cancel, which keep going
    /// through the command router.
    pub fn from_message(msg: Message) -> Option<Self> {
        if msg.forward_origin().is_some() {
            return Some(Self::Submit(msg));
        }
        match msg.text().and_then(command_name).as_deref() {
            Some("stop") => Some(Self::Stop),
            Some("cancel") => Some(Self::Cancel),
            Some(_) => None,
            None => Some(Self::Submit(msg)),
        }
    }
}

/// Lowercased command name of `/name@bot args`, if `text` is a command.
fn command_name(text: &str) -> Option<String> {
    let word = text.strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next().unwrap_or(word);
    (!name.is_empty()).then(|| name.to_lowercase())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    /// One message, single link.
    Single,
    /// First and last channel message, range link, nothing copied.
    Range,
    /// Any number of messages, copied as needed.
    Custom,
}

impl Mode {
    fn session(self) -> BatchSession {
        match self {
            Self::Single => BatchSession::with_limit(1),
            Self::Range => BatchSession::with_limit(2),
            Self::Custom => BatchSession::new(),
        }
    }

    fn prompt(self) -> &'static str {
        match self {
            Self::Single => "Send or forward the message to share.\n/cancel to abort.",
            Self::Range => {
                "Forward the <b>first</b> message of the range from the channel (or send its link), \
                 then the <b>last</b> one.\n/cancel to abort."
            }
            Self::Custom => {
                "Send or forward messages in the order they should be delivered.\n\
                 /stop when done, /cancel to abort."
            }
        }
    }
}

/// Handle /genlink.
pub async fn genlink_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    open_session(bot, msg, state, Mode::Single).await
}

/// Handle /batch.
pub async fn batch_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    open_session(bot, msg, state, Mode::Range).await
}

/// Handle /custom_batch.
pub async fn custom_batch_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    open_session(bot, msg, state, Mode::Custom).await
}

/// /stop or /cancel with no session open.
pub async fn no_session_command(bot: ThrottledBot, msg: Message) -> anyhow::Result<()> {
    reply_html(&bot, &msg, "Nothing is being collected right now.").await?;
    Ok(())
}

async fn open_session(bot: ThrottledBot, msg: Message, state: AppState, mode: Mode) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let Some(inbox) = state.sessions.open(user.id.0) else {
        reply_html(&bot, &msg, "A collection is already running. Send /stop or /cancel first.").await?;
        return Ok(());
    };

    reply_html(&bot, &msg, mode.prompt()).await?;
    info!("User {} opened a {:?} collection", user.id, mode);

    let collector = Collector {
        bot,
        state,
        chat_id: msg.chat.id,
        mode,
    };
    tokio::spawn(collector.run(inbox));
    Ok(())
}

/// Session input from the admin's private chat.
pub async fn route_session_input(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    input: SessionInput,
) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    if state.sessions.route(user.id.0, input).is_err() {
        reply_html(&bot, &msg, "That collection has already finished.").await?;
    }
    Ok(())
}

/// Yes/No answer to the re-copy prompt.
pub async fn recopy_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    let answer = q
        .data
        .as_deref()
        .and_then(|d| d.strip_prefix(RECOPY_PREFIX))
        .map(|a| a == "yes");
    let routed = answer.is_some_and(|yes| state.sessions.route(q.from.id.0, SessionInput::Recopy(yes)).is_ok());

    if !routed {
        bot.answer_callback_query(&q.id)
            .text("No collection is waiting for this answer.")
            .await?;
        return Ok(());
    }

    bot.answer_callback_query(&q.id).await?;
    if let Some(message) = q.message.as_ref()
        && let Err(e) = bot.edit_message_reply_markup(message.chat().id, message.id()).await
    {
        debug!("Could not clear re-copy prompt: {}", e);
    }
    Ok(())
}

/// Owns one collection session from open to link.
struct Collector {
    bot: ThrottledBot,
    state: AppState,
    chat_id: ChatId,
    mode: Mode,
}

impl Collector {
    async fn run(self, mut inbox: SessionInbox<SessionInput>) {
        let mut session = self.mode.session();
        // External message waiting for the admin's re-copy answer.
        let mut awaiting: Option<PendingMessage> = None;
        let idle = self.state.config.batch_idle_timeout;

        while session.is_collecting() {
            let Some(input) = inbox.next(idle).await else {
                session.time_out();
                break;
            };

            match input {
                SessionInput::Stop => session.stop(),
                SessionInput::Cancel => session.cancel(),
                SessionInput::Recopy(yes) => match awaiting.take() {
                    Some(pending) if yes => {
                        if let Some(sequence) = session.push_copy(pending) {
                            self.say(format!("➕ Will copy as item #{}.", sequence + 1)).await;
                        }
                    }
                    Some(_) => self.say("Skipped.").await,
                    None => {}
                },
                SessionInput::Submit(msg) => {
                    if awaiting.is_some() {
                        self.say("Answer the re-copy question first.").await;
                        continue;
                    }
                    awaiting = self.submit(&mut session, &msg).await;
                }
            }
        }

        // Let the admin open a new session while this one is copied.
        drop(inbox);

        match session.finish() {
            SessionOutcome::Proceed(items) => self.complete(items).await,
            SessionOutcome::Abort(SessionState::TimedOut) => {
                self.say("⌛ Collection timed out with nothing collected.").await
            }
            SessionOutcome::Abort(SessionState::Stopped) => self.say("Nothing was collected.").await,
            SessionOutcome::Abort(_) => self.say("Collection cancelled.").await,
        }
    }

    /// Classify a submission. Returns the message when it needs a re-copy answer.
    async fn submit(&self, session: &mut BatchSession, msg: &Message) -> Option<PendingMessage> {
        let forward_origin = match msg.forward_origin() {
            Some(MessageOrigin::Channel { chat, message_id, .. }) => Some((chat.id.0, message_id.0)),
            _ => None,
        };
        let submission = Submission {
            forward_origin,
            text: msg.text().or_else(|| msg.caption()),
        };

        match classify(&submission, &self.state.channel) {
            Classification::Reference(id) => {
                if let Some(sequence) = session.push_reference(id) {
                    self.say(format!("✅ Item #{}: channel message {}.", sequence + 1, id)).await;
                }
                None
            }
            Classification::External if self.mode == Mode::Range => {
                self.say("Only messages from the channel can mark a range. Forward one from there or send its link.")
                    .await;
                None
            }
            Classification::External => {
                let pending = PendingMessage {
                    chat_id: msg.chat.id.0,
                    message_id: msg.id.0,
                    entry: Some(MediaEntry::from_message(msg, msg.id.0)),
                };

                match self.state.settings.get().await.recopy_policy {
                    RecopyPolicy::Allow => {
                        if let Some(sequence) = session.push_copy(pending) {
                            self.say(format!("➕ Item #{}: will be copied to the channel.", sequence + 1)).await;
                        }
                        None
                    }
                    RecopyPolicy::Deny => {
                        self.say("This message is not in the channel and re-copying is disabled. Skipped.")
                            .await;
                        None
                    }
                    RecopyPolicy::Ask => {
                        self.ask_recopy().await;
                        Some(pending)
                    }
                }
            }
        }
    }

    async fn ask_recopy(&self) {
        let keyboard = InlineKeyboardMarkup::new(vec![vec![
            InlineKeyboardButton::callback("✅ Copy", format!("{}yes", RECOPY_PREFIX)),
            InlineKeyboardButton::callback("❌ Skip", format!("{}no", RECOPY_PREFIX)),
        ]]);
        if let Err(e) = self
            .bot
            .send_message(self.chat_id, "This message is not in the channel. Copy it there?")
            .reply_markup(keyboard)
            .await
        {
            warn!("Failed to send re-copy prompt: {}", e);
        }
    }

    async fn complete(&self, items: Vec<BatchItem>) {
        let channel_id = self.state.config.db_channel_id;

        let (payload, summary) = match self.mode {
            Mode::Range => {
                let Some((first, last)) = range_anchors(&items) else {
                    self.say("Nothing was collected.").await;
                    return;
                };
                (LinkPayload::range(first, last, channel_id), format!("Range: {} → {}", first, last))
            }
            Mode::Single | Mode::Custom => {
                let settings = self.state.settings.get().await;
                let bot_username = self.state.bot_username.clone();
                let markup_for = settings
                    .share_button
                    .then(|| move |id: i32| share_markup(&bot_username, id, channel_id));

                let outcome = match self.state.copier.run(items, markup_for).await {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        self.say(format!("❌ No link created: {}.", e)).await;
                        return;
                    }
                };
                self.index_copies(&outcome.items).await;
                (LinkPayload::range(outcome.first, outcome.last, channel_id), outcome.summary())
            }
        };

        let payload = match payload {
            Ok(payload) => payload,
            Err(e) => {
                error!("Could not build link: {}", e);
                self.say(format!("❌ Could not build the link: {}.", e)).await;
                return;
            }
        };

        let link = links::deep_link(&self.state.bot_username, &payload);
        let text = format!("🔗 <b>Link ready</b>\n{}\n\n<code>{}</code>", summary, link);
        let mut request = self.bot.send_message(self.chat_id, text).parse_mode(ParseMode::Html);
        if let Some(share) = share_url(&link) {
            request = request.reply_markup(InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url(
                "🔁 Share link",
                share,
            )]]));
        }
        if let Err(e) = request.await {
            error!("Failed to send link to {}: {}", self.chat_id, e);
        }
    }

    /// Store index entries for messages the copier placed in the channel.
    async fn index_copies(&self, items: &[BatchItem]) {
        for item in items {
            let (Some(pending), Some(copied)) = (item.pending.as_ref(), item.copied_message_id) else {
                continue;
            };
            let Some(entry) = pending.entry.as_ref() else {
                continue;
            };

            let entry = MediaEntry {
                message_id: copied,
                ..entry.clone()
            };
            if let Err(e) = self.state.media.upsert(&entry).await {
                warn!("Failed to index copied message {}: {}", copied, e);
            }
        }
    }

    async fn say(&self, text: impl Into<String>) {
        if let Err(e) = self
            .bot
            .send_message(self.chat_id, text)
            .parse_mode(ParseMode::Html)
            .await
        {
            warn!("Failed to message {}: {}", self.chat_id, e);
        }
    }
}

/// `t.me/share` URL for a deep link.
fn share_url(link: &str) -> Option<Url> {
    Url::parse_with_params("https://t.me/share/url", &[("url", link)]).ok()
}

/// Share button placed on a copied channel message.
fn share_markup(bot_username: &str, message_id: i32, channel_id: i64) -> InlineKeyboardMarkup {
    let share = LinkPayload::single(message_id, channel_id)
        .ok()
        .and_then(|payload| share_url(&links::deep_link(bot_username, &payload)));

    match share {
        Some(url) => InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::url("🔁 Share", url)]]),
        None => InlineKeyboardMarkup::default(),
    }
}
