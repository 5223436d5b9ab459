//! /start command plugin.
//!
//! Without a payload it greets the user. With one it decodes the link,
//! checks the ban list and forced subscriptions, and delivers the files.

use std::collections::HashMap;

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tracing::{debug, warn};
use url::Url;

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::delivery::{BRAND_CALLBACK, ChatKind, DeliveryReport, DeliveryRequest, format_ttl};
use crate::links::LinkPayload;
use crate::utils::{html_escape, mention};

/// Handle /start [payload].
pub async fn start_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };
    let token = args.trim();

    if token.is_empty() {
        let text = format!(
            "Hi {}! 👋\n\nI hand out files shared through links. \
             Open a link you were given, or look for something with /search.",
            mention(user)
        );
        reply_html(&bot, &msg, text).await?;
        return Ok(());
    }

    if !admit(&bot, &state, user.id.0, msg.chat.id, Some(token)).await? {
        return Ok(());
    }

    let ids = match LinkPayload::from_token(token)
        .and_then(|payload| payload.message_ids(state.config.db_channel_id))
    {
        Ok(ids) => ids,
        Err(e) => {
            debug!("Rejected start payload {:?}: {}", token, e);
            reply_html(&bot, &msg, "❌ This link is invalid.").await?;
            return Ok(());
        }
    };

    let report = deliver(&state, msg.chat.id, ChatKind::of(&msg.chat), &ids, false).await;

    if report.is_empty() {
        reply_html(&bot, &msg, "❌ These files are no longer available.").await?;
    } else if let Some(ttl) = report.ttl_hours {
        let text = format!(
            "⏳ These files will be deleted in <b>{}</b>. Save them somewhere before then.",
            format_ttl(ttl)
        );
        bot.send_message(msg.chat.id, text)
            .parse_mode(ParseMode::Html)
            .await?;
    }

    Ok(())
}

/// Refuse banned users and users missing a required channel.
///
/// Sends the refusal to `chat_id` and returns `false` when the user may
/// not receive files. `retry_token` builds the "try again" button.
pub(crate) async fn admit(
    bot: &ThrottledBot,
    state: &AppState,
    user_id: u64,
    chat_id: ChatId,
    retry_token: Option<&str>,
) -> anyhow::Result<bool> {
    let banned = state.users.is_banned(user_id).await.unwrap_or_else(|e| {
        warn!("Ban check for {} failed: {}", user_id, e);
        false
    });
    if banned {
        bot.send_message(chat_id, "🚫 You are banned from using this bot.")
            .await?;
        return Ok(false);
    }

    let channels = state.channels.list().await.unwrap_or_else(|e| {
        warn!("Failed to load required channels: {}", e);
        Vec::new()
    });
    let missing = state.permissions.missing_channels(user_id, &channels).await;
    if missing.is_empty() {
        return Ok(true);
    }
    // The next attempt re-checks membership.
    for channel in &missing {
        state.permissions.invalidate(channel.chat_id, user_id);
    }

    let mut rows: Vec<Vec<InlineKeyboardButton>> = missing
        .iter()
        .filter_map(|channel| {
            let link = channel.invite_link.as_deref()?.parse::<Url>().ok()?;
            Some(vec![InlineKeyboardButton::url(format!("📢 Join {}", channel.title), link)])
        })
        .collect();

    let retry = match retry_token {
        Some(token) => format!("https://t.me/{}?start={}", state.bot_username, token),
        None => format!("https://t.me/{}", state.bot_username),
    };
    if let Ok(retry) = retry.parse::<Url>() {
        rows.push(vec![InlineKeyboardButton::url("🔄 Try again", retry)]);
    }

    let names: Vec<String> = missing.iter().map(|c| html_escape(&c.title)).collect();
    let text = format!(
        "🔒 Join these channels first to get the files:\n<b>{}</b>",
        names.join("</b>, <b>")
    );
    bot.send_message(chat_id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(InlineKeyboardMarkup::new(rows))
        .await?;

    Ok(false)
}

/// Deliver channel messages to `chat_id` with the current settings.
pub(crate) async fn deliver(
    state: &AppState,
    chat_id: ChatId,
    kind: ChatKind,
    message_ids: &[i32],
    fast: bool,
) -> DeliveryReport {
    let entries = state.media.get_many(message_ids).await.unwrap_or_else(|e| {
        warn!("Media index lookup failed, keeping source captions: {}", e);
        HashMap::new()
    });
    let settings = state.settings.get().await;

    state
        .deliverer
        .deliver(DeliveryRequest {
            chat_id,
            kind,
            message_ids,
            entries: &entries,
            settings: &settings,
            fast,
        })
        .await
}

/// Handle /notify.
pub async fn notify_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let text = if state.notify_prefs.toggle(user.id.0).await {
        "🔔 You will be told when delivered files expire."
    } else {
        "🔕 Expiry notices turned off."
    };
    reply_html(&bot, &msg, text).await?;
    Ok(())
}

/// Brand button, and a silent answer for any other unhandled callback.
pub async fn about_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    if q.data.as_deref() == Some(BRAND_CALLBACK) {
        bot.answer_callback_query(&q.id)
            .text(format!("Shared through @{}. Send /start to the bot to learn more.", state.bot_username))
            .show_alert(true)
            .await?;
    } else {
        bot.answer_callback_query(&q.id).await?;
    }
    Ok(())
}
