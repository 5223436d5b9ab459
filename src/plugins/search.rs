//! /search command plugin.
//!
//! Ranks the newest indexed media against the query and shows the results
//! as a paged keyboard. Each result button delivers that file to the user.

use teloxide::prelude::*;
use teloxide::types::{InlineKeyboardButton, InlineKeyboardMarkup, ParseMode};
use tracing::{debug, warn};

use super::reply_html;
use super::start::{admit, deliver};
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::MediaKind;
use crate::delivery::{ChatKind, format_ttl};
use crate::search::{self, SearchSession};
use crate::utils::{format_size, html_escape};

/// Callback prefix of the page buttons, followed by the page index.
pub const PAGE_PREFIX: &str = "search:";
/// Callback prefix of the result buttons, followed by the message ID.
pub const GET_PREFIX: &str = "sget:";

const LABEL_LEN: usize = 40;

/// Handle /search <query>.
pub async fn search_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    query: String,
) -> anyhow::Result<()> {
    let Some(user) = msg.from.as_ref() else {
        return Ok(());
    };

    let query = match search::normalize_query(&query) {
        Ok(query) => query,
        Err(e) => {
            reply_html(&bot, &msg, format!("Usage: /search &lt;name&gt;\n{}.", e)).await?;
            return Ok(());
        }
    };

    let entries: Vec<_> = state
        .media
        .recent(state.config.search_scan_limit)
        .await?
        .into_iter()
        .filter(|e| e.kind != MediaKind::Text)
        .collect();
    let results = search::rank(&query, &entries);
    debug!("Search {:?} by {}: {} of {} matched", query, user.id, results.len(), entries.len());

    if results.is_empty() {
        reply_html(&bot, &msg, format!("Nothing matches <b>{}</b>.", html_escape(&query))).await?;
        return Ok(());
    }

    let session = state.search.store(user.id.0, query, results);
    let (text, keyboard) = render(&session, 0);
    bot.send_message(msg.chat.id, text)
        .parse_mode(ParseMode::Html)
        .reply_markup(keyboard)
        .reply_parameters(teloxide::types::ReplyParameters::new(msg.id))
        .await?;

    Ok(())
}

/// Page text and keyboard for page `index` of a search.
fn render(session: &SearchSession, index: usize) -> (String, InlineKeyboardMarkup) {
    let page = search::page(&session.results, index);

    let text = format!(
        "🔎 Results for <b>{}</b>: {} file{} (page {}/{})\nTap a file to receive it.",
        html_escape(&session.query),
        session.results.len(),
        if session.results.len() == 1 { "" } else { "s" },
        page.index + 1,
        page.total_pages
    );

    let mut rows: Vec<Vec<InlineKeyboardButton>> = page
        .items
        .iter()
        .map(|result| {
            vec![InlineKeyboardButton::callback(
                label(&result.display_name, result.size_bytes),
                format!("{}{}", GET_PREFIX, result.message_id),
            )]
        })
        .collect();

    let mut nav = Vec::new();
    if page.has_prev() {
        nav.push(InlineKeyboardButton::callback("◀️ Prev", format!("{}{}", PAGE_PREFIX, page.index - 1)));
    }
    if page.has_next() {
        nav.push(InlineKeyboardButton::callback("Next ▶️", format!("{}{}", PAGE_PREFIX, page.index + 1)));
    }
    if !nav.is_empty() {
        rows.push(nav);
    }

    (text, InlineKeyboardMarkup::new(rows))
}

fn label(name: &str, size_bytes: u64) -> String {
    let mut short: String = name.chars().take(LABEL_LEN).collect();
    if name.chars().count() > LABEL_LEN {
        short.push('…');
    }
    if size_bytes == 0 {
        short
    } else {
        format!("{} ({})", short, format_size(size_bytes))
    }
}

fn callback_arg<T: std::str::FromStr>(q: &CallbackQuery, prefix: &str) -> Option<T> {
    q.data.as_deref()?.strip_prefix(prefix)?.parse().ok()
}

/// Page buttons.
pub async fn page_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    let Some(index) = callback_arg::<usize>(&q, PAGE_PREFIX) else {
        bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };
    let Some(session) = state.search.get(q.from.id.0) else {
        bot.answer_callback_query(&q.id)
            .text("This search has expired. Run /search again.")
            .show_alert(true)
            .await?;
        return Ok(());
    };

    bot.answer_callback_query(&q.id).await?;
    if let Some(message) = q.message.as_ref() {
        let (text, keyboard) = render(&session, index);
        bot.edit_message_text(message.chat().id, message.id(), text)
            .parse_mode(ParseMode::Html)
            .reply_markup(keyboard)
            .await?;
    }
    Ok(())
}

/// Result buttons: deliver the file to the user's private chat.
pub async fn get_callback(bot: ThrottledBot, q: CallbackQuery, state: AppState) -> anyhow::Result<()> {
    let user_id = q.from.id.0;
    let Some(message_id) = callback_arg::<i32>(&q, GET_PREFIX) else {
        bot.answer_callback_query(&q.id).await?;
        return Ok(());
    };

    // Only files from the user's own live search can be requested.
    let listed = state
        .search
        .get(user_id)
        .is_some_and(|s| s.results.iter().any(|r| r.message_id == message_id));
    if !listed {
        bot.answer_callback_query(&q.id)
            .text("This search has expired. Run /search again.")
            .show_alert(true)
            .await?;
        return Ok(());
    }

    bot.answer_callback_query(&q.id).text("📤 Sending…").await?;

    let chat_id = ChatId(user_id as i64);
    if !admit(&bot, &state, user_id, chat_id, None).await? {
        return Ok(());
    }

    let report = deliver(&state, chat_id, ChatKind::Private, &[message_id], true).await;
    if report.is_empty() {
        warn!("Search delivery of {} to {} failed", message_id, user_id);
        bot.send_message(chat_id, "❌ This file is no longer available.").await?;
    } else if let Some(ttl) = report.ttl_hours {
        bot.send_message(chat_id, format!("⏳ This file will be deleted in <b>{}</b>.", format_ttl(ttl)))
            .parse_mode(ParseMode::Html)
            .await?;
    }
    Ok(())
}
