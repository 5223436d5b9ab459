//! Admin commands: bans, forced-subscription channels, delivery settings,
//! statistics and backups.

use teloxide::prelude::*;
use teloxide::types::InputFile;
use tracing::{info, warn};

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::database::{ForceSubChannel, RecopyPolicy};
use crate::delivery::format_ttl;
use crate::utils::{html_escape, parse_timer_hours, parse_toggle};

fn admin_id(msg: &Message) -> u64 {
    msg.from.as_ref().map(|u| u.id.0).unwrap_or(0)
}

/// User ID from the argument, or the author of the replied-to message.
fn target_user(msg: &Message, args: &str) -> Option<u64> {
    if let Ok(id) = args.trim().parse::<u64>() {
        return Some(id);
    }
    msg.reply_to_message()
        .and_then(|reply| reply.from.as_ref())
        .map(|u| u.id.0)
}

/// Handle /ban <user_id> (or as a reply).
pub async fn ban_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let Some(user_id) = target_user(&msg, &args) else {
        reply_html(&bot, &msg, "Usage: /ban user_id, or reply to one of their messages.").await?;
        return Ok(());
    };

    if state.is_admin(user_id).await {
        reply_html(&bot, &msg, "❌ Admins cannot be banned.").await?;
        return Ok(());
    }

    state.users.set_banned(user_id, true).await?;
    state.audit.record(admin_id(&msg), "ban", user_id.to_string()).await;
    info!("User {} banned by {}", user_id, admin_id(&msg));

    reply_html(&bot, &msg, format!("🚫 User <code>{}</code> banned.", user_id)).await?;
    Ok(())
}

/// Handle /unban <user_id> (or as a reply).
pub async fn unban_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let Some(user_id) = target_user(&msg, &args) else {
        reply_html(&bot, &msg, "Usage: /unban user_id, or reply to one of their messages.").await?;
        return Ok(());
    };

    state.users.set_banned(user_id, false).await?;
    state.audit.record(admin_id(&msg), "unban", user_id.to_string()).await;

    reply_html(&bot, &msg, format!("✅ User <code>{}</code> unbanned.", user_id)).await?;
    Ok(())
}

/// Handle /addchannel <chat_id | @username>.
///
/// The bot must be an admin of the channel to export an invite link and to
/// check memberships.
pub async fn addchannel_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let arg = args.trim();
    if arg.is_empty() {
        reply_html(&bot, &msg, "Usage: /addchannel -100123456789 or /addchannel @channel").await?;
        return Ok(());
    }

    let chat = match arg.parse::<i64>() {
        Ok(id) => bot.get_chat(ChatId(id)).await,
        Err(_) => bot.get_chat(format!("@{}", arg.trim_start_matches('@'))).await,
    };
    let chat = match chat {
        Ok(chat) => chat,
        Err(e) => {
            reply_html(&bot, &msg, format!("❌ Cannot access that chat: {}", html_escape(&e.to_string()))).await?;
            return Ok(());
        }
    };

    let invite_link = match chat.invite_link() {
        Some(link) => Some(link.to_string()),
        None => match bot.export_chat_invite_link(chat.id).await {
            Ok(link) => Some(link),
            Err(e) => {
                warn!("Could not export invite link for {}: {}", chat.id, e);
                chat.username().map(|u| format!("https://t.me/{}", u))
            }
        },
    };

    let channel = ForceSubChannel {
        chat_id: chat.id.0,
        title: chat.title().unwrap_or("Channel").to_string(),
        invite_link,
    };
    state.channels.add(&channel).await?;
    state.audit.record(admin_id(&msg), "addchannel", format!("{} {}", channel.chat_id, channel.title)).await;

    let mut text = format!(
        "✅ Users must now join <b>{}</b> (<code>{}</code>).",
        html_escape(&channel.title),
        channel.chat_id
    );
    if channel.invite_link.is_none() {
        text.push_str("\n⚠️ No invite link available. Make the bot an admin there.");
    }
    reply_html(&bot, &msg, text).await?;
    Ok(())
}

/// Handle /delchannel <chat_id>.
pub async fn delchannel_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let Ok(chat_id) = args.trim().parse::<i64>() else {
        reply_html(&bot, &msg, "Usage: /delchannel -100123456789").await?;
        return Ok(());
    };

    if state.channels.remove(chat_id).await? {
        state.audit.record(admin_id(&msg), "delchannel", chat_id.to_string()).await;
        reply_html(&bot, &msg, format!("✅ <code>{}</code> is no longer required.", chat_id)).await?;
    } else {
        reply_html(&bot, &msg, "That channel was not registered.").await?;
    }
    Ok(())
}

/// Handle /channels.
pub async fn channels_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let channels = state.channels.list().await?;
    if channels.is_empty() {
        reply_html(&bot, &msg, "No required channels. Add one with /addchannel.").await?;
        return Ok(());
    }

    let lines: Vec<String> = channels
        .iter()
        .map(|c| format!("• <b>{}</b> <code>{}</code>", html_escape(&c.title), c.chat_id))
        .collect();
    reply_html(&bot, &msg, format!("<b>Required channels</b>\n{}", lines.join("\n"))).await?;
    Ok(())
}

/// Handle /settimer <2h | 30m | 1d | off>.
pub async fn settimer_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let Some(hours) = parse_timer_hours(&args) else {
        let current = state.settings.get().await;
        let current = if current.auto_delete_enabled() {
            format_ttl(current.delete_timer_hours)
        } else {
            "off".to_string()
        };
        reply_html(
            &bot,
            &msg,
            format!("Usage: /settimer 2h | 30m | 1d | off (at most 365d)\nCurrent: <b>{}</b>", current),
        )
        .await?;
        return Ok(());
    };

    state.settings.update(|s| s.delete_timer_hours = hours).await;
    state.audit.record(admin_id(&msg), "settimer", hours.to_string()).await;

    let text = if hours > 0.0 {
        format!("⏳ Delivered files will be deleted after <b>{}</b>.", format_ttl(hours))
    } else {
        "Auto-delete turned off.".to_string()
    };
    reply_html(&bot, &msg, text).await?;
    Ok(())
}

/// Handle /recopy <allow | deny | ask>.
pub async fn recopy_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let Some(policy) = RecopyPolicy::parse(&args) else {
        let current = state.settings.get().await.recopy_policy;
        reply_html(
            &bot,
            &msg,
            format!("Usage: /recopy allow | deny | ask\nCurrent: <b>{}</b>", current.as_str()),
        )
        .await?;
        return Ok(());
    };

    state.settings.update(|s| s.recopy_policy = policy).await;
    state.audit.record(admin_id(&msg), "recopy", policy.as_str()).await;

    reply_html(&bot, &msg, format!("✅ Re-copy policy: <b>{}</b>", policy.as_str())).await?;
    Ok(())
}

/// Handle /sharebutton <on | off>.
pub async fn sharebutton_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    let Some(on) = parse_toggle(&args) else {
        reply_html(&bot, &msg, "Usage: /sharebutton on | off").await?;
        return Ok(());
    };

    state.settings.update(|s| s.share_button = on).await;
    state.audit.record(admin_id(&msg), "sharebutton", if on { "on" } else { "off" }).await;

    reply_html(&bot, &msg, format!("✅ Share button <b>{}</b>", if on { "ON" } else { "OFF" })).await?;
    Ok(())
}

/// Handle /stats.
pub async fn stats_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let users = state.users.count().await.unwrap_or(0);
    let banned = state.users.banned_ids().await.map(|ids| ids.len()).unwrap_or(0);
    let media = state.media.count().await.unwrap_or(0);
    let channels = state.channels.list().await.map(|c| c.len()).unwrap_or(0);
    let last_backup = state
        .backup
        .last_backup()
        .await
        .at
        .map(|at| at.format("%Y-%m-%d %H:%M UTC").to_string())
        .unwrap_or_else(|| "never".to_string());

    let mut text = format!(
        "<b>📊 Stats</b>\n\n\
         Users: <b>{}</b> ({} banned)\n\
         Indexed messages: <b>{}</b>\n\
         Required channels: <b>{}</b>\n\
         Pending auto-deletes: <b>{}</b>\n\
         Last update: <code>{}</code>\n\
         Last backup: {}",
        users,
        banned,
        media,
        channels,
        state.deliverer.tracker().len(),
        state.offset.latest(),
        last_backup,
    );

    let caches: Vec<String> = state
        .cache
        .stats()
        .into_iter()
        .map(|(name, entries)| format!("{} {}", name, entries))
        .collect();
    if !caches.is_empty() {
        text.push_str(&format!("\nCaches: {}", caches.join(", ")));
    }

    let recent = state.audit.recent(5);
    if !recent.is_empty() {
        text.push_str("\n\n<b>Recent changes</b>");
        for entry in recent {
            text.push_str(&format!(
                "\n• {} <code>{}</code> {}: {}",
                entry.at.format("%m-%d %H:%M"),
                entry.admin_id,
                entry.action,
                html_escape(&entry.detail)
            ));
        }
    }

    reply_html(&bot, &msg, text).await?;
    Ok(())
}

/// Handle /backup: take a snapshot now and send it.
pub async fn backup_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let report = match state.backup.run_once().await {
        Ok(report) => report,
        Err(e) => {
            reply_html(&bot, &msg, format!("❌ Backup failed: {}", html_escape(&format!("{:#}", e)))).await?;
            return Ok(());
        }
    };
    state.audit.record(admin_id(&msg), "backup", report.path.display().to_string()).await;

    bot.send_document(msg.chat.id, InputFile::file(report.path.clone()))
        .caption(format!(
            "💾 {} documents, {} pending auto-deletes, {} old backups pruned",
            report.documents, report.tracked, report.pruned
        ))
        .await?;
    Ok(())
}
