//! Caption settings commands.
//!
//! Every change is applied to the global settings document and written to
//! the audit log. `off` clears a value.

use teloxide::prelude::*;

use super::reply_html;
use crate::bot::dispatcher::{AppState, ThrottledBot};
use crate::caption;
use crate::database::{CaptionSettings, ReplacePair};
use crate::utils::{html_escape, parse_toggle, split_pair};

/// Parsed argument of the text-or-toggle commands.
#[derive(Debug, PartialEq, Eq)]
enum TextArg {
    Toggle(bool),
    Text(String),
    Missing,
}

fn text_arg(args: &str) -> TextArg {
    let args = args.trim();
    if args.is_empty() {
        return TextArg::Missing;
    }
    match parse_toggle(args) {
        Some(on) => TextArg::Toggle(on),
        None => TextArg::Text(args.to_string()),
    }
}

/// Parse `old | new`, or `off` to clear.
fn pair_arg(args: &str) -> Option<Option<ReplacePair>> {
    if parse_toggle(args) == Some(false) {
        return Some(None);
    }
    split_pair(args).map(|(old, new)| Some(ReplacePair { old, new }))
}

/// Apply a caption change, audit it and confirm.
async fn apply<F>(
    bot: &ThrottledBot,
    msg: &Message,
    state: &AppState,
    action: &str,
    detail: String,
    change: F,
) -> anyhow::Result<()>
where
    F: FnOnce(&mut CaptionSettings),
{
    state.settings.update(|s| change(&mut s.caption)).await;

    let admin_id = msg.from.as_ref().map(|u| u.id.0).unwrap_or(0);
    state.audit.record(admin_id, action, detail.clone()).await;

    reply_html(bot, msg, format!("✅ {}: {}", action, html_escape(&detail))).await?;
    Ok(())
}

async fn usage(bot: &ThrottledBot, msg: &Message, text: &str) -> anyhow::Result<()> {
    reply_html(bot, msg, format!("Usage: {}", text)).await?;
    Ok(())
}

/// Handle /replace old | new.
pub async fn replace_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match pair_arg(&args) {
        Some(pair) => {
            let detail = describe_pair(&pair);
            apply(&bot, &msg, &state, "replace", detail, |c| c.replace = pair).await
        }
        None => usage(&bot, &msg, "/replace old text | new text (or off)").await,
    }
}

/// Handle /linkreplace old | new.
pub async fn linkreplace_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match pair_arg(&args) {
        Some(pair) => {
            let detail = describe_pair(&pair);
            apply(&bot, &msg, &state, "linkreplace", detail, |c| c.link_replace = pair).await
        }
        None => usage(&bot, &msg, "/linkreplace old link | new link (or off)").await,
    }
}

fn describe_pair(pair: &Option<ReplacePair>) -> String {
    match pair {
        Some(p) => format!("{} → {}", p.old, p.new),
        None => "off".to_string(),
    }
}

/// Handle /globalcap text | on | off.
pub async fn globalcap_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match text_arg(&args) {
        TextArg::Toggle(on) => {
            let detail = if on { "on" } else { "off" }.to_string();
            apply(&bot, &msg, &state, "globalcap", detail, |c| c.global_caption.enabled = on).await
        }
        TextArg::Text(text) => {
            apply(&bot, &msg, &state, "globalcap", text.clone(), |c| {
                c.global_caption.text = text;
                c.global_caption.enabled = true;
            })
            .await
        }
        TextArg::Missing => usage(&bot, &msg, "/globalcap caption text | on | off").await,
    }
}

/// Handle /replaceall url | on | off.
pub async fn replaceall_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match text_arg(&args) {
        TextArg::Toggle(on) => {
            let detail = if on { "on" } else { "off" }.to_string();
            apply(&bot, &msg, &state, "replaceall", detail, |c| c.replace_all_link.enabled = on).await
        }
        TextArg::Text(value) => {
            apply(&bot, &msg, &state, "replaceall", value.clone(), |c| {
                c.replace_all_link.value = value;
                c.replace_all_link.enabled = true;
            })
            .await
        }
        TextArg::Missing => usage(&bot, &msg, "/replaceall https://new.link | on | off").await,
    }
}

/// Handle /append text.
pub async fn append_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match text_arg(&args) {
        TextArg::Toggle(false) => apply(&bot, &msg, &state, "append", "off".to_string(), |c| c.append = None).await,
        TextArg::Text(text) => apply(&bot, &msg, &state, "append", text.clone(), |c| c.append = Some(text)).await,
        TextArg::Toggle(true) | TextArg::Missing => usage(&bot, &msg, "/append text to add (or off)").await,
    }
}

/// Handle /customcaption template.
pub async fn customcaption_command(
    bot: ThrottledBot,
    msg: Message,
    state: AppState,
    args: String,
) -> anyhow::Result<()> {
    match text_arg(&args) {
        TextArg::Toggle(false) => {
            apply(&bot, &msg, &state, "customcaption", "off".to_string(), |c| c.custom_caption = None).await
        }
        TextArg::Text(template) => {
            apply(&bot, &msg, &state, "customcaption", template.clone(), |c| {
                c.custom_caption = Some(template)
            })
            .await
        }
        TextArg::Toggle(true) | TextArg::Missing => {
            usage(&bot, &msg, "/customcaption 📁 {filename}\n{previouscaption} (or off)").await
        }
    }
}

/// Handle /striplinks on | off.
pub async fn striplinks_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match parse_toggle(&args) {
        Some(on) => {
            let detail = if on { "on" } else { "off" }.to_string();
            apply(&bot, &msg, &state, "striplinks", detail, |c| c.strip_links = on).await
        }
        None => usage(&bot, &msg, "/striplinks on | off").await,
    }
}

/// Handle /protect on | off.
pub async fn protect_command(bot: ThrottledBot, msg: Message, state: AppState, args: String) -> anyhow::Result<()> {
    match parse_toggle(&args) {
        Some(on) => {
            let detail = if on { "on" } else { "off" }.to_string();
            apply(&bot, &msg, &state, "protect", detail, |c| c.protect_content = on).await
        }
        None => usage(&bot, &msg, "/protect on | off").await,
    }
}

/// Handle /caption.
pub async fn caption_command(bot: ThrottledBot, msg: Message, state: AppState) -> anyhow::Result<()> {
    let settings = state.settings.get().await;
    reply_html(&bot, &msg, caption::overview(&settings.caption)).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_arg() {
        assert_eq!(text_arg("  "), TextArg::Missing);
        assert_eq!(text_arg("OFF"), TextArg::Toggle(false));
        assert_eq!(text_arg("on"), TextArg::Toggle(true));
        assert_eq!(text_arg(" Join @vault "), TextArg::Text("Join @vault".to_string()));
    }

    #[test]
    fn test_pair_arg() {
        assert_eq!(pair_arg("off"), Some(None));
        assert_eq!(
            pair_arg("old | new"),
            Some(Some(ReplacePair {
                old: "old".to_string(),
                new: "new".to_string()
            }))
        );
        assert_eq!(pair_arg("no separator"), None);
    }
}
