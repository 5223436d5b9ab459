//! Utility functions.
//!
//! Collection of helper functions used across the bot.

use teloxide::types::User;

/// Escape text for Telegram HTML parse mode.
pub fn html_escape(s: &str) -> String {
    s.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Reverse [`html_escape`].
pub fn html_unescape(s: &str) -> String {
    s.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&amp;", "&")
}

/// Clickable mention of a user in HTML.
pub fn mention(user: &User) -> String {
    format!(
        "<a href=\"tg://user?id={}\">{}</a>",
        user.id,
        html_escape(&user.first_name)
    )
}

/// Format a byte count, e.g. `1.5 MB`.
pub fn format_size(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }

    if unit == 0 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} {}", value, UNITS[unit])
    }
}

/// Longest accepted delete timer: one year.
pub const MAX_TIMER_HOURS: f64 = 365.0 * 24.0;

/// Parse a delete timer into hours.
///
/// Accepts plain hours (`2`, `0.5`), a unit suffix (`30m`, `6h`, `1d`),
/// and `off`. Zero means disabled. Values above [`MAX_TIMER_HOURS`] are
/// rejected.
pub fn parse_timer_hours(input: &str) -> Option<f64> {
    let input = input.trim().to_lowercase();
    if input == "off" || input == "disable" {
        return Some(0.0);
    }

    let hours = match input.parse::<f64>() {
        Ok(hours) => hours,
        Err(_) => {
            let (digits, unit) = input.split_at(input.len().checked_sub(1)?);
            let amount: f64 = digits.parse().ok()?;
            match unit {
                "m" => amount / 60.0,
                "h" => amount,
                "d" => amount * 24.0,
                _ => return None,
            }
        }
    };

    (hours.is_finite() && (0.0..=MAX_TIMER_HOURS).contains(&hours)).then_some(hours)
}

/// Split `old | new` command arguments. Both sides are trimmed; the left
/// side must not be empty.
pub fn split_pair(args: &str) -> Option<(String, String)> {
    let (old, new) = args.split_once('|')?;
    let old = old.trim();
    (!old.is_empty()).then(|| (old.to_string(), new.trim().to_string()))
}

/// Parse an on/off toggle argument.
pub fn parse_toggle(arg: &str) -> Option<bool> {
    match arg.trim().to_lowercase().as_str() {
        "on" | "yes" | "true" | "enable" | "1" => Some(true),
        "off" | "no" | "false" | "disable" | "0" => Some(false),
        _ => None,
    }
}
