//! Decide whether a submitted message already lives in the canonical channel.

use url::Url;

/// The canonical channel, as links refer to it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelIdentity {
    pub chat_id: i64,
    /// Public username without `@`, if the channel has one.
    pub username: Option<String>,
}

impl ChannelIdentity {
    /// The ID used in `t.me/c/<id>/<msg>` links (`-100` prefix removed).
    pub fn internal_id(&self) -> Option<String> {
        self.chat_id.to_string().strip_prefix("-100").map(String::from)
    }
}

/// What the collector learned about a submitted message.
#[derive(Debug, Clone, Copy, Default)]
pub struct Submission<'a> {
    /// `(origin chat, origin message)` for messages forwarded from a channel.
    pub forward_origin: Option<(i64, i32)>,
    pub text: Option<&'a str>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Classification {
    /// Already in the channel under this message ID.
    Reference(i32),
    /// Needs to be copied into the channel first.
    External,
}

pub fn classify(submission: &Submission<'_>, channel: &ChannelIdentity) -> Classification {
    if let Some((chat_id, message_id)) = submission.forward_origin
        && chat_id == channel.chat_id
    {
        return Classification::Reference(message_id);
    }

    submission
        .text
        .and_then(|text| find_channel_link(text, channel))
        .map_or(Classification::External, Classification::Reference)
}

/// First `t.me` link in `text` pointing at a message of `channel`.
pub fn find_channel_link(text: &str, channel: &ChannelIdentity) -> Option<i32> {
    text.split_whitespace()
        .filter(|word| word.contains("t.me/") || word.contains("telegram.me/"))
        .find_map(|word| parse_channel_link(word, channel))
}

fn parse_channel_link(word: &str, channel: &ChannelIdentity) -> Option<i32> {
    let raw = if word.starts_with("http://") || word.starts_with("https://") {
        word.to_string()
    } else {
        format!("https://{}", word)
    };
    let url = Url::parse(&raw).ok()?;
    let host = url.host_str()?;
    if host != "t.me" && host != "telegram.me" {
        return None;
    }

    let segments: Vec<&str> = url.path_segments()?.filter(|s| !s.is_empty()).collect();
    match segments.as_slice() {
        ["c", internal, message_id, ..] => {
            (channel.internal_id().as_deref() == Some(*internal)).then_some(())?;
            message_id.parse().ok()
        }
        [username, message_id, ..] => {
            let ours = channel.username.as_deref()?;
            username.eq_ignore_ascii_case(ours).then_some(())?;
            message_id.parse().ok()
        }
        _ => None,
    }
}
