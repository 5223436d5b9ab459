//! Index of media stored in the canonical channel.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use teloxide::types::Message;

use crate::utils::html_escape;

/// Kind of media a channel post carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MediaKind {
    Document,
    Video,
    Audio,
    Photo,
    Animation,
    Voice,
    Text,
}

/// One indexed channel message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MediaEntry {
    pub message_id: i32,
    pub kind: MediaKind,
    #[serde(default)]
    pub file_name: Option<String>,
    #[serde(default)]
    pub size_bytes: u64,
    /// Caption as HTML.
    #[serde(default)]
    pub caption: Option<String>,
    pub date: DateTime<Utc>,
}

impl MediaEntry {
    /// Build an index entry from a message, stored under `message_id`.
    ///
    /// `message_id` differs from `msg.id` when the message was copied into
    /// the channel from elsewhere.
    pub fn from_message(msg: &Message, message_id: i32) -> Self {
        let (kind, file_name, size) = if let Some(doc) = msg.document() {
            (MediaKind::Document, doc.file_name.clone(), doc.file.size)
        } else if let Some(video) = msg.video() {
            (MediaKind::Video, video.file_name.clone(), video.file.size)
        } else if let Some(audio) = msg.audio() {
            let name = audio.file_name.clone().or_else(|| audio.title.clone());
            (MediaKind::Audio, name, audio.file.size)
        } else if let Some(anim) = msg.animation() {
            (MediaKind::Animation, anim.file_name.clone(), anim.file.size)
        } else if let Some(voice) = msg.voice() {
            (MediaKind::Voice, None, voice.file.size)
        } else if let Some(photo) = msg.photo().and_then(|sizes| sizes.last()) {
            (MediaKind::Photo, None, photo.file.size)
        } else {
            (MediaKind::Text, None, 0)
        };

        let caption = msg.caption().or_else(|| msg.text()).map(html_escape);

        Self {
            message_id,
            kind,
            file_name,
            size_bytes: u64::from(size),
            caption,
            date: msg.date,
        }
    }

    pub fn is_document(&self) -> bool {
        self.kind == MediaKind::Document
    }

    /// Name shown in search results.
    pub fn display_name(&self) -> String {
        if let Some(name) = self.file_name.as_deref().filter(|n| !n.is_empty()) {
            return name.to_string();
        }
        self.caption
            .as_deref()
            .and_then(|c| c.lines().next())
            .map(|line| line.chars().take(48).collect())
            .unwrap_or_else(|| format!("Message {}", self.message_id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(file_name: Option<&str>, caption: Option<&str>) -> MediaEntry {
        MediaEntry {
            message_id: 7,
            kind: MediaKind::Document,
            file_name: file_name.map(String::from),
            size_bytes: 0,
            caption: caption.map(String::from),
            date: Utc::now(),
        }
    }

    #[test]
    fn test_display_name_prefers_file_name() {
        assert_eq!(entry(Some("a.mkv"), Some("cap")).display_name(), "a.mkv");
        assert_eq!(entry(None, Some("first\nsecond")).display_name(), "first");
        assert_eq!(entry(Some(""), None).display_name(), "Message 7");
    }
}
