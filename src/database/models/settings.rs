//! Global bot settings.
//!
//! One document per deployment. Mutated only by admin commands, read on
//! every delivery.

use serde::{Deserialize, Serialize};

/// Document ID of the single settings document.
pub const SETTINGS_ID: &str = "global";

/// Plain substring replacement.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplacePair {
    pub old: String,
    pub new: String,
}

/// Caption used when a delivered message would otherwise have none.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalCaption {
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Replace every URL in a caption with one target.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplaceAllLink {
    #[serde(default)]
    pub value: String,
    #[serde(default)]
    pub enabled: bool,
}

/// Caption rewriting rules.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptionSettings {
    #[serde(default)]
    pub replace: Option<ReplacePair>,

    #[serde(default)]
    pub global_caption: GlobalCaption,

    #[serde(default)]
    pub link_replace: Option<ReplacePair>,

    #[serde(default)]
    pub replace_all_link: ReplaceAllLink,

    #[serde(default)]
    pub append: Option<String>,

    #[serde(default)]
    pub strip_links: bool,

    /// Deliver with forwarding/saving disabled.
    #[serde(default)]
    pub protect_content: bool,

    /// Template for documents, with `{filename}` and `{previouscaption}`.
    #[serde(default)]
    pub custom_caption: Option<String>,
}

/// How the batch collector treats messages that are not in the channel yet.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecopyPolicy {
    /// Copy them into the channel.
    #[default]
    Allow,
    /// Reject them.
    Deny,
    /// Ask the admin per message.
    Ask,
}

impl RecopyPolicy {
    pub fn parse(s: &str) -> Option<Self> {
        match s.trim().to_lowercase().as_str() {
            "allow" => Some(Self::Allow),
            "deny" => Some(Self::Deny),
            "ask" => Some(Self::Ask),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Allow => "allow",
            Self::Deny => "deny",
            Self::Ask => "ask",
        }
    }
}

/// The settings document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BotSettings {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub caption: CaptionSettings,

    /// Hours before delivered copies are deleted. `0` disables auto-delete.
    #[serde(default)]
    pub delete_timer_hours: f64,

    #[serde(default)]
    pub recopy_policy: RecopyPolicy,

    /// Attach a share button to messages the batch copier creates.
    #[serde(default)]
    pub share_button: bool,

    /// Admins added at runtime, on top of the configured owners.
    #[serde(default)]
    pub admins: Vec<u64>,
}

impl Default for BotSettings {
    fn default() -> Self {
        Self {
            id: SETTINGS_ID.to_string(),
            caption: CaptionSettings::default(),
            delete_timer_hours: 0.0,
            recopy_policy: RecopyPolicy::default(),
            share_button: false,
            admins: Vec::new(),
        }
    }
}

impl BotSettings {
    pub fn auto_delete_enabled(&self) -> bool {
        self.delete_timer_hours > 0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_document_fills_defaults() {
        let json = r#"{"_id":"global","delete_timer_hours":1.5,"recopy_policy":"ask"}"#;
        let settings: BotSettings = serde_json::from_str(json).unwrap();

        assert_eq!(settings.delete_timer_hours, 1.5);
        assert_eq!(settings.recopy_policy, RecopyPolicy::Ask);
        assert_eq!(settings.caption, CaptionSettings::default());
        assert!(settings.auto_delete_enabled());
    }

    #[test]
    fn test_recopy_policy_parse() {
        assert_eq!(RecopyPolicy::parse(" ASK "), Some(RecopyPolicy::Ask));
        assert_eq!(RecopyPolicy::parse("maybe"), None);
    }
}
