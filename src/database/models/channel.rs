//! Forced-subscription channels.

use serde::{Deserialize, Serialize};

/// A channel users must join before receiving files.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ForceSubChannel {
    pub chat_id: i64,
    #[serde(default)]
    pub title: String,
    /// Invite link exported when the channel was added.
    #[serde(default)]
    pub invite_link: Option<String>,
}
