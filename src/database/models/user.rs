//! Users who have talked to the bot.

use serde::{Deserialize, Serialize};
use teloxide::types::User;

/// Stored user data plus the ban flag.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct StoredUser {
    /// Telegram user ID.
    pub user_id: u64,
    /// Username without @, lowercase.
    pub username: Option<String>,
    pub first_name: String,
    /// Refused any delivery while set.
    #[serde(default)]
    pub banned: bool,
    /// Unix timestamp of first contact.
    #[serde(default)]
    pub joined_at: i64,
    /// Unix timestamp of last profile update.
    pub updated_at: i64,
}

impl StoredUser {
    pub fn from_telegram(user: &User) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            user_id: user.id.0,
            username: user.username.as_ref().map(|u| u.to_lowercase()),
            first_name: user.first_name.clone(),
            banned: false,
            joined_at: now,
            updated_at: now,
        }
    }

    /// Placeholder for a user banned by ID before ever talking to the bot.
    pub fn banned_placeholder(user_id: u64) -> Self {
        let now = chrono::Utc::now().timestamp();
        Self {
            user_id,
            username: None,
            first_name: String::new(),
            banned: true,
            joined_at: now,
            updated_at: now,
        }
    }

    /// Whether the Telegram profile differs from what is stored.
    pub fn has_changed(&self, other: &User) -> bool {
        let new_username = other.username.as_ref().map(|u| u.to_lowercase());
        self.username != new_username || self.first_name != other.first_name
    }
}
