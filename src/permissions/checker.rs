//! Permission checker with caching.

use std::sync::Arc;

use teloxide::prelude::*;
use teloxide::types::{ChatId, UserId};
use tracing::{debug, warn};

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::{BotSettings, ForceSubChannel};

/// Cache key for membership lookups.
type MemberCacheKey = (i64, u64); // (channel_id, user_id)

/// Permission checker with caching support.
///
/// Bot owners (from OWNER_IDS env) are always admins.
#[derive(Clone)]
pub struct Permissions {
    bot: Bot,
    cache: TypedCache<MemberCacheKey, bool>,
    /// Bot owner IDs - these users can run every admin command.
    owner_ids: Arc<[u64]>,
}

impl Permissions {
    /// Create a new permission checker with bot owner IDs.
    pub fn with_owners(bot: Bot, cache_registry: &CacheRegistry, owner_ids: Vec<u64>) -> Self {
        let cache = cache_registry.get_or_create("channel_membership", CacheConfig::gate());

        Self {
            bot,
            cache,
            owner_ids: owner_ids.into(),
        }
    }

    /// Check if a user is a bot owner.
    #[inline]
    pub fn is_bot_owner(&self, user_id: u64) -> bool {
        self.owner_ids.contains(&user_id)
    }

    /// Owners plus the admins added through settings.
    pub fn is_admin(&self, user_id: u64, settings: &BotSettings) -> bool {
        self.is_bot_owner(user_id) || settings.admins.contains(&user_id)
    }

    /// Whether the user currently belongs to `channel_id`.
    ///
    /// Lookups that fail (bot not admin there, channel gone) count as
    /// membership so a misconfigured channel does not lock everyone out.
    pub async fn is_member(&self, channel_id: i64, user_id: u64) -> bool {
        let cache_key = (channel_id, user_id);

        // Check cache first
        if let Some(cached) = self.cache.get(&cache_key) {
            debug!("Membership cache hit for user {} in {}", user_id, channel_id);
            return cached;
        }

        match self.bot.get_chat_member(ChatId(channel_id), UserId(user_id)).await {
            Ok(member) => {
                let present = member.is_present();
                self.cache.insert(cache_key, present);
                present
            }
            Err(e) => {
                warn!("Membership check in {} failed: {}", channel_id, e);
                true
            }
        }
    }

    /// Channels from `channels` the user has not joined yet.
    pub async fn missing_channels(
        &self,
        user_id: u64,
        channels: &[ForceSubChannel],
    ) -> Vec<ForceSubChannel> {
        if self.is_bot_owner(user_id) {
            return Vec::new();
        }

        let checks = channels.iter().map(|c| self.is_member(c.chat_id, user_id));
        let joined = futures::future::join_all(checks).await;

        channels
            .iter()
            .zip(joined)
            .filter(|(_, joined)| !joined)
            .map(|(c, _)| c.clone())
            .collect()
    }

    /// Forget a cached membership result.
    ///
    /// Called when the user presses "try again" after joining.
    pub fn invalidate(&self, channel_id: i64, user_id: u64) {
        self.cache.invalidate(&(channel_id, user_id));
        debug!("Invalidated membership cache for user {} in {}", user_id, channel_id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_admins_include_owners_and_settings() {
        let registry = CacheRegistry::new();
        let perms = Permissions::with_owners(Bot::new("0:test"), &registry, vec![1]);
        let mut settings = BotSettings::default();
        settings.admins.push(2);

        assert!(perms.is_admin(1, &settings));
        assert!(perms.is_admin(2, &settings));
        assert!(!perms.is_admin(3, &settings));
        assert!(perms.is_bot_owner(1) && !perms.is_bot_owner(2));
    }
}
