//! User repository: presence tracking and the ban list.

use std::sync::Arc;

use anyhow::Result;
use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::doc;
use mongodb::options::UpdateOptions;
use teloxide::types::User;
use tokio::spawn;
use tracing::{debug, warn};

use super::Database;
use super::models::StoredUser;
use crate::cache::{CacheConfig, CacheRegistry, TypedCache};

/// Repository for users who have talked to the bot.
pub struct UserRepo {
    collection: Collection<StoredUser>,
    /// Users already upserted with their current profile.
    seen: TypedCache<u64, StoredUser>,
    /// user_id -> banned
    bans: TypedCache<u64, bool>,
}

impl UserRepo {
    pub fn new(db: &Database, cache: &CacheRegistry) -> Self {
        Self {
            collection: db.collection("users"),
            seen: cache.get_or_create("users_seen", CacheConfig::with_capacity(10_000)),
            bans: cache.get_or_create("user_bans", CacheConfig::gate()),
        }
    }

    /// Record a user, keeping the ban flag and first-contact time intact.
    pub async fn upsert(&self, user: &User) -> Result<()> {
        let user_id = user.id.0;
        if let Some(cached) = self.seen.get(&user_id)
            && !cached.has_changed(user)
        {
            return Ok(());
        }

        let stored = StoredUser::from_telegram(user);
        let update = doc! {
            "$set": {
                "username": stored.username.clone(),
                "first_name": &stored.first_name,
                "updated_at": stored.updated_at,
            },
            "$setOnInsert": {
                "banned": false,
                "joined_at": stored.joined_at,
            },
        };

        self.collection
            .update_one(doc! { "user_id": user_id as i64 }, update)
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;

        self.seen.insert(user_id, stored);
        debug!("Upserted user {}", user_id);
        Ok(())
    }

    /// Upsert without blocking the handler.
    pub fn upsert_background(self: Arc<Self>, user: User) {
        spawn(async move {
            if let Err(e) = self.upsert(&user).await {
                warn!("Failed to upsert user {}: {}", user.id, e);
            }
        });
    }

    pub async fn is_banned(&self, user_id: u64) -> Result<bool> {
        if let Some(banned) = self.bans.get(&user_id) {
            return Ok(banned);
        }

        let banned = self
            .collection
            .find_one(doc! { "user_id": user_id as i64 })
            .await?
            .map(|u| u.banned)
            .unwrap_or(false);

        self.bans.insert(user_id, banned);
        Ok(banned)
    }

    /// Set or clear the ban flag, creating a placeholder user if needed.
    pub async fn set_banned(&self, user_id: u64, banned: bool) -> Result<()> {
        let placeholder = StoredUser::banned_placeholder(user_id);
        let update = doc! {
            "$set": { "banned": banned },
            "$setOnInsert": {
                "username": null,
                "first_name": "",
                "joined_at": placeholder.joined_at,
                "updated_at": placeholder.updated_at,
            },
        };

        self.collection
            .update_one(doc! { "user_id": user_id as i64 }, update)
            .with_options(UpdateOptions::builder().upsert(true).build())
            .await?;

        self.bans.insert(user_id, banned);
        Ok(())
    }

    pub async fn banned_ids(&self) -> Result<Vec<u64>> {
        let users: Vec<StoredUser> = self
            .collection
            .find(doc! { "banned": true })
            .await?
            .try_collect()
            .await?;
        Ok(users.into_iter().map(|u| u.user_id).collect())
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }
}
