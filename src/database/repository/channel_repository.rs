//! Forced-subscription channel list.

use anyhow::Result;
use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::doc;

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::Database;
use crate::database::models::ForceSubChannel;

pub struct ChannelRepository {
    collection: Collection<ForceSubChannel>,
    cache: TypedCache<&'static str, Vec<ForceSubChannel>>,
}

const ALL: &str = "all";

impl ChannelRepository {
    pub fn new(db: &Database, cache: &CacheRegistry) -> Self {
        Self {
            collection: db.collection("force_sub_channels"),
            cache: cache.get_or_create("force_sub_channels", CacheConfig::with_capacity(1)),
        }
    }

    pub async fn list(&self) -> Result<Vec<ForceSubChannel>> {
        if let Some(channels) = self.cache.get(&ALL) {
            return Ok(channels);
        }

        let channels: Vec<ForceSubChannel> =
            self.collection.find(doc! {}).await?.try_collect().await?;
        self.cache.insert(ALL, channels.clone());
        Ok(channels)
    }

    pub async fn add(&self, channel: &ForceSubChannel) -> Result<()> {
        let options = mongodb::options::ReplaceOptions::builder()
            .upsert(true)
            .build();

        self.collection
            .replace_one(doc! { "chat_id": channel.chat_id }, channel)
            .with_options(options)
            .await?;
        self.cache.invalidate(&ALL);
        Ok(())
    }

    /// Returns whether the channel was registered.
    pub async fn remove(&self, chat_id: i64) -> Result<bool> {
        let result = self.collection.delete_one(doc! { "chat_id": chat_id }).await?;
        self.cache.invalidate(&ALL);
        Ok(result.deleted_count > 0)
    }
}
