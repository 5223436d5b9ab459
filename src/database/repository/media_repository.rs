//! Index of canonical channel messages.

use std::collections::HashMap;

use anyhow::Result;
use futures::TryStreamExt;
use mongodb::Collection;
use mongodb::bson::doc;
use tracing::debug;

use crate::database::Database;
use crate::database::models::MediaEntry;

pub struct MediaRepository {
    collection: Collection<MediaEntry>,
}

impl MediaRepository {
    pub fn new(db: &Database) -> Self {
        Self {
            collection: db.collection("media"),
        }
    }

    /// Insert or refresh the entry for a channel message.
    pub async fn upsert(&self, entry: &MediaEntry) -> Result<()> {
        let options = mongodb::options::ReplaceOptions::builder()
            .upsert(true)
            .build();

        self.collection
            .replace_one(doc! { "message_id": entry.message_id }, entry)
            .with_options(options)
            .await?;

        debug!("Indexed channel message {}", entry.message_id);
        Ok(())
    }

    /// Entries for the given IDs; IDs without an entry are absent.
    pub async fn get_many(&self, ids: &[i32]) -> Result<HashMap<i32, MediaEntry>> {
        let filter = doc! { "message_id": { "$in": ids.to_vec() } };
        let entries: Vec<MediaEntry> = self.collection.find(filter).await?.try_collect().await?;

        Ok(entries.into_iter().map(|e| (e.message_id, e)).collect())
    }

    pub async fn get(&self, id: i32) -> Result<Option<MediaEntry>> {
        Ok(self.collection.find_one(doc! { "message_id": id }).await?)
    }

    /// The `limit` newest entries, newest first.
    pub async fn recent(&self, limit: i64) -> Result<Vec<MediaEntry>> {
        let options = mongodb::options::FindOptions::builder()
            .sort(doc! { "message_id": -1 })
            .limit(limit)
            .build();

        let cursor = self.collection.find(doc! {}).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }

    pub async fn count(&self) -> Result<u64> {
        Ok(self.collection.count_documents(doc! {}).await?)
    }
}
