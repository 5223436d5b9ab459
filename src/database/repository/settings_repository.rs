//! Settings repository.
//!
//! The cached copy is authoritative for the running process: an update is
//! applied in memory first, then written to MongoDB and mirrored to the
//! JSON store. Persistence failures are logged and do not undo the change.

use anyhow::Result;
use mongodb::Collection;
use mongodb::bson::doc;
use tracing::{debug, error, warn};

use crate::cache::{CacheConfig, CacheRegistry, TypedCache};
use crate::database::Database;
use crate::database::models::{BotSettings, SETTINGS_ID};
use crate::store::{JsonStore, SETTINGS_MIRROR};

pub struct SettingsRepository {
    collection: Collection<BotSettings>,
    cache: TypedCache<&'static str, BotSettings>,
    mirror: JsonStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl SettingsRepository {
    pub fn new(db: &Database, cache: &CacheRegistry, mirror: JsonStore) -> Self {
        let cache = cache.get_or_create("settings", CacheConfig::with_capacity(1).no_ttl());

        Self {
            collection: db.collection("settings"),
            cache,
            mirror,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Current settings. Reads MongoDB once, then serves from memory.
    ///
    /// If MongoDB is unreachable the JSON mirror is used instead.
    pub async fn get(&self) -> BotSettings {
        if let Some(settings) = self.cache.get(&SETTINGS_ID) {
            return settings;
        }

        let settings = match self.collection.find_one(doc! { "_id": SETTINGS_ID }).await {
            Ok(found) => found.unwrap_or_default(),
            Err(e) => {
                warn!("Settings read failed ({}), using local mirror", e);
                self.mirror.load_or_default(SETTINGS_MIRROR).await
            }
        };

        self.cache.insert(SETTINGS_ID, settings.clone());
        settings
    }

    /// Apply `change` and persist. Returns the new settings.
    pub async fn update<F>(&self, change: F) -> BotSettings
    where
        F: FnOnce(&mut BotSettings),
    {
        let _guard = self.write_lock.lock().await;

        let mut settings = self.get().await;
        change(&mut settings);
        self.cache.insert(SETTINGS_ID, settings.clone());

        if let Err(e) = self.save_to_db(&settings).await {
            error!("Failed to save settings to MongoDB: {}", e);
        }
        match self.mirror.save_with_fallback(SETTINGS_MIRROR, &settings).await {
            Ok(dir) => debug!("Settings mirrored to {}", dir.display()),
            Err(e) => error!("Failed to mirror settings: {}", e),
        }

        settings
    }

    async fn save_to_db(&self, settings: &BotSettings) -> Result<()> {
        let options = mongodb::options::ReplaceOptions::builder()
            .upsert(true)
            .build();

        self.collection
            .replace_one(doc! { "_id": SETTINGS_ID }, settings)
            .with_options(options)
            .await?;
        Ok(())
    }
}
