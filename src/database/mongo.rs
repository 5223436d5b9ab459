//! MongoDB database wrapper.

use mongodb::bson::{Document, doc};
use mongodb::{Client, Collection, options::ClientOptions};
use tracing::info;

/// Database handle shared by all repositories.
#[derive(Debug, Clone)]
pub struct Database {
    db: mongodb::Database,
}

impl Database {
    /// Connect and ping.
    ///
    /// # Errors
    /// Returns error if the URI is invalid or the server does not answer.
    pub async fn connect(uri: &str, db_name: &str) -> anyhow::Result<Self> {
        let options = ClientOptions::parse(uri).await?;
        let client = Client::with_options(options)?;

        client
            .database("admin")
            .run_command(doc! { "ping": 1 })
            .await?;

        info!("Successfully connected to MongoDB");

        Ok(Self {
            db: client.database(db_name),
        })
    }

    /// Get a typed collection.
    pub fn collection<T: Send + Sync>(&self, name: &str) -> Collection<T> {
        self.db.collection(name)
    }

    /// Every document of a collection, without `_id`. Used by backups.
    pub async fn dump(&self, name: &str) -> anyhow::Result<Vec<Document>> {
        use futures::TryStreamExt;

        let collection: Collection<Document> = self.db.collection(name);
        let options = mongodb::options::FindOptions::builder()
            .projection(doc! { "_id": 0 })
            .build();
        let cursor = collection.find(doc! {}).with_options(options).await?;
        Ok(cursor.try_collect().await?)
    }
}
