//! Last processed update ID.
//!
//! Telegram may hand back updates the previous process already handled
//! when it stopped before confirming them. Updates at or below the offset
//! stored at startup are dropped.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error};

use super::{JsonStore, UPDATE_OFFSET};

#[derive(Debug, Default, Serialize, Deserialize)]
struct OffsetTable {
    last_update_id: u32,
}

pub struct UpdateOffset {
    store: JsonStore,
    startup: u32,
    latest: AtomicU32,
    dirty: AtomicBool,
}

impl UpdateOffset {
    pub async fn load(store: JsonStore) -> Self {
        let table: OffsetTable = store.load_or_default(UPDATE_OFFSET).await;
        Self {
            store,
            startup: table.last_update_id,
            latest: AtomicU32::new(table.last_update_id),
            dirty: AtomicBool::new(false),
        }
    }

    /// Record an update; returns `false` if it was handled by a previous run.
    pub fn observe(&self, update_id: u32) -> bool {
        if update_id <= self.startup {
            debug!("Skipping replayed update {}", update_id);
            return false;
        }
        if self.latest.fetch_max(update_id, Ordering::Relaxed) < update_id {
            self.dirty.store(true, Ordering::Relaxed);
        }
        true
    }

    pub fn latest(&self) -> u32 {
        self.latest.load(Ordering::Relaxed)
    }

    /// Persist the latest offset if it moved since the last flush.
    pub async fn flush(&self) {
        if !self.dirty.swap(false, Ordering::Relaxed) {
            return;
        }
        let table = OffsetTable {
            last_update_id: self.latest(),
        };
        if let Err(e) = self.store.save(UPDATE_OFFSET, &table).await {
            self.dirty.store(true, Ordering::Relaxed);
            error!("Failed to save update offset: {}", e);
        }
    }

    /// Flush every `every` until `token` is cancelled, then once more.
    pub async fn run_flusher(self: Arc<Self>, every: Duration, token: CancellationToken) {
        let mut ticker = tokio::time::interval(every);
        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = ticker.tick() => self.flush().await,
            }
        }
        self.flush().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_replays_are_dropped_after_restart() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);

        let offset = UpdateOffset::load(store.clone()).await;
        assert!(offset.observe(10));
        assert!(offset.observe(12));
        assert!(offset.observe(11));
        offset.flush().await;

        let restarted = UpdateOffset::load(store).await;
        assert!(!restarted.observe(12));
        assert!(!restarted.observe(3));
        assert!(restarted.observe(13));
        assert_eq!(restarted.latest(), 13);
    }

    #[tokio::test]
    async fn test_flusher_saves_on_shutdown() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);
        let offset = Arc::new(UpdateOffset::load(store.clone()).await);
        let token = CancellationToken::new();

        let flusher = tokio::spawn(Arc::clone(&offset).run_flusher(Duration::from_secs(3600), token.clone()));
        assert!(offset.observe(40));
        token.cancel();
        flusher.await.unwrap();

        let restarted = UpdateOffset::load(store).await;
        assert!(!restarted.observe(40));
    }
}
