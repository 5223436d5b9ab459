//! Auto-delete tracking.
//!
//! Every delivered copy is tracked until `sent_at + ttl`. The table is
//! persisted to the JSON store off the delivery path so pending deletions
//! survive a restart.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use teloxide::types::{ChatId, MessageId};
use tracing::{debug, error, info};

use super::Notices;
use crate::store::{JsonStore, TRACKED_DELIVERIES};
use crate::telegram::MessageOps;

/// One delivered copy waiting for deletion.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackedDelivery {
    pub chat_id: i64,
    pub message_id: i32,
    pub sent_at: DateTime<Utc>,
    pub ttl_hours: f64,
}

impl TrackedDelivery {
    pub fn key(&self) -> String {
        format!("{}_{}", self.chat_id, self.message_id)
    }

    /// `sent_at + ttl`, clamped to the latest representable time.
    pub fn due_at(&self) -> DateTime<Utc> {
        let millis = (self.ttl_hours * 3_600_000.0).round() as i64;
        ChronoDuration::try_milliseconds(millis)
            .and_then(|ttl| self.sent_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC)
    }

    pub fn is_due(&self, now: DateTime<Utc>) -> bool {
        now >= self.due_at()
    }
}

/// Outcome of one sweep.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SweepReport {
    pub deleted: usize,
    /// Entries purged although deleting the message failed.
    pub failed: usize,
    pub notified: usize,
}

pub struct DeliveryTracker {
    entries: DashMap<String, TrackedDelivery>,
    store: JsonStore,
    write_lock: tokio::sync::Mutex<()>,
}

impl DeliveryTracker {
    /// Load tracked entries from the store.
    pub async fn load(store: JsonStore) -> Self {
        let table: HashMap<String, TrackedDelivery> = store.load_or_default(TRACKED_DELIVERIES).await;
        info!("Loaded {} tracked deliveries", table.len());

        // Re-key on load so a hand-edited file cannot leave mismatched keys.
        let entries = table.into_values().map(|e| (e.key(), e)).collect();
        Self {
            entries,
            store,
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn get(&self, chat_id: i64, message_id: i32) -> Option<TrackedDelivery> {
        self.entries
            .get(&format!("{}_{}", chat_id, message_id))
            .map(|e| e.clone())
    }

    /// Track copies sent together; they share `sent_at` and TTL but expire
    /// independently.
    pub fn register(&self, chat_id: i64, message_ids: &[i32], sent_at: DateTime<Utc>, ttl_hours: f64) {
        for &message_id in message_ids {
            let entry = TrackedDelivery {
                chat_id,
                message_id,
                sent_at,
                ttl_hours,
            };
            self.entries.insert(entry.key(), entry);
        }
        debug!("Tracking {} messages in chat {} for {}h", message_ids.len(), chat_id, ttl_hours);
    }

    /// Entries due at `now`.
    pub fn due(&self, now: DateTime<Utc>) -> Vec<TrackedDelivery> {
        self.entries
            .iter()
            .filter(|e| e.is_due(now))
            .map(|e| e.value().clone())
            .collect()
    }

    /// Delete every due message, purge its entry, and notify affected chats.
    pub async fn sweep(&self, ops: &dyn MessageOps, notices: &Notices, now: DateTime<Utc>) -> SweepReport {
        let due = self.due(now);
        if due.is_empty() {
            return SweepReport::default();
        }

        let mut report = SweepReport::default();
        let mut chats = BTreeSet::new();

        for entry in due {
            match ops.remove(ChatId(entry.chat_id), MessageId(entry.message_id)).await {
                Ok(()) => report.deleted += 1,
                Err(e) => {
                    debug!("Delete of {} failed, purging anyway: {}", entry.key(), e);
                    report.failed += 1;
                }
            }
            self.entries.remove(&entry.key());
            chats.insert(entry.chat_id);
        }

        for chat_id in chats {
            if notices.notify_expired(ops, chat_id, now).await {
                report.notified += 1;
            }
        }

        self.persist().await;
        info!(
            "Sweep: {} deleted, {} already gone, {} notified",
            report.deleted, report.failed, report.notified
        );
        report
    }

    /// Rewrite the table. Failures are logged; memory stays authoritative.
    pub async fn persist(&self) {
        let _guard = self.write_lock.lock().await;
        let snapshot: HashMap<String, TrackedDelivery> = self
            .entries
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        if let Err(e) = self.store.save(TRACKED_DELIVERIES, &snapshot).await {
            error!("Failed to save tracked deliveries: {}", e);
        }
    }

    /// Persist without waiting for the write.
    pub fn persist_background(self: &Arc<Self>) {
        let tracker = Arc::clone(self);
        tokio::spawn(async move { tracker.persist().await });
    }

    /// Snapshot for backups.
    pub fn snapshot(&self) -> Vec<TrackedDelivery> {
        self.entries.iter().map(|e| e.value().clone()).collect()
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::telegram::OpsError;
    use crate::telegram::fake::FakeOps;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
    }

    async fn tracker(dir: &tempfile::TempDir) -> DeliveryTracker {
        DeliveryTracker::load(JsonStore::new(dir.path(), None)).await
    }

    #[tokio::test]
    async fn test_ttl_boundary() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir).await;
        let ops = FakeOps::new();
        let notices = Notices::disabled();

        tracker.register(10, &[1], t0(), 2.0);
        let eps = ChronoDuration::seconds(1);

        let early = tracker.sweep(&ops, &notices, t0() + ChronoDuration::hours(2) - eps).await;
        assert_eq!(early.deleted, 0);
        assert_eq!(tracker.len(), 1);

        let late = tracker.sweep(&ops, &notices, t0() + ChronoDuration::hours(2) + eps).await;
        assert_eq!(late.deleted, 1);
        assert!(tracker.is_empty());
        assert_eq!(*ops.removed.lock(), vec![(ChatId(10), MessageId(1))]);
    }

    #[tokio::test]
    async fn test_failed_delete_still_purged() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir).await;
        let ops = FakeOps::new();
        ops.fail_remove(2, OpsError::NotFound("message to delete not found".into()));

        tracker.register(10, &[1, 2], t0(), 0.5);
        let report = tracker
            .sweep(&ops, &Notices::disabled(), t0() + ChronoDuration::hours(1))
            .await;

        assert_eq!((report.deleted, report.failed), (1, 1));
        assert!(tracker.is_empty());
    }

    #[tokio::test]
    async fn test_entries_expire_independently() {
        let dir = tempfile::tempdir().unwrap();
        let tracker = tracker(&dir).await;
        let ops = FakeOps::new();

        tracker.register(10, &[1], t0(), 1.0);
        tracker.register(10, &[2], t0() + ChronoDuration::minutes(30), 1.0);

        tracker
            .sweep(&ops, &Notices::disabled(), t0() + ChronoDuration::minutes(70))
            .await;
        assert!(tracker.get(10, 1).is_none());
        assert!(tracker.get(10, 2).is_some());
    }

    #[tokio::test]
    async fn test_survives_restart() {
        let dir = tempfile::tempdir().unwrap();
        {
            let tracker = tracker(&dir).await;
            tracker.register(-5, &[7, 8], t0(), 24.0);
            tracker.persist().await;
        }

        let reloaded = tracker(&dir).await;
        assert_eq!(reloaded.len(), 2);
        let entry = reloaded.get(-5, 8).unwrap();
        assert_eq!(entry.due_at(), t0() + ChronoDuration::hours(24));
    }

    #[test]
    fn test_fractional_ttl() {
        let entry = TrackedDelivery {
            chat_id: 1,
            message_id: 1,
            sent_at: t0(),
            ttl_hours: 0.25,
        };
        assert_eq!(entry.due_at(), t0() + ChronoDuration::minutes(15));
        assert_eq!(entry.key(), "1_1");
    }

    #[test]
    fn test_huge_ttl_never_due() {
        let entry = TrackedDelivery {
            chat_id: 1,
            message_id: 1,
            sent_at: t0(),
            ttl_hours: 3e9,
        };
        assert_eq!(entry.due_at(), DateTime::<Utc>::MAX_UTC);
        assert!(!entry.is_due(Utc::now()));
    }
}
