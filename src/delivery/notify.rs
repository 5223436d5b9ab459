//! Post-deletion notices.
//!
//! Users can opt out with `/notify`. Each chat gets at most one notice per
//! cooldown window; the window is in memory only, so a restart may let one
//! extra notice through.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use teloxide::types::ChatId;
use tracing::{debug, error};

use crate::store::{JsonStore, NOTIFY_PREFS};
use crate::telegram::MessageOps;

const EXPIRED_TEXT: &str =
    "🗑 Files sent to you earlier have expired and were deleted.\nUse the same link again to get them back.";

/// Per-user notification opt-out, persisted as a JSON table.
pub struct NotifyPrefs {
    store: JsonStore,
    prefs: DashMap<u64, bool>,
    write_lock: tokio::sync::Mutex<()>,
}

impl NotifyPrefs {
    pub async fn load(store: JsonStore) -> Self {
        let table: HashMap<u64, bool> = store.load_or_default(NOTIFY_PREFS).await;
        Self {
            store,
            prefs: table.into_iter().collect(),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Notifications are on unless the user turned them off.
    pub fn enabled(&self, user_id: u64) -> bool {
        self.prefs.get(&user_id).map(|v| *v).unwrap_or(true)
    }

    /// Flip the preference, persist, and return the new value.
    pub async fn toggle(&self, user_id: u64) -> bool {
        let enabled = !self.enabled(user_id);
        self.prefs.insert(user_id, enabled);

        let _guard = self.write_lock.lock().await;
        let snapshot: HashMap<u64, bool> = self.prefs.iter().map(|e| (*e.key(), *e.value())).collect();
        if let Err(e) = self.store.save(NOTIFY_PREFS, &snapshot).await {
            error!("Failed to save notification preferences: {}", e);
        }
        enabled
    }
}

/// Sends the "your files were deleted" notice, rate limited per chat.
pub struct Notices {
    prefs: Option<Arc<NotifyPrefs>>,
    last_sent: DashMap<i64, DateTime<Utc>>,
    window: ChronoDuration,
}

impl Notices {
    pub fn new(prefs: Arc<NotifyPrefs>, window: ChronoDuration) -> Self {
        Self {
            prefs: Some(prefs),
            last_sent: DashMap::new(),
            window,
        }
    }

    /// Never sends anything.
    pub fn disabled() -> Self {
        Self {
            prefs: None,
            last_sent: DashMap::new(),
            window: ChronoDuration::zero(),
        }
    }

    /// Claim the chat's notice slot if its cooldown has passed.
    pub fn try_claim(&self, chat_id: i64, now: DateTime<Utc>) -> bool {
        let mut claimed = false;
        self.last_sent
            .entry(chat_id)
            .and_modify(|last| {
                if now - *last >= self.window {
                    *last = now;
                    claimed = true;
                }
            })
            .or_insert_with(|| {
                claimed = true;
                now
            });
        claimed
    }

    /// Drop chats whose window has passed; they would be claimable anyway.
    pub fn prune(&self, now: DateTime<Utc>) -> usize {
        let before = self.last_sent.len();
        self.last_sent.retain(|_, last| now - *last < self.window);
        before.saturating_sub(self.last_sent.len())
    }

    pub fn tracked_chats(&self) -> usize {
        self.last_sent.len()
    }

    /// Best-effort notice after deletions in `chat_id`. Returns whether one was sent.
    pub async fn notify_expired(&self, ops: &dyn MessageOps, chat_id: i64, now: DateTime<Utc>) -> bool {
        let Some(prefs) = &self.prefs else {
            return false;
        };
        if chat_id > 0 && !prefs.enabled(chat_id as u64) {
            return false;
        }
        if !self.try_claim(chat_id, now) {
            return false;
        }

        match ops.send_html(ChatId(chat_id), EXPIRED_TEXT).await {
            Ok(_) => true,
            Err(e) => {
                debug!("Expiry notice to {} failed: {}", chat_id, e);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;

    use super::*;
    use crate::telegram::fake::FakeOps;

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 0, 0, 0).unwrap()
    }

    #[tokio::test]
    async fn test_cooldown_window() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Arc::new(NotifyPrefs::load(JsonStore::new(dir.path(), None)).await);
        let notices = Notices::new(prefs, ChronoDuration::minutes(5));
        let ops = FakeOps::new();

        assert!(notices.notify_expired(&ops, 42, t0()).await);
        assert!(!notices.notify_expired(&ops, 42, t0() + ChronoDuration::minutes(4)).await);
        assert!(notices.notify_expired(&ops, 43, t0() + ChronoDuration::minutes(4)).await);
        assert!(notices.notify_expired(&ops, 42, t0() + ChronoDuration::minutes(5)).await);
        assert_eq!(ops.sent.lock().len(), 3);
    }

    #[tokio::test]
    async fn test_expired_windows_are_pruned() {
        let dir = tempfile::tempdir().unwrap();
        let prefs = Arc::new(NotifyPrefs::load(JsonStore::new(dir.path(), None)).await);
        let notices = Notices::new(prefs, ChronoDuration::minutes(5));

        assert!(notices.try_claim(1, t0()));
        assert!(notices.try_claim(2, t0() + ChronoDuration::minutes(3)));

        assert_eq!(notices.prune(t0() + ChronoDuration::minutes(4)), 0);
        assert_eq!(notices.prune(t0() + ChronoDuration::minutes(5)), 1);
        assert_eq!(notices.tracked_chats(), 1);

        // Chat 2 is still inside its window after the prune.
        assert!(!notices.try_claim(2, t0() + ChronoDuration::minutes(6)));
        assert!(notices.try_claim(1, t0() + ChronoDuration::minutes(6)));
    }

    #[tokio::test]
    async fn test_opt_out_persists() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);
        let prefs = NotifyPrefs::load(store.clone()).await;

        assert!(prefs.enabled(9));
        assert!(!prefs.toggle(9).await);

        let prefs = Arc::new(NotifyPrefs::load(store).await);
        assert!(!prefs.enabled(9));

        let notices = Notices::new(prefs, ChronoDuration::minutes(5));
        let ops = FakeOps::new();
        assert!(!notices.notify_expired(&ops, 9, t0()).await);
        assert!(ops.sent.lock().is_empty());
    }
}
