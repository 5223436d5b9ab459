//! Audit log of admin settings changes.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use tracing::error;

use super::{AUDIT_LOG, JsonStore};

/// Entries kept on disk; older ones are dropped first.
const MAX_ENTRIES: usize = 500;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    pub admin_id: u64,
    pub action: String,
    pub detail: String,
}

pub struct AuditLog {
    store: JsonStore,
    entries: Mutex<Vec<AuditEntry>>,
    write_lock: tokio::sync::Mutex<()>,
}

impl AuditLog {
    pub async fn load(store: JsonStore) -> Self {
        let entries = store.load_or_default(AUDIT_LOG).await;
        Self {
            store,
            entries: Mutex::new(entries),
            write_lock: tokio::sync::Mutex::new(()),
        }
    }

    /// Append an entry and rewrite the log. Write failures are logged only.
    pub async fn record(&self, admin_id: u64, action: &str, detail: impl Into<String>) {
        {
            let mut entries = self.entries.lock();
            entries.push(AuditEntry {
                at: Utc::now(),
                admin_id,
                action: action.to_string(),
                detail: detail.into(),
            });
            let excess = entries.len().saturating_sub(MAX_ENTRIES);
            entries.drain(..excess);
        }

        let _guard = self.write_lock.lock().await;
        let snapshot = self.entries.lock().clone();
        if let Err(e) = self.store.save(AUDIT_LOG, &snapshot).await {
            error!("Failed to save audit log: {}", e);
        }
    }

    /// Newest entries first.
    pub fn recent(&self, limit: usize) -> Vec<AuditEntry> {
        self.entries.lock().iter().rev().take(limit).cloned().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_record_persists_and_caps() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonStore::new(dir.path(), None);
        let log = AuditLog::load(store.clone()).await;

        for i in 0..(MAX_ENTRIES + 3) {
            log.record(1, "replace", format!("#{}", i)).await;
        }

        let recent = log.recent(1);
        assert_eq!(recent[0].detail, format!("#{}", MAX_ENTRIES + 2));

        let reloaded = AuditLog::load(store).await;
        assert_eq!(reloaded.recent(usize::MAX).len(), MAX_ENTRIES);
    }
}
