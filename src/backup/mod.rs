//! JSON snapshots of bot state.
//!
//! A snapshot holds the settings, users, forced-subscription channels and
//! media index collections plus the tracked deliveries table. Snapshots are
//! written to `<data_dir>/backups/backup-<timestamp>.json`; only the newest
//! `keep` files survive.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use mongodb::bson::Bson;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::database::Database;
use crate::delivery::{DeliveryTracker, TrackedDelivery};
use crate::store::{JsonStore, LAST_BACKUP};

/// Collections included in every snapshot.
pub const COLLECTIONS: [&str; 4] = ["settings", "users", "force_sub_channels", "media"];

const PREFIX: &str = "backup-";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    pub created_at: DateTime<Utc>,
    pub collections: BTreeMap<String, Vec<serde_json::Value>>,
    pub tracked_deliveries: Vec<TrackedDelivery>,
}

impl Snapshot {
    pub fn document_count(&self) -> usize {
        self.collections.values().map(Vec::len).sum()
    }
}

/// Content of the `last_backup` table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LastBackup {
    pub at: Option<DateTime<Utc>>,
    pub file: Option<String>,
}

/// Result of one backup run.
#[derive(Debug, Clone)]
pub struct BackupReport {
    pub path: PathBuf,
    pub documents: usize,
    pub tracked: usize,
    pub pruned: usize,
}

pub struct BackupService {
    db: Database,
    tracker: Arc<DeliveryTracker>,
    store: JsonStore,
    dir: PathBuf,
    keep: usize,
}

impl BackupService {
    pub fn new(db: Database, tracker: Arc<DeliveryTracker>, store: JsonStore, keep: usize) -> Self {
        let dir = store.dir().join("backups");
        Self {
            db,
            tracker,
            store,
            dir,
            keep,
        }
    }

    /// Take a snapshot, write it, prune old files, and record the time.
    pub async fn run_once(&self) -> Result<BackupReport> {
        let mut collections = BTreeMap::new();
        for name in COLLECTIONS {
            let docs = self
                .db
                .dump(name)
                .await
                .with_context(|| format!("dumping {}", name))?;
            let docs = docs
                .into_iter()
                .map(|d| Bson::Document(d).into_relaxed_extjson())
                .collect();
            collections.insert(name.to_string(), docs);
        }

        let snapshot = Snapshot {
            created_at: Utc::now(),
            collections,
            tracked_deliveries: self.tracker.snapshot(),
        };

        let path = write_snapshot(&self.dir, &snapshot).await?;
        let pruned = prune(&self.dir, self.keep).await?;

        let last = LastBackup {
            at: Some(snapshot.created_at),
            file: path.file_name().map(|f| f.to_string_lossy().into_owned()),
        };
        if let Err(e) = self.store.save(LAST_BACKUP, &last).await {
            error!("Failed to record last backup time: {}", e);
        }

        info!(
            "Backup written to {} ({} documents, {} pruned)",
            path.display(),
            snapshot.document_count(),
            pruned
        );

        Ok(BackupReport {
            path,
            documents: snapshot.document_count(),
            tracked: snapshot.tracked_deliveries.len(),
            pruned,
        })
    }

    pub async fn last_backup(&self) -> LastBackup {
        self.store.load_or_default(LAST_BACKUP).await
    }

    /// Back up every `interval`, counting from the last recorded backup.
    pub async fn run_periodic(self: Arc<Self>, interval: Duration, token: CancellationToken) {
        let mut wait = initial_delay(self.last_backup().await.at, interval, Utc::now());
        info!("Periodic backups every {:?}, next in {:?}", interval, wait);

        loop {
            tokio::select! {
                _ = token.cancelled() => break,
                _ = tokio::time::sleep(wait) => {
                    if let Err(e) = self.run_once().await {
                        warn!("Periodic backup failed: {:#}", e);
                    }
                    wait = interval;
                }
            }
        }

        info!("Backup loop stopped");
    }
}

/// Time until the next backup is due.
fn initial_delay(last: Option<DateTime<Utc>>, interval: Duration, now: DateTime<Utc>) -> Duration {
    let Some(last) = last else {
        return Duration::ZERO;
    };
    let elapsed = (now - last).to_std().unwrap_or(Duration::ZERO);
    interval.saturating_sub(elapsed)
}

fn file_name(at: DateTime<Utc>) -> String {
    format!("{}{}.json", PREFIX, at.format("%Y%m%d-%H%M%S"))
}

/// Write a snapshot into `dir`. Returns the file path.
pub async fn write_snapshot(dir: &Path, snapshot: &Snapshot) -> Result<PathBuf> {
    let bytes = serde_json::to_vec_pretty(snapshot)?;
    let dir = dir.to_path_buf();
    let path = dir.join(file_name(snapshot.created_at));

    let target = path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        std::fs::create_dir_all(&dir)?;
        let tmp = target.with_extension("json.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, &target)
    })
    .await?
    .with_context(|| format!("writing {}", path.display()))?;

    Ok(path)
}

/// Delete all but the newest `keep` snapshots in `dir`.
pub async fn prune(dir: &Path, keep: usize) -> Result<usize> {
    let dir = dir.to_path_buf();
    let removed = tokio::task::spawn_blocking(move || -> std::io::Result<usize> {
        let mut files: Vec<PathBuf> = std::fs::read_dir(&dir)?
            .filter_map(|e| e.ok().map(|e| e.path()))
            .filter(|p| {
                p.file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with(PREFIX) && n.ends_with(".json"))
            })
            .collect();

        // Timestamped names sort chronologically.
        files.sort();
        let excess = files.len().saturating_sub(keep);
        for path in &files[..excess] {
            std::fs::remove_file(path)?;
        }
        Ok(excess)
    })
    .await??;

    Ok(removed)
}
