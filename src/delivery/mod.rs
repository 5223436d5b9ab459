//! File delivery to users.
//!
//! A delivery copies channel messages to a chat one by one: caption rewritten
//! through the caption pipeline, protect flag and brand button applied, each
//! send paced by the per-chat cooldown and wrapped in [`SendRetry`]. Copies
//! that went out are handed to the [`DeliveryTracker`] for auto-delete.

mod cooldown;
mod notify;
mod tracker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use teloxide::types::{ChatId, InlineKeyboardButton, InlineKeyboardMarkup, MessageId};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::caption::{self, CaptionInput};
use crate::database::{BotSettings, MediaEntry, MediaKind};
use crate::telegram::{CaptionOverride, CopyOptions, MessageOps, OpsError, SendRetry};

pub use cooldown::{ChatKind, CooldownGovernor};
pub use notify::{Notices, NotifyPrefs};
pub use tracker::{DeliveryTracker, SweepReport, TrackedDelivery};

/// Callback data of the brand button.
pub const BRAND_CALLBACK: &str = "about";

/// What to deliver and to whom.
pub struct DeliveryRequest<'a> {
    pub chat_id: ChatId,
    pub kind: ChatKind,
    /// Channel message IDs in delivery order.
    pub message_ids: &'a [i32],
    /// Index entries for the messages that have one.
    pub entries: &'a HashMap<i32, MediaEntry>,
    pub settings: &'a BotSettings,
    /// Use the light fixed cooldown (search result deliveries).
    pub fast: bool,
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct DeliveryReport {
    /// IDs of the copies in the user's chat.
    pub delivered: Vec<i32>,
    /// Channel message IDs that could not be sent.
    pub failed: Vec<i32>,
    /// Auto-delete TTL applied to the copies, if any.
    pub ttl_hours: Option<f64>,
}

impl DeliveryReport {
    pub fn is_empty(&self) -> bool {
        self.delivered.is_empty()
    }
}

pub struct Deliverer {
    ops: Arc<dyn MessageOps>,
    channel: ChatId,
    tracker: Arc<DeliveryTracker>,
    governor: Arc<CooldownGovernor>,
    retry: SendRetry,
    brand: Option<InlineKeyboardMarkup>,
}

impl Deliverer {
    pub fn new(
        ops: Arc<dyn MessageOps>,
        channel: ChatId,
        tracker: Arc<DeliveryTracker>,
        governor: Arc<CooldownGovernor>,
        brand_text: Option<String>,
    ) -> Self {
        let brand = brand_text
            .filter(|t| !t.trim().is_empty())
            .map(|text| InlineKeyboardMarkup::new(vec![vec![InlineKeyboardButton::callback(text, BRAND_CALLBACK)]]));

        Self {
            ops,
            channel,
            tracker,
            governor,
            retry: SendRetry::default(),
            brand,
        }
    }

    pub fn tracker(&self) -> &Arc<DeliveryTracker> {
        &self.tracker
    }

    /// Copy the requested messages in order and track what was sent.
    pub async fn deliver(&self, request: DeliveryRequest<'_>) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        let chat = request.chat_id;

        for &source in request.message_ids {
            let options = CopyOptions {
                caption: caption_for(request.entries.get(&source), request.settings),
                protect_content: request.settings.caption.protect_content,
                reply_markup: self.brand.clone(),
            };

            match self.send_copy(chat, request.kind, request.fast, source, &options).await {
                Ok(copy) => report.delivered.push(copy.0),
                Err(e) => {
                    warn!("Delivery of {} to {} failed: {}", source, chat, e);
                    report.failed.push(source);
                }
            }
        }

        if !report.delivered.is_empty() && request.settings.auto_delete_enabled() {
            let ttl = request.settings.delete_timer_hours;
            self.tracker.register(chat.0, &report.delivered, Utc::now(), ttl);
            self.tracker.persist_background();
            report.ttl_hours = Some(ttl);
        }

        debug!(
            "Delivered {}/{} messages to {}",
            report.delivered.len(),
            request.message_ids.len(),
            chat
        );
        report
    }

    async fn send_copy(
        &self,
        chat: ChatId,
        kind: ChatKind,
        fast: bool,
        source: i32,
        options: &CopyOptions,
    ) -> Result<MessageId, OpsError> {
        let ops = self.ops.as_ref();
        let governor = self.governor.as_ref();
        let channel = self.channel;

        self.retry
            .run(
                move || async move {
                    governor.wait(chat.0, kind, fast).await;
                    ops.copy(chat, channel, MessageId(source), options).await
                },
                |err| {
                    if matches!(err, OpsError::Timeout | OpsError::RateLimited(_)) {
                        governor.penalize(chat.0);
                    }
                },
            )
            .await
    }
}

/// Caption override for one delivered message.
///
/// Without an index entry the raw caption is unknown, so the source caption
/// is kept as is. Text posts have no caption to rewrite.
pub fn caption_for(entry: Option<&MediaEntry>, settings: &BotSettings) -> CaptionOverride {
    let Some(entry) = entry.filter(|e| e.kind != MediaKind::Text) else {
        return CaptionOverride::Keep;
    };

    let input = CaptionInput {
        caption: entry.caption.as_deref(),
        file_name: entry.file_name.as_deref(),
        is_document: entry.is_document(),
    };
    match caption::render(input, &settings.caption) {
        Some(text) => CaptionOverride::Set(text),
        None => CaptionOverride::Clear,
    }
}

/// Human readable TTL, e.g. `30 minutes` or `2 hours`.
pub fn format_ttl(hours: f64) -> String {
    let minutes = (hours * 60.0).round() as u64;
    if minutes < 60 {
        format!("{} minute{}", minutes, if minutes == 1 { "" } else { "s" })
    } else if minutes % 60 == 0 {
        let h = minutes / 60;
        format!("{} hour{}", h, if h == 1 { "" } else { "s" })
    } else {
        format!("{}h {}m", minutes / 60, minutes % 60)
    }
}

/// Periodic auto-delete sweep. Runs until `token` is cancelled.
///
/// Each tick also drops idle per-chat cooldown and notice state.
pub async fn run_sweeper(
    tracker: Arc<DeliveryTracker>,
    ops: Arc<dyn MessageOps>,
    notices: Arc<Notices>,
    governor: Arc<CooldownGovernor>,
    interval: Duration,
    token: CancellationToken,
) {
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    info!("Auto-delete sweeper running every {:?}", interval);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = ticker.tick() => {
                let now = Utc::now();
                tracker.sweep(ops.as_ref(), &notices, now).await;
                let pruned = governor.prune() + notices.prune(now);
                if pruned > 0 {
                    debug!("Pruned {} idle chat states", pruned);
                }
            }
        }
    }

    tracker.persist().await;
    info!("Auto-delete sweeper stopped");
}

#[cfg(test)]
mod tests {
    use chrono::Duration as ChronoDuration;

    use super::*;
    use crate::store::JsonStore;
    use crate::telegram::fake::{COPY_ID_OFFSET, FakeOps};

    const CHANNEL: ChatId = ChatId(-100_500);

    fn document(id: i32, caption: &str) -> MediaEntry {
        MediaEntry {
            message_id: id,
            kind: MediaKind::Document,
            file_name: Some(format!("file{}.pdf", id)),
            size_bytes: 1024,
            caption: Some(caption.to_string()),
            date: Utc::now(),
        }
    }

    async fn deliverer(ops: Arc<FakeOps>, dir: &tempfile::TempDir) -> Deliverer {
        let tracker = Arc::new(DeliveryTracker::load(JsonStore::new(dir.path(), None)).await);
        Deliverer::new(
            ops,
            CHANNEL,
            tracker,
            Arc::new(CooldownGovernor::new()),
            Some("📦 Vault".to_string()),
        )
    }

    #[tokio::test(start_paused = true)]
    async fn test_delivers_in_order_and_tracks() {
        let dir = tempfile::tempdir().unwrap();
        let ops = Arc::new(FakeOps::new());
        let deliverer = deliverer(ops.clone(), &dir).await;

        let mut settings = BotSettings::default();
        settings.delete_timer_hours = 2.0;
        settings.caption.protect_content = true;
        settings.caption.append = Some("- via Bot".to_string());

        let entries = HashMap::from([(3, document(3, "Check http://x.co now"))]);
        let report = deliverer
            .deliver(DeliveryRequest {
                chat_id: ChatId(77),
                kind: ChatKind::Private,
                message_ids: &[3, 4],
                entries: &entries,
                settings: &settings,
                fast: false,
            })
            .await;

        assert_eq!(report.delivered, vec![3 + COPY_ID_OFFSET, 4 + COPY_ID_OFFSET]);
        assert_eq!(report.ttl_hours, Some(2.0));

        let copies = ops.copies.lock();
        assert_eq!(copies[0].1, MessageId(3));
        assert!(copies[0].2.protect_content);
        assert!(copies[0].2.reply_markup.is_some());
        assert_eq!(
            copies[0].2.caption,
            CaptionOverride::Set("Check http://x.co now\n- via Bot".to_string())
        );
        // No index entry: the source caption is kept.
        assert_eq!(copies[1].2.caption, CaptionOverride::Keep);
        drop(copies);

        let tracked = deliverer.tracker().get(77, 3 + COPY_ID_OFFSET).unwrap();
        assert_eq!(tracked.ttl_hours, 2.0);
        assert_eq!(deliverer.tracker().len(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_off_tracks_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let ops = Arc::new(FakeOps::new());
        let deliverer = deliverer(ops, &dir).await;

        let report = deliverer
            .deliver(DeliveryRequest {
                chat_id: ChatId(1),
                kind: ChatKind::Private,
                message_ids: &[9],
                entries: &HashMap::new(),
                settings: &BotSettings::default(),
                fast: true,
            })
            .await;

        assert_eq!(report.delivered.len(), 1);
        assert_eq!(report.ttl_hours, None);
        assert!(deliverer.tracker().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_timeouts_and_penalizes() {
        let dir = tempfile::tempdir().unwrap();
        let ops = Arc::new(FakeOps::new());
        ops.fail_copy(5, vec![OpsError::Timeout, OpsError::Timeout]);
        ops.fail_copy(6, vec![OpsError::NotFound("message to copy not found".into())]);
        let governor = Arc::new(CooldownGovernor::new());
        let tracker = Arc::new(DeliveryTracker::load(JsonStore::new(dir.path(), None)).await);
        let deliverer = Deliverer::new(ops.clone(), CHANNEL, tracker, governor.clone(), None);

        let report = deliverer
            .deliver(DeliveryRequest {
                chat_id: ChatId(-42),
                kind: ChatKind::Group,
                message_ids: &[5, 6],
                entries: &HashMap::new(),
                settings: &BotSettings::default(),
                fast: false,
            })
            .await;

        assert_eq!(report.delivered, vec![5 + COPY_ID_OFFSET]);
        assert_eq!(report.failed, vec![6]);
        // Two timeouts, one attempt for the missing message.
        assert_eq!(ops.copy_attempts(), 4);
        assert!(governor.multiplier(-42) > 2.0);
        assert!(ops.copies.lock().iter().all(|c| c.2.reply_markup.is_none()));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweeper_deletes_due_entries() {
        let dir = tempfile::tempdir().unwrap();
        let ops = Arc::new(FakeOps::new());
        let tracker = Arc::new(DeliveryTracker::load(JsonStore::new(dir.path(), None)).await);
        tracker.register(8, &[100], Utc::now() - ChronoDuration::hours(3), 1.0);
        tracker.register(8, &[101], Utc::now(), 1.0);

        let token = CancellationToken::new();
        let handle = tokio::spawn(run_sweeper(
            tracker.clone(),
            ops.clone(),
            Arc::new(Notices::disabled()),
            Arc::new(CooldownGovernor::new()),
            Duration::from_secs(60),
            token.clone(),
        ));

        tokio::time::sleep(Duration::from_secs(1)).await;
        token.cancel();
        handle.await.unwrap();

        assert_eq!(*ops.removed.lock(), vec![(ChatId(8), MessageId(100))]);
        assert!(tracker.get(8, 101).is_some());
    }

    #[test]
    fn test_format_ttl() {
        assert_eq!(format_ttl(0.5), "30 minutes");
        assert_eq!(format_ttl(1.0), "1 hour");
        assert_eq!(format_ttl(24.0), "24 hours");
        assert_eq!(format_ttl(1.25), "1h 15m");
    }
}
