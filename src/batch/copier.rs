//! Bounded-concurrency copy and button-attach passes.

use std::collections::HashMap;
use std::sync::Arc;

use futures::future::join_all;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId};
use thiserror::Error;
use tokio::sync::Semaphore;
use tracing::{info, warn};

use super::{BatchItem, ItemOrigin, range_anchors};
use crate::telegram::{BackoffPolicy, CopyOptions, MessageOps};

/// Failure sets at most this large are listed ID by ID in reports.
const LIST_LIMIT: usize = 10;

#[derive(Debug, Clone, Copy)]
pub struct CopierConfig {
    pub concurrency: usize,
    pub copy: BackoffPolicy,
    pub attach: BackoffPolicy,
}

impl Default for CopierConfig {
    fn default() -> Self {
        Self {
            concurrency: 5,
            copy: BackoffPolicy::new(5),
            attach: BackoffPolicy::new(3),
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum BatchError {
    #[error("none of the {0} collected messages could be resolved")]
    NothingResolved(usize),
}

/// Result of a batch run.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchOutcome {
    /// Items in submission order with copies resolved.
    pub items: Vec<BatchItem>,
    pub first: i32,
    pub last: i32,
    pub references: usize,
    pub copied: usize,
    /// Sequence numbers (1-based) of items whose copy failed.
    pub copy_failed: Vec<usize>,
    /// Channel message IDs that did not get their button.
    pub attach_failed: Vec<i32>,
}

impl BatchOutcome {
    /// Report for the admin who ran the batch.
    pub fn summary(&self) -> String {
        let mut text = format!(
            "Items: <b>{}</b> ({} from channel, {} copied)",
            self.items.len(),
            self.references,
            self.copied
        );
        if !self.copy_failed.is_empty() {
            text.push_str(&format!(
                "\nCopy failures: <b>{}</b>{}",
                self.copy_failed.len(),
                list_ids(&self.copy_failed, "#")
            ));
        }
        if !self.attach_failed.is_empty() {
            text.push_str(&format!(
                "\nButton failures: <b>{}</b>{}",
                self.attach_failed.len(),
                list_ids(&self.attach_failed, "")
            ));
        }
        text
    }
}

fn list_ids<T: std::fmt::Display>(ids: &[T], prefix: &str) -> String {
    if ids.len() > LIST_LIMIT {
        return String::new();
    }
    let ids: Vec<String> = ids.iter().map(|id| format!("{}{}", prefix, id)).collect();
    format!(" ({})", ids.join(", "))
}

pub struct BatchCopier {
    ops: Arc<dyn MessageOps>,
    channel: ChatId,
    config: CopierConfig,
}

impl BatchCopier {
    pub fn new(ops: Arc<dyn MessageOps>, channel: ChatId, config: CopierConfig) -> Self {
        Self {
            ops,
            channel,
            config,
        }
    }

    /// Copy every `CopyNeeded` item into the channel and merge the results
    /// back in submission order. Failed copies keep `copied_message_id = None`.
    pub async fn copy_all(&self, mut items: Vec<BatchItem>) -> Vec<BatchItem> {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let tasks = items
            .iter()
            .filter(|item| item.origin == ItemOrigin::CopyNeeded)
            .filter_map(|item| item.pending.as_ref().map(|p| (item.sequence, p.chat_id, p.message_id)))
            .map(|(sequence, chat_id, message_id)| {
                let semaphore = Arc::clone(&semaphore);
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return (sequence, None);
                    };
                    let what = format!("batch copy #{}", sequence + 1);
                    let options = CopyOptions::default();
                    let result = self
                        .config
                        .copy
                        .run(&what, || {
                            self.ops
                                .copy(self.channel, ChatId(chat_id), MessageId(message_id), &options)
                        })
                        .await;
                    (sequence, result.ok().map(|id| id.0))
                }
            });

        let copied: HashMap<usize, Option<i32>> = join_all(tasks).await.into_iter().collect();

        items.sort_by_key(|item| item.sequence);
        for item in &mut items {
            if let Some(id) = copied.get(&item.sequence) {
                item.copied_message_id = *id;
            }
        }
        items
    }

    /// Put `markup_for(id)` on every copied message. Returns the IDs that failed.
    pub async fn attach_buttons<F>(&self, items: &[BatchItem], markup_for: F) -> Vec<i32>
    where
        F: Fn(i32) -> InlineKeyboardMarkup,
    {
        let semaphore = Arc::new(Semaphore::new(self.config.concurrency.max(1)));

        let tasks = items
            .iter()
            .filter(|item| item.origin == ItemOrigin::CopyNeeded)
            .filter_map(|item| item.copied_message_id)
            .map(|id| {
                let semaphore = Arc::clone(&semaphore);
                let markup = markup_for(id);
                async move {
                    let Ok(_permit) = semaphore.acquire().await else {
                        return Some(id);
                    };
                    let what = format!("attach button {}", id);
                    self.config
                        .attach
                        .run(&what, || self.ops.edit_markup(self.channel, MessageId(id), markup.clone()))
                        .await
                        .err()
                        .map(|_| id)
                }
            });

        join_all(tasks).await.into_iter().flatten().collect()
    }

    /// Full pipeline: copy, merge, compute anchors, optionally attach buttons.
    pub async fn run<F>(
        &self,
        items: Vec<BatchItem>,
        markup_for: Option<F>,
    ) -> Result<BatchOutcome, BatchError>
    where
        F: Fn(i32) -> InlineKeyboardMarkup,
    {
        let total = items.len();
        let items = self.copy_all(items).await;

        let Some((first, last)) = range_anchors(&items) else {
            warn!("Batch of {} items resolved nothing", total);
            return Err(BatchError::NothingResolved(total));
        };

        let references = items
            .iter()
            .filter(|i| i.origin == ItemOrigin::DbReference && i.resolved_id().is_some())
            .count();
        let copied = items
            .iter()
            .filter(|i| i.origin == ItemOrigin::CopyNeeded && i.copied_message_id.is_some())
            .count();
        let copy_failed: Vec<usize> = items
            .iter()
            .filter(|i| i.resolved_id().is_none())
            .map(|i| i.sequence + 1)
            .collect();

        let attach_failed = match markup_for {
            Some(markup_for) => self.attach_buttons(&items, markup_for).await,
            None => Vec::new(),
        };

        info!(
            "Batch done: {} items, {} copied, {} failed, range {}..{}",
            total,
            copied,
            copy_failed.len(),
            first,
            last
        );

        Ok(BatchOutcome {
            items,
            first,
            last,
            references,
            copied,
            copy_failed,
            attach_failed,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::time::Instant;

    use super::*;
    use crate::batch::{BatchSession, PendingMessage, SessionOutcome};
    use crate::telegram::OpsError;
    use crate::telegram::fake::{COPY_ID_OFFSET, FakeOps};

    const CHANNEL: ChatId = ChatId(-1001);

    fn pending(id: i32) -> PendingMessage {
        PendingMessage {
            chat_id: 5,
            message_id: id,
            entry: None,
        }
    }

    fn collect(build: impl FnOnce(&mut BatchSession)) -> Vec<BatchItem> {
        let mut session = BatchSession::new();
        build(&mut session);
        session.stop();
        match session.finish() {
            SessionOutcome::Proceed(items) => items,
            other => panic!("unexpected {:?}", other),
        }
    }

    fn copier(ops: &Arc<FakeOps>, concurrency: usize) -> BatchCopier {
        let config = CopierConfig {
            concurrency,
            ..Default::default()
        };
        BatchCopier::new(ops.clone(), CHANNEL, config)
    }

    fn no_buttons() -> Option<fn(i32) -> InlineKeyboardMarkup> {
        None
    }

    #[tokio::test(start_paused = true)]
    async fn test_order_survives_out_of_order_completion() {
        let ops = Arc::new(FakeOps::new());
        // Earlier submissions finish last.
        for (i, source) in [1, 2, 3, 4].into_iter().enumerate() {
            ops.delay_copy(source, Duration::from_secs(10 - i as u64 * 2));
        }
        let items = collect(|s| {
            s.push_copy(pending(1));
            s.push_reference(300);
            s.push_copy(pending(2));
            s.push_copy(pending(3));
            s.push_reference(301);
            s.push_copy(pending(4));
        });

        let outcome = copier(&ops, 4).run(items, no_buttons()).await.unwrap();

        assert_eq!(*ops.completed.lock(), vec![4, 3, 2, 1]);
        let resolved: Vec<Option<i32>> = outcome.items.iter().map(BatchItem::resolved_id).collect();
        assert_eq!(
            resolved,
            vec![
                Some(1 + COPY_ID_OFFSET),
                Some(300),
                Some(2 + COPY_ID_OFFSET),
                Some(3 + COPY_ID_OFFSET),
                Some(301),
                Some(4 + COPY_ID_OFFSET),
            ]
        );
        assert_eq!((outcome.first, outcome.last), (1 + COPY_ID_OFFSET, 4 + COPY_ID_OFFSET));
        assert_eq!((outcome.references, outcome.copied), (2, 4));
    }

    #[tokio::test(start_paused = true)]
    async fn test_concurrency_is_bounded() {
        let ops = Arc::new(FakeOps::new());
        for source in 1..=6 {
            ops.delay_copy(source, Duration::from_secs(1));
        }
        let items = collect(|s| {
            for source in 1..=6 {
                s.push_copy(pending(source));
            }
        });

        let start = Instant::now();
        copier(&ops, 2).copy_all(items).await;

        assert_eq!(start.elapsed(), Duration::from_secs(3));
        assert_eq!(ops.max_in_flight(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_copy_marks_item_and_reports() {
        let ops = Arc::new(FakeOps::new());
        ops.fail_copy(2, vec![OpsError::Timeout; 6]);
        ops.fail_copy(3, vec![OpsError::RateLimited(Duration::from_secs(30)); 8]);
        let items = collect(|s| {
            s.push_copy(pending(1));
            s.push_copy(pending(2));
            s.push_copy(pending(3));
        });

        let outcome = copier(&ops, 3).run(items, no_buttons()).await.unwrap();

        assert_eq!(outcome.items[1].copied_message_id, None);
        // Flood waits never exhaust the budget.
        assert_eq!(outcome.items[2].copied_message_id, Some(3 + COPY_ID_OFFSET));
        assert_eq!(outcome.copy_failed, vec![2]);
        assert!(outcome.summary().contains("Copy failures: <b>1</b> (#2)"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_nothing_resolved_fails_batch() {
        let ops = Arc::new(FakeOps::new());
        ops.fail_copy(1, vec![OpsError::NotFound("gone".into())]);
        let items = collect(|s| {
            s.push_copy(pending(1));
        });

        let result = copier(&ops, 1).run(items, no_buttons()).await;
        assert_eq!(result, Err(BatchError::NothingResolved(1)));
    }

    #[tokio::test(start_paused = true)]
    async fn test_attach_failures_do_not_fail_batch() {
        let ops = Arc::new(FakeOps::new());
        ops.fail_edit(2 + COPY_ID_OFFSET, vec![OpsError::Network("reset".into()); 10]);
        let items = collect(|s| {
            s.push_copy(pending(1));
            s.push_copy(pending(2));
            s.push_reference(77);
        });

        let outcome = copier(&ops, 2)
            .run(items, Some(|_id: i32| InlineKeyboardMarkup::default()))
            .await
            .unwrap();

        assert_eq!(outcome.attach_failed, vec![2 + COPY_ID_OFFSET]);
        // Only copied messages get buttons, never references.
        assert_eq!(*ops.edited.lock(), vec![MessageId(1 + COPY_ID_OFFSET)]);
        assert_eq!((outcome.first, outcome.last), (1 + COPY_ID_OFFSET, 77));
    }

    #[test]
    fn test_summary_hides_long_failure_lists() {
        let outcome = BatchOutcome {
            items: Vec::new(),
            first: 1,
            last: 2,
            references: 0,
            copied: 0,
            copy_failed: (1..=11).collect(),
            attach_failed: Vec::new(),
        };
        let summary = outcome.summary();
        assert!(summary.contains("Copy failures: <b>11</b>"));
        assert!(!summary.contains("#1"));
    }
}
