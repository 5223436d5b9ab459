//! Batch link creation.
//!
//! Admins collect messages in a session; messages that are not yet in the
//! canonical channel are copied there concurrently, and the first and last
//! resolved message (in submission order) become the link's range.

mod classify;
mod copier;
mod session;

use crate::database::MediaEntry;

pub use classify::{ChannelIdentity, Classification, Submission, classify};
pub use copier::{BatchCopier, BatchError, BatchOutcome, CopierConfig};
pub use session::{BatchSession, SessionHub, SessionInbox, SessionOutcome, SessionState};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemOrigin {
    /// Already in the canonical channel.
    DbReference,
    /// Must be copied into the channel.
    CopyNeeded,
}

/// A message waiting to be copied into the channel.
#[derive(Debug, Clone, PartialEq)]
pub struct PendingMessage {
    pub chat_id: i64,
    pub message_id: i32,
    /// Index entry to store once the copy has a channel message ID.
    pub entry: Option<MediaEntry>,
}

/// One collected message.
#[derive(Debug, Clone, PartialEq)]
pub struct BatchItem {
    /// Submission order within the session.
    pub sequence: usize,
    pub origin: ItemOrigin,
    pub source_message_id: Option<i32>,
    pub pending: Option<PendingMessage>,
    pub copied_message_id: Option<i32>,
}

impl BatchItem {
    /// The channel message this item ended up as, if any.
    pub fn resolved_id(&self) -> Option<i32> {
        match self.origin {
            ItemOrigin::DbReference => self.source_message_id,
            ItemOrigin::CopyNeeded => self.copied_message_id,
        }
    }
}

/// First and last resolved message IDs, in submission order.
pub fn range_anchors(items: &[BatchItem]) -> Option<(i32, i32)> {
    let mut resolved = items.iter().filter_map(BatchItem::resolved_id);
    let first = resolved.next()?;
    let last = resolved.last().unwrap_or(first);
    Some((first, last))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn item(sequence: usize, origin: ItemOrigin, source: Option<i32>, copied: Option<i32>) -> BatchItem {
        BatchItem {
            sequence,
            origin,
            source_message_id: source,
            pending: None,
            copied_message_id: copied,
        }
    }

    #[test]
    fn test_anchors_are_first_and_last_resolved_not_min_max() {
        let items = vec![
            item(0, ItemOrigin::CopyNeeded, None, None),
            item(1, ItemOrigin::DbReference, Some(50), None),
            item(2, ItemOrigin::CopyNeeded, None, Some(90)),
            item(3, ItemOrigin::DbReference, Some(20), None),
            item(4, ItemOrigin::CopyNeeded, None, None),
        ];
        assert_eq!(range_anchors(&items), Some((50, 20)));
    }

    #[test]
    fn test_single_resolved_item() {
        let items = vec![item(0, ItemOrigin::DbReference, Some(7), None)];
        assert_eq!(range_anchors(&items), Some((7, 7)));
    }

    #[test]
    fn test_nothing_resolved() {
        let items = vec![item(0, ItemOrigin::CopyNeeded, None, None)];
        assert_eq!(range_anchors(&items), None);
    }
}
