//! Interactive collection sessions.
//!
//! A session collects items until the admin stops or cancels it, or it
//! sits idle past the timeout. A timeout with items already collected
//! proceeds exactly like `/stop`; a timeout with nothing collected is a
//! cancellation.

use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::mpsc;

use super::{BatchItem, ItemOrigin, PendingMessage};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Collecting,
    Stopped,
    Cancelled,
    TimedOut,
}

/// What a finished session hands to the copier.
#[derive(Debug, PartialEq)]
pub enum SessionOutcome {
    Proceed(Vec<BatchItem>),
    Abort(SessionState),
}

#[derive(Debug)]
pub struct BatchSession {
    state: SessionState,
    items: Vec<BatchItem>,
    limit: Option<usize>,
}

impl Default for BatchSession {
    fn default() -> Self {
        Self::new()
    }
}

impl BatchSession {
    pub fn new() -> Self {
        Self {
            state: SessionState::Collecting,
            items: Vec::new(),
            limit: None,
        }
    }

    /// Session that stops by itself after `limit` items.
    pub fn with_limit(limit: usize) -> Self {
        Self {
            limit: Some(limit),
            ..Self::new()
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn is_collecting(&self) -> bool {
        self.state == SessionState::Collecting
    }

    /// Record a message already in the channel. Returns its sequence number.
    pub fn push_reference(&mut self, message_id: i32) -> Option<usize> {
        self.push(ItemOrigin::DbReference, Some(message_id), None)
    }

    /// Record a message that must be copied into the channel first.
    pub fn push_copy(&mut self, pending: PendingMessage) -> Option<usize> {
        self.push(ItemOrigin::CopyNeeded, None, Some(pending))
    }

    fn push(
        &mut self,
        origin: ItemOrigin,
        source_message_id: Option<i32>,
        pending: Option<PendingMessage>,
    ) -> Option<usize> {
        if !self.is_collecting() {
            return None;
        }
        let sequence = self.items.len();
        self.items.push(BatchItem {
            sequence,
            origin,
            source_message_id,
            pending,
            copied_message_id: None,
        });
        if self.limit.is_some_and(|limit| self.items.len() >= limit) {
            self.state = SessionState::Stopped;
        }
        Some(sequence)
    }

    pub fn stop(&mut self) {
        self.transition(SessionState::Stopped);
    }

    pub fn cancel(&mut self) {
        self.transition(SessionState::Cancelled);
    }

    pub fn time_out(&mut self) {
        self.transition(SessionState::TimedOut);
    }

    fn transition(&mut self, to: SessionState) {
        if self.is_collecting() {
            self.state = to;
        }
    }

    pub fn finish(self) -> SessionOutcome {
        match self.state {
            SessionState::Stopped | SessionState::TimedOut if !self.items.is_empty() => {
                SessionOutcome::Proceed(self.items)
            }
            SessionState::Collecting => SessionOutcome::Abort(SessionState::Cancelled),
            SessionState::TimedOut => SessionOutcome::Abort(SessionState::TimedOut),
            other => SessionOutcome::Abort(other),
        }
    }
}

/// Routes incoming updates to the user's open session, if any.
pub struct SessionHub<T> {
    open: DashMap<u64, mpsc::Sender<T>>,
}

impl<T> Default for SessionHub<T> {
    fn default() -> Self {
        Self {
            open: DashMap::new(),
        }
    }
}

impl<T: Send + 'static> SessionHub<T> {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Open a session for `user_id`. `None` if one is already open.
    pub fn open(self: &Arc<Self>, user_id: u64) -> Option<SessionInbox<T>> {
        use dashmap::mapref::entry::Entry;

        let (tx, rx) = mpsc::channel(32);
        match self.open.entry(user_id) {
            Entry::Occupied(_) => None,
            Entry::Vacant(slot) => {
                slot.insert(tx);
                Some(SessionInbox {
                    hub: Arc::clone(self),
                    user_id,
                    rx,
                })
            }
        }
    }

    pub fn is_open(&self, user_id: u64) -> bool {
        self.open.contains_key(&user_id)
    }

    /// Hand `input` to the user's session. Returns it back if none is open.
    pub fn route(&self, user_id: u64, input: T) -> Result<(), T> {
        let Some(tx) = self.open.get(&user_id).map(|tx| tx.clone()) else {
            return Err(input);
        };
        tx.try_send(input).map_err(|e| match e {
            mpsc::error::TrySendError::Full(input) | mpsc::error::TrySendError::Closed(input) => input,
        })
    }
}

/// Receiving end of a session. Closes the session when dropped.
pub struct SessionInbox<T: Send + 'static> {
    hub: Arc<SessionHub<T>>,
    user_id: u64,
    rx: mpsc::Receiver<T>,
}

impl<T: Send + 'static> SessionInbox<T> {
    /// Next input, or `None` after `idle` without one.
    pub async fn next(&mut self, idle: std::time::Duration) -> Option<T> {
        tokio::time::timeout(idle, self.rx.recv()).await.ok().flatten()
    }
}

impl<T: Send + 'static> Drop for SessionInbox<T> {
    fn drop(&mut self) {
        self.hub.open.remove(&self.user_id);
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    fn pending(id: i32) -> PendingMessage {
        PendingMessage {
            chat_id: 1,
            message_id: id,
            entry: None,
        }
    }

    #[test]
    fn test_sequences_follow_submission_order() {
        let mut session = BatchSession::new();
        assert_eq!(session.push_reference(10), Some(0));
        assert_eq!(session.push_copy(pending(3)), Some(1));
        assert_eq!(session.push_reference(11), Some(2));
        session.stop();

        let SessionOutcome::Proceed(items) = session.finish() else {
            panic!("expected items");
        };
        let origins: Vec<ItemOrigin> = items.iter().map(|i| i.origin).collect();
        assert_eq!(
            origins,
            vec![ItemOrigin::DbReference, ItemOrigin::CopyNeeded, ItemOrigin::DbReference]
        );
    }

    #[test]
    fn test_cancel_discards_items() {
        let mut session = BatchSession::new();
        session.push_reference(1);
        session.cancel();
        assert_eq!(session.finish(), SessionOutcome::Abort(SessionState::Cancelled));
    }

    #[test]
    fn test_timeout_with_items_proceeds() {
        let mut session = BatchSession::new();
        session.push_reference(1);
        session.time_out();
        assert!(matches!(session.finish(), SessionOutcome::Proceed(items) if items.len() == 1));
    }

    #[test]
    fn test_timeout_without_items_aborts() {
        let mut session = BatchSession::new();
        session.time_out();
        assert_eq!(session.finish(), SessionOutcome::Abort(SessionState::TimedOut));
    }

    #[test]
    fn test_no_pushes_after_stop() {
        let mut session = BatchSession::new();
        session.stop();
        assert_eq!(session.push_reference(1), None);
        session.cancel();
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[test]
    fn test_limit_stops_session() {
        let mut session = BatchSession::with_limit(2);
        session.push_reference(1);
        assert!(session.is_collecting());
        session.push_reference(2);
        assert_eq!(session.state(), SessionState::Stopped);
    }

    #[tokio::test]
    async fn test_hub_routes_and_closes() {
        let hub: Arc<SessionHub<u32>> = SessionHub::new();
        assert_eq!(hub.route(7, 1), Err(1));

        let mut inbox = hub.open(7).unwrap();
        assert!(hub.open(7).is_none());
        assert_eq!(hub.route(7, 5), Ok(()));
        assert_eq!(inbox.next(Duration::from_secs(1)).await, Some(5));

        drop(inbox);
        assert!(!hub.is_open(7));
    }

    #[tokio::test(start_paused = true)]
    async fn test_inbox_idle_timeout() {
        let hub: Arc<SessionHub<u32>> = SessionHub::new();
        let mut inbox = hub.open(1).unwrap();
        assert_eq!(inbox.next(Duration::from_secs(120)).await, None);
    }
}
