//! Scripted [`MessageOps`] for tests.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId};

use super::{CopyOptions, MessageOps, OpsError};

/// Offset added to a source message ID to form its copy's ID.
pub const COPY_ID_OFFSET: i32 = 1000;

#[derive(Default)]
pub struct FakeOps {
    copy_failures: Mutex<HashMap<i32, VecDeque<OpsError>>>,
    copy_delays: Mutex<HashMap<i32, Duration>>,
    edit_failures: Mutex<HashMap<i32, VecDeque<OpsError>>>,
    remove_failures: Mutex<HashMap<i32, OpsError>>,
    pub copies: Mutex<Vec<(ChatId, MessageId, CopyOptions)>>,
    pub completed: Mutex<Vec<i32>>,
    pub removed: Mutex<Vec<(ChatId, MessageId)>>,
    pub edited: Mutex<Vec<MessageId>>,
    pub sent: Mutex<Vec<(ChatId, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeOps {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail copies of `source` with these errors, in order, before succeeding.
    pub fn fail_copy(&self, source: i32, errors: Vec<OpsError>) {
        self.copy_failures.lock().insert(source, errors.into());
    }

    pub fn delay_copy(&self, source: i32, delay: Duration) {
        self.copy_delays.lock().insert(source, delay);
    }

    pub fn fail_edit(&self, message_id: i32, errors: Vec<OpsError>) {
        self.edit_failures.lock().insert(message_id, errors.into());
    }

    pub fn fail_remove(&self, message_id: i32, error: OpsError) {
        self.remove_failures.lock().insert(message_id, error);
    }

    pub fn copy_attempts(&self) -> usize {
        self.copies.lock().len()
    }

    /// Highest number of copies that were running at the same time.
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl MessageOps for FakeOps {
    async fn copy(
        &self,
        to: ChatId,
        _from: ChatId,
        message_id: MessageId,
        options: &CopyOptions,
    ) -> Result<MessageId, OpsError> {
        self.copies.lock().push((to, message_id, options.clone()));

        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        let delay = self.copy_delays.lock().get(&message_id.0).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);

        let failure = self
            .copy_failures
            .lock()
            .get_mut(&message_id.0)
            .and_then(|q| q.pop_front());
        if let Some(err) = failure {
            return Err(err);
        }

        self.completed.lock().push(message_id.0);
        Ok(MessageId(message_id.0 + COPY_ID_OFFSET))
    }

    async fn remove(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), OpsError> {
        self.removed.lock().push((chat_id, message_id));
        match self.remove_failures.lock().get(&message_id.0) {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    async fn edit_markup(
        &self,
        _chat_id: ChatId,
        message_id: MessageId,
        _markup: InlineKeyboardMarkup,
    ) -> Result<(), OpsError> {
        let failure = self
            .edit_failures
            .lock()
            .get_mut(&message_id.0)
            .and_then(|q| q.pop_front());
        if let Some(err) = failure {
            return Err(err);
        }
        self.edited.lock().push(message_id);
        Ok(())
    }

    async fn send_html(&self, chat_id: ChatId, text: &str) -> Result<MessageId, OpsError> {
        let mut sent = self.sent.lock();
        sent.push((chat_id, text.to_string()));
        Ok(MessageId(sent.len() as i32))
    }
}
