//! Message operations used by the core.
//!
//! Everything the batch copier and the delivery tracker do to Telegram goes
//! through [`MessageOps`], so both can run against a scripted fake in tests.

use async_trait::async_trait;
use teloxide::prelude::*;
use teloxide::types::{ChatId, InlineKeyboardMarkup, MessageId, ParseMode};
use teloxide::{ApiError, RequestError};

use super::OpsError;
use crate::bot::dispatcher::ThrottledBot;

/// What to do with the caption of a copied message.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum CaptionOverride {
    /// Keep the source caption untouched.
    #[default]
    Keep,
    /// Replace with this HTML caption.
    Set(String),
    /// Drop the caption.
    Clear,
}

/// Options for a single copy.
#[derive(Debug, Clone, Default)]
pub struct CopyOptions {
    pub caption: CaptionOverride,
    pub protect_content: bool,
    pub reply_markup: Option<InlineKeyboardMarkup>,
}

/// Send/copy/delete capability set.
#[async_trait]
pub trait MessageOps: Send + Sync {
    /// Copy `message_id` from `from` into `to`, returning the new message ID.
    async fn copy(
        &self,
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
        options: &CopyOptions,
    ) -> Result<MessageId, OpsError>;

    async fn remove(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), OpsError>;

    /// Replace the inline keyboard of a message.
    async fn edit_markup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        markup: InlineKeyboardMarkup,
    ) -> Result<(), OpsError>;

    async fn send_html(&self, chat_id: ChatId, text: &str) -> Result<MessageId, OpsError>;
}

#[async_trait]
impl MessageOps for ThrottledBot {
    async fn copy(
        &self,
        to: ChatId,
        from: ChatId,
        message_id: MessageId,
        options: &CopyOptions,
    ) -> Result<MessageId, OpsError> {
        let mut request = self
            .copy_message(to, from, message_id)
            .protect_content(options.protect_content);

        match &options.caption {
            CaptionOverride::Keep => {}
            CaptionOverride::Set(text) => {
                request = request.caption(text.clone()).parse_mode(ParseMode::Html);
            }
            CaptionOverride::Clear => request = request.caption(String::new()),
        }

        if let Some(markup) = &options.reply_markup {
            request = request.reply_markup(markup.clone());
        }

        Ok(request.await?)
    }

    async fn remove(&self, chat_id: ChatId, message_id: MessageId) -> Result<(), OpsError> {
        self.delete_message(chat_id, message_id).await?;
        Ok(())
    }

    async fn edit_markup(
        &self,
        chat_id: ChatId,
        message_id: MessageId,
        markup: InlineKeyboardMarkup,
    ) -> Result<(), OpsError> {
        match self
            .edit_message_reply_markup(chat_id, message_id)
            .reply_markup(markup)
            .await
        {
            Ok(_) | Err(RequestError::Api(ApiError::MessageNotModified)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    async fn send_html(&self, chat_id: ChatId, text: &str) -> Result<MessageId, OpsError> {
        let msg = self
            .send_message(chat_id, text)
            .parse_mode(ParseMode::Html)
            .await?;
        Ok(msg.id)
    }
}
