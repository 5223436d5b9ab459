//! Event handlers for non-command updates.
//!
//! Posts in the canonical channel are indexed as they arrive so deliveries
//! can rewrite captions and `/search` has something to rank.

use teloxide::dispatching::UpdateHandler;
use teloxide::prelude::*;
use tracing::{debug, error};

use crate::bot::dispatcher::AppState;
use crate::database::{MediaEntry, MediaKind};

/// Index new and edited posts of the canonical channel.
pub fn channel_post_handler() -> UpdateHandler<anyhow::Error> {
    dptree::filter(|msg: Message, state: AppState| msg.chat.id.0 == state.config.db_channel_id)
        .endpoint(index_channel_post)
}

async fn index_channel_post(msg: Message, state: AppState) -> anyhow::Result<()> {
    let Some(entry) = indexable(&msg) else {
        debug!("Skipping channel service message {}", msg.id);
        return Ok(());
    };

    if let Err(e) = state.media.upsert(&entry).await {
        error!("Failed to index channel message {}: {}", msg.id, e);
    }
    Ok(())
}

/// Index entry for a post, or `None` for service messages.
fn indexable(msg: &Message) -> Option<MediaEntry> {
    let entry = MediaEntry::from_message(msg, msg.id.0);
    (entry.kind != MediaKind::Text || entry.caption.is_some()).then_some(entry)
}
