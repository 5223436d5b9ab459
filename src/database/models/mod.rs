//! Database models.

pub mod channel;
pub mod media;
pub mod settings;
pub mod user;

pub use channel::ForceSubChannel;
pub use media::{MediaEntry, MediaKind};
pub use settings::{
    BotSettings, CaptionSettings, GlobalCaption, RecopyPolicy, ReplaceAllLink, ReplacePair,
    SETTINGS_ID,
};
pub use user::StoredUser;
