//! Repositories - one per collection.

mod channel_repository;
mod media_repository;
mod settings_repository;

pub use channel_repository::ChannelRepository;
pub use media_repository::MediaRepository;
pub use settings_repository::SettingsRepository;
