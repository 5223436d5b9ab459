//! Database module exports.

mod models;
mod mongo;
mod repository;
mod users;

pub use models::*;
pub use mongo::Database;
pub use repository::{ChannelRepository, MediaRepository, SettingsRepository};
pub use users::UserRepo;
