//! Telegram transport seam.

mod error;
mod ops;
mod retry;

#[cfg(test)]
pub mod fake;

pub use error::OpsError;
pub use ops::{CaptionOverride, CopyOptions, MessageOps};
pub use retry::{BackoffPolicy, SendRetry};
