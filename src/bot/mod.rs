//! Bot module - Core bot functionality.

pub mod dispatcher;
mod health;
mod runtime;
mod webhook;

pub use dispatcher::{AppState, ThrottledBot, build_dispatcher};
pub use health::serve_health;
pub use runtime::run;
