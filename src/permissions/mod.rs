//! Who may run what.
//!
//! - [`Scope`] predicates gate every command in the router table
//! - [`Permissions`] answers admin checks and forced-subscription membership,
//!   with membership lookups cached briefly to spare the API

mod checker;
mod scope;

pub use checker::Permissions;
pub use scope::{Denied, Scope, ScopeContext};
