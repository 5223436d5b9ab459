//! Caching built on Moka.
//!
//! - `CacheRegistry` hands out named caches so repositories can share them
//! - `TypedCache` is the typed handle each repository keeps
//! - `CacheConfig` sets capacity and expiry

mod config;
mod registry;
mod typed;

pub use config::CacheConfig;
pub use registry::CacheRegistry;
pub use typed::TypedCache;
