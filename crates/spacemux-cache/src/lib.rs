//! Read-through entity cache for Spacemux.
//!
//! Sits above the session layer and turns "look up user `u1`" into at most
//! one in-flight request per key, however many callers ask at once. Values
//! are reused for a freshness window and refetched after it.
//!
//! The cache is agnostic to what it stores: a [`Fetcher`] decides how a key
//! is loaded. The `spacemux` facade supplies one backed by
//! `request("space", ["find-user", id])`.

mod cache;
mod config;

pub use cache::{EntityCache, Fetcher, Lookup, PendingLookup};
pub use config::CacheConfig;
