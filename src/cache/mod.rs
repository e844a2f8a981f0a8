//! Caching subsystem.
//!
//! - [`key`] derives the [`CacheDigest`] of a
//!   [`RequestDescriptor`](crate::RequestDescriptor): SHA-256 over every
//!   field that changes the response.
//!
//! - [`response::ResponseCache`] persists one completion per digest as a
//!   JSON file, with an optional in-memory front. Write-once, no eviction.

pub mod key;
pub mod response;

pub use key::{CacheDigest, key_for, key_for_route};
pub use response::{CacheConfig, CacheEntry, DEFAULT_CACHE_DIR, ResponseCache};
