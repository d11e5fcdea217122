//! Profile caching.
//!
//! ## Architecture
//!
//! - **Local (moka)**: Bounded, in-memory, per-instance, used when Redis is off or
//!   unreachable at start-up
//! - **Redis**: Shared across instances
//!
//! The cache is disposable: the user store stays the source of truth, and
//! every cache failure degrades to a store read.

pub mod backend;
pub mod profile;

pub use backend::{CacheBackend, CacheError, CacheStats, CachedEntry};
pub use profile::{PROFILE_KEY_PREFIX, ProfileCache, profile_key};
