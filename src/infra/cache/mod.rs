//! Cache adapters behind [`CacheStore`](crate::application::cache::CacheStore).
//!
//! - [`RedisCache`]: shared Redis instance, the production backend.
//! - [`MemoryCache`]: per-process map with the same TTL semantics, used when
//!   no Redis is deployed and in tests.

mod memory;
mod redis_backend;

pub use self::memory::MemoryCache;
pub use self::redis_backend::RedisCache;
