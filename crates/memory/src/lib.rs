//! Session memory for Kindred.
//!
//! A bounded, per-(companion, user) rolling window of recent turns, stored as
//! an opaque JSON blob in a TTL cache. The persisted message log is the
//! authoritative history; session memory only exists to give the generator
//! short-term context without re-reading the full log each turn — so loads
//! fail open and saves are best-effort.

pub mod in_memory;
pub mod redis_cache;
pub mod session;

pub use in_memory::InMemoryCache;
pub use redis_cache::RedisCache;
pub use session::SessionMemory;
