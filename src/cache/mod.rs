// Cache - Content-addressed store of derived files with size-budget eviction

pub mod eviction;
pub mod store;

pub use eviction::{EvictionPolicy, EvictionReport};
pub use store::{CacheStore, KeyGuard};
