//! In-memory object cache
//!
//! A fixed array of slots, each behind its own reader/writer admission, shared
//! by every connection. See [`store`] for the eviction policy and [`slot`] for
//! the locking protocol.

pub mod slot;
pub mod stats;
pub mod store;

pub use slot::{SlotLock, SlotReadGuard, SlotWriteGuard};
pub use stats::CacheStats;
pub use store::{ObjectCache, SlotSnapshot, RANK_SENTINEL};
