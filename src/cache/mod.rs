//! In-memory fetch cache with retry and stale fallback.
//!
//! Reads are keyed by a plain string (e.g. `"dashboard-users"`). A fresh
//! entry is served without touching the network; a missing, expired or
//! force-refreshed entry triggers a fetch through the retry policy, and if
//! every attempt fails the last cached payload (even an expired one) is
//! served instead of the error.

mod layer;
mod storage;
pub mod traits;

pub use layer::CacheLayer;
pub use storage::MemoryStorage;
pub use traits::{CacheResult, FetchOptions};
