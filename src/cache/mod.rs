//! # Feature Cache
//!
//! Time-boxed, two-tier memoization of extraction results keyed by image identity.
//!
//! - [`key`]: deterministic key derivation
//! - [`memory`]: LRU memory tier under one read-write lock
//! - [`disk`]: JSON spill files with per-file locking
//! - [`sweeper`]: periodic expiry on a background thread
//! - [`writer`]: ordered disk writes on one background thread
//! - [`stats`]: counters and derived ratios
//! - [`clock`]: injectable time source

pub mod clock;
pub mod disk;
pub mod feature_cache;
pub mod key;
pub mod memory;
pub mod stats;
pub mod sweeper;
pub mod writer;

pub use clock::{Clock, ManualClock, SystemClock};
pub use feature_cache::{FeatureCache, SweepReport};
pub use key::{pixel_digest, CacheKey};
pub use stats::CacheStats;
