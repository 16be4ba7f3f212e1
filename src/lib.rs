//! Stateful Bloom filters for per-flow state tracking.
//!
//! This crate provides memory-bounded structures that remember the current
//! protocol state of a large number of flows without storing the flow keys.
//! Answers are approximate: a lookup may miss, report a wrong flow as
//! present, or admit that it cannot tell (`Lookup::DontKnow`).
//!
//! Filters:
//!    * `DirectStateFilter`: 3-bit cells (timer + 2-bit counter) addressed by
//!      hashing the `(flow, state)` pair. Lookups check every state seen so
//!      far.
//!    * `StatefulCellFilter`: reference-counted cells addressed by the flow
//!      alone, holding the state itself or a sticky `DontKnow` marker.
//!    * `FingerprintCompressedFilter`: `h` subtables of small buckets holding
//!      `(touched, fingerprint, state)` entries; inserts go to the least
//!      loaded candidate bucket.
//!
//! Expiration:
//!     * No timestamps are stored. Every entry carries a single touched bit.
//!     * An operation budget counts down on every call; when it runs out, a
//!       sweep drops untouched entries and clears the bit on the others.
//!     * Any insert, modify or lookup of a flow sets the bit again, so active
//!       flows live on and idle ones vanish after at most two windows.
//!
//! Concurrency:
//!     * Filters are plain single-owner values (`&mut self` for every call,
//!       lookups included). Wrap one in a lock, or use `ShardedFilter` to
//!       split flows across independently locked instances.
pub mod aging;
pub mod direct;
mod error;
pub mod fcf;
mod filter;
mod hash;
pub mod sharded;
pub mod stateful;

pub use aging::{AgingClock, SweepMode};
pub use direct::{
    CounterMode, DirectFilterConfig, DirectFilterConfigBuilder,
    DirectStateFilter,
};
pub use error::{FilterError, Result};
pub use fcf::{
    BucketEntry, FcfConfig, FcfConfigBuilder, FingerprintCompressedFilter,
    OverflowPolicy, Placement,
};
pub use filter::{FilterStats, Lookup, StatefulFilter};
pub use hash::{HashFamily, optimal_num_cells, optimal_num_hashes};
pub use sharded::ShardedFilter;
pub use stateful::{
    Cell, CellState, StatefulCellFilter, StatefulFilterConfig,
    StatefulFilterConfigBuilder,
};
