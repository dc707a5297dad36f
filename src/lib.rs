//! Partition-aware scatter-gather for time-sharded document databases
//!
//! A [`ScatterClient`] applies one document-store operation (view query,
//! bulk insert, fetch-and-delete) across every shard a partitioner resolves
//! for a key/time range, and merges the per-shard rows into one ordered,
//! paginated result.
//!
//! - Partitions are walked in order; a `limit` stops the walk early
//! - Shards inside one partition run concurrently and are sort-merged by id
//! - Shard handles are pooled per (URI, access mode) for the client's lifetime
//! - Conflict and not-found failures are flagged `noretry`/`nobreaker`

pub mod config;
pub mod error;
pub mod memory;
pub mod metrics;
pub mod options;
pub mod partition;
pub mod scatter;
pub mod shard;

pub use error::{normalize, ScatterError, StoreError};
pub use options::{Document, Mode, OpOptions, Row};
pub use partition::{mask_uri, IdKeys, KeyExtractor, Partition, Partitioner, TimeRange};
pub use scatter::ScatterClient;
pub use shard::{ConnectOptions, Connector, ShardStore};
