//! Shard handle management
//!
//! Store seams plus the per-client connection pool.

mod pool;
mod store;

pub use pool::{ConnectionPool, PoolKey, ShardHandle};
pub use store::{ConnectOptions, Connector, ShardStore};
