//! Scatter-gather over partitioned shards
//!
//! `client` exposes the public operations, `executor` drives the fan-out and
//! `merge` orders rows from overlapping shards.

mod client;
mod executor;
pub mod merge;

pub use client::ScatterClient;
pub use merge::{merge, Merged};
