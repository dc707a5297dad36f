//! Partition resolution seam
//!
//! The partitioner maps a routing key and time range to an ordered list of
//! partitions. Each partition is either one shard or a set of shards that
//! cover the same logical bucket (replicas or overlapping periods).

mod keys;

pub use keys::{IdKeys, KeyExtractor};

use crate::error::BoxError;
use crate::options::Mode;
use async_trait::async_trait;
use std::sync::Arc;
use url::Url;

/// Derives a connection URI from a shard descriptor
pub type UriFn<D> = Arc<dyn Fn(&D) -> String + Send + Sync>;

/// Strip `user:password@` credentials from a shard URI.
///
/// Every URI that reaches a log line or an error message goes through here.
/// URIs without credentials come back unchanged.
pub fn mask_uri(uri: &str) -> String {
    match Url::parse(uri) {
        Ok(mut url) if !url.username().is_empty() || url.password().is_some() => {
            match url.set_username("").and(url.set_password(None)) {
                Ok(()) => url.into(),
                Err(()) => strip_userinfo(uri),
            }
        }
        Ok(_) => uri.to_string(),
        Err(_) => strip_userinfo(uri),
    }
}

/// Fallback for strings the URL parser rejects
fn strip_userinfo(uri: &str) -> String {
    let Some(authority) = uri.find("://").map(|i| i + 3) else {
        return uri.to_string();
    };
    let end = uri[authority..]
        .find(['/', '?', '#'])
        .map_or(uri.len(), |i| authority + i);
    match uri[authority..end].rfind('@') {
        Some(at) => format!("{}{}", &uri[..authority], &uri[authority + at + 1..]),
        None => uri.to_string(),
    }
}

/// Inclusive time bounds in epoch milliseconds; `None` is open-ended
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeRange {
    pub start: Option<i64>,
    pub end: Option<i64>,
}

impl TimeRange {
    pub fn new(start: Option<i64>, end: Option<i64>) -> Self {
        Self { start, end }
    }
}

/// One resolved partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Partition<D> {
    Single(D),
    Set(Vec<D>),
}

impl<D> Partition<D> {
    /// Number of shards behind this partition
    pub fn len(&self) -> usize {
        match self {
            Partition::Single(_) => 1,
            Partition::Set(shards) => shards.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn iter(&self) -> impl Iterator<Item = &D> {
        let shards: &[D] = match self {
            Partition::Single(d) => std::slice::from_ref(d),
            Partition::Set(shards) => shards,
        };
        shards.iter()
    }
}

/// Resolves a key and time range to partitions
///
/// Implementations must return partitions in a stable order for the mode;
/// the fan-out walks them left to right and stops once a limit is met.
#[async_trait]
pub trait Partitioner: Send + Sync {
    type Descriptor: Send + Sync;

    /// `key` is `None` when the range spans several buckets
    async fn partition(
        &self,
        key: Option<&str>,
        range: TimeRange,
        mode: Mode,
    ) -> Result<Vec<Partition<Self::Descriptor>>, BoxError>;
}
