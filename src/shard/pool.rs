//! Connection pool
//!
//! Memoizes one handle per (shard URI, access mode) for the lifetime of a
//! scatter client. Each key owns a `OnceCell`; concurrent acquirers of the
//! same key await a single construction instead of racing the connector.

use crate::error::{normalize, ScatterError, StoreError};
use crate::metrics::ScatterMetrics;
use crate::options::Mode;
use crate::partition::mask_uri;
use crate::shard::store::{ConnectOptions, Connector};

use dashmap::DashMap;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tracing::{debug, warn};

/// Pool slot key
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub uri: String,
    pub mode: Mode,
}

impl PoolKey {
    pub fn new(uri: impl Into<String>, mode: Mode) -> Self {
        Self {
            uri: uri.into(),
            mode,
        }
    }
}

/// Result of acquiring a shard
///
/// A failed construction does not abort the acquisition of other shards; it
/// yields a `Degraded` handle that reports the failure once it is used.
/// `uri` is the masked form, safe to log.
#[derive(Debug)]
pub enum ShardHandle<H> {
    Ready { uri: String, handle: Arc<H> },
    Degraded { uri: String, error: StoreError },
}

impl<H> ShardHandle<H> {
    pub fn uri(&self) -> &str {
        match self {
            ShardHandle::Ready { uri, .. } | ShardHandle::Degraded { uri, .. } => uri,
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self, ShardHandle::Degraded { .. })
    }

    /// The live handle, or the construction failure
    pub fn ready(&self) -> Result<&Arc<H>, ScatterError> {
        match self {
            ShardHandle::Ready { handle, .. } => Ok(handle),
            ShardHandle::Degraded { uri, error } => Err(ScatterError::ShardConstruction {
                uri: uri.clone(),
                source: normalize(error.clone()),
            }),
        }
    }
}

impl<H> Clone for ShardHandle<H> {
    fn clone(&self) -> Self {
        match self {
            ShardHandle::Ready { uri, handle } => ShardHandle::Ready {
                uri: uri.clone(),
                handle: Arc::clone(handle),
            },
            ShardHandle::Degraded { uri, error } => ShardHandle::Degraded {
                uri: uri.clone(),
                error: error.clone(),
            },
        }
    }
}

type Slot<H> = Arc<OnceCell<Arc<H>>>;

/// Per-client pool of shard handles
pub struct ConnectionPool<C: Connector> {
    connector: C,
    slots: DashMap<PoolKey, Slot<C::Handle>>,
    metrics: ScatterMetrics,
}

impl<C: Connector> ConnectionPool<C> {
    pub fn new(connector: C, metrics: ScatterMetrics) -> Self {
        Self {
            connector,
            slots: DashMap::new(),
            metrics,
        }
    }

    pub fn connector(&self) -> &C {
        &self.connector
    }

    /// Number of constructed handles (a promoted write handle counts twice)
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|slot| slot.initialized()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a handle is memoized for the key
    pub fn contains(&self, key: &PoolKey) -> bool {
        self.slots.get(key).is_some_and(|slot| slot.initialized())
    }

    fn slot(&self, key: PoolKey) -> Slot<C::Handle> {
        self.slots
            .entry(key)
            .or_insert_with(|| Arc::new(OnceCell::new()))
            .clone()
    }

    /// Return the memoized handle for the descriptor's shard, or construct one.
    ///
    /// Read mode opens with `skip_setup` so a missing shard is never created
    /// by a read. A successful write-mode construction also fills the read
    /// slot for the same URI when that slot is still free.
    pub async fn acquire<D>(
        &self,
        uri_fn: &(dyn Fn(&D) -> String + Send + Sync),
        descriptor: &D,
        mode: Mode,
    ) -> ShardHandle<C::Handle> {
        let uri = uri_fn(descriptor);
        let masked = mask_uri(&uri);
        debug!(uri = %masked, %mode, "Using shard");

        let slot = self.slot(PoolKey::new(uri.as_str(), mode));
        let constructed = slot
            .get_or_try_init(|| async {
                debug!(uri = %masked, %mode, "Constructing shard handle");
                let options = ConnectOptions {
                    skip_setup: mode == Mode::Read,
                };
                let result = self.connector.connect(&uri, options).await;
                self.metrics.record_construction(mode, result.is_ok());
                result
            })
            .await;

        match constructed {
            Ok(handle) => {
                let handle = Arc::clone(handle);
                if mode == Mode::Write {
                    let read = self.slot(PoolKey::new(uri.as_str(), Mode::Read));
                    if read.set(Arc::clone(&handle)).is_ok() {
                        debug!(uri = %masked, "Promoted write handle to read slot");
                    }
                }
                ShardHandle::Ready {
                    uri: masked,
                    handle,
                }
            }
            Err(error) => {
                warn!(uri = %masked, %mode, error = %error, "Shard handle construction failed");
                ShardHandle::Degraded { uri: masked, error }
            }
        }
    }
}
