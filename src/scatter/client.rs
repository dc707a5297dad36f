//! Scatter client
//!
//! Binds the store operations to the fan-out executor. One client owns one
//! connection pool; handles live as long as the client does.

use crate::error::{ScatterError, StoreError};
use crate::metrics::ScatterMetrics;
use crate::options::{Document, Mode, OpOptions, Row};
use crate::partition::{IdKeys, KeyExtractor, Partitioner, UriFn};
use crate::scatter::executor::FanOut;
use crate::shard::{ConnectionPool, Connector, ShardStore};

use std::sync::Arc;

/// Treats a family of partitioned databases as one logical collection
pub struct ScatterClient<P: Partitioner, C: Connector> {
    partitioner: P,
    uri: UriFn<P::Descriptor>,
    keys: Arc<dyn KeyExtractor>,
    pool: ConnectionPool<C>,
    metrics: ScatterMetrics,
}

impl<P: Partitioner, C: Connector> ScatterClient<P, C> {
    /// Create a client using the `k/<key>/t/<time>` id convention
    pub fn new<U>(partitioner: P, uri: U, connector: C) -> Self
    where
        U: Fn(&P::Descriptor) -> String + Send + Sync + 'static,
    {
        let metrics = ScatterMetrics::new();
        Self {
            partitioner,
            uri: Arc::new(uri),
            keys: Arc::new(IdKeys),
            pool: ConnectionPool::new(connector, metrics),
            metrics,
        }
    }

    /// Replace the routing key/time extractor
    pub fn with_keys(mut self, keys: impl KeyExtractor + 'static) -> Self {
        self.keys = Arc::new(keys);
        self
    }

    pub fn pool(&self) -> &ConnectionPool<C> {
        &self.pool
    }

    fn fan_out(&self) -> FanOut<'_, P, C> {
        FanOut {
            partitioner: &self.partitioner,
            uri: &self.uri,
            keys: self.keys.as_ref(),
            pool: &self.pool,
            metrics: self.metrics,
        }
    }

    /// Run the named view on every shard in range and merge the rows
    pub async fn query(&self, view: &str, options: &OpOptions) -> Result<Vec<Row>, ScatterError> {
        self.fan_out()
            .execute("query", Mode::Read, options, |db, opts| async move {
                db.query(view, &opts).await
            })
            .await
    }

    /// Bulk insert `docs` into every shard in range
    pub async fn range_add(
        &self,
        docs: &[Document],
        options: &OpOptions,
    ) -> Result<Vec<Row>, ScatterError> {
        self.fan_out()
            .execute("range_add", Mode::Write, options, |db, opts| async move {
                db.bulk_docs(docs, &opts).await
            })
            .await
    }

    /// Delete the current revision of document `id` from every shard in range
    ///
    /// A failed fetch on any shard aborts without issuing that delete.
    pub async fn range_remove(
        &self,
        id: &str,
        options: &OpOptions,
    ) -> Result<Vec<Row>, ScatterError> {
        self.fan_out()
            .execute("range_remove", Mode::Write, options, |db, _| async move {
                let doc = db.get(id).await?;
                let row = db.remove(&doc).await?;
                Ok::<_, StoreError>(vec![row])
            })
            .await
    }
}
