//! Fan-out executor
//!
//! Resolves partitions, acquires their handles, then folds the bound
//! operation's results left to right. Shards inside one partition run
//! concurrently; partitions run strictly in order so the limit can stop the
//! scatter before later partitions are contacted.

use crate::error::{normalize, ScatterError, StoreError};
use crate::metrics::ScatterMetrics;
use crate::options::{Mode, OpOptions, Row};
use crate::partition::{KeyExtractor, Partition, Partitioner, TimeRange, UriFn};
use crate::scatter::merge::merge;
use crate::shard::{ConnectionPool, Connector, ShardHandle};

use futures::future::{join_all, try_join_all};
use std::future::Future;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info};

/// Borrowed view of everything one scatter call needs
pub(crate) struct FanOut<'a, P: Partitioner, C: Connector> {
    pub partitioner: &'a P,
    pub uri: &'a UriFn<P::Descriptor>,
    pub keys: &'a dyn KeyExtractor,
    pub pool: &'a ConnectionPool<C>,
    pub metrics: ScatterMetrics,
}

impl<P: Partitioner, C: Connector> FanOut<'_, P, C> {
    /// Bucket key shared by both ends of the range, if any
    fn routing_key(&self, options: &OpOptions) -> Option<String> {
        let start = self.keys.key(options.startkey.as_deref()?)?;
        let end = self.keys.key(options.endkey.as_deref()?)?;
        (start == end).then_some(start)
    }

    fn time_range(&self, options: &OpOptions) -> TimeRange {
        let time = |k: &Option<String>| k.as_deref().and_then(|id| self.keys.time(id));
        TimeRange::new(time(&options.startkey), time(&options.endkey))
    }

    async fn acquire(
        &self,
        partition: &Partition<P::Descriptor>,
        mode: Mode,
    ) -> Vec<ShardHandle<C::Handle>> {
        join_all(
            partition
                .iter()
                .map(|descriptor| self.pool.acquire(&**self.uri, descriptor, mode)),
        )
        .await
    }

    async fn run_shard<F, Fut>(
        &self,
        label: &'static str,
        shard: &ShardHandle<C::Handle>,
        options: OpOptions,
        op: &F,
    ) -> Result<Vec<Row>, ScatterError>
    where
        F: Fn(Arc<C::Handle>, OpOptions) -> Fut,
        Fut: Future<Output = Result<Vec<Row>, StoreError>>,
    {
        let handle = Arc::clone(shard.ready()?);
        debug!(
            op = label,
            uri = shard.uri(),
            limit = ?options.limit,
            skip = options.skip,
            "Running operation on shard"
        );

        let start = Instant::now();
        let result = op(handle, options).await;
        self.metrics.record_shard_op(label, start.elapsed(), result.is_ok());

        result.map_err(|source| ScatterError::ShardOperation {
            uri: shard.uri().to_string(),
            source: normalize(source),
        })
    }

    /// Apply `op` to every shard covering the options' key/time range and
    /// merge the results.
    ///
    /// The first failing shard aborts the whole call; rows collected from
    /// earlier partitions are discarded.
    pub async fn execute<F, Fut>(
        &self,
        label: &'static str,
        mode: Mode,
        options: &OpOptions,
        op: F,
    ) -> Result<Vec<Row>, ScatterError>
    where
        F: Fn(Arc<C::Handle>, OpOptions) -> Fut,
        Fut: Future<Output = Result<Vec<Row>, StoreError>>,
    {
        self.metrics.record_call(label, mode);
        let result = self.scatter(label, mode, options, op).await;
        if let Err(ref e) = result {
            self.metrics.record_error(e.error_type_label());
        }
        result
    }

    async fn scatter<F, Fut>(
        &self,
        label: &'static str,
        mode: Mode,
        options: &OpOptions,
        op: F,
    ) -> Result<Vec<Row>, ScatterError>
    where
        F: Fn(Arc<C::Handle>, OpOptions) -> Fut,
        Fut: Future<Output = Result<Vec<Row>, StoreError>>,
    {
        let key = self.routing_key(options);
        let range = self.time_range(options);
        let partitions = self
            .partitioner
            .partition(key.as_deref(), range, mode)
            .await
            .map_err(|source| ScatterError::PartitionResolution { mode, source })?;

        debug!(
            op = label,
            %mode,
            key = ?key,
            ?range,
            partitions = partitions.len(),
            "Resolved partitions"
        );

        let handles = join_all(partitions.iter().map(|p| self.acquire(p, mode))).await;
        let total = handles.len();

        // A zero limit means unbounded
        let limit = options.limit.filter(|&limit| limit > 0);

        let mut accum: Vec<Row> = Vec::new();
        for (index, (partition, shards)) in partitions.iter().zip(&handles).enumerate() {
            let remaining = match limit {
                Some(limit) if accum.len() >= limit => {
                    let skipped = total - index;
                    debug!(
                        op = label,
                        limit,
                        skipped,
                        "Limit reached, skipping remaining partitions"
                    );
                    self.metrics.record_partitions_skipped(label, skipped);
                    break;
                }
                Some(limit) => Some(limit - accum.len()),
                None => None,
            };
            // Offset only applies to the first partition contacted
            let skip = if index == 0 { options.skip } else { 0 };

            match partition {
                Partition::Single(_) => {
                    let shard_options = options.for_shard(remaining, skip);
                    let rows = self.run_shard(label, &shards[0], shard_options, &op).await?;
                    accum.extend(rows);
                }
                Partition::Set(_) => {
                    // Members over-fetch by the caller's offset so the merge can trim it
                    let fetch = remaining.map(|r| r + options.skip);
                    let shard_options = options.for_shard(fetch, 0);
                    let row_sets = try_join_all(
                        shards
                            .iter()
                            .map(|shard| self.run_shard(label, shard, shard_options.clone(), &op)),
                    )
                    .await?;
                    let merged = merge(row_sets, options.descending, skip, remaining);
                    if merged.degraded {
                        self.metrics.record_merge_degraded();
                    }
                    accum.extend(merged.rows);
                }
            }
        }

        if let Some(limit) = limit {
            accum.truncate(limit);
        }

        info!(op = label, %mode, partitions = total, rows = accum.len(), "Scatter complete");
        Ok(accum)
    }
}
