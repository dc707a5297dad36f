//! Shard Scatter demo
//!
//! Runs the scatter operations against an in-memory cluster partitioned by
//! key bucket and time period:
//! - seeds documents into their owning shards
//! - installs a design document across a time range
//! - queries a view across every bucket and period in range
//! - removes the design document again
//! - prints the results and the Prometheus metrics

use anyhow::Result;
use async_trait::async_trait;
use serde_json::{json, Value};
use shard_scatter::config::ScatterConfig;
use shard_scatter::error::BoxError;
use shard_scatter::memory::{MemoryCluster, MemoryConnector};
use shard_scatter::metrics::install_prometheus;
use shard_scatter::{Mode, OpOptions, Partition, Partitioner, ScatterClient, TimeRange};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tracing::{error, info};

const DESIGN_DOC_ID: &str = "_design/example";
const VIEW: &str = "example/by_title";
const RANGE_START: i64 = 1_400_000_000_000;
const RANGE_END: i64 = 1_410_000_000_000;

/// Shard descriptor: (key bucket, time period)
type Shard = (u32, i64);

/// Buckets keys by hash and time by fixed-width periods
struct BucketPeriodPartitioner {
    buckets: u32,
    period_ms: i64,
}

impl BucketPeriodPartitioner {
    fn bucket(&self, key: &str) -> u32 {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.buckets as u64) as u32
    }
}

#[async_trait]
impl Partitioner for BucketPeriodPartitioner {
    type Descriptor = Shard;

    async fn partition(
        &self,
        key: Option<&str>,
        range: TimeRange,
        mode: Mode,
    ) -> Result<Vec<Partition<Shard>>, BoxError> {
        let start = range.start.ok_or("time range must have a start")?;
        let end = range.end.unwrap_or(start);
        let (first, last) = (start / self.period_ms, end / self.period_ms);
        let (first, last) = (first.min(last), first.max(last));

        let buckets: Vec<u32> = match key {
            Some(key) => vec![self.bucket(key)],
            None => (0..self.buckets).collect(),
        };

        let partitions = (first..=last)
            .map(|period| match buckets.as_slice() {
                [bucket] => Partition::Single((*bucket, period)),
                all => Partition::Set(all.iter().map(|b| (*b, period)).collect()),
            })
            .collect::<Vec<_>>();

        info!(key = ?key, %mode, first, last, partitions = partitions.len(), "Partitioned range");
        Ok(partitions)
    }
}

fn key_time_id(key: &str, time: i64) -> String {
    format!("k/{key}/t/{time}")
}

fn print_json(label: &str, value: &impl serde::Serialize) -> Result<()> {
    println!("{label}: {}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let scatter_config = ScatterConfig::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("shard_scatter={}", scatter_config.log_level).parse()?),
        )
        .json()
        .init();

    info!(
        version = env!("CARGO_PKG_VERSION"),
        db_prefix = %scatter_config.db_prefix,
        buckets = scatter_config.buckets,
        period_ms = scatter_config.period_ms,
        "Starting Shard Scatter demo"
    );

    let metrics = install_prometheus()?;

    let cluster = MemoryCluster::new();
    cluster.define_view(VIEW, |doc: &Value| {
        doc.get("title")
            .map(|title| vec![(title.clone(), Value::Null)])
            .unwrap_or_default()
    });

    let partitioner = BucketPeriodPartitioner {
        buckets: scatter_config.buckets,
        period_ms: scatter_config.period_ms,
    };
    let prefix = scatter_config.db_prefix.clone();
    let client = ScatterClient::new(
        partitioner,
        move |(bucket, period): &Shard| format!("{prefix}-{bucket}-{period}"),
        MemoryConnector::new(Arc::clone(&cluster)),
    );

    // Each document lands in the shard owning its key and time
    let books = [
        ("abcde", RANGE_START, "The Heart of Darkness"),
        ("efghi", RANGE_START + 3_000_000_000, "The Old Man and the Sea"),
        ("jklmno", RANGE_START + 6_000_000_000, "The Sound and the Fury"),
        ("pqrst", RANGE_END, "The Brothers Karamazov"),
    ];
    for (key, time, title) in books {
        let id = key_time_id(key, time);
        let doc = json!({ "_id": id, "title": title });
        let rows = client
            .range_add(&[doc], &OpOptions::range(id.as_str(), id.as_str()))
            .await?;
        print_json("SEED", &rows)?;
    }

    let design = json!({
        "_id": DESIGN_DOC_ID,
        "views": { "by_title": { "map": "function(doc) { emit(doc.title); }" } }
    });
    // Different keys at both ends span every bucket, so the design document
    // is written to (and creates) every shard in the range
    let design_range = OpOptions::range(key_time_id("a", RANGE_START), key_time_id("z", RANGE_END));
    let added = client.range_add(&[design], &design_range).await?;
    print_json("ADD", &added)?;

    let mut query_range = design_range.clone().include_docs(true);
    query_range.limit = scatter_config.query_limit;
    match client.query(VIEW, &query_range).await {
        Ok(rows) => print_json("QUERY", &rows)?,
        Err(e) => error!(error = %e, noretry = e.noretry(), "Query failed"),
    }

    match client.range_remove(DESIGN_DOC_ID, &design_range).await {
        Ok(rows) => print_json("REMOVE", &rows)?,
        Err(e) => error!(error = %e, noretry = e.noretry(), "Remove failed"),
    }

    info!(
        databases = cluster.database_names().len(),
        pooled_handles = client.pool().len(),
        "Shard Scatter demo complete"
    );
    println!("{}", metrics.render());
    Ok(())
}
