//! Shared stubs for scatter integration tests
//!
//! `StubPartitioner` returns a fixed partition list and records every
//! resolution request. `StubConnector` hands out `StubStore`s by URI and
//! counts constructions per (uri, mode).

#![allow(dead_code)]

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::{json, Value};
use shard_scatter::error::BoxError;
use shard_scatter::{
    ConnectOptions, Connector, Document, Mode, OpOptions, Partition, Partitioner, Row,
    ScatterClient, ShardStore, StoreError, TimeRange,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// Recorded partitioner request
#[derive(Debug, Clone, PartialEq)]
pub struct Resolution {
    pub key: Option<String>,
    pub range: TimeRange,
    pub mode: Mode,
}

pub struct StubPartitioner {
    partitions: Vec<Partition<String>>,
    fail: bool,
    pub requests: Arc<Mutex<Vec<Resolution>>>,
}

#[async_trait]
impl Partitioner for StubPartitioner {
    type Descriptor = String;

    async fn partition(
        &self,
        key: Option<&str>,
        range: TimeRange,
        mode: Mode,
    ) -> Result<Vec<Partition<String>>, BoxError> {
        self.requests.lock().unwrap().push(Resolution {
            key: key.map(str::to_string),
            range,
            mode,
        });
        if self.fail {
            return Err("partition table unavailable".into());
        }
        Ok(self.partitions.clone())
    }
}

/// One stub shard
///
/// Queries return the configured rows in their configured order, honouring
/// `skip` and `limit` the way a real store would.
#[derive(Default)]
pub struct StubStore {
    rows: Vec<Row>,
    docs: Mutex<HashMap<String, Document>>,
    error: Option<StoreError>,
    pub calls: AtomicUsize,
    pub removes: AtomicUsize,
    pub seen: Mutex<Vec<OpOptions>>,
}

impl StubStore {
    pub fn with_rows(rows: Vec<Row>) -> Arc<Self> {
        Arc::new(Self {
            rows,
            ..Default::default()
        })
    }

    pub fn with_ids(ids: &[&str]) -> Arc<Self> {
        Self::with_rows(ids.iter().map(|id| json!({ "id": id })).collect())
    }

    pub fn failing(error: StoreError) -> Arc<Self> {
        Arc::new(Self {
            error: Some(error),
            ..Default::default()
        })
    }

    pub fn with_doc(doc: Document) -> Arc<Self> {
        let store = Self::default();
        let id = doc["_id"].as_str().unwrap().to_string();
        store.docs.lock().unwrap().insert(id, doc);
        Arc::new(store)
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_options(&self) -> Option<OpOptions> {
        self.seen.lock().unwrap().last().cloned()
    }

    fn enter(&self, options: Option<&OpOptions>) -> Result<(), StoreError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(options) = options {
            self.seen.lock().unwrap().push(options.clone());
        }
        match &self.error {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl ShardStore for StubStore {
    async fn query(&self, _view: &str, options: &OpOptions) -> Result<Vec<Row>, StoreError> {
        self.enter(Some(options))?;
        Ok(self
            .rows
            .iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn bulk_docs(
        &self,
        docs: &[Document],
        options: &OpOptions,
    ) -> Result<Vec<Row>, StoreError> {
        self.enter(Some(options))?;
        Ok(docs
            .iter()
            .map(|d| json!({ "ok": true, "id": d["_id"], "rev": "1-a" }))
            .collect())
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.enter(None)?;
        self.docs
            .lock()
            .unwrap()
            .get(id)
            .cloned()
            .ok_or_else(|| StoreError::not_found("missing"))
    }

    async fn remove(&self, doc: &Document) -> Result<Row, StoreError> {
        self.removes.fetch_add(1, Ordering::SeqCst);
        let id = doc["_id"].as_str().unwrap_or_default();
        self.docs.lock().unwrap().remove(id);
        Ok(json!({ "ok": true, "id": id, "rev": "2-b" }))
    }
}

pub struct StubConnector {
    stores: HashMap<String, Arc<StubStore>>,
    unreachable: Vec<String>,
    constructions: DashMap<(String, Mode), usize>,
}

impl StubConnector {
    /// Constructions for a (uri, mode) pair
    pub fn constructions(&self, uri: &str, mode: Mode) -> usize {
        self.constructions
            .get(&(uri.to_string(), mode))
            .map(|n| *n)
            .unwrap_or(0)
    }

    pub fn total_constructions(&self) -> usize {
        self.constructions.iter().map(|e| *e.value()).sum()
    }
}

#[async_trait]
impl Connector for StubConnector {
    type Handle = StubStore;

    async fn connect(
        &self,
        uri: &str,
        options: ConnectOptions,
    ) -> Result<Arc<StubStore>, StoreError> {
        let mode = if options.skip_setup {
            Mode::Read
        } else {
            Mode::Write
        };
        *self.constructions.entry((uri.to_string(), mode)).or_insert(0) += 1;
        tokio::task::yield_now().await;

        if self.unreachable.iter().any(|u| u == uri) {
            return Err(StoreError::new(Some(503), "unavailable", "connection refused"));
        }
        self.stores
            .get(uri)
            .cloned()
            .ok_or_else(|| StoreError::not_found(format!("no shard {uri}")))
    }
}

pub type StubClient = ScatterClient<StubPartitioner, StubConnector>;

/// Builds a client over stub shards
#[derive(Default)]
pub struct Fixture {
    partitions: Vec<Partition<String>>,
    stores: HashMap<String, Arc<StubStore>>,
    unreachable: Vec<String>,
    fail_partitioning: bool,
}

impl Fixture {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shard(mut self, uri: &str, store: Arc<StubStore>) -> Self {
        self.stores.insert(uri.to_string(), store);
        self
    }

    pub fn unreachable(mut self, uri: &str) -> Self {
        self.unreachable.push(uri.to_string());
        self
    }

    pub fn single(mut self, uri: &str) -> Self {
        self.partitions.push(Partition::Single(uri.to_string()));
        self
    }

    pub fn set(mut self, uris: &[&str]) -> Self {
        self.partitions
            .push(Partition::Set(uris.iter().map(|u| u.to_string()).collect()));
        self
    }

    pub fn failing_partitioner(mut self) -> Self {
        self.fail_partitioning = true;
        self
    }

    pub fn build(self) -> (StubClient, Arc<Mutex<Vec<Resolution>>>) {
        let requests = Arc::new(Mutex::new(Vec::new()));
        let partitioner = StubPartitioner {
            partitions: self.partitions,
            fail: self.fail_partitioning,
            requests: Arc::clone(&requests),
        };
        let connector = StubConnector {
            stores: self.stores,
            unreachable: self.unreachable,
            constructions: DashMap::new(),
        };
        let client = ScatterClient::new(partitioner, |uri: &String| uri.clone(), connector);
        (client, requests)
    }
}

/// Ids of the returned rows
pub fn ids(rows: &[Row]) -> Vec<Value> {
    rows.iter().map(|r| r["id"].clone()).collect()
}
