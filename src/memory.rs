//! In-memory document store
//!
//! A cluster of named databases with CouchDB-like document semantics:
//! revisioned documents, per-document conflicts on bulk insert, and views
//! defined as Rust map functions. Used by the demo binary and tests.

use crate::error::StoreError;
use crate::options::{Document, OpOptions, Row};
use crate::partition::mask_uri;
use crate::shard::{ConnectOptions, Connector, ShardStore};

use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{json, Value};
use std::cmp::Ordering;
use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

/// View map function: emits `(key, value)` pairs for a document
pub type ViewFn = Arc<dyn Fn(&Document) -> Vec<(Value, Value)> + Send + Sync>;

type Views = Arc<DashMap<String, ViewFn>>;

/// A set of in-memory databases addressed by URI
#[derive(Default)]
pub struct MemoryCluster {
    dbs: DashMap<String, Arc<MemoryDb>>,
    views: Views,
    connects: AtomicUsize,
}

impl MemoryCluster {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Register a view available in every database of the cluster
    pub fn define_view<F>(&self, name: impl Into<String>, map: F)
    where
        F: Fn(&Document) -> Vec<(Value, Value)> + Send + Sync + 'static,
    {
        self.views.insert(name.into(), Arc::new(map));
    }

    pub fn create_database(&self, uri: &str) -> Arc<MemoryDb> {
        self.dbs
            .entry(uri.to_string())
            .or_insert_with(|| {
                debug!(uri = %mask_uri(uri), "Creating in-memory database");
                Arc::new(MemoryDb::new(Arc::clone(&self.views)))
            })
            .clone()
    }

    pub fn database(&self, uri: &str) -> Option<Arc<MemoryDb>> {
        self.dbs.get(uri).map(|db| Arc::clone(&db))
    }

    /// Database URIs in sorted order
    pub fn database_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.dbs.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Total connection attempts
    pub fn connects(&self) -> usize {
        self.connects.load(AtomicOrdering::Relaxed)
    }
}

/// Connector over a [`MemoryCluster`]
#[derive(Clone)]
pub struct MemoryConnector {
    cluster: Arc<MemoryCluster>,
}

impl MemoryConnector {
    pub fn new(cluster: Arc<MemoryCluster>) -> Self {
        Self { cluster }
    }
}

#[async_trait]
impl Connector for MemoryConnector {
    type Handle = MemoryDb;

    async fn connect(
        &self,
        uri: &str,
        options: ConnectOptions,
    ) -> Result<Arc<MemoryDb>, StoreError> {
        self.cluster.connects.fetch_add(1, AtomicOrdering::Relaxed);
        match self.cluster.database(uri) {
            Some(db) => Ok(db),
            None if options.skip_setup => Err(StoreError::not_found(format!(
                "Database {} does not exist",
                mask_uri(uri)
            ))),
            None => Ok(self.cluster.create_database(uri)),
        }
    }
}

/// One in-memory database
pub struct MemoryDb {
    docs: DashMap<String, Document>,
    views: Views,
    ops: AtomicUsize,
}

impl MemoryDb {
    fn new(views: Views) -> Self {
        Self {
            docs: DashMap::new(),
            views,
            ops: AtomicUsize::new(0),
        }
    }

    pub fn doc_count(&self) -> usize {
        self.docs.len()
    }

    /// Operations served by this database
    pub fn ops(&self) -> usize {
        self.ops.load(AtomicOrdering::Relaxed)
    }

    fn record_op(&self) {
        self.ops.fetch_add(1, AtomicOrdering::Relaxed);
    }

    fn sorted_docs(&self) -> Vec<Document> {
        let mut docs: Vec<(String, Document)> = self
            .docs
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        docs.sort_by(|a, b| a.0.cmp(&b.0));
        docs.into_iter().map(|(_, doc)| doc).collect()
    }

    fn put(&self, doc: Document) -> Row {
        let Some(fields) = doc.as_object() else {
            return json!({"error": "bad_request", "reason": "Document must be a JSON object"});
        };
        let id = match fields.get("_id").and_then(Value::as_str) {
            Some(id) => id.to_string(),
            None => Uuid::new_v4().simple().to_string(),
        };
        let given = fields.get("_rev").and_then(Value::as_str).map(str::to_string);

        let rev = match self.docs.entry(id.clone()) {
            Entry::Occupied(mut e) => {
                let current = e.get()["_rev"].as_str().map(str::to_string);
                if given != current {
                    return conflict_row(&id);
                }
                let rev = next_rev(current.as_deref());
                e.insert(stamped(doc, &id, &rev));
                rev
            }
            Entry::Vacant(e) => {
                if given.is_some() {
                    return conflict_row(&id);
                }
                let rev = next_rev(None);
                e.insert(stamped(doc, &id, &rev));
                rev
            }
        };
        json!({"ok": true, "id": id, "rev": rev})
    }
}

fn conflict_row(id: &str) -> Row {
    json!({"id": id, "error": "conflict", "reason": "Document update conflict"})
}

fn stamped(mut doc: Document, id: &str, rev: &str) -> Document {
    doc["_id"] = Value::String(id.to_string());
    doc["_rev"] = Value::String(rev.to_string());
    doc
}

fn next_rev(current: Option<&str>) -> String {
    let generation = current
        .and_then(|rev| rev.split('-').next())
        .and_then(|n| n.parse::<u64>().ok())
        .unwrap_or(0);
    format!("{}-{}", generation + 1, Uuid::new_v4().simple())
}

fn type_rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}

/// View key collation: null < booleans < numbers < strings < arrays < objects
fn collate(a: &Value, b: &Value) -> Ordering {
    match (a, b) {
        (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
        (Value::Number(x), Value::Number(y)) => {
            let x = x.as_f64().unwrap_or_default();
            let y = y.as_f64().unwrap_or_default();
            x.partial_cmp(&y).unwrap_or(Ordering::Equal)
        }
        (Value::String(x), Value::String(y)) => x.cmp(y),
        (Value::Array(x), Value::Array(y)) => x
            .iter()
            .zip(y)
            .map(|(a, b)| collate(a, b))
            .find(|o| o.is_ne())
            .unwrap_or_else(|| x.len().cmp(&y.len())),
        (Value::Object(x), Value::Object(y)) => x.len().cmp(&y.len()),
        _ => type_rank(a).cmp(&type_rank(b)),
    }
}

#[async_trait]
impl ShardStore for MemoryDb {
    async fn query(&self, view: &str, options: &OpOptions) -> Result<Vec<Row>, StoreError> {
        self.record_op();
        let map = self
            .views
            .get(view)
            .map(|v| Arc::clone(&v))
            .ok_or_else(|| StoreError::not_found(format!("missing_named_view {view}")))?;

        let mut rows: Vec<(Value, Row)> = Vec::new();
        for doc in self.sorted_docs() {
            let Some(id) = doc["_id"].as_str().map(str::to_string) else {
                continue;
            };
            if id.starts_with("_design/") {
                continue;
            }
            for (key, value) in map(&doc) {
                let mut row = json!({"id": id, "key": key, "value": value});
                if options.include_docs {
                    row["doc"] = doc.clone();
                }
                rows.push((key, row));
            }
        }
        rows.sort_by(|a, b| collate(&a.0, &b.0));

        let mut rows: Vec<Row> = rows.into_iter().map(|(_, row)| row).collect();
        if options.descending {
            rows.reverse();
        }
        let rows = rows
            .into_iter()
            .skip(options.skip)
            .take(options.limit.unwrap_or(usize::MAX))
            .collect();
        Ok(rows)
    }

    async fn bulk_docs(
        &self,
        docs: &[Document],
        _options: &OpOptions,
    ) -> Result<Vec<Row>, StoreError> {
        self.record_op();
        Ok(docs.iter().cloned().map(|doc| self.put(doc)).collect())
    }

    async fn get(&self, id: &str) -> Result<Document, StoreError> {
        self.record_op();
        self.docs
            .get(id)
            .map(|doc| doc.value().clone())
            .ok_or_else(|| StoreError::not_found(format!("missing {id}")))
    }

    async fn remove(&self, doc: &Document) -> Result<Row, StoreError> {
        self.record_op();
        let id = doc["_id"]
            .as_str()
            .ok_or_else(|| StoreError::new(Some(400), "bad_request", "Document has no _id"))?;
        let rev = doc["_rev"].as_str();

        match self.docs.entry(id.to_string()) {
            Entry::Vacant(_) => {
                Err(StoreError::not_found(format!("missing {id}")))
            }
            Entry::Occupied(e) => {
                let current = e.get()["_rev"].as_str().map(str::to_string);
                if rev != current.as_deref() {
                    return Err(StoreError::conflict("Document update conflict"));
                }
                e.remove();
                Ok(json!({"ok": true, "id": id, "rev": next_rev(current.as_deref())}))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn db() -> Arc<MemoryDb> {
        let cluster = MemoryCluster::new();
        cluster.define_view("by_title", |doc| {
            doc.get("title")
                .map(|t| vec![(t.clone(), Value::Null)])
                .unwrap_or_default()
        });
        cluster.create_database("test-db")
    }

    #[tokio::test]
    async fn bulk_docs_assigns_revisions_and_detects_conflicts() {
        let db = db();
        let rows = db
            .bulk_docs(&[json!({"_id": "k/a/t/1", "title": "x"})], &OpOptions::default())
            .await
            .unwrap();
        assert_eq!(rows[0]["ok"], true);
        assert!(rows[0]["rev"].as_str().unwrap().starts_with("1-"));

        let stale = db
            .bulk_docs(&[json!({"_id": "k/a/t/1", "title": "y"})], &OpOptions::default())
            .await
            .unwrap();
        assert_eq!(stale[0]["error"], "conflict");

        let current = db.get("k/a/t/1").await.unwrap();
        let mut update = current.clone();
        update["title"] = json!("y");
        let rows = db.bulk_docs(&[update], &OpOptions::default()).await.unwrap();
        assert!(rows[0]["rev"].as_str().unwrap().starts_with("2-"));
    }

    #[tokio::test]
    async fn query_orders_by_key_and_pages() {
        let db = db();
        let docs = vec![
            json!({"_id": "k/a/t/1", "title": "b"}),
            json!({"_id": "k/a/t/2", "title": "a"}),
            json!({"_id": "k/a/t/3", "title": "c"}),
            json!({"_id": "_design/example", "title": "z"}),
        ];
        db.bulk_docs(&docs, &OpOptions::default()).await.unwrap();

        let rows = db.query("by_title", &OpOptions::default()).await.unwrap();
        let keys: Vec<&str> = rows.iter().map(|r| r["key"].as_str().unwrap()).collect();
        assert_eq!(keys, vec!["a", "b", "c"]);

        let opts = OpOptions::default().descending(true).with_skip(1).with_limit(1);
        let rows = db.query("by_title", &opts).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["key"], "b");
        assert!(rows[0].get("doc").is_none());

        let err = db.query("missing", &OpOptions::default()).await.unwrap_err();
        assert_eq!(err.status, Some(404));
    }

    #[tokio::test]
    async fn remove_checks_revision() {
        let db = db();
        db.bulk_docs(&[json!({"_id": "doc"})], &OpOptions::default())
            .await
            .unwrap();

        let err = db.remove(&json!({"_id": "doc", "_rev": "9-old"})).await.unwrap_err();
        assert_eq!(err.status, Some(409));

        let doc = db.get("doc").await.unwrap();
        let row = db.remove(&doc).await.unwrap();
        assert_eq!(row["ok"], true);
        assert_eq!(db.doc_count(), 0);
        assert_eq!(db.get("doc").await.unwrap_err().status, Some(404));
    }

    #[tokio::test]
    async fn skip_setup_does_not_create_databases() {
        let cluster = MemoryCluster::new();
        let connector = MemoryConnector::new(Arc::clone(&cluster));

        let err = connector
            .connect("missing", ConnectOptions { skip_setup: true })
            .await
            .err()
            .unwrap();
        assert_eq!(err.status, Some(404));
        assert!(cluster.database("missing").is_none());

        connector
            .connect("missing", ConnectOptions { skip_setup: false })
            .await
            .unwrap();
        assert_eq!(cluster.database_names(), vec!["missing".to_string()]);
        assert_eq!(cluster.connects(), 2);
    }

    #[test]
    fn collation_orders_types() {
        let mut keys = vec![
            json!("b"),
            json!(2),
            json!(null),
            json!([1, "a"]),
            json!(true),
            json!("a"),
        ];
        keys.sort_by(collate);
        assert_eq!(
            keys,
            vec![json!(null), json!(true), json!(2), json!("a"), json!("b"), json!([1, "a"])]
        );
    }
}
