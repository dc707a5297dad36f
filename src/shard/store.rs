//! Store client seam
//!
//! A [`Connector`] opens shard handles; a [`ShardStore`] is the per-handle
//! operation surface the scatter operations are bound to.

use crate::error::StoreError;
use crate::options::{Document, OpOptions, Row};
use async_trait::async_trait;
use std::sync::Arc;

/// Options passed when opening a shard handle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConnectOptions {
    /// Do not create the database if it does not exist
    pub skip_setup: bool,
}

/// Opens handles to shards by URI
#[async_trait]
pub trait Connector: Send + Sync {
    type Handle: ShardStore + 'static;

    async fn connect(
        &self,
        uri: &str,
        options: ConnectOptions,
    ) -> Result<Arc<Self::Handle>, StoreError>;
}

/// Document operations against one shard
#[async_trait]
pub trait ShardStore: Send + Sync {
    /// Run the named map/reduce view
    async fn query(&self, view: &str, options: &OpOptions) -> Result<Vec<Row>, StoreError>;

    /// Insert or update documents; returns one status row per document
    async fn bulk_docs(
        &self,
        docs: &[Document],
        options: &OpOptions,
    ) -> Result<Vec<Row>, StoreError>;

    /// Fetch the current revision of a document
    async fn get(&self, id: &str) -> Result<Document, StoreError>;

    /// Delete the given revision of a document
    async fn remove(&self, doc: &Document) -> Result<Row, StoreError>;
}
