//! Domain error types for shard scatter-gather
//!
//! Store failures are carried as a plain [`StoreError`] value so they can be
//! cloned into every caller that awaits a shared shard construction. Fan-out
//! failures wrap them in [`ScatterError`], which names the shard or stage
//! that failed. Library functions return these types; only the demo binary
//! reaches for `anyhow`.

use crate::options::Mode;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Boxed error returned by external collaborators (partitioners)
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// Status code for a document update conflict
pub const STATUS_CONFLICT: u16 = 409;

/// Status code for a missing database or document
pub const STATUS_NOT_FOUND: u16 = 404;

/// Raw error reported by a document store
///
/// `noretry` and `nobreaker` are advisory flags for upstream retry and
/// circuit-breaker layers. They are only ever set by [`normalize`].
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[error("{name}: {message}")]
pub struct StoreError {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub name: String,
    pub message: String,
    #[serde(default)]
    pub noretry: bool,
    #[serde(default)]
    pub nobreaker: bool,
}

impl StoreError {
    pub fn new(status: Option<u16>, name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status,
            name: name.into(),
            message: message.into(),
            noretry: false,
            nobreaker: false,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(Some(STATUS_NOT_FOUND), "not_found", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(Some(STATUS_CONFLICT), "conflict", message)
    }

    /// True for statuses that signal a terminal, expected failure
    pub fn is_terminal(&self) -> bool {
        matches!(self.status, Some(STATUS_CONFLICT) | Some(STATUS_NOT_FOUND))
    }
}

/// Mark conflict and not-found failures so they bypass retries and breakers.
///
/// Returns a new value; the input is consumed rather than mutated behind a
/// shared reference. Successful results never reach this function, use it as
/// `result.map_err(normalize)`.
pub fn normalize(err: StoreError) -> StoreError {
    if !err.is_terminal() {
        return err;
    }
    StoreError {
        noretry: true,
        nobreaker: true,
        ..err
    }
}

/// Scatter-gather errors
///
/// Every variant carries the shard or stage that failed so callers can tell
/// a routing failure from a single unreachable shard.
#[derive(Error, Debug)]
pub enum ScatterError {
    /// The partitioner could not resolve the requested key/time range
    #[error("partition resolution failed in {mode} mode")]
    PartitionResolution {
        mode: Mode,
        #[source]
        source: BoxError,
    },

    /// A shard handle could not be constructed
    #[error("unable to open shard {uri}")]
    ShardConstruction {
        uri: String,
        #[source]
        source: StoreError,
    },

    /// The bound operation failed against one shard
    #[error("operation failed on shard {uri}")]
    ShardOperation {
        uri: String,
        #[source]
        source: StoreError,
    },

    /// A `SCATTER_*` setting could not be parsed or failed validation
    #[error("configuration error: {0}")]
    Config(String),
}

impl ScatterError {
    /// The underlying store error, if the failure came from a shard
    pub fn store_error(&self) -> Option<&StoreError> {
        match self {
            Self::ShardConstruction { source, .. } | Self::ShardOperation { source, .. } => {
                Some(source)
            }
            Self::PartitionResolution { .. } | Self::Config(_) => None,
        }
    }

    pub fn status(&self) -> Option<u16> {
        self.store_error().and_then(|e| e.status)
    }

    /// Upstream retry layers should not retry this failure
    pub fn noretry(&self) -> bool {
        self.store_error().is_some_and(|e| e.noretry)
    }

    /// Upstream circuit breakers should not count this failure
    pub fn nobreaker(&self) -> bool {
        self.store_error().is_some_and(|e| e.nobreaker)
    }

    /// Stable, low-cardinality name of the variant.
    ///
    /// Used as the `error_type` label on `scatter_errors_total`.
    pub fn error_type_label(&self) -> &'static str {
        match self {
            Self::PartitionResolution { .. } => "partition_resolution",
            Self::ShardConstruction { .. } => "shard_construction",
            Self::ShardOperation { .. } => "shard_operation",
            Self::Config(_) => "config",
        }
    }
}
