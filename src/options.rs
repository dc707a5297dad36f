//! Operation options, access modes and row types

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// A stored document
pub type Document = Value;

/// One result row. The `id` field is the merge key.
pub type Row = Value;

/// Shard access mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    Read,
    Write,
}

impl Mode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Mode::Read => "read",
            Mode::Write => "write",
        }
    }
}

impl fmt::Display for Mode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Options for a scattered operation
///
/// `startkey` and `endkey` only drive partition resolution and are cleared
/// before the options reach a shard. Unrecognized fields are kept in `extra`
/// and passed through to the store.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct OpOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub startkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endkey: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limit: Option<usize>,
    #[serde(default)]
    pub skip: usize,
    #[serde(default)]
    pub descending: bool,
    #[serde(default)]
    pub include_docs: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl OpOptions {
    pub fn range(startkey: impl Into<String>, endkey: impl Into<String>) -> Self {
        Self {
            startkey: Some(startkey.into()),
            endkey: Some(endkey.into()),
            ..Default::default()
        }
    }

    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn with_skip(mut self, skip: usize) -> Self {
        self.skip = skip;
        self
    }

    pub fn descending(mut self, descending: bool) -> Self {
        self.descending = descending;
        self
    }

    pub fn include_docs(mut self, include_docs: bool) -> Self {
        self.include_docs = include_docs;
        self
    }

    /// Copy of these options as sent to a single shard
    pub fn for_shard(&self, limit: Option<usize>, skip: usize) -> Self {
        Self {
            startkey: None,
            endkey: None,
            limit,
            skip,
            ..self.clone()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn for_shard_clears_range_and_keeps_passthrough() {
        let mut opts = OpOptions::range("k/a/t/1", "k/a/t/9")
            .with_limit(10)
            .with_skip(2)
            .include_docs(true);
        opts.extra.insert("reduce".to_string(), Value::Bool(false));

        let shard = opts.for_shard(Some(4), 0);
        assert_eq!(shard.startkey, None);
        assert_eq!(shard.endkey, None);
        assert_eq!(shard.limit, Some(4));
        assert_eq!(shard.skip, 0);
        assert!(shard.include_docs);
        assert_eq!(shard.extra.get("reduce"), Some(&Value::Bool(false)));
    }

    #[test]
    fn deserializes_with_defaults() {
        let opts: OpOptions =
            serde_json::from_str(r#"{"startkey":"k/a/t/1","group":true}"#).unwrap();
        assert_eq!(opts.startkey.as_deref(), Some("k/a/t/1"));
        assert_eq!(opts.limit, None);
        assert_eq!(opts.skip, 0);
        assert!(!opts.descending);
        assert_eq!(opts.extra.get("group"), Some(&Value::Bool(true)));
    }

    #[test]
    fn mode_display() {
        assert_eq!(Mode::Read.to_string(), "read");
        assert_eq!(Mode::Write.to_string(), "write");
    }
}
