//! 📦 Common data structures — the building blocks of amsq.
//!
//! 🎬 COLD OPEN — INT. QUEUE — EVERY TEN SECONDS, FOREVER
//!
//! A snapshot arrives: a list of column names and a pile of rows. It does not know it is about to
//! become log records. It does not know about the ingestion API. It is, frankly, just a matrix.
//!
//! 🦆

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// 📊 The upstream matrix: `{cols: [...], results: [[...], ...]}`.
///
/// Position-significant. `cols[i]` names `row[i]` for every row in `results`. Read-only input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub cols: Vec<String>,
    pub results: Vec<Vec<Value>>,
}

impl SourceSnapshot {
    /// 📥 Parse the wire shape. Same parser for the remote document and the fallback file.
    pub fn from_slice(bytes: &[u8]) -> serde_json::Result<Self> {
        serde_json::from_slice(bytes)
    }
}

/// 🎯 One flattened log record, ready to ship.
///
/// Field order is insertion order (serde_json `preserve_order`): the reserved identity fields
/// first, then every retained column in column-index order. Built by the transformer, read by
/// everybody else. There is no `&mut` accessor: once born, a record is done.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(transparent)]
pub struct LogRecord(Map<String, Value>);

impl LogRecord {
    pub(crate) fn from_fields(fields: Map<String, Value>) -> Self {
        Self(fields)
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn contains(&self, field: &str) -> bool {
        self.0.contains_key(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}
