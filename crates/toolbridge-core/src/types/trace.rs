//! Call trace recording

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One successful tool invocation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CallRecord {
    pub tool_name: String,
    pub arguments: Value,
    pub result: Value,
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    pub fn new(tool_name: impl Into<String>, arguments: Value, result: Value) -> Self {
        Self {
            tool_name: tool_name.into(),
            arguments,
            result,
            timestamp: Utc::now(),
        }
    }
}

/// Append-only list of call records shared by every clone of a context
#[derive(Debug, Clone, Default)]
pub struct CallTrace {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl CallTrace {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, record: CallRecord) {
        self.records.lock().push(record);
    }

    /// Snapshot of the records in invocation order
    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
