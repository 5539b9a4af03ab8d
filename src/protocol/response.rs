//! Response definitions
//!
//! The result object returned for a single executed command, mirroring the
//! shape the HTTP dashboard surface exposes per query:
//! `{query, executed, error?, list?, explain?, runtime_ms, primary?, secondary?}`.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

/// Outcome of running one [`crate::protocol::Command`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Response {
    /// The command's name, for echoing back to a caller that doesn't keep
    /// the original query text around.
    pub query: String,
    pub executed: bool,
    pub error: Option<String>,
    /// Row/document results, for `select` and `show` commands.
    pub list: Option<Vec<Value>>,
    /// Human-readable plan, when the command asked for one.
    pub explain: Option<String>,
    pub runtime_ms: u64,
    /// Placement of the affected row, for single-row writes.
    pub primary: Option<Uuid>,
    pub secondary: Option<Uuid>,
}

impl Response {
    pub fn ok(query: &str, runtime_ms: u64) -> Self {
        Self {
            query: query.to_string(),
            executed: true,
            error: None,
            list: None,
            explain: None,
            runtime_ms,
            primary: None,
            secondary: None,
        }
    }

    pub fn with_list(mut self, list: Vec<Value>) -> Self {
        self.list = Some(list);
        self
    }

    pub fn with_explain(mut self, explain: String) -> Self {
        self.explain = Some(explain);
        self
    }

    pub fn with_placement(mut self, primary: Uuid, secondary: Uuid) -> Self {
        self.primary = Some(primary);
        self.secondary = Some(secondary);
        self
    }

    pub fn failed(query: &str, runtime_ms: u64, error: impl std::fmt::Display) -> Self {
        Self {
            query: query.to_string(),
            executed: false,
            error: Some(error.to_string()),
            list: None,
            explain: None,
            runtime_ms,
            primary: None,
            secondary: None,
        }
    }
}
