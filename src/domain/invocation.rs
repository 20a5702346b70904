//! Per-invocation payloads.
//!
//! An `Input` is produced by an event source for a single event and moved into
//! the invoker. The `InvocationResult` it yields is immutable once produced and
//! is what a sink receives.

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Input for one function invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Input {
    /// Invocation id (echoed on the result)
    pub id: Uuid,

    /// Payload written to the function's stdin
    pub data: Vec<u8>,

    /// Extra environment for the function process, layered over the inherited one
    #[serde(default)]
    pub env: HashMap<String, String>,
}

impl Input {
    /// Create an input with a fresh id and no extra environment
    pub fn new(data: impl Into<Vec<u8>>) -> Self {
        Self {
            id: Uuid::new_v4(),
            data: data.into(),
            env: HashMap::new(),
        }
    }

    /// Add an environment variable for this invocation only
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }
}

/// Outcome data of one successful invocation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InvocationResult {
    /// Id of the input that produced this result
    pub id: Uuid,

    /// Function output (stdout for process-backed invokers)
    pub data: Vec<u8>,

    /// Wall-clock execution time in milliseconds
    pub duration_ms: u64,

    /// When the invocation finished
    pub completed_at: DateTime<Utc>,
}

impl InvocationResult {
    pub fn new(id: Uuid, data: impl Into<Vec<u8>>, duration: Duration) -> Self {
        Self {
            id,
            data: data.into(),
            duration_ms: duration.as_millis() as u64,
            completed_at: Utc::now(),
        }
    }

    /// Output decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.data).into_owned()
    }
}
