//! Append-only JSONL result log.
//!
//! One JSON object per line, following the same format choice as an event
//! log: trivial to tail, grep and replay.

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs::{self, OpenOptions};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::config::ConfigSource;
use crate::core::{Context, EventSink};
use crate::domain::{InvocationResult, SinkError};

pub const MODULE_PATH: &str = "builtin/jsonl";
pub const SYMBOL: &str = "JsonlSink";

pub const SINK_JSONL_PATH: &str = "SINK_JSONL_PATH";

/// One line of the log
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResultRecord {
    pub invocation_id: Uuid,
    pub completed_at: DateTime<Utc>,
    pub duration_ms: u64,
    /// Output as UTF-8 (lossy)
    pub output: String,
}

impl From<&InvocationResult> for ResultRecord {
    fn from(result: &InvocationResult) -> Self {
        Self {
            invocation_id: result.id,
            completed_at: result.completed_at,
            duration_ms: result.duration_ms,
            output: result.text(),
        }
    }
}

pub struct JsonlSink {
    path: PathBuf,
    // Serializes appends from concurrent invocations
    lock: Mutex<()>,
}

impl JsonlSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn from_source(config: &dyn ConfigSource) -> Result<Self> {
        let path = config
            .value(SINK_JSONL_PATH)
            .with_context(|| format!("{} is required for {}", SINK_JSONL_PATH, MODULE_PATH))?;
        Ok(Self::new(path))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read every record back, in append order
    pub async fn replay(&self) -> Result<Vec<ResultRecord>> {
        let content = match fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(e).with_context(|| format!("Failed to read {}", self.path.display()))
            }
        };

        content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .enumerate()
            .map(|(i, line)| {
                serde_json::from_str(line)
                    .with_context(|| format!("Failed to parse record on line {}", i + 1))
            })
            .collect()
    }
}

#[async_trait]
impl EventSink for JsonlSink {
    async fn consume(&self, _ctx: &Context, result: &InvocationResult) -> Result<(), SinkError> {
        let mut line = serde_json::to_string(&ResultRecord::from(result))?;
        line.push('\n');

        let _guard = self.lock.lock().await;
        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).await?;
        }
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(line.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}
