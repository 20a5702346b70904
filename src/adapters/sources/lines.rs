//! Line-oriented event source.
//!
//! Every non-empty line of the input stream becomes one invocation. Lines are
//! dispatched as they arrive without waiting for earlier invocations; reading
//! pauses only while the dispatcher is full. A busy pool is retried rather than
//! treated as a failure. The first failed outcome ends the source with that
//! error once in-flight work has settled.

use std::sync::Arc;

use anyhow::{Context as _, Result};
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader};
use tracing::info;

use super::dispatch::Dispatcher;
use crate::core::{Context, EventSource, Invoker};
use crate::domain::Input;

pub const MODULE_PATH: &str = "builtin/lines";
pub const SYMBOL: &str = "LineSource";

/// Reads inputs from stdin, one per line
#[derive(Debug, Clone, Copy, Default)]
pub struct LineSource;

impl LineSource {
    /// Dispatch every line of `reader` and wait for all invocations
    pub async fn dispatch<R>(reader: R, ctx: Context, invoker: Arc<dyn Invoker>) -> Result<usize>
    where
        R: AsyncBufRead + Unpin,
    {
        let mut dispatcher = Dispatcher::new(ctx, invoker);
        let mut lines = reader.lines();
        let mut line_number = 0usize;

        while let Some(line) = lines.next_line().await.context("Failed to read input line")? {
            line_number += 1;
            if line.trim().is_empty() {
                continue;
            }
            dispatcher
                .submit(format!("line {}", line_number), async move {
                    Ok::<_, anyhow::Error>(Input::new(line))
                })
                .await;
        }

        dispatcher.finish().await
    }
}

#[async_trait]
impl EventSource for LineSource {
    async fn run(&self, ctx: Context, invoker: Arc<dyn Invoker>) -> Result<()> {
        let stdin = BufReader::new(tokio::io::stdin());
        let count = Self::dispatch(stdin, ctx, invoker).await?;
        info!(count, "Input stream exhausted");
        Ok(())
    }
}
