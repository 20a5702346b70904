//! Bounded pool of subprocess-backed invocations.
//!
//! Each invocation takes a slot from a fixed-size semaphore, spawns the
//! configured command, pipes the input to stdin and collects stdout as the
//! result. Two bounds are enforced:
//! - waiting longer than `max_queue_wait` for a slot fails with backpressure
//! - running longer than `max_execution_time` kills the process

use std::process::Stdio;
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use thiserror::Error;
use tokio::io::AsyncWriteExt;
use tokio::sync::Semaphore;
use tokio::time::timeout;
use tracing::{debug, instrument, warn};

use crate::config::PoolConfig;
use crate::core::{Context, Invoker, PoolFactory};
use crate::domain::{Input, InvocationResult, InvokeError, Outcome};

#[derive(Debug, Error)]
pub enum PoolError {
    #[error("max concurrent invokers must be positive")]
    NoCapacity,
}

/// Subprocess invoker pool
pub struct InvokerPool {
    config: PoolConfig,
    permits: Arc<Semaphore>,
}

impl InvokerPool {
    pub fn new(config: PoolConfig) -> Result<Self, PoolError> {
        if config.max_concurrent_invokers == 0 {
            return Err(PoolError::NoCapacity);
        }
        let permits = Arc::new(Semaphore::new(config.max_concurrent_invokers));
        Ok(Self { config, permits })
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }

    /// Slots not currently held by a running invocation
    pub fn available_slots(&self) -> usize {
        self.permits.available_permits()
    }

    async fn execute(&self, ctx: &Context, input: Input) -> Result<InvocationResult, InvokeError> {
        let _permit = tokio::select! {
            biased;
            _ = ctx.done() => return Err(InvokeError::Cancelled),
            // The semaphore is never closed, so a permit is the only success
            acquired = timeout(self.config.max_queue_wait, self.permits.acquire()) => match acquired {
                Ok(Ok(permit)) => permit,
                _ => {
                    return Err(InvokeError::Backpressure {
                        waited_ms: self.config.max_queue_wait.as_millis() as u64,
                    })
                }
            },
        };

        let mut command = self.config.command.to_command();
        command
            .env_clear()
            .envs(self.config.inherited_env.iter().map(|(k, v)| (k, v)))
            .envs(&input.env)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let started = Instant::now();
        let mut child = command.spawn().map_err(InvokeError::Spawn)?;

        let stdin = child.stdin.take();
        let data = input.data;
        let feed = async move {
            if let Some(mut stdin) = stdin {
                match stdin.write_all(&data).await {
                    // The function is free to exit without reading its input
                    Err(e) if e.kind() == std::io::ErrorKind::BrokenPipe => {}
                    other => other?,
                }
            }
            Ok::<_, std::io::Error>(())
        };
        let run = async move {
            let (fed, output) = tokio::join!(feed, child.wait_with_output());
            fed?;
            output
        };

        let limit = self.config.max_execution_time;
        let output = tokio::select! {
            biased;
            _ = ctx.done() => return Err(InvokeError::Cancelled),
            finished = timeout(limit, run) => match finished {
                Ok(output) => output?,
                Err(_) => {
                    return Err(InvokeError::ExecutionTimeout {
                        limit_ms: limit.as_millis() as u64,
                    })
                }
            },
        };

        if !output.status.success() {
            return Err(InvokeError::Failed {
                code: output.status.code().unwrap_or(-1),
                stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
            });
        }

        Ok(InvocationResult::new(input.id, output.stdout, started.elapsed()))
    }
}

#[async_trait]
impl Invoker for InvokerPool {
    #[instrument(skip_all, fields(invocation_id = %input.id))]
    async fn invoke(&self, ctx: &Context, input: Input) -> Outcome {
        match self.execute(ctx, input).await {
            Ok(result) => {
                debug!(
                    duration_ms = result.duration_ms,
                    bytes = result.data.len(),
                    "Invocation completed"
                );
                Outcome::Success(result)
            }
            Err(e) => {
                warn!(error = %e, "Invocation failed");
                Outcome::InvocationFailed(e)
            }
        }
    }
}

/// Builds an `InvokerPool` for the orchestrator
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandPoolFactory;

impl PoolFactory for CommandPoolFactory {
    fn construct(&self, config: PoolConfig) -> anyhow::Result<Arc<dyn Invoker>> {
        Ok(Arc::new(InvokerPool::new(config)?))
    }
}
