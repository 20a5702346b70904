//! Pipeline assembly.
//!
//! Setup runs in a fixed order and stops at the first failure:
//! 1. invoker pool from `PoolConfig`
//! 2. event source (required)
//! 3. event sink (optional; a path without a symbol is rejected)
//! 4. `SinkInvoker` over the pool
//!
//! Control then passes to the event source with a background context. The
//! source runs its own loop and the orchestrator only waits for it to return.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info, instrument};

use crate::adapters::{builtin_registry, CommandPoolFactory};
use crate::config::{
    ConfigError, ConfigSource, PoolConfig, SINK_PLUGIN_PATH, SINK_PLUGIN_SYMBOL,
    SOURCE_PLUGIN_PATH, SOURCE_PLUGIN_SYMBOL,
};

use super::context::Context;
use super::extension::{
    resolve_sink, resolve_source, EventSink, EventSource, ExtensionReference, Loader, ResolveError,
};
use super::invoker::Invoker;
use super::sink_invoker::SinkInvoker;

/// Constructs the invoker pool from its configuration
pub trait PoolFactory: Send + Sync {
    fn construct(&self, config: PoolConfig) -> anyhow::Result<Arc<dyn Invoker>>;
}

/// Failures before any invocation happens
#[derive(Debug, Error)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Failed to construct invoker pool")]
    Pool(#[source] anyhow::Error),

    #[error(transparent)]
    Resolve(#[from] ResolveError),
}

/// Why a run ended abnormally
#[derive(Debug, Error)]
pub enum RunError {
    #[error(transparent)]
    Setup(#[from] SetupError),

    #[error("Event source failed")]
    Source(#[source] anyhow::Error),
}

/// Wires the pool, the extensions and the sink decorator together
pub struct Orchestrator {
    loader: Arc<dyn Loader>,
    pools: Arc<dyn PoolFactory>,
}

impl Default for Orchestrator {
    fn default() -> Self {
        Self::new(builtin_registry(), CommandPoolFactory)
    }
}

impl Orchestrator {
    pub fn new(loader: impl Loader + 'static, pools: impl PoolFactory + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            pools: Arc::new(pools),
        }
    }

    /// Event source reference from configuration (both values required)
    pub fn source_reference(config: &dyn ConfigSource) -> Result<ExtensionReference, ConfigError> {
        let path = config.value(SOURCE_PLUGIN_PATH).ok_or(ConfigError::Missing {
            key: SOURCE_PLUGIN_PATH,
        })?;
        let symbol = config.value(SOURCE_PLUGIN_SYMBOL).ok_or(ConfigError::Missing {
            key: SOURCE_PLUGIN_SYMBOL,
        })?;
        Ok(ExtensionReference::source(path, symbol))
    }

    /// Event sink reference from configuration; `None` when no sink path is set
    pub fn sink_reference(
        config: &dyn ConfigSource,
    ) -> Result<Option<ExtensionReference>, ConfigError> {
        let Some(path) = config.value(SINK_PLUGIN_PATH) else {
            return Ok(None);
        };
        let symbol = config
            .value(SINK_PLUGIN_SYMBOL)
            .ok_or(ConfigError::PartialSink)?;
        Ok(Some(ExtensionReference::sink(path, symbol)))
    }

    /// Perform setup without starting the event source
    #[instrument(skip_all)]
    pub fn assemble(&self, config: &dyn ConfigSource) -> Result<Bridge, SetupError> {
        let pool_config = PoolConfig::from_source(config)?;
        info!(
            command = %pool_config.command,
            max_concurrent_invokers = pool_config.max_concurrent_invokers,
            max_queue_wait_ms = pool_config.max_queue_wait.as_millis() as u64,
            max_execution_time_ms = pool_config.max_execution_time.as_millis() as u64,
            "Building invoker pool"
        );
        let pool = self.pools.construct(pool_config).map_err(SetupError::Pool)?;

        let source_ref = Self::source_reference(config)?;
        let source = resolve_source(self.loader.as_ref(), &source_ref, config)?;
        info!(source = %source_ref, "Event source resolved");

        let sink = match Self::sink_reference(config)? {
            Some(sink_ref) => {
                let sink = resolve_sink(self.loader.as_ref(), &sink_ref, config)?;
                info!(sink = %sink_ref, "Event sink resolved");
                Some(sink)
            }
            None => {
                debug!("No event sink configured");
                None
            }
        };

        Ok(Bridge::new(source, pool, sink))
    }

    /// Set up and run until the event source returns
    pub async fn run(&self, config: &dyn ConfigSource) -> Result<(), RunError> {
        self.assemble(config)?.run().await
    }
}

/// An assembled pipeline, ready to hand to its event source
pub struct Bridge {
    source: Arc<dyn EventSource>,
    invoker: Arc<dyn Invoker>,
}

impl Bridge {
    pub fn new(
        source: Arc<dyn EventSource>,
        pool: Arc<dyn Invoker>,
        sink: Option<Arc<dyn EventSink>>,
    ) -> Self {
        Self {
            source,
            invoker: Arc::new(SinkInvoker::new(pool, sink)),
        }
    }

    /// The invoker the event source receives
    pub fn invoker(&self) -> Arc<dyn Invoker> {
        self.invoker.clone()
    }

    /// Call the event source once and wait for it to finish
    pub async fn run(self) -> Result<(), RunError> {
        info!("Handing control to event source");
        self.source
            .run(Context::background(), self.invoker)
            .await
            .map_err(RunError::Source)?;
        info!("Event source finished");
        Ok(())
    }
}
