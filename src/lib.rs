//! fnbridge - event-driven function runner
//!
//! Connects an event source to a bounded pool of subprocess "functions" and
//! optionally forwards every result to a sink:
//!
//! ```text
//! EventSource ──invoke──▶ SinkInvoker ──▶ InvokerPool (subprocess per input)
//!                              └──────▶ EventSink (successful results only)
//! ```
//!
//! # Modules
//!
//! - `core`: invoke contract, sink decorator, extension resolution, orchestrator
//! - `adapters`: subprocess pool and built-in sources/sinks
//! - `domain`: Input, InvocationResult, Outcome
//! - `config`: configuration source and pool policies
//! - `cli`: command-line interface
//!
//! # Usage
//!
//! ```bash
//! # Uppercase every stdin line with `tr`, printing results
//! SOURCE_PLUGIN_PATH=builtin/lines SOURCE_PLUGIN_SYMBOL=LineSource \
//! SINK_PLUGIN_PATH=builtin/stdout SINK_PLUGIN_SYMBOL=StdoutSink \
//! FUNCTION_COMMAND="tr a-z A-Z" fnbridge < input.txt
//!
//! # List built-in extensions
//! fnbridge extensions
//! ```

pub mod adapters;
pub mod cli;
pub mod config;
pub mod core;
pub mod domain;

// Re-export main types at crate root for convenience
pub use config::{ConfigSource, EnvSource, PoolConfig};
pub use core::{
    Context, EventSink, EventSource, ExtensionModule, ExtensionRegistry, Invoker, Orchestrator,
    SinkInvoker,
};
pub use domain::{Input, InvocationResult, Outcome};
