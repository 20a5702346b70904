//! Core bridge logic.
//!
//! This module contains:
//! - Context: cancellation/deadline scope passed to invocations
//! - Invoker: the invoke contract
//! - SinkInvoker: decorator forwarding results to a sink
//! - Extension: event source/sink contracts and their resolution
//! - Orchestrator: setup and hand-off to the event source

pub mod context;
pub mod extension;
pub mod invoker;
pub mod orchestrator;
pub mod sink_invoker;

// Re-export commonly used types
pub use context::{CancelHandle, Context};
pub use extension::{
    resolve, resolve_sink, resolve_source, Capability, EventSink, EventSource, ExtensionModule,
    ExtensionReference, ExtensionRegistry, Loader, ResolveError, Shape,
};
pub use invoker::Invoker;
pub use orchestrator::{Bridge, Orchestrator, PoolFactory, RunError, SetupError};
pub use sink_invoker::SinkInvoker;
