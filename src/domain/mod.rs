//! Domain types for the invocation bridge.
//!
//! This module contains the data that flows through the pipeline:
//! - Input / InvocationResult: per-invocation payloads
//! - Outcome: tagged result of one invoke, with its error types

pub mod invocation;
pub mod outcome;

// Re-export commonly used types
pub use invocation::{Input, InvocationResult};
pub use outcome::{InvocationError, InvokeError, Outcome, SinkError};
