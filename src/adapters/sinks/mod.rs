//! Built-in event sinks.

pub mod jsonl;
pub mod webhook;
pub mod writer;

pub use jsonl::{JsonlSink, ResultRecord};
pub use webhook::WebhookSink;
pub use writer::{StdoutSink, WriterSink};
