//! Invoker decorator that forwards successful results to a sink.
//!
//! Error precedence:
//! - inner failure is returned as-is and the sink is never called
//! - sink failure keeps the result and reports `DeliveryFailed`
//! - otherwise the inner result passes through untouched
//!
//! The decorator holds no state of its own, so it is safe to share across
//! concurrent invocations whenever the wrapped invoker and sink are.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Input, Outcome};

use super::context::Context;
use super::extension::EventSink;
use super::invoker::Invoker;

pub struct SinkInvoker<I> {
    invoker: I,
    sink: Option<Arc<dyn EventSink>>,
}

impl<I: Invoker> SinkInvoker<I> {
    pub fn new(invoker: I, sink: Option<Arc<dyn EventSink>>) -> Self {
        Self { invoker, sink }
    }
}

#[async_trait]
impl<I: Invoker> Invoker for SinkInvoker<I> {
    async fn invoke(&self, ctx: &Context, input: Input) -> Outcome {
        let result = match self.invoker.invoke(ctx, input).await {
            Outcome::Success(result) => result,
            other => return other,
        };

        let Some(sink) = &self.sink else {
            return Outcome::Success(result);
        };

        match sink.consume(ctx, &result).await {
            Ok(()) => Outcome::Success(result),
            Err(err) => Outcome::DeliveryFailed(result, err),
        }
    }
}
