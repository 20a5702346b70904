//! The invoke contract shared by the pool, the sink decorator and test doubles.

use std::sync::Arc;

use async_trait::async_trait;

use crate::domain::{Input, Outcome};

use super::context::Context;

/// Anything that can run one input to an outcome
#[async_trait]
pub trait Invoker: Send + Sync {
    async fn invoke(&self, ctx: &Context, input: Input) -> Outcome;
}

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Arc<T> {
    async fn invoke(&self, ctx: &Context, input: Input) -> Outcome {
        (**self).invoke(ctx, input).await
    }
}

#[async_trait]
impl<T: Invoker + ?Sized> Invoker for Box<T> {
    async fn invoke(&self, ctx: &Context, input: Input) -> Outcome {
        (**self).invoke(ctx, input).await
    }
}
