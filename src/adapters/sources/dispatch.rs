//! Concurrent dispatch shared by the built-in sources.
//!
//! A source hands every event to a `Dispatcher`, which runs the invocation on
//! its own task. At most `MAX_IN_FLIGHT` invocations are outstanding; beyond
//! that `submit` waits for one to settle, so the source stops reading input
//! until there is room. An invocation rejected with `Backpressure` is retried
//! with exponential backoff until it is admitted or the context ends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use tokio::task::JoinSet;
use tracing::debug;

use crate::core::{Context, Invoker};
use crate::domain::{Input, InvokeError, Outcome};

pub const MAX_IN_FLIGHT: usize = 64;

const RETRY_INITIAL_DELAY: Duration = Duration::from_millis(25);
const RETRY_MAX_DELAY: Duration = Duration::from_secs(1);

/// Invoke, retrying while the invoker reports backpressure
pub async fn invoke_admitted(invoker: &dyn Invoker, ctx: &Context, input: Input) -> Outcome {
    let mut delay = RETRY_INITIAL_DELAY;
    loop {
        match invoker.invoke(ctx, input.clone()).await {
            Outcome::InvocationFailed(InvokeError::Backpressure { waited_ms }) => {
                debug!(invocation_id = %input.id, waited_ms, retry_in_ms = delay.as_millis() as u64, "Invoker busy, retrying");
                tokio::select! {
                    biased;
                    _ = ctx.done() => return Outcome::InvocationFailed(InvokeError::Cancelled),
                    _ = tokio::time::sleep(delay) => {}
                }
                delay = (delay * 2).min(RETRY_MAX_DELAY);
            }
            other => return other,
        }
    }
}

/// Bounded set of in-flight invocations that remembers the first failure
pub struct Dispatcher {
    ctx: Context,
    invoker: Arc<dyn Invoker>,
    limit: usize,
    in_flight: JoinSet<Result<()>>,
    dispatched: usize,
    first_error: Option<anyhow::Error>,
}

impl Dispatcher {
    pub fn new(ctx: Context, invoker: Arc<dyn Invoker>) -> Self {
        Self::with_limit(ctx, invoker, MAX_IN_FLIGHT)
    }

    pub fn with_limit(ctx: Context, invoker: Arc<dyn Invoker>, limit: usize) -> Self {
        Self {
            ctx,
            invoker,
            limit: limit.max(1),
            in_flight: JoinSet::new(),
            dispatched: 0,
            first_error: None,
        }
    }

    /// Start one invocation once there is room. `input` is resolved on the
    /// invocation's task; `label` names the event in error messages.
    pub async fn submit<F>(&mut self, label: String, input: F)
    where
        F: Future<Output = Result<Input>> + Send + 'static,
    {
        while self.in_flight.len() >= self.limit {
            self.settle_next().await;
        }

        let ctx = self.ctx.clone();
        let invoker = self.invoker.clone();
        self.dispatched += 1;
        self.in_flight.spawn(async move {
            let input = input.await?;
            let result = invoke_admitted(invoker.as_ref(), &ctx, input)
                .await
                .into_result()
                .with_context(|| format!("Processing {} failed", label))?;
            debug!(invocation_id = %result.id, event = %label, "Event processed");
            Ok(())
        });
    }

    /// Wait for one in-flight invocation. Returns false when none are left.
    pub async fn settle_next(&mut self) -> bool {
        let Some(joined) = self.in_flight.join_next().await else {
            return false;
        };
        let outcome = joined
            .map_err(anyhow::Error::from)
            .and_then(|settled| settled);
        if let Err(e) = outcome {
            self.first_error.get_or_insert(e);
        }
        true
    }

    pub fn in_flight(&self) -> usize {
        self.in_flight.len()
    }

    pub fn dispatched(&self) -> usize {
        self.dispatched
    }

    pub fn has_failed(&self) -> bool {
        self.first_error.is_some()
    }

    /// Wait for everything in flight; the first failure wins
    pub async fn finish(mut self) -> Result<usize> {
        while self.settle_next().await {}
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.dispatched),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::Semaphore;

    use crate::domain::InvocationResult;

    /// Admits `slots` invocations at a time and rejects the rest immediately
    struct Crowded {
        slots: Semaphore,
        attempts: AtomicUsize,
        peak: AtomicUsize,
        running: AtomicUsize,
    }

    impl Crowded {
        fn new(slots: usize) -> Self {
            Self {
                slots: Semaphore::new(slots),
                attempts: AtomicUsize::new(0),
                peak: AtomicUsize::new(0),
                running: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl Invoker for Crowded {
        async fn invoke(&self, _ctx: &Context, input: Input) -> Outcome {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let Ok(_permit) = self.slots.try_acquire() else {
                return Outcome::InvocationFailed(InvokeError::Backpressure { waited_ms: 0 });
            };
            let running = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.peak.fetch_max(running, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(20)).await;
            self.running.fetch_sub(1, Ordering::SeqCst);
            Outcome::Success(InvocationResult::new(input.id, input.data, Duration::ZERO))
        }
    }

    #[tokio::test]
    async fn test_backpressure_is_retried_until_admitted() {
        let invoker = Arc::new(Crowded::new(2));
        let mut dispatcher = Dispatcher::new(Context::background(), invoker.clone());

        for i in 0..10 {
            dispatcher
                .submit(format!("event {}", i), async move { Ok::<_, anyhow::Error>(Input::new(format!("{}", i))) })
                .await;
        }

        assert_eq!(dispatcher.finish().await.unwrap(), 10);
        assert!(invoker.attempts.load(Ordering::SeqCst) > 10);
        assert!(invoker.peak.load(Ordering::SeqCst) <= 2);
    }

    #[tokio::test]
    async fn test_submit_waits_for_room() {
        let invoker = Arc::new(Crowded::new(8));
        let mut dispatcher = Dispatcher::with_limit(Context::background(), invoker.clone(), 3);

        for i in 0..9 {
            dispatcher
                .submit(format!("event {}", i), async move { Ok::<_, anyhow::Error>(Input::new(format!("{}", i))) })
                .await;
            assert!(dispatcher.in_flight() <= 3);
        }

        assert_eq!(dispatcher.finish().await.unwrap(), 9);
        assert!(invoker.peak.load(Ordering::SeqCst) <= 3);
    }

    #[tokio::test]
    async fn test_retry_stops_when_context_ends() {
        let invoker = Crowded::new(0);
        let (ctx, cancel) = Context::background().with_cancel();
        cancel.cancel();

        let outcome = invoke_admitted(&invoker, &ctx, Input::new("x")).await;

        assert!(matches!(outcome, Outcome::InvocationFailed(InvokeError::Cancelled)));
        assert_eq!(invoker.attempts.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_first_failure_is_reported_after_all_settle() {
        let invoker = Arc::new(Crowded::new(4));
        let mut dispatcher = Dispatcher::new(Context::background(), invoker.clone());

        dispatcher.submit("good".into(), async { Ok::<_, anyhow::Error>(Input::new("a")) }).await;
        dispatcher
            .submit("unreadable".into(), async { Err::<Input, _>(anyhow::anyhow!("no such file")) })
            .await;
        dispatcher.submit("also good".into(), async { Ok::<_, anyhow::Error>(Input::new("b")) }).await;

        let err = dispatcher.finish().await.unwrap_err();
        assert_eq!(err.to_string(), "no such file");
        assert_eq!(invoker.attempts.load(Ordering::SeqCst), 2);
    }
}
