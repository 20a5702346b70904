//! Tagged outcome of a single invocation.
//!
//! A plain invoker either succeeds or fails. Once a sink is involved there is a
//! third case: the function produced a result but it could not be delivered
//! downstream. `Outcome` keeps the three apart so a caller never has to guess
//! whether a result paired with an error can be trusted.

use thiserror::Error;

use super::invocation::InvocationResult;

/// Failure of the invoker itself (the function could not run or returned an error)
#[derive(Debug, Error)]
pub enum InvokeError {
    #[error("No invoker slot available within {waited_ms}ms")]
    Backpressure { waited_ms: u64 },

    #[error("Invocation exceeded maximum execution time of {limit_ms}ms")]
    ExecutionTimeout { limit_ms: u64 },

    #[error("Invocation cancelled")]
    Cancelled,

    #[error("Failed to spawn function process: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Function exited with code {code}: {stderr}")]
    Failed { code: i32, stderr: String },
}

/// Failure of a sink after a successful invocation
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{0}")]
    Rejected(String),
}

/// Either side of a failed invocation, for callers that want `?`
#[derive(Debug, Error)]
pub enum InvocationError {
    #[error(transparent)]
    Invoke(#[from] InvokeError),

    #[error("Result {id} could not be delivered: {source}")]
    Delivery {
        id: uuid::Uuid,
        #[source]
        source: SinkError,
    },
}

/// What one `invoke` call produced
#[derive(Debug)]
pub enum Outcome {
    /// The function ran and (if configured) the sink accepted the result
    Success(InvocationResult),

    /// The function ran but the sink rejected the result; the result is still valid
    DeliveryFailed(InvocationResult, SinkError),

    /// The function itself failed; no result and the sink was never called
    InvocationFailed(InvokeError),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// The produced result, present for both `Success` and `DeliveryFailed`
    pub fn result(&self) -> Option<&InvocationResult> {
        match self {
            Outcome::Success(result) | Outcome::DeliveryFailed(result, _) => Some(result),
            Outcome::InvocationFailed(_) => None,
        }
    }

    /// Collapse into a `Result`, treating a delivery failure as an error
    pub fn into_result(self) -> Result<InvocationResult, InvocationError> {
        match self {
            Outcome::Success(result) => Ok(result),
            Outcome::DeliveryFailed(result, source) => Err(InvocationError::Delivery {
                id: result.id,
                source,
            }),
            Outcome::InvocationFailed(err) => Err(InvocationError::Invoke(err)),
        }
    }
}

impl From<Result<InvocationResult, InvokeError>> for Outcome {
    fn from(result: Result<InvocationResult, InvokeError>) -> Self {
        match result {
            Ok(result) => Outcome::Success(result),
            Err(err) => Outcome::InvocationFailed(err),
        }
    }
}
