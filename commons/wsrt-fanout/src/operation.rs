use async_trait::async_trait;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[derive(Debug, thiserror::Error)]
pub enum OperationError {
    #[error("operation failed: {0}")]
    Failed(String),

    #[error("operation cancelled")]
    Cancelled,

    #[error("operation timed out after {0:?}")]
    TimedOut(Duration),

    #[error("operation panicked: {0}")]
    Panicked(String),
}

impl OperationError {
    pub fn failed(msg: impl Into<String>) -> Self {
        OperationError::Failed(msg.into())
    }
}

/// An action that can be attempted against a single target.
///
/// `start` receives a token that is cancelled once the executor stops
/// waiting for this target; long-running work should observe it.
#[async_trait]
pub trait TargetOperation<T: Send + Sync>: Send + Sync {
    type Output: Send + 'static;

    fn can_attempt(&self, _target: &T) -> bool {
        true
    }

    async fn start(
        &self,
        target: &T,
        cancel: CancellationToken,
    ) -> Result<Self::Output, OperationError>;

    fn is_acceptable(&self, _target: &T, _output: &Self::Output) -> bool {
        true
    }
}

/// Result accepted for the target at `index` of the input collection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Accepted<O> {
    pub index: usize,
    pub output: O,
}
