use async_trait::async_trait;
use std::fmt;

/// Container a command is executed in.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecTarget {
    pub namespace: String,
    pub pod: String,
    pub container: String,
}

impl fmt::Display for ExecTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.namespace, self.pod, self.container)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("exec in {target} failed: {message}")]
pub struct ExecError {
    pub target: String,
    pub message: String,
}

impl ExecError {
    pub fn new(target: &ExecTarget, message: impl Into<String>) -> Self {
        Self {
            target: target.to_string(),
            message: message.into(),
        }
    }
}

/// Starts a command inside a running container and returns once it has been
/// dispatched; it does not wait for the command to exit.
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn exec(
        &self,
        target: &ExecTarget,
        command: &[String],
    ) -> Result<(), ExecError>;
}
