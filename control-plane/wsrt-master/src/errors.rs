use crate::infra::InfraError;
use std::time::Duration;
use thiserror::Error;
use wsrt_agent::BootstrapError;
use wsrt_provision::{ProvisionError, StageFailure};
use wsrt_storage::StorageError;

/// Why a runtime failed to start. Every variant names the step it failed
/// in, see [`StartError::stage`].
#[derive(Error, Debug)]
pub enum StartError {
    #[error("runtime {0} already exists")]
    AlreadyExists(String),

    #[error("machine token unavailable: {0}")]
    MachineToken(#[source] InfraError),

    #[error("invalid environment: {0}")]
    Environment(#[from] ProvisionError),

    #[error(transparent)]
    Provision(#[from] StageFailure),

    #[error("infra: {0}")]
    Infra(#[source] InfraError),

    /// Bootstrap failure of the first failing machine.
    #[error("{error}")]
    Agent {
        machine: String,
        #[source]
        error: BootstrapError,
    },

    #[error("agent task of machine {machine} aborted: {message}")]
    AgentPanicked { machine: String, message: String },

    #[error("agents of runtime {identity} did not start within {} seconds", after.as_secs())]
    Timeout { identity: String, after: Duration },

    #[error("start of runtime {0} was interrupted by a stop")]
    Interrupted(String),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}

impl StartError {
    /// Step tag, e.g. `provision:volumes`, `infra` or `agent:timeout`.
    pub fn stage(&self) -> String {
        match self {
            StartError::AlreadyExists(_) => "state".into(),
            StartError::MachineToken(_) => "machine-token".into(),
            StartError::Environment(_) => "environment".into(),
            StartError::Provision(f) => format!("provision:{}", f.stage),
            StartError::Infra(_) => "infra".into(),
            StartError::Agent { error, .. } => {
                let kind = match error {
                    BootstrapError::Configuration(_) => "configuration",
                    BootstrapError::Dispatch(_) => "dispatch",
                    BootstrapError::Timeout { .. } => "timeout",
                    BootstrapError::Cancelled { .. } => "cancelled",
                    BootstrapError::Storage(_) => "storage",
                };
                format!("agent:{kind}")
            }
            StartError::AgentPanicked { .. } => "agent".into(),
            StartError::Timeout { .. } => "agent:timeout".into(),
            StartError::Interrupted(_) => "interrupted".into(),
            StartError::Storage(_) => "storage".into(),
        }
    }
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("runtime {0} is not running")]
    NotRunning(String),

    #[error("infra: {0}")]
    Infra(#[from] InfraError),

    #[error("storage: {0}")]
    Storage(#[from] StorageError),
}
