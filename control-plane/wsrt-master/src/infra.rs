use async_trait::async_trait;
use std::collections::BTreeMap;
use wsrt_models::{MachineRecord, MachineStatus, RuntimeIdentity};
use wsrt_provision::InfraEnvironment;

#[derive(Debug, thiserror::Error)]
#[error("{message}")]
pub struct InfraError {
    pub message: String,
}

impl InfraError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Addresses the infrastructure of one runtime. It can be rebuilt from a
/// persisted runtime state, so it stays valid across restarts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeHandle {
    pub identity: RuntimeIdentity,
    pub namespace: String,
}

impl RuntimeHandle {
    pub fn new(identity: RuntimeIdentity, namespace: impl Into<String>) -> Self {
        Self {
            identity,
            namespace: namespace.into(),
        }
    }
}

/// Machines materialized by [`InfraRealizer::apply`], keyed by machine
/// name, with server URLs resolved.
pub type RealizedMachines = BTreeMap<String, MachineRecord>;

/// Container orchestrator the engine delegates to.
#[async_trait]
pub trait InfraRealizer: Send + Sync {
    /// Creates every object of `infra` and waits until the pods run.
    async fn apply(
        &self,
        handle: &RuntimeHandle,
        infra: &InfraEnvironment,
    ) -> Result<RealizedMachines, InfraError>;

    /// Live machines of the runtime. Empty when nothing is running.
    async fn status(
        &self,
        handle: &RuntimeHandle,
    ) -> Result<BTreeMap<String, MachineStatus>, InfraError>;

    /// Removes everything `apply` created. Succeeds when nothing is left.
    async fn destroy(&self, handle: &RuntimeHandle) -> Result<(), InfraError>;
}

#[async_trait]
pub trait MachineTokenSource: Send + Sync {
    async fn token(&self, identity: &RuntimeIdentity)
    -> Result<String, InfraError>;
}
