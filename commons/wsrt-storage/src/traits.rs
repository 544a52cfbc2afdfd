use crate::error::StorageError;
use async_trait::async_trait;
use std::collections::{BTreeMap, BTreeSet};
use wsrt_models::{
    MachineRecord, MachineStatus, RuntimeIdentity, RuntimeState,
    RuntimeStatus, ServerRecord, ServerStatus,
};

pub type StorageResult<T> = Result<T, StorageError>;

#[async_trait]
pub trait StorageHealth: Send + Sync {
    /// Lightweight check that the backing store is usable.
    async fn health(&self) -> StorageResult<()>;
}

/// Durable store of runtime states and of the machines and servers that
/// belong to them.
///
/// Every operation on one identity is atomic: a read-modify-write of a
/// status never interleaves with another write to the same identity, and
/// readers never observe half of an update. Operations on different
/// identities do not contend on a shared lock.
#[async_trait]
pub trait RuntimeStateCache: Send + Sync + StorageHealth {
    /// Persists a new runtime state. Fails with `AlreadyExists` when the
    /// identity is already known.
    async fn create(&self, state: &RuntimeState) -> StorageResult<()>;

    async fn get(&self, identity: &RuntimeIdentity)
    -> StorageResult<RuntimeState>;

    async fn update_status(
        &self,
        identity: &RuntimeIdentity,
        status: RuntimeStatus,
    ) -> StorageResult<()>;

    /// Moves to `status` only when the current status is one of `expected`.
    /// Returns whether the transition happened.
    async fn update_status_if(
        &self,
        identity: &RuntimeIdentity,
        expected: &[RuntimeStatus],
        status: RuntimeStatus,
    ) -> StorageResult<bool>;

    /// Deletes the runtime together with its machines and servers.
    /// Returns the removed state, if there was one.
    async fn remove(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<Option<RuntimeState>>;

    /// All identities persisted so far, including those written by an
    /// earlier process.
    async fn get_identities(&self) -> StorageResult<BTreeSet<RuntimeIdentity>>;

    /// Adds or replaces a machine of an existing runtime.
    async fn add_machine(
        &self,
        identity: &RuntimeIdentity,
        machine: &MachineRecord,
    ) -> StorageResult<()>;

    async fn update_machine_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        status: MachineStatus,
    ) -> StorageResult<()>;

    async fn update_server_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
        status: ServerStatus,
    ) -> StorageResult<()>;

    async fn get_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<BTreeMap<String, MachineRecord>>;

    async fn get_server(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
    ) -> StorageResult<ServerRecord>;

    async fn remove_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<()>;
}

pub(crate) fn machine_not_found(
    identity: &RuntimeIdentity,
    machine: &str,
) -> StorageError {
    StorageError::NotFound(format!("{identity}/{machine}"))
}

pub(crate) fn server_not_found(
    identity: &RuntimeIdentity,
    machine: &str,
    server: &str,
) -> StorageError {
    StorageError::NotFound(format!("{identity}/{machine}/{server}"))
}
