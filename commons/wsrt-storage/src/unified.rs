use crate::error::StorageError;
use crate::traits::*;
use std::collections::{BTreeMap, BTreeSet};
use wsrt_models::{
    MachineRecord, MachineStatus, RuntimeIdentity, RuntimeState,
    RuntimeStatus, ServerRecord, ServerStatus,
};

#[cfg(feature = "memory")]
use crate::memory::MemoryRuntimeCache;

#[cfg(feature = "redb")]
use crate::redb::{RedbConfig, RedbRuntimeCache};

/// Runtime cache chosen at start-up without exposing the concrete backend.
pub enum DynRuntimeCache {
    #[cfg(feature = "memory")]
    Memory(MemoryRuntimeCache),
    #[cfg(feature = "redb")]
    Redb(RedbRuntimeCache),
}

impl DynRuntimeCache {
    /// Builds a cache from a backend name (`memory` or `redb`).
    pub fn open(
        backend: &str,
        path: &str,
        sync_writes: bool,
    ) -> StorageResult<Self> {
        match backend.to_ascii_lowercase().as_str() {
            #[cfg(feature = "memory")]
            "memory" => {
                let _ = (path, sync_writes);
                Ok(DynRuntimeCache::Memory(MemoryRuntimeCache::new()))
            }
            #[cfg(feature = "redb")]
            "redb" => {
                let config = RedbConfig {
                    path: path.into(),
                    sync_writes,
                };
                Ok(DynRuntimeCache::Redb(RedbRuntimeCache::open(config)?))
            }
            other => Err(StorageError::Configuration(format!(
                "unsupported runtime cache backend '{other}'"
            ))),
        }
    }

    pub fn backend_name(&self) -> &'static str {
        match self {
            #[cfg(feature = "memory")]
            DynRuntimeCache::Memory(_) => "memory",
            #[cfg(feature = "redb")]
            DynRuntimeCache::Redb(_) => "redb",
        }
    }
}

macro_rules! delegate {
    ($self:ident, $s:ident => $call:expr) => {
        match $self {
            #[cfg(feature = "memory")]
            DynRuntimeCache::Memory($s) => $call,
            #[cfg(feature = "redb")]
            DynRuntimeCache::Redb($s) => $call,
        }
    };
}

#[async_trait::async_trait]
impl StorageHealth for DynRuntimeCache {
    async fn health(&self) -> StorageResult<()> {
        delegate!(self, s => s.health().await)
    }
}

#[async_trait::async_trait]
impl RuntimeStateCache for DynRuntimeCache {
    async fn create(&self, state: &RuntimeState) -> StorageResult<()> {
        delegate!(self, s => s.create(state).await)
    }

    async fn get(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<RuntimeState> {
        delegate!(self, s => s.get(identity).await)
    }

    async fn update_status(
        &self,
        identity: &RuntimeIdentity,
        status: RuntimeStatus,
    ) -> StorageResult<()> {
        delegate!(self, s => s.update_status(identity, status).await)
    }

    async fn update_status_if(
        &self,
        identity: &RuntimeIdentity,
        expected: &[RuntimeStatus],
        status: RuntimeStatus,
    ) -> StorageResult<bool> {
        delegate!(self, s => s.update_status_if(identity, expected, status).await)
    }

    async fn remove(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<Option<RuntimeState>> {
        delegate!(self, s => s.remove(identity).await)
    }

    async fn get_identities(
        &self,
    ) -> StorageResult<BTreeSet<RuntimeIdentity>> {
        delegate!(self, s => s.get_identities().await)
    }

    async fn add_machine(
        &self,
        identity: &RuntimeIdentity,
        machine: &MachineRecord,
    ) -> StorageResult<()> {
        delegate!(self, s => s.add_machine(identity, machine).await)
    }

    async fn update_machine_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        status: MachineStatus,
    ) -> StorageResult<()> {
        delegate!(self, s => s.update_machine_status(identity, machine, status).await)
    }

    async fn update_server_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
        status: ServerStatus,
    ) -> StorageResult<()> {
        delegate!(self, s => {
            s.update_server_status(identity, machine, server, status).await
        })
    }

    async fn get_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<BTreeMap<String, MachineRecord>> {
        delegate!(self, s => s.get_machines(identity).await)
    }

    async fn get_server(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
    ) -> StorageResult<ServerRecord> {
        delegate!(self, s => s.get_server(identity, machine, server).await)
    }

    async fn remove_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<()> {
        delegate!(self, s => s.remove_machines(identity).await)
    }
}

#[cfg(all(test, feature = "memory"))]
mod tests {
    use super::*;

    #[test]
    fn unknown_backend_is_a_configuration_error() {
        let err = DynRuntimeCache::open("etcd", "", false).err().unwrap();
        assert!(matches!(err, StorageError::Configuration(_)));
    }

    #[tokio::test]
    async fn memory_backend_delegates() {
        let cache = DynRuntimeCache::open("Memory", "", false).unwrap();
        assert_eq!(cache.backend_name(), "memory");
        let id = RuntimeIdentity::new("ws", "env", "owner");
        cache
            .create(&RuntimeState::new(id.clone(), "ns", RuntimeStatus::Starting))
            .await
            .unwrap();
        cache.update_status(&id, RuntimeStatus::Running).await.unwrap();
        assert_eq!(cache.get(&id).await.unwrap().status, RuntimeStatus::Running);
        cache.health().await.unwrap();
    }
}
