use crate::error::StorageError;
use crate::traits::*;
use async_trait::async_trait;
use scc::HashMap;
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use wsrt_models::{
    MachineRecord, MachineStatus, RuntimeIdentity, RuntimeState,
    RuntimeStatus, ServerRecord, ServerStatus,
};

#[derive(Debug, Clone)]
struct RuntimeEntry {
    state: RuntimeState,
    machines: BTreeMap<String, MachineRecord>,
}

/// In-process cache. Each identity lives in its own bucket entry, so every
/// mutation below is a single bucket-locked read-modify-write.
#[derive(Clone, Default)]
pub struct MemoryRuntimeCache {
    store: Arc<HashMap<RuntimeIdentity, RuntimeEntry>>,
}

impl MemoryRuntimeCache {
    pub fn new() -> Self {
        Self::default()
    }

    async fn modify<R>(
        &self,
        identity: &RuntimeIdentity,
        f: impl FnOnce(&mut RuntimeEntry) -> StorageResult<R>,
    ) -> StorageResult<R> {
        self.store
            .update_async(identity, |_, entry| f(entry))
            .await
            .unwrap_or_else(|| {
                Err(StorageError::NotFound(identity.to_string()))
            })
    }
}

#[async_trait]
impl StorageHealth for MemoryRuntimeCache {
    async fn health(&self) -> StorageResult<()> {
        Ok(())
    }
}

#[async_trait]
impl RuntimeStateCache for MemoryRuntimeCache {
    async fn create(&self, state: &RuntimeState) -> StorageResult<()> {
        let entry = RuntimeEntry {
            state: state.clone(),
            machines: BTreeMap::new(),
        };
        self.store
            .insert_async(state.identity.clone(), entry)
            .await
            .map_err(|(id, _)| StorageError::AlreadyExists(id.to_string()))
    }

    async fn get(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<RuntimeState> {
        self.store
            .read_async(identity, |_, entry| entry.state.clone())
            .await
            .ok_or_else(|| StorageError::NotFound(identity.to_string()))
    }

    async fn update_status(
        &self,
        identity: &RuntimeIdentity,
        status: RuntimeStatus,
    ) -> StorageResult<()> {
        self.modify(identity, |entry| {
            entry.state.status = status;
            Ok(())
        })
        .await
    }

    async fn update_status_if(
        &self,
        identity: &RuntimeIdentity,
        expected: &[RuntimeStatus],
        status: RuntimeStatus,
    ) -> StorageResult<bool> {
        self.modify(identity, |entry| {
            if expected.contains(&entry.state.status) {
                entry.state.status = status;
                Ok(true)
            } else {
                Ok(false)
            }
        })
        .await
    }

    async fn remove(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<Option<RuntimeState>> {
        Ok(self
            .store
            .remove_async(identity)
            .await
            .map(|(_, entry)| entry.state))
    }

    async fn get_identities(
        &self,
    ) -> StorageResult<BTreeSet<RuntimeIdentity>> {
        let mut out = BTreeSet::new();
        self.store
            .scan_async(|id, _| {
                out.insert(id.clone());
            })
            .await;
        Ok(out)
    }

    async fn add_machine(
        &self,
        identity: &RuntimeIdentity,
        machine: &MachineRecord,
    ) -> StorageResult<()> {
        self.modify(identity, |entry| {
            entry.machines.insert(machine.name.clone(), machine.clone());
            Ok(())
        })
        .await
    }

    async fn update_machine_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        status: MachineStatus,
    ) -> StorageResult<()> {
        self.modify(identity, |entry| {
            let m = entry
                .machines
                .get_mut(machine)
                .ok_or_else(|| machine_not_found(identity, machine))?;
            m.status = status;
            Ok(())
        })
        .await
    }

    async fn update_server_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
        status: ServerStatus,
    ) -> StorageResult<()> {
        self.modify(identity, |entry| {
            let s = entry
                .machines
                .get_mut(machine)
                .ok_or_else(|| machine_not_found(identity, machine))?
                .servers
                .get_mut(server)
                .ok_or_else(|| server_not_found(identity, machine, server))?;
            s.status = status;
            Ok(())
        })
        .await
    }

    async fn get_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<BTreeMap<String, MachineRecord>> {
        self.store
            .read_async(identity, |_, entry| entry.machines.clone())
            .await
            .ok_or_else(|| StorageError::NotFound(identity.to_string()))
    }

    async fn get_server(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
    ) -> StorageResult<ServerRecord> {
        self.store
            .read_async(identity, |_, entry| {
                entry
                    .machines
                    .get(machine)
                    .ok_or_else(|| machine_not_found(identity, machine))?
                    .servers
                    .get(server)
                    .cloned()
                    .ok_or_else(|| server_not_found(identity, machine, server))
            })
            .await
            .unwrap_or_else(|| {
                Err(StorageError::NotFound(identity.to_string()))
            })
    }

    async fn remove_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<()> {
        self.store
            .update_async(identity, |_, entry| entry.machines.clear())
            .await;
        Ok(())
    }
}
