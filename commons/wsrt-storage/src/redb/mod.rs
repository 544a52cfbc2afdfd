use crate::error::StorageError;
use crate::traits::*;
use async_trait::async_trait;
use redb::{
    Database, Durability, ReadableDatabase, ReadableTable, TableDefinition,
    WriteTransaction,
};
use serde::{Serialize, de::DeserializeOwned};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Bound;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use wsrt_models::{
    MachineRecord, MachineStatus, RuntimeIdentity, RuntimeState,
    RuntimeStatus, ServerRecord, ServerStatus,
};

type Table = TableDefinition<'static, &'static [u8], &'static [u8]>;

const RUNTIMES: Table = TableDefinition::new("runtimes");
const MACHINES: Table = TableDefinition::new("machines");
const SERVERS: Table = TableDefinition::new("servers");

#[derive(Debug, Clone)]
pub struct RedbConfig {
    pub path: PathBuf,
    /// When false, commits skip fsync.
    pub sync_writes: bool,
}

impl RedbConfig {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            sync_writes: true,
        }
    }
}

/// Durable cache on a single redb file.
///
/// Runtimes, machines and servers live in three tables. Keys are built from
/// length-prefixed segments, so a runtime key is a strict prefix of the keys
/// of its machines and servers and a prefix range never leaks into another
/// identity. Every operation runs in one transaction; redb serializes
/// writers, which makes each per-identity read-modify-write atomic.
pub struct RedbRuntimeCache {
    db: Database,
    config: RedbConfig,
}

fn backend(e: impl std::fmt::Display) -> StorageError {
    StorageError::backend(e.to_string())
}

fn push_segment(buf: &mut Vec<u8>, segment: &str) {
    buf.extend_from_slice(&(segment.len() as u32).to_be_bytes());
    buf.extend_from_slice(segment.as_bytes());
}

fn runtime_key(identity: &RuntimeIdentity) -> Vec<u8> {
    let mut key = Vec::new();
    push_segment(&mut key, &identity.workspace_id);
    push_segment(&mut key, &identity.env_name);
    push_segment(&mut key, &identity.owner_id);
    key
}

fn machine_key(identity: &RuntimeIdentity, machine: &str) -> Vec<u8> {
    let mut key = runtime_key(identity);
    push_segment(&mut key, machine);
    key
}

fn server_key(
    identity: &RuntimeIdentity,
    machine: &str,
    server: &str,
) -> Vec<u8> {
    let mut key = machine_key(identity, machine);
    push_segment(&mut key, server);
    key
}

/// Splits a key suffix back into its segments.
fn segments(mut bytes: &[u8]) -> StorageResult<Vec<String>> {
    let mut out = Vec::new();
    while !bytes.is_empty() {
        if bytes.len() < 4 {
            return Err(StorageError::backend("truncated key segment"));
        }
        let (len, rest) = bytes.split_at(4);
        let len = u32::from_be_bytes([len[0], len[1], len[2], len[3]]) as usize;
        if rest.len() < len {
            return Err(StorageError::backend("truncated key segment"));
        }
        let (segment, rest) = rest.split_at(len);
        out.push(String::from_utf8(segment.to_vec()).map_err(backend)?);
        bytes = rest;
    }
    Ok(out)
}

fn upper_bound(prefix: &[u8]) -> Option<Vec<u8>> {
    let mut end = prefix.to_vec();
    while let Some(last) = end.pop() {
        if last < u8::MAX {
            end.push(last + 1);
            return Some(end);
        }
    }
    None
}

fn encode<T: Serialize>(value: &T) -> StorageResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

fn decode<T: DeserializeOwned>(bytes: &[u8]) -> StorageResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}

/// Collects `(key, value)` pairs whose key starts with `prefix`.
fn scan_prefix<T: ReadableTable<&'static [u8], &'static [u8]>>(
    table: &T,
    prefix: &[u8],
) -> StorageResult<Vec<(Vec<u8>, Vec<u8>)>> {
    let end = upper_bound(prefix);
    let end_bound: Bound<&[u8]> = match end {
        None => Bound::Unbounded,
        Some(ref v) => Bound::Excluded(v.as_slice()),
    };
    let mut out = Vec::new();
    for item in table
        .range::<&[u8]>((Bound::Included(prefix), end_bound))
        .map_err(backend)?
    {
        let (k, v) = item.map_err(backend)?;
        out.push((k.value().to_vec(), v.value().to_vec()));
    }
    Ok(out)
}

impl RedbRuntimeCache {
    /// Opens the database file, creating it and its tables when missing.
    pub fn open(config: RedbConfig) -> StorageResult<Self> {
        let path = config.path.as_path();
        let builder = Database::builder();
        let db = if path.exists() {
            builder.open(path).map_err(backend)?
        } else {
            if let Some(parent) = Path::new(path).parent() {
                if !parent.as_os_str().is_empty() {
                    std::fs::create_dir_all(parent)?;
                }
            }
            builder.create(path).map_err(backend)?
        };

        {
            let wtxn = db.begin_write().map_err(backend)?;
            wtxn.open_table(RUNTIMES).map_err(backend)?;
            wtxn.open_table(MACHINES).map_err(backend)?;
            wtxn.open_table(SERVERS).map_err(backend)?;
            wtxn.commit().map_err(backend)?;
        }
        info!(path = %config.path.display(), "opened redb runtime cache");
        Ok(Self { db, config })
    }

    fn begin_write(&self) -> StorageResult<WriteTransaction> {
        let mut wtxn = self.db.begin_write().map_err(backend)?;
        if !self.config.sync_writes {
            let _ = wtxn.set_durability(Durability::None);
        }
        Ok(wtxn)
    }

    /// Runs `f` inside one write transaction and commits when it succeeds.
    fn write<R>(
        &self,
        f: impl FnOnce(&WriteTransaction) -> StorageResult<R>,
    ) -> StorageResult<R> {
        let wtxn = self.begin_write()?;
        let out = f(&wtxn)?;
        wtxn.commit().map_err(backend)?;
        Ok(out)
    }

    fn require_runtime(
        wtxn: &WriteTransaction,
        identity: &RuntimeIdentity,
    ) -> StorageResult<RuntimeState> {
        let table = wtxn.open_table(RUNTIMES).map_err(backend)?;
        let row = table
            .get(runtime_key(identity).as_slice())
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(identity.to_string()))?;
        decode(row.value())
    }

    fn put_runtime(
        wtxn: &WriteTransaction,
        state: &RuntimeState,
    ) -> StorageResult<()> {
        let key = runtime_key(&state.identity);
        let mut table = wtxn.open_table(RUNTIMES).map_err(backend)?;
        table
            .insert(key.as_slice(), encode(state)?.as_slice())
            .map_err(backend)?;
        Ok(())
    }

    fn delete_prefix(
        wtxn: &WriteTransaction,
        def: Table,
        prefix: &[u8],
    ) -> StorageResult<usize> {
        let mut table = wtxn.open_table(def).map_err(backend)?;
        let keys: Vec<Vec<u8>> = scan_prefix(&table, prefix)?
            .into_iter()
            .map(|(k, _)| k)
            .collect();
        for key in &keys {
            table.remove(key.as_slice()).map_err(backend)?;
        }
        Ok(keys.len())
    }
}

#[async_trait]
impl StorageHealth for RedbRuntimeCache {
    async fn health(&self) -> StorageResult<()> {
        let rtxn = self.db.begin_read().map_err(backend)?;
        rtxn.open_table(RUNTIMES).map_err(backend)?;
        Ok(())
    }
}

#[async_trait]
impl RuntimeStateCache for RedbRuntimeCache {
    async fn create(&self, state: &RuntimeState) -> StorageResult<()> {
        self.write(|wtxn| {
            let key = runtime_key(&state.identity);
            let mut table = wtxn.open_table(RUNTIMES).map_err(backend)?;
            if table.get(key.as_slice()).map_err(backend)?.is_some() {
                return Err(StorageError::AlreadyExists(
                    state.identity.to_string(),
                ));
            }
            table
                .insert(key.as_slice(), encode(state)?.as_slice())
                .map_err(backend)?;
            Ok(())
        })
    }

    async fn get(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<RuntimeState> {
        let rtxn = self.db.begin_read().map_err(backend)?;
        let table = rtxn.open_table(RUNTIMES).map_err(backend)?;
        let row = table
            .get(runtime_key(identity).as_slice())
            .map_err(backend)?
            .ok_or_else(|| StorageError::NotFound(identity.to_string()))?;
        decode(row.value())
    }

    async fn update_status(
        &self,
        identity: &RuntimeIdentity,
        status: RuntimeStatus,
    ) -> StorageResult<()> {
        self.write(|wtxn| {
            let mut state = Self::require_runtime(wtxn, identity)?;
            state.status = status;
            Self::put_runtime(wtxn, &state)
        })
    }

    async fn update_status_if(
        &self,
        identity: &RuntimeIdentity,
        expected: &[RuntimeStatus],
        status: RuntimeStatus,
    ) -> StorageResult<bool> {
        self.write(|wtxn| {
            let mut state = Self::require_runtime(wtxn, identity)?;
            if !expected.contains(&state.status) {
                return Ok(false);
            }
            state.status = status;
            Self::put_runtime(wtxn, &state)?;
            Ok(true)
        })
    }

    async fn remove(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<Option<RuntimeState>> {
        let prefix = runtime_key(identity);
        self.write(|wtxn| {
            let removed = {
                let mut table = wtxn.open_table(RUNTIMES).map_err(backend)?;
                let prev = table.remove(prefix.as_slice()).map_err(backend)?;
                match prev {
                    Some(row) => Some(decode::<RuntimeState>(row.value())?),
                    None => None,
                }
            };
            let machines = Self::delete_prefix(wtxn, MACHINES, &prefix)?;
            let servers = Self::delete_prefix(wtxn, SERVERS, &prefix)?;
            debug!(%identity, machines, servers, "removed runtime rows");
            Ok(removed)
        })
    }

    async fn get_identities(
        &self,
    ) -> StorageResult<BTreeSet<RuntimeIdentity>> {
        let rtxn = self.db.begin_read().map_err(backend)?;
        let table = rtxn.open_table(RUNTIMES).map_err(backend)?;
        let mut out = BTreeSet::new();
        for item in table.iter().map_err(backend)? {
            let (_, v) = item.map_err(backend)?;
            let state: RuntimeState = decode(v.value())?;
            out.insert(state.identity);
        }
        Ok(out)
    }

    async fn add_machine(
        &self,
        identity: &RuntimeIdentity,
        machine: &MachineRecord,
    ) -> StorageResult<()> {
        self.write(|wtxn| {
            Self::require_runtime(wtxn, identity)?;
            let key = machine_key(identity, &machine.name);
            // Replacing a machine drops its previous servers.
            Self::delete_prefix(wtxn, SERVERS, &key)?;

            let row = MachineRecord {
                servers: BTreeMap::new(),
                ..machine.clone()
            };
            let mut machines = wtxn.open_table(MACHINES).map_err(backend)?;
            machines
                .insert(key.as_slice(), encode(&row)?.as_slice())
                .map_err(backend)?;

            let mut servers = wtxn.open_table(SERVERS).map_err(backend)?;
            for (name, server) in &machine.servers {
                servers
                    .insert(
                        server_key(identity, &machine.name, name).as_slice(),
                        encode(server)?.as_slice(),
                    )
                    .map_err(backend)?;
            }
            Ok(())
        })
    }

    async fn update_machine_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        status: MachineStatus,
    ) -> StorageResult<()> {
        self.write(|wtxn| {
            let key = machine_key(identity, machine);
            let mut table = wtxn.open_table(MACHINES).map_err(backend)?;
            let mut row: MachineRecord = {
                let guard = table
                    .get(key.as_slice())
                    .map_err(backend)?
                    .ok_or_else(|| machine_not_found(identity, machine))?;
                decode(guard.value())?
            };
            row.status = status;
            table
                .insert(key.as_slice(), encode(&row)?.as_slice())
                .map_err(backend)?;
            Ok(())
        })
    }

    async fn update_server_status(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
        status: ServerStatus,
    ) -> StorageResult<()> {
        self.write(|wtxn| {
            let key = server_key(identity, machine, server);
            let mut table = wtxn.open_table(SERVERS).map_err(backend)?;
            let mut row: ServerRecord = {
                let guard = table
                    .get(key.as_slice())
                    .map_err(backend)?
                    .ok_or_else(|| server_not_found(identity, machine, server))?;
                decode(guard.value())?
            };
            row.status = status;
            table
                .insert(key.as_slice(), encode(&row)?.as_slice())
                .map_err(backend)?;
            Ok(())
        })
    }

    async fn get_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<BTreeMap<String, MachineRecord>> {
        let prefix = runtime_key(identity);
        let rtxn = self.db.begin_read().map_err(backend)?;
        {
            let runtimes = rtxn.open_table(RUNTIMES).map_err(backend)?;
            if runtimes.get(prefix.as_slice()).map_err(backend)?.is_none() {
                return Err(StorageError::NotFound(identity.to_string()));
            }
        }

        let mut out = BTreeMap::new();
        let machines = rtxn.open_table(MACHINES).map_err(backend)?;
        for (_, v) in scan_prefix(&machines, &prefix)? {
            let record: MachineRecord = decode(&v)?;
            out.insert(record.name.clone(), record);
        }

        let servers = rtxn.open_table(SERVERS).map_err(backend)?;
        for (k, v) in scan_prefix(&servers, &prefix)? {
            let parts = segments(&k[prefix.len()..])?;
            let [machine, server] = parts.as_slice() else {
                return Err(StorageError::backend("malformed server key"));
            };
            if let Some(record) = out.get_mut(machine) {
                record.servers.insert(server.clone(), decode(&v)?);
            }
        }
        Ok(out)
    }

    async fn get_server(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
    ) -> StorageResult<ServerRecord> {
        let rtxn = self.db.begin_read().map_err(backend)?;
        let table = rtxn.open_table(SERVERS).map_err(backend)?;
        let row = table
            .get(server_key(identity, machine, server).as_slice())
            .map_err(backend)?
            .ok_or_else(|| server_not_found(identity, machine, server))?;
        decode(row.value())
    }

    async fn remove_machines(
        &self,
        identity: &RuntimeIdentity,
    ) -> StorageResult<()> {
        let prefix = runtime_key(identity);
        self.write(|wtxn| {
            Self::delete_prefix(wtxn, MACHINES, &prefix)?;
            Self::delete_prefix(wtxn, SERVERS, &prefix)?;
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn keys_do_not_collide_across_segment_boundaries() {
        let a = RuntimeIdentity::new("ab", "c", "d");
        let b = RuntimeIdentity::new("a", "bc", "d");
        assert_ne!(runtime_key(&a), runtime_key(&b));
        assert!(!machine_key(&b, "m").starts_with(&runtime_key(&a)));
    }

    #[test]
    fn machine_keys_extend_runtime_key() {
        let id = RuntimeIdentity::new("ws", "env", "owner");
        let key = server_key(&id, "pod/dev", "wsagent/http");
        assert!(key.starts_with(&machine_key(&id, "pod/dev")));
        let parts = segments(&key[runtime_key(&id).len()..]).unwrap();
        assert_eq!(parts, vec!["pod/dev", "wsagent/http"]);
    }

    #[test]
    fn upper_bound_carries_over_max_bytes() {
        assert_eq!(upper_bound(&[1, 2]), Some(vec![1, 3]));
        assert_eq!(upper_bound(&[1, 0xff]), Some(vec![2]));
        assert_eq!(upper_bound(&[0xff, 0xff]), None);
    }
}
