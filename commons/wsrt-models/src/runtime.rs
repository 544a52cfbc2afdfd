use crate::identity::RuntimeIdentity;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum RuntimeStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
}

impl RuntimeStatus {
    /// Statuses that claim live infrastructure behind them.
    pub fn is_active(self) -> bool {
        matches!(self, RuntimeStatus::Starting | RuntimeStatus::Running)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RuntimeState {
    pub identity: RuntimeIdentity,
    /// Infrastructure namespace the runtime lives in.
    pub namespace: String,
    pub status: RuntimeStatus,
}

impl RuntimeState {
    pub fn new(
        identity: RuntimeIdentity,
        namespace: impl Into<String>,
        status: RuntimeStatus,
    ) -> Self {
        Self {
            identity,
            namespace: namespace.into(),
            status,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum MachineStatus {
    Starting,
    Running,
    Stopped,
    Failed,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum ServerStatus {
    Unknown,
    Starting,
    Running,
    Stopped,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ServerRecord {
    pub url: String,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    pub status: ServerStatus,
}

impl ServerRecord {
    pub fn new(url: impl Into<String>, port: impl Into<String>) -> Self {
        let mut attributes = BTreeMap::new();
        attributes.insert(crate::attrs::SERVER_PORT.to_string(), port.into());
        Self {
            url: url.into(),
            attributes,
            status: ServerStatus::Unknown,
        }
    }

    /// Declared port, e.g. `4401/tcp`.
    pub fn port(&self) -> Option<&str> {
        self.attributes
            .get(crate::attrs::SERVER_PORT)
            .map(String::as_str)
    }
}

/// One container of a runtime, as observed after the infrastructure
/// materialized it.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MachineRecord {
    pub name: String,
    pub pod_name: String,
    pub container_name: String,
    pub status: MachineStatus,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerRecord>,
}

impl MachineRecord {
    /// Finds the server declared on the given port.
    ///
    /// Ports are compared without the protocol suffix when one side omits
    /// it, so `4401` matches `4401/tcp`.
    pub fn server_on_port(&self, port: &str) -> Option<(&str, &ServerRecord)> {
        let wanted = port_number(port);
        self.servers
            .iter()
            .find(|(_, s)| s.port().map(port_number) == Some(wanted))
            .map(|(name, s)| (name.as_str(), s))
    }
}

fn port_number(port: &str) -> &str {
    port.split('/').next().unwrap_or(port)
}
