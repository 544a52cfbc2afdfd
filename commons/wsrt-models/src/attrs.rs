//! Well-known attribute keys shared between the environment descriptor,
//! the provisioners and the runtime records.

/// Declared port of a server record (`4401/tcp`).
pub const SERVER_PORT: &str = "port";
/// Server is reachable only inside the runtime network.
pub const SERVER_INTERNAL: &str = "internal";
/// Server belongs to a dev-tooling machine.
pub const SERVER_TOOLING: &str = "tooling";
/// Name of the Service port that exposes a server.
pub const SERVER_SERVICE_PORT: &str = "servicePort";

/// Memory limit of a machine in bytes.
pub const MEMORY_LIMIT: &str = "memoryLimitBytes";
/// Memory request of a machine in bytes.
pub const MEMORY_REQUEST: &str = "memoryRequestBytes";
/// Machine is a dev-tooling sidecar (plugin, language server, ...).
pub const TOOLING: &str = "tooling";
/// Tooling machine wants the workspace projects mounted.
pub const MOUNT_SOURCES: &str = "mountSources";
