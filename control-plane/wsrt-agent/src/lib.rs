//! Agent bootstrap: launch an agent inside a running machine, then poll its
//! liveness endpoint until it answers or the start budget runs out.

pub mod bootstrap;
pub mod config;
pub mod exec;
pub mod liveness;

pub use bootstrap::{AgentBootstrapper, BootstrapError, BootstrapReport};
pub use config::BootstrapConfig;
pub use exec::{CommandExecutor, ExecError, ExecTarget};
pub use liveness::{LivenessClient, LivenessError, ReqwestLivenessClient};
