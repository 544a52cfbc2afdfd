use crate::error::ProvisionError;
use crate::infra::InfraEnvironment;
use std::fmt;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

/// Position of a provisioner in the pipeline. Later stages read what
/// earlier ones wrote, so the variant order is the invocation order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ProvisionStage {
    Servers,
    EnvVars,
    Volumes,
    Resources,
    Labels,
    AgentBinaries,
    ToolingProjects,
    ToolingServers,
    SystemSettings,
    ApiHostEnv,
    Ingress,
}

impl ProvisionStage {
    pub const ORDER: [ProvisionStage; 11] = [
        ProvisionStage::Servers,
        ProvisionStage::EnvVars,
        ProvisionStage::Volumes,
        ProvisionStage::Resources,
        ProvisionStage::Labels,
        ProvisionStage::AgentBinaries,
        ProvisionStage::ToolingProjects,
        ProvisionStage::ToolingServers,
        ProvisionStage::SystemSettings,
        ProvisionStage::ApiHostEnv,
        ProvisionStage::Ingress,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ProvisionStage::Servers => "servers",
            ProvisionStage::EnvVars => "env-vars",
            ProvisionStage::Volumes => "volumes",
            ProvisionStage::Resources => "resources",
            ProvisionStage::Labels => "labels",
            ProvisionStage::AgentBinaries => "agent-binaries",
            ProvisionStage::ToolingProjects => "tooling-projects",
            ProvisionStage::ToolingServers => "tooling-servers",
            ProvisionStage::SystemSettings => "system-settings",
            ProvisionStage::ApiHostEnv => "api-host-env",
            ProvisionStage::Ingress => "ingress",
        }
    }
}

impl fmt::Display for ProvisionStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One idempotent transformation of the infra environment.
///
/// Implementations touch nothing but `infra`: anything they need from the
/// outside world is handed to them at construction time.
pub trait Provisioner: fmt::Debug + Send + Sync {
    fn name(&self) -> &'static str;

    fn stage(&self) -> ProvisionStage;

    fn apply(
        &self,
        env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_matches_variant_order() {
        let mut sorted = ProvisionStage::ORDER;
        sorted.sort();
        assert_eq!(sorted, ProvisionStage::ORDER);
        assert_eq!(ProvisionStage::ORDER[0], ProvisionStage::Servers);
        assert_eq!(ProvisionStage::ORDER[10], ProvisionStage::Ingress);
    }
}
