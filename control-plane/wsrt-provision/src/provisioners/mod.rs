mod agents;
mod api_host;
mod env_vars;
mod ingress;
mod labels;
mod resources;
mod servers;
mod system;
mod tooling;
mod volumes;

pub use agents::AgentBinariesProvisioner;
pub use api_host::ApiHostEnvProvisioner;
pub use env_vars::EnvVarsProvisioner;
pub use ingress::IngressProvisioner;
pub use labels::{LabelsProvisioner, UniqueNamesProvisioner};
pub use resources::ResourcesProvisioner;
pub use servers::{ServersProvisioner, service_name};
pub use system::{
    ImagePullPolicyProvisioner, MachineTokenProvisioner,
    PodTerminationProvisioner, ProxySettingsProvisioner,
    ServiceAccountProvisioner,
};
pub use tooling::{ToolingProjectsProvisioner, ToolingServersProvisioner};
pub use volumes::VolumesProvisioner;
