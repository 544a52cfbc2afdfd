//! Turns an abstract workspace environment into a Kubernetes-shaped infra
//! environment by running an ordered pipeline of provisioners.

pub mod config;
pub mod error;
pub mod factory;
pub mod infra;
pub mod names;
pub mod pipeline;
pub mod provisioner;
pub mod provisioners;

pub use config::ProvisionConfig;
pub use error::{ProvisionError, StageFailure};
pub use factory::EnvironmentFactory;
pub use infra::{InfraEnvironment, InternalMachineConfig, machine_name};
pub use pipeline::{PipelineBuilder, ProvisioningPipeline};
pub use provisioner::{ProvisionStage, Provisioner};

#[cfg(test)]
pub(crate) mod test_support {
    use crate::factory::EnvironmentFactory;
    use crate::infra::InfraEnvironment;
    use k8s_openapi::api::core::v1::Container;
    use wsrt_models::{
        AgentConfig, EnvironmentConfig, MachineConfig, Recipe, RuntimeIdentity,
    };

    pub fn identity() -> RuntimeIdentity {
        RuntimeIdentity::new("ws-1", "default", "owner-1")
    }

    pub fn ws_agent() -> AgentConfig {
        AgentConfig {
            id: "wsagent".into(),
            run_script: "/mnt/wsrt/agents/wsagent/start.sh".into(),
            port: "4401/tcp".into(),
            ping_path: Some("/api/liveness".into()),
        }
    }

    /// Docker-image environment with one machine `dev`, i.e. pod `dev` and
    /// machine key `dev/dev`.
    pub fn single_machine(
        f: impl FnOnce(&mut MachineConfig),
    ) -> (EnvironmentConfig, InfraEnvironment) {
        let mut machine = MachineConfig::default();
        f(&mut machine);
        let mut env = EnvironmentConfig {
            recipe: Recipe::docker_image("example/dev:latest"),
            ..Default::default()
        };
        env.machines.insert("dev".into(), machine);
        let infra = EnvironmentFactory.create(&env).unwrap();
        (env, infra)
    }

    pub fn dev_container(infra: &InfraEnvironment) -> &Container {
        &infra.pods["dev"].spec.as_ref().unwrap().containers[0]
    }
}
