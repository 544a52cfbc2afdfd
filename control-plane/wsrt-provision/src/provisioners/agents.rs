use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, ensure_mount, ensure_volume};
use crate::names::AGENTS_VOLUME;
use crate::provisioner::{ProvisionStage, Provisioner};
use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, Volume, VolumeMount};
use validator::Validate;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

/// Gives containers that run agents a read-only mount with the agent
/// binaries.
#[derive(Debug)]
pub struct AgentBinariesProvisioner {
    path: String,
}

impl AgentBinariesProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            path: config.agents_path.clone(),
        }
    }
}

impl Provisioner for AgentBinariesProvisioner {
    fn name(&self) -> &'static str {
        "agent-binaries"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::AgentBinaries
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for (name, machine) in &infra.machines {
            for agent in &machine.agents {
                agent.validate().map_err(|e| {
                    ProvisionError::config(format!(
                        "agent of machine '{name}' is invalid: {e}"
                    ))
                })?;
            }
        }

        infra.for_each_container(|_, machine, container| {
            if machine.agents.is_empty() {
                return;
            }
            ensure_mount(
                container,
                VolumeMount {
                    name: AGENTS_VOLUME.to_string(),
                    mount_path: self.path.clone(),
                    read_only: Some(true),
                    ..Default::default()
                },
            );
        });
        infra.for_each_pod(|_, machines, spec| {
            if machines.iter().any(|m| !m.agents.is_empty()) {
                ensure_volume(
                    spec,
                    Volume {
                        name: AGENTS_VOLUME.to_string(),
                        empty_dir: Some(EmptyDirVolumeSource::default()),
                        ..Default::default()
                    },
                );
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use wsrt_models::AgentConfig;

    #[test]
    fn only_agent_machines_get_the_mount() {
        let (env, mut infra) = single_machine(|_| {});
        let p = AgentBinariesProvisioner::new(&ProvisionConfig::default());
        p.apply(&env, &mut infra, &identity()).unwrap();
        assert!(dev_container(&infra).volume_mounts.is_none());

        let (env, mut infra) = single_machine(|m| m.agents.push(ws_agent()));
        p.apply(&env, &mut infra, &identity()).unwrap();
        let mounts = dev_container(&infra).volume_mounts.clone().unwrap();
        assert_eq!(mounts[0].mount_path, "/mnt/wsrt/agents");
        assert_eq!(mounts[0].read_only, Some(true));
    }

    #[test]
    fn agent_without_script_is_rejected() {
        let (env, mut infra) = single_machine(|m| {
            m.agents.push(AgentConfig {
                run_script: String::new(),
                ..ws_agent()
            })
        });
        let p = AgentBinariesProvisioner::new(&ProvisionConfig::default());
        assert!(matches!(
            p.apply(&env, &mut infra, &identity()),
            Err(ProvisionError::Configuration(_))
        ));
    }
}
