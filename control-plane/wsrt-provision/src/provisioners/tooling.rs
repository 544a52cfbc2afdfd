use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, ensure_mount, ensure_volume, upsert_env};
use crate::names::{DATA_VOLUME, ENV_PROJECTS_ROOT, slug};
use crate::provisioner::{ProvisionStage, Provisioner};
use crate::provisioners::volumes::data_volume;
use k8s_openapi::api::core::v1::VolumeMount;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity, attrs};

/// Mounts the workspace projects into tooling machines that ask for
/// sources.
#[derive(Debug)]
pub struct ToolingProjectsProvisioner {
    projects_root: String,
    claim: String,
}

impl ToolingProjectsProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            projects_root: config.projects_root.clone(),
            claim: config.pvc_name.clone(),
        }
    }
}

impl Provisioner for ToolingProjectsProvisioner {
    fn name(&self) -> &'static str {
        "tooling-projects"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::ToolingProjects
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        let sub_path = format!("{}/projects", slug(&identity.workspace_id));
        let wants = |m: &crate::infra::InternalMachineConfig| {
            m.is_flag_set(attrs::TOOLING) && m.is_flag_set(attrs::MOUNT_SOURCES)
        };
        infra.for_each_container(|_, machine, container| {
            if !wants(machine) {
                return;
            }
            ensure_mount(
                container,
                VolumeMount {
                    name: DATA_VOLUME.to_string(),
                    mount_path: self.projects_root.clone(),
                    sub_path: Some(sub_path.clone()),
                    ..Default::default()
                },
            );
            upsert_env(container, ENV_PROJECTS_ROOT, &self.projects_root);
        });
        infra.for_each_pod(|_, machines, spec| {
            if machines.iter().any(|m| wants(*m)) {
                ensure_volume(spec, data_volume(&self.claim));
            }
        });
        Ok(())
    }
}

/// Marks servers of tooling machines as tooling servers, internal unless
/// declared otherwise.
#[derive(Debug, Default)]
pub struct ToolingServersProvisioner;

impl Provisioner for ToolingServersProvisioner {
    fn name(&self) -> &'static str {
        "tooling-servers"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::ToolingServers
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for machine in infra.machines.values_mut() {
            if !machine.is_flag_set(attrs::TOOLING) {
                continue;
            }
            for server in machine.servers.values_mut() {
                server
                    .attributes
                    .insert(attrs::SERVER_TOOLING.into(), "true".into());
                server
                    .attributes
                    .entry(attrs::SERVER_INTERNAL.into())
                    .or_insert_with(|| "true".into());
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use wsrt_models::ServerConfig;

    #[test]
    fn tooling_machine_gets_projects() {
        let (env, mut infra) = single_machine(|m| {
            m.attributes.insert(attrs::TOOLING.into(), "true".into());
            m.attributes.insert(attrs::MOUNT_SOURCES.into(), "true".into());
        });
        let p = ToolingProjectsProvisioner::new(&ProvisionConfig::default());
        p.apply(&env, &mut infra, &identity()).unwrap();
        let c = dev_container(&infra);
        let mount = &c.volume_mounts.as_ref().unwrap()[0];
        assert_eq!(mount.mount_path, "/projects");
        assert_eq!(mount.sub_path.as_deref(), Some("ws-1/projects"));
        assert_eq!(c.env.as_ref().unwrap()[0].name, ENV_PROJECTS_ROOT);
    }

    #[test]
    fn explicit_external_flag_is_kept() {
        let (env, mut infra) = single_machine(|m| {
            m.attributes.insert(attrs::TOOLING.into(), "true".into());
            let mut public = ServerConfig::new("3000/tcp", "http");
            public
                .attributes
                .insert(attrs::SERVER_INTERNAL.into(), "false".into());
            m.servers.insert("ls".into(), ServerConfig::new("4000/tcp", "ws"));
            m.servers.insert("preview".into(), public);
        });
        ToolingServersProvisioner
            .apply(&env, &mut infra, &identity())
            .unwrap();
        let servers = &infra.machines["dev/dev"].servers;
        assert_eq!(servers["ls"].attributes[attrs::SERVER_INTERNAL], "true");
        assert_eq!(
            servers["preview"].attributes[attrs::SERVER_INTERNAL],
            "false"
        );
        assert_eq!(servers["preview"].attributes[attrs::SERVER_TOOLING], "true");
    }
}
