use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, ensure_mount, ensure_volume};
use crate::names::{DATA_VOLUME, slug};
use crate::provisioner::{ProvisionStage, Provisioner};
use k8s_openapi::api::core::v1::{
    PersistentVolumeClaimVolumeSource, Volume, VolumeMount,
};
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

/// Pod volume backed by the shared workspace claim.
pub(crate) fn data_volume(claim: &str) -> Volume {
    Volume {
        name: DATA_VOLUME.to_string(),
        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource {
            claim_name: claim.to_string(),
            ..Default::default()
        }),
        ..Default::default()
    }
}

/// Mounts machine volumes from one claim, each under its own sub-path.
#[derive(Debug)]
pub struct VolumesProvisioner {
    claim: String,
}

impl VolumesProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            claim: config.pvc_name.clone(),
        }
    }
}

impl Provisioner for VolumesProvisioner {
    fn name(&self) -> &'static str {
        "volumes"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::Volumes
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for (name, machine) in &infra.machines {
            for (volume, cfg) in &machine.volumes {
                if !cfg.path.starts_with('/') {
                    return Err(ProvisionError::config(format!(
                        "volume '{volume}' of machine '{name}' must have an \
                         absolute path, got '{}'",
                        cfg.path
                    )));
                }
            }
        }

        let workspace = slug(&identity.workspace_id);
        infra.for_each_container(|_, machine, container| {
            for (volume, cfg) in &machine.volumes {
                ensure_mount(
                    container,
                    VolumeMount {
                        name: DATA_VOLUME.to_string(),
                        mount_path: cfg.path.clone(),
                        sub_path: Some(format!("{workspace}/{}", slug(volume))),
                        ..Default::default()
                    },
                );
            }
        });
        infra.for_each_pod(|_, machines, spec| {
            if machines.iter().any(|m| !m.volumes.is_empty()) {
                ensure_volume(spec, data_volume(&self.claim));
            }
        });
        Ok(())
    }
}
