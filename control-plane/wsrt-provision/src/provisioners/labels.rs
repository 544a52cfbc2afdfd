use crate::error::ProvisionError;
use crate::infra::InfraEnvironment;
use crate::names::{
    LABEL_ENV_NAME, LABEL_OWNER_ID, LABEL_WORKSPACE_ID, workspace_scoped,
};
use crate::provisioner::{ProvisionStage, Provisioner};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

fn runtime_labels(identity: &RuntimeIdentity) -> [(&'static str, &str); 3] {
    [
        (LABEL_WORKSPACE_ID, identity.workspace_id.as_str()),
        (LABEL_ENV_NAME, identity.env_name.as_str()),
        (LABEL_OWNER_ID, identity.owner_id.as_str()),
    ]
}

fn label(meta: &mut ObjectMeta, identity: &RuntimeIdentity) {
    let labels = meta.labels.get_or_insert_with(BTreeMap::new);
    for (k, v) in runtime_labels(identity) {
        labels.insert(k.to_string(), v.to_string());
    }
}

/// Tags pods and services with the runtime identity and narrows service
/// selectors to this workspace's pods.
#[derive(Debug, Default)]
pub struct LabelsProvisioner;

impl Provisioner for LabelsProvisioner {
    fn name(&self) -> &'static str {
        "labels"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::Labels
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for pod in infra.pods.values_mut() {
            label(&mut pod.metadata, identity);
        }
        for service in infra.services.values_mut() {
            label(&mut service.metadata, identity);
            if let Some(spec) = service.spec.as_mut() {
                spec.selector
                    .get_or_insert_with(BTreeMap::new)
                    .insert(
                        LABEL_WORKSPACE_ID.into(),
                        identity.workspace_id.clone(),
                    );
            }
        }
        Ok(())
    }
}

/// Renames pods to `<workspace>-<pod>` so runtimes sharing a namespace
/// never collide. Pods stay keyed by their recipe name, which machine names
/// are built from; services and ingresses are created with scoped names.
#[derive(Debug, Default)]
pub struct UniqueNamesProvisioner;

impl Provisioner for UniqueNamesProvisioner {
    fn name(&self) -> &'static str {
        "unique-names"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::Labels
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for (key, pod) in infra.pods.iter_mut() {
            pod.metadata.name = Some(workspace_scoped(identity, key));
        }
        Ok(())
    }
}
