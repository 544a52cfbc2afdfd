use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::InfraEnvironment;
use crate::provisioner::{ProvisionStage, Provisioner};
use k8s_openapi::api::core::v1::ResourceRequirements;
use k8s_openapi::apimachinery::pkg::api::resource::Quantity;
use std::collections::BTreeMap;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity, attrs};

/// Applies memory limit and request per container, taken from machine
/// attributes or the configured defaults. The resolved values are written
/// back into the machine attributes.
#[derive(Debug)]
pub struct ResourcesProvisioner {
    default_limit: u64,
    default_request: u64,
}

impl ResourcesProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            default_limit: config.default_memory_limit,
            default_request: config.default_memory_request,
        }
    }
}

fn parse_bytes(
    machine: &str,
    key: &str,
    raw: Option<&String>,
) -> Result<Option<u64>, ProvisionError> {
    raw.map(|v| {
        v.trim().parse::<u64>().map_err(|_| {
            ProvisionError::config(format!(
                "machine '{machine}' has invalid {key} '{v}'"
            ))
        })
    })
    .transpose()
}

impl Provisioner for ResourcesProvisioner {
    fn name(&self) -> &'static str {
        "resources"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::Resources
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for (name, machine) in infra.machines.iter_mut() {
            let limit = parse_bytes(
                name,
                attrs::MEMORY_LIMIT,
                machine.attributes.get(attrs::MEMORY_LIMIT),
            )?
            .unwrap_or(self.default_limit);
            let request = parse_bytes(
                name,
                attrs::MEMORY_REQUEST,
                machine.attributes.get(attrs::MEMORY_REQUEST),
            )?
            .unwrap_or(self.default_request)
            .min(limit);
            machine
                .attributes
                .insert(attrs::MEMORY_LIMIT.into(), limit.to_string());
            machine
                .attributes
                .insert(attrs::MEMORY_REQUEST.into(), request.to_string());
        }

        infra.for_each_container(|_, machine, container| {
            let resources = container
                .resources
                .get_or_insert_with(ResourceRequirements::default);
            for (key, target) in [
                (attrs::MEMORY_LIMIT, &mut resources.limits),
                (attrs::MEMORY_REQUEST, &mut resources.requests),
            ] {
                if let Some(bytes) = machine.attributes.get(key) {
                    target
                        .get_or_insert_with(BTreeMap::new)
                        .insert("memory".into(), Quantity(bytes.clone()));
                }
            }
        });
        Ok(())
    }
}
