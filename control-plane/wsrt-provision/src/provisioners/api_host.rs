use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, has_env, upsert_env};
use crate::names::ENV_API_ENDPOINT;
use crate::provisioner::{ProvisionStage, Provisioner};
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

/// Tells containers where the engine API lives. A value already present,
/// e.g. from machine env vars, wins.
#[derive(Debug)]
pub struct ApiHostEnvProvisioner {
    endpoint: String,
}

impl ApiHostEnvProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            endpoint: config.api_endpoint.clone(),
        }
    }
}

impl Provisioner for ApiHostEnvProvisioner {
    fn name(&self) -> &'static str {
        "api-host-env"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::ApiHostEnv
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        infra.for_each_container(|_, _, container| {
            if !has_env(container, ENV_API_ENDPOINT) {
                upsert_env(container, ENV_API_ENDPOINT, &self.endpoint);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provisioners::EnvVarsProvisioner;
    use crate::test_support::*;

    #[test]
    fn existing_value_is_not_overridden() {
        let (env, mut infra) = single_machine(|m| {
            m.env.insert(ENV_API_ENDPOINT.into(), "http://custom/api".into());
        });
        let id = identity();
        EnvVarsProvisioner.apply(&env, &mut infra, &id).unwrap();
        ApiHostEnvProvisioner::new(&ProvisionConfig::default())
            .apply(&env, &mut infra, &id)
            .unwrap();
        let vars = dev_container(&infra).env.clone().unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].value.as_deref(), Some("http://custom/api"));
    }

    #[test]
    fn default_endpoint_is_added() {
        let (env, mut infra) = single_machine(|_| {});
        ApiHostEnvProvisioner::new(&ProvisionConfig::default())
            .apply(&env, &mut infra, &identity())
            .unwrap();
        let vars = dev_container(&infra).env.clone().unwrap();
        assert_eq!(vars[0].value.as_deref(), Some("http://wsrt-master:8080/api"));
    }
}
