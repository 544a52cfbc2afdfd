use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, upsert_env};
use crate::provisioner::{ProvisionStage, Provisioner};
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

/// Copies machine env vars into their containers.
#[derive(Debug, Default)]
pub struct EnvVarsProvisioner;

impl Provisioner for EnvVarsProvisioner {
    fn name(&self) -> &'static str {
        "env-vars"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::EnvVars
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        infra.for_each_container(|_, machine, container| {
            for (name, value) in &machine.env {
                upsert_env(container, name, value);
            }
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn env_vars_land_once() {
        let (env, mut infra) = single_machine(|m| {
            m.env.insert("JAVA_OPTS".into(), "-Xmx1g".into());
        });
        EnvVarsProvisioner.apply(&env, &mut infra, &identity()).unwrap();
        EnvVarsProvisioner.apply(&env, &mut infra, &identity()).unwrap();
        let vars = dev_container(&infra).env.clone().unwrap();
        assert_eq!(vars.len(), 1);
        assert_eq!(vars[0].value.as_deref(), Some("-Xmx1g"));
    }
}
