//! Cluster-wide settings applied to every pod or container. All of these
//! share the `SystemSettings` stage and run in registration order.

use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, upsert_env};
use crate::names::{ENV_MACHINE_TOKEN, ENV_WORKSPACE_ID};
use crate::provisioner::{ProvisionStage, Provisioner};
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

#[derive(Debug)]
pub struct ServiceAccountProvisioner {
    account: Option<String>,
}

impl ServiceAccountProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            account: config.service_account.clone(),
        }
    }
}

impl Provisioner for ServiceAccountProvisioner {
    fn name(&self) -> &'static str {
        "service-account"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::SystemSettings
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        let Some(account) = &self.account else {
            return Ok(());
        };
        infra.for_each_pod(|_, _, spec| {
            spec.service_account_name = Some(account.clone());
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct PodTerminationProvisioner {
    grace_secs: Option<i64>,
}

impl PodTerminationProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            grace_secs: config.termination_grace_secs,
        }
    }
}

impl Provisioner for PodTerminationProvisioner {
    fn name(&self) -> &'static str {
        "pod-termination"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::SystemSettings
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        let Some(secs) = self.grace_secs else {
            return Ok(());
        };
        if secs < 0 {
            return Err(ProvisionError::config(format!(
                "termination grace period must not be negative, got {secs}"
            )));
        }
        infra.for_each_pod(|_, _, spec| {
            spec.termination_grace_period_seconds = Some(secs);
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct ImagePullPolicyProvisioner {
    policy: Option<String>,
}

impl ImagePullPolicyProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            policy: config.image_pull_policy.clone(),
        }
    }
}

impl Provisioner for ImagePullPolicyProvisioner {
    fn name(&self) -> &'static str {
        "image-pull-policy"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::SystemSettings
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        let Some(policy) = &self.policy else {
            return Ok(());
        };
        if !matches!(policy.as_str(), "Always" | "IfNotPresent" | "Never") {
            return Err(ProvisionError::config(format!(
                "unknown image pull policy '{policy}'"
            )));
        }
        infra.for_each_container(|_, _, container| {
            container.image_pull_policy = Some(policy.clone());
        });
        Ok(())
    }
}

#[derive(Debug)]
pub struct ProxySettingsProvisioner {
    vars: Vec<(&'static str, String)>,
}

impl ProxySettingsProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        let vars = [
            ("HTTP_PROXY", &config.http_proxy),
            ("HTTPS_PROXY", &config.https_proxy),
            ("NO_PROXY", &config.no_proxy),
        ]
        .into_iter()
        .filter_map(|(k, v)| v.clone().map(|v| (k, v)))
        .collect();
        Self { vars }
    }
}

impl Provisioner for ProxySettingsProvisioner {
    fn name(&self) -> &'static str {
        "proxy-settings"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::SystemSettings
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        _identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        infra.for_each_container(|_, _, container| {
            for (name, value) in &self.vars {
                upsert_env(container, name, value);
                upsert_env(container, &name.to_ascii_lowercase(), value);
            }
        });
        Ok(())
    }
}

/// Injects the machine token and workspace id used by agents to call back.
/// The token is fetched before the pipeline is built.
#[derive(Debug)]
pub struct MachineTokenProvisioner {
    token: String,
}

impl MachineTokenProvisioner {
    pub fn new(token: String) -> Self {
        Self { token }
    }
}

impl Provisioner for MachineTokenProvisioner {
    fn name(&self) -> &'static str {
        "machine-token"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::SystemSettings
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        if self.token.is_empty() {
            return Err(ProvisionError::ExternalData(format!(
                "no machine token for {identity}"
            )));
        }
        infra.for_each_container(|_, _, container| {
            upsert_env(container, ENV_MACHINE_TOKEN, &self.token);
            upsert_env(container, ENV_WORKSPACE_ID, &identity.workspace_id);
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;

    #[test]
    fn settings_are_applied_when_configured() {
        let config = ProvisionConfig {
            service_account: Some("workspace".into()),
            termination_grace_secs: Some(5),
            image_pull_policy: Some("IfNotPresent".into()),
            http_proxy: Some("http://proxy:3128".into()),
            ..Default::default()
        };
        let (env, mut infra) = single_machine(|_| {});
        let id = identity();
        ServiceAccountProvisioner::new(&config)
            .apply(&env, &mut infra, &id)
            .unwrap();
        PodTerminationProvisioner::new(&config)
            .apply(&env, &mut infra, &id)
            .unwrap();
        ImagePullPolicyProvisioner::new(&config)
            .apply(&env, &mut infra, &id)
            .unwrap();
        ProxySettingsProvisioner::new(&config)
            .apply(&env, &mut infra, &id)
            .unwrap();

        let spec = infra.pods["dev"].spec.clone().unwrap();
        assert_eq!(spec.service_account_name.as_deref(), Some("workspace"));
        assert_eq!(spec.termination_grace_period_seconds, Some(5));
        let c = &spec.containers[0];
        assert_eq!(c.image_pull_policy.as_deref(), Some("IfNotPresent"));
        let names: Vec<_> =
            c.env.as_ref().unwrap().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, vec!["HTTP_PROXY", "http_proxy"]);
    }

    #[test]
    fn unknown_pull_policy_fails() {
        let config = ProvisionConfig {
            image_pull_policy: Some("Sometimes".into()),
            ..Default::default()
        };
        let (env, mut infra) = single_machine(|_| {});
        assert!(
            ImagePullPolicyProvisioner::new(&config)
                .apply(&env, &mut infra, &identity())
                .is_err()
        );
    }

    #[test]
    fn empty_token_is_external_data_error() {
        let (env, mut infra) = single_machine(|_| {});
        let err = MachineTokenProvisioner::new(String::new())
            .apply(&env, &mut infra, &identity())
            .unwrap_err();
        assert!(matches!(err, ProvisionError::ExternalData(_)));
    }
}
