use crate::config::ProvisionConfig;
use crate::error::StageFailure;
use crate::infra::InfraEnvironment;
use crate::provisioner::{ProvisionStage, Provisioner};
use crate::provisioners::*;
use tracing::{debug, warn};
use wsrt_models::{EnvironmentConfig, RuntimeIdentity};

/// Collects provisioners in any order; [`PipelineBuilder::build`] sorts them
/// by stage, keeping registration order within a stage.
#[derive(Debug, Default)]
pub struct PipelineBuilder {
    provisioners: Vec<Box<dyn Provisioner>>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every built-in provisioner. `machine_token` must be fetched by the
    /// caller beforehand.
    pub fn standard(config: &ProvisionConfig, machine_token: String) -> Self {
        Self::new()
            .with(ServersProvisioner)
            .with(EnvVarsProvisioner)
            .with(VolumesProvisioner::new(config))
            .with(ResourcesProvisioner::new(config))
            .with(LabelsProvisioner)
            .with(UniqueNamesProvisioner)
            .with(AgentBinariesProvisioner::new(config))
            .with(ToolingProjectsProvisioner::new(config))
            .with(ToolingServersProvisioner)
            .with(ServiceAccountProvisioner::new(config))
            .with(PodTerminationProvisioner::new(config))
            .with(ImagePullPolicyProvisioner::new(config))
            .with(ProxySettingsProvisioner::new(config))
            .with(MachineTokenProvisioner::new(machine_token))
            .with(ApiHostEnvProvisioner::new(config))
            .with(IngressProvisioner::new(config))
    }

    pub fn with(mut self, provisioner: impl Provisioner + 'static) -> Self {
        self.provisioners.push(Box::new(provisioner));
        self
    }

    pub fn with_boxed(mut self, provisioner: Box<dyn Provisioner>) -> Self {
        self.provisioners.push(provisioner);
        self
    }

    pub fn build(mut self) -> ProvisioningPipeline {
        self.provisioners.sort_by_key(|p| p.stage());
        ProvisioningPipeline {
            provisioners: self.provisioners,
        }
    }
}

#[derive(Debug)]
pub struct ProvisioningPipeline {
    provisioners: Vec<Box<dyn Provisioner>>,
}

impl ProvisioningPipeline {
    /// Runs every provisioner in stage order and stops at the first error.
    /// Nothing is rolled back; the caller discards `infra` on failure.
    pub fn provision(
        &self,
        env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), StageFailure> {
        for p in &self.provisioners {
            debug!(%identity, stage = %p.stage(), name = p.name(), "provisioning");
            if let Err(error) = p.apply(env, infra, identity) {
                warn!(
                    %identity,
                    stage = %p.stage(),
                    name = p.name(),
                    %error,
                    "provisioner failed"
                );
                return Err(StageFailure {
                    stage: p.stage(),
                    name: p.name(),
                    error,
                });
            }
        }
        Ok(())
    }

    /// Stage and name of each provisioner, in invocation order.
    pub fn plan(&self) -> Vec<(ProvisionStage, &'static str)> {
        self.provisioners
            .iter()
            .map(|p| (p.stage(), p.name()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProvisionError;
    use std::sync::{Arc, Mutex};

    #[derive(Debug)]
    struct Recorder {
        name: &'static str,
        stage: ProvisionStage,
        log: Arc<Mutex<Vec<&'static str>>>,
        fail: bool,
    }

    impl Provisioner for Recorder {
        fn name(&self) -> &'static str {
            self.name
        }

        fn stage(&self) -> ProvisionStage {
            self.stage
        }

        fn apply(
            &self,
            _env: &EnvironmentConfig,
            _infra: &mut InfraEnvironment,
            _identity: &RuntimeIdentity,
        ) -> Result<(), ProvisionError> {
            self.log.lock().unwrap().push(self.name);
            if self.fail {
                return Err(ProvisionError::config("bad input"));
            }
            Ok(())
        }
    }

    fn rec(
        name: &'static str,
        stage: ProvisionStage,
        log: &Arc<Mutex<Vec<&'static str>>>,
    ) -> Recorder {
        Recorder {
            name,
            stage,
            log: log.clone(),
            fail: false,
        }
    }

    #[test]
    fn invokes_in_stage_order_regardless_of_registration() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let pipeline = PipelineBuilder::new()
            .with(rec("ingress", ProvisionStage::Ingress, &log))
            .with(rec("labels", ProvisionStage::Labels, &log))
            .with(rec("proxy", ProvisionStage::SystemSettings, &log))
            .with(rec("servers", ProvisionStage::Servers, &log))
            .with(rec("token", ProvisionStage::SystemSettings, &log))
            .build();

        let id = RuntimeIdentity::new("ws", "env", "owner");
        pipeline
            .provision(
                &EnvironmentConfig::default(),
                &mut InfraEnvironment::default(),
                &id,
            )
            .unwrap();
        assert_eq!(
            *log.lock().unwrap(),
            vec!["servers", "labels", "proxy", "token", "ingress"]
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn stops_at_first_failure_and_tags_stage() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut failing = rec("volumes", ProvisionStage::Volumes, &log);
        failing.fail = true;
        let pipeline = PipelineBuilder::new()
            .with(rec("labels", ProvisionStage::Labels, &log))
            .with(failing)
            .with(rec("servers", ProvisionStage::Servers, &log))
            .build();

        let id = RuntimeIdentity::new("ws", "env", "owner");
        let err = pipeline
            .provision(
                &EnvironmentConfig::default(),
                &mut InfraEnvironment::default(),
                &id,
            )
            .unwrap_err();
        assert_eq!(err.stage, ProvisionStage::Volumes);
        assert_eq!(err.name, "volumes");
        assert!(matches!(err.error, ProvisionError::Configuration(_)));
        assert!(err.to_string().starts_with("provision:volumes"));
        assert_eq!(*log.lock().unwrap(), vec!["servers", "volumes"]);
        assert!(logs_contain("provisioner failed"));
    }

    #[test]
    fn standard_pipeline_covers_every_stage() {
        let pipeline =
            PipelineBuilder::standard(&ProvisionConfig::default(), "t".into())
                .build();
        let mut stages: Vec<_> =
            pipeline.plan().into_iter().map(|(s, _)| s).collect();
        stages.dedup();
        assert_eq!(stages, ProvisionStage::ORDER.to_vec());
    }
}
