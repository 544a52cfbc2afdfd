use crate::config::EngineConfig;
use crate::errors::{EngineError, StartError};
use crate::infra::{InfraRealizer, MachineTokenSource, RuntimeHandle};
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wsrt_agent::{AgentBootstrapper, BootstrapError, BootstrapReport};
use wsrt_fanout::{OperationError, TargetOperation, do_in_parallel};
use wsrt_models::{
    AgentConfig, EnvironmentConfig, MachineStatus, RuntimeIdentity,
    RuntimeState, RuntimeStatus,
};
use wsrt_provision::names::slug;
use wsrt_provision::{EnvironmentFactory, InfraEnvironment, PipelineBuilder};
use wsrt_storage::{RuntimeStateCache, StorageError};

/// Agents of one machine, launched in declaration order.
#[derive(Debug, Clone)]
struct MachineAgents {
    machine: String,
    agents: Vec<AgentConfig>,
}

struct StartAgents {
    bootstrapper: Arc<AgentBootstrapper>,
    identity: RuntimeIdentity,
}

#[async_trait]
impl TargetOperation<MachineAgents> for StartAgents {
    /// A bootstrap failure is an output so its kind survives the fan-out.
    type Output = Result<Vec<BootstrapReport>, BootstrapError>;

    fn can_attempt(&self, target: &MachineAgents) -> bool {
        !target.agents.is_empty()
    }

    async fn start(
        &self,
        target: &MachineAgents,
        cancel: CancellationToken,
    ) -> Result<Self::Output, OperationError> {
        let mut reports = Vec::with_capacity(target.agents.len());
        for agent in &target.agents {
            match self
                .bootstrapper
                .bootstrap(&self.identity, &target.machine, agent, cancel.clone())
                .await
            {
                Ok(report) => reports.push(report),
                Err(e) => return Ok(Err(e)),
            }
        }
        Ok(Ok(reports))
    }
}

/// Starts, stops and recovers workspace runtimes.
pub struct RuntimeEngine {
    config: EngineConfig,
    cache: Arc<dyn RuntimeStateCache>,
    infra: Arc<dyn InfraRealizer>,
    tokens: Arc<dyn MachineTokenSource>,
    bootstrapper: Arc<AgentBootstrapper>,
    /// Cancels agent bootstrap of runtimes still starting.
    starting: scc::HashMap<RuntimeIdentity, CancellationToken>,
}

impl RuntimeEngine {
    pub fn new(
        config: EngineConfig,
        cache: Arc<dyn RuntimeStateCache>,
        infra: Arc<dyn InfraRealizer>,
        tokens: Arc<dyn MachineTokenSource>,
        bootstrapper: Arc<AgentBootstrapper>,
    ) -> Self {
        Self {
            config,
            cache,
            infra,
            tokens,
            bootstrapper,
            starting: scc::HashMap::new(),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn RuntimeStateCache> {
        &self.cache
    }

    fn namespace_for(&self, identity: &RuntimeIdentity) -> String {
        match &self.config.namespace {
            Some(ns) => ns.clone(),
            None => format!("{}-wsrt", slug(&identity.owner_id)),
        }
    }

    #[instrument(skip(self, env), fields(%identity))]
    pub async fn start(
        &self,
        identity: &RuntimeIdentity,
        env: &EnvironmentConfig,
    ) -> Result<RuntimeState, StartError> {
        let mut state = RuntimeState::new(
            identity.clone(),
            self.namespace_for(identity),
            RuntimeStatus::Starting,
        );
        match self.cache.create(&state).await {
            Ok(()) => {}
            Err(StorageError::AlreadyExists(_)) => {
                return Err(StartError::AlreadyExists(identity.to_string()));
            }
            Err(e) => return Err(e.into()),
        }

        let cancel = CancellationToken::new();
        let _ = self
            .starting
            .insert_async(identity.clone(), cancel.clone())
            .await;

        let handle = RuntimeHandle::new(identity.clone(), &state.namespace);
        let result = match self.prepare(identity, env).await {
            Ok(infra) => self.realize(&handle, &infra, cancel).await,
            Err(e) => Err(e),
        };
        self.starting.remove_async(identity).await;

        match result {
            Ok(()) => {
                info!("runtime is running");
                state.status = RuntimeStatus::Running;
                Ok(state)
            }
            Err(err) => {
                warn!(stage = %err.stage(), error = %err, "runtime start failed");
                // Nothing reached the orchestrator before `infra`.
                let applied = !matches!(
                    err,
                    StartError::MachineToken(_)
                        | StartError::Environment(_)
                        | StartError::Provision(_)
                );
                self.abort(&handle, applied).await;
                Err(err)
            }
        }
    }

    /// Fetches the machine token and runs the provisioning pipeline.
    async fn prepare(
        &self,
        identity: &RuntimeIdentity,
        env: &EnvironmentConfig,
    ) -> Result<InfraEnvironment, StartError> {
        let token = self
            .tokens
            .token(identity)
            .await
            .map_err(StartError::MachineToken)?;
        let mut infra = EnvironmentFactory.create(env)?;
        PipelineBuilder::standard(&self.config.provision, token)
            .build()
            .provision(env, &mut infra, identity)?;
        debug!(
            pods = infra.pods.len(),
            services = infra.services.len(),
            ingresses = infra.ingresses.len(),
            "infra environment provisioned"
        );
        Ok(infra)
    }

    async fn realize(
        &self,
        handle: &RuntimeHandle,
        infra: &InfraEnvironment,
        cancel: CancellationToken,
    ) -> Result<(), StartError> {
        let identity = &handle.identity;
        let machines = self
            .infra
            .apply(handle, infra)
            .await
            .map_err(StartError::Infra)?;
        for record in machines.values() {
            self.cache.add_machine(identity, record).await?;
        }

        let targets: Vec<MachineAgents> = infra
            .machines
            .iter()
            .filter(|(name, _)| machines.contains_key(*name))
            .map(|(name, m)| MachineAgents {
                machine: name.clone(),
                agents: m.agents.clone(),
            })
            .collect();
        let op = Arc::new(StartAgents {
            bootstrapper: self.bootstrapper.clone(),
            identity: identity.clone(),
        });
        let timeout = self.config.start_timeout();
        let report = tokio::select! {
            _ = cancel.cancelled() => {
                return Err(StartError::Interrupted(identity.to_string()));
            }
            r = do_in_parallel(targets.clone(), op, timeout) => r,
        };

        for accepted in report.accepted {
            if let Err(error) = accepted.output {
                return Err(StartError::Agent {
                    machine: targets[accepted.index].machine.clone(),
                    error,
                });
            }
        }
        if let Some((index, error)) = report.failed.into_iter().next() {
            let message = match error {
                OperationError::Failed(m) => m,
                other => other.to_string(),
            };
            return Err(StartError::AgentPanicked {
                machine: targets[index].machine.clone(),
                message,
            });
        }
        if !report.incomplete.is_empty() {
            return Err(StartError::Timeout {
                identity: identity.to_string(),
                after: timeout,
            });
        }

        for name in machines.keys() {
            self.cache
                .update_machine_status(identity, name, MachineStatus::Running)
                .await?;
        }
        let moved = self
            .cache
            .update_status_if(
                identity,
                &[RuntimeStatus::Starting],
                RuntimeStatus::Running,
            )
            .await?;
        if !moved {
            return Err(StartError::Interrupted(identity.to_string()));
        }
        Ok(())
    }

    /// Best-effort cleanup after a failed start.
    async fn abort(&self, handle: &RuntimeHandle, applied: bool) {
        let identity = &handle.identity;
        if applied {
            if let Err(e) = self.infra.destroy(handle).await {
                warn!(%identity, error = %e, "failed to destroy infra of failed runtime");
            }
        }
        if let Err(e) = self.cache.remove(identity).await {
            warn!(%identity, error = %e, "failed to remove state of failed runtime");
        }
    }

    /// Stops a starting or running runtime and forgets it.
    #[instrument(skip(self), fields(%identity))]
    pub async fn stop(&self, identity: &RuntimeIdentity) -> Result<(), EngineError> {
        let moved = match self
            .cache
            .update_status_if(
                identity,
                &[RuntimeStatus::Starting, RuntimeStatus::Running],
                RuntimeStatus::Stopping,
            )
            .await
        {
            Ok(moved) => moved,
            Err(e) if e.is_not_found() => false,
            Err(e) => return Err(e.into()),
        };
        if !moved {
            return Err(EngineError::NotRunning(identity.to_string()));
        }

        if let Some((_, cancel)) = self.starting.remove_async(identity).await {
            cancel.cancel();
        }
        let state = self.cache.get(identity).await?;
        let handle = RuntimeHandle::new(identity.clone(), state.namespace);
        self.infra.destroy(&handle).await?;
        self.cache.remove(identity).await?;
        info!("runtime stopped");
        Ok(())
    }

    /// Reconciles persisted runtimes with the orchestrator after a restart.
    ///
    /// A runtime recorded as starting or running whose machines are all gone
    /// is marked stopped and its machines are dropped. Returns those
    /// runtimes.
    pub async fn recover(&self) -> Result<Vec<RuntimeIdentity>, EngineError> {
        let mut recovered = Vec::new();
        for identity in self.cache.get_identities().await? {
            let state = match self.cache.get(&identity).await {
                Ok(s) => s,
                Err(e) if e.is_not_found() => continue,
                Err(e) => return Err(e.into()),
            };
            if !state.status.is_active() {
                continue;
            }
            let handle = RuntimeHandle::new(identity.clone(), &state.namespace);
            let live = match self.infra.status(&handle).await {
                Ok(live) => live,
                Err(e) => {
                    warn!(%identity, error = %e, "cannot inspect runtime infra, leaving it as is");
                    continue;
                }
            };
            let alive = live.values().any(|s| {
                matches!(s, MachineStatus::Starting | MachineStatus::Running)
            });
            if alive {
                debug!(%identity, machines = live.len(), "runtime still alive");
                continue;
            }
            self.cache
                .update_status(&identity, RuntimeStatus::Stopped)
                .await?;
            self.cache.remove_machines(&identity).await?;
            info!(%identity, "orphaned runtime marked stopped");
            recovered.push(identity);
        }
        Ok(recovered)
    }
}
