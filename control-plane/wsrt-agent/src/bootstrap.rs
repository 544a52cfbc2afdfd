use crate::config::BootstrapConfig;
use crate::exec::{CommandExecutor, ExecError, ExecTarget};
use crate::liveness::LivenessClient;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};
use wsrt_models::{AgentConfig, RuntimeIdentity, ServerStatus};
use wsrt_storage::{RuntimeStateCache, StorageError};

#[derive(Debug, thiserror::Error)]
pub enum BootstrapError {
    /// Machine or agent server is not known. Raised before anything is
    /// launched.
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("failed to launch agent: {0}")]
    Dispatch(#[from] ExecError),

    #[error(
        "agent {agent} did not become ready within {} seconds",
        after.as_secs()
    )]
    Timeout { agent: String, after: Duration },

    #[error("bootstrap of agent {agent} was cancelled")]
    Cancelled { agent: String },

    #[error("runtime state error: {0}")]
    Storage(#[from] StorageError),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootstrapReport {
    /// Liveness requests issued, the successful one included.
    pub attempts: u32,
    pub elapsed: Duration,
}

/// Launches an agent inside its machine and waits until its liveness
/// endpoint answers with a 2xx status.
pub struct AgentBootstrapper {
    cache: Arc<dyn RuntimeStateCache>,
    exec: Arc<dyn CommandExecutor>,
    liveness: Arc<dyn LivenessClient>,
    config: BootstrapConfig,
}

fn join_url(base: &str, path: Option<&str>) -> String {
    match path {
        Some(p) if !p.is_empty() => format!(
            "{}/{}",
            base.trim_end_matches('/'),
            p.trim_start_matches('/')
        ),
        _ => base.to_string(),
    }
}

impl AgentBootstrapper {
    pub fn new(
        cache: Arc<dyn RuntimeStateCache>,
        exec: Arc<dyn CommandExecutor>,
        liveness: Arc<dyn LivenessClient>,
        config: BootstrapConfig,
    ) -> Self {
        Self {
            cache,
            exec,
            liveness,
            config,
        }
    }

    pub fn config(&self) -> &BootstrapConfig {
        &self.config
    }

    /// Shell command handed to the executor.
    fn launch_command(&self, agent: &AgentConfig) -> Vec<String> {
        let script = if self.config.activation_command.is_empty() {
            agent.run_script.clone()
        } else {
            format!("{}\n{}", agent.run_script, self.config.activation_command)
        };
        vec!["sh".into(), "-c".into(), script]
    }

    #[instrument(skip(self, agent, cancel), fields(%identity, agent = %agent.id))]
    pub async fn bootstrap(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        agent: &AgentConfig,
        cancel: CancellationToken,
    ) -> Result<BootstrapReport, BootstrapError> {
        let started = Instant::now();
        let deadline = started + self.config.max_start_time();

        let machines = match self.cache.get_machines(identity).await {
            Ok(m) => m,
            Err(e) if e.is_not_found() => {
                return Err(BootstrapError::Configuration(format!(
                    "runtime {identity} is not known"
                )));
            }
            Err(e) => return Err(e.into()),
        };
        let record = machines.get(machine).ok_or_else(|| {
            BootstrapError::Configuration(format!(
                "machine '{machine}' of runtime {identity} is not known"
            ))
        })?;
        let (server_name, server) =
            record.server_on_port(&agent.port).ok_or_else(|| {
                BootstrapError::Configuration(format!(
                    "machine '{machine}' has no server on port {} for agent {}",
                    agent.port, agent.id
                ))
            })?;
        let server_name = server_name.to_string();
        let url = join_url(&server.url, agent.ping_path.as_deref());
        let namespace = self.cache.get(identity).await?.namespace;
        let target = ExecTarget {
            namespace,
            pod: record.pod_name.clone(),
            container: record.container_name.clone(),
        };

        info!(%target, "launching agent");
        self.exec
            .exec(&target, &self.launch_command(agent))
            .await?;
        self.cache
            .update_server_status(
                identity,
                machine,
                &server_name,
                ServerStatus::Starting,
            )
            .await?;

        let cancelled = || BootstrapError::Cancelled {
            agent: agent.id.clone(),
        };
        let timed_out = || BootstrapError::Timeout {
            agent: agent.id.clone(),
            after: self.config.max_start_time(),
        };

        let mut attempts = 0u32;
        loop {
            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                warn!(attempts, "agent did not become ready in time");
                return Err(timed_out());
            }

            attempts += 1;
            let budget = remaining.min(self.config.ping_timeout());
            let outcome = tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                r = tokio::time::timeout(budget, self.liveness.get(&url, budget)) => r,
            };
            match outcome {
                Ok(Ok(status)) if (200..300).contains(&status) => {
                    self.cache
                        .update_server_status(
                            identity,
                            machine,
                            &server_name,
                            ServerStatus::Running,
                        )
                        .await?;
                    let elapsed = started.elapsed();
                    info!(attempts, ?elapsed, "agent is ready");
                    return Ok(BootstrapReport { attempts, elapsed });
                }
                Ok(Ok(status)) => debug!(attempts, status, "agent not ready"),
                Ok(Err(e)) => debug!(attempts, error = %e, "agent not reachable"),
                Err(_) => debug!(attempts, "liveness attempt timed out"),
            }

            if cancel.is_cancelled() {
                return Err(cancelled());
            }
            let remaining = deadline.saturating_duration_since(Instant::now());
            let pause = remaining.min(self.config.ping_delay());
            tokio::select! {
                _ = cancel.cancelled() => return Err(cancelled()),
                _ = tokio::time::sleep(pause) => {}
            }
        }
    }
}
