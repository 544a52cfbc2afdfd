use envconfig::Envconfig;
use std::time::Duration;

#[derive(Envconfig, Clone, Debug)]
pub struct BootstrapConfig {
    /// Pause between two liveness attempts.
    /// Env: WSRT_AGENT_PING_DELAY_MS
    #[envconfig(from = "WSRT_AGENT_PING_DELAY_MS", default = "2000")]
    pub ping_delay_ms: u64,

    /// Hard limit for the agent to become ready, launch included.
    /// Env: WSRT_AGENT_MAX_START_SECS
    #[envconfig(from = "WSRT_AGENT_MAX_START_SECS", default = "180")]
    pub max_start_secs: u64,

    /// Timeout of a single liveness request.
    #[envconfig(from = "WSRT_AGENT_PING_TIMEOUT_MS", default = "2000")]
    pub ping_timeout_ms: u64,

    /// Appended to the agent run script on its own line.
    #[envconfig(from = "WSRT_AGENT_ACTIVATION_COMMAND", default = "")]
    pub activation_command: String,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            ping_delay_ms: 2000,
            max_start_secs: 180,
            ping_timeout_ms: 2000,
            activation_command: String::new(),
        }
    }
}

impl BootstrapConfig {
    pub fn ping_delay(&self) -> Duration {
        Duration::from_millis(self.ping_delay_ms)
    }

    pub fn max_start_time(&self) -> Duration {
        Duration::from_secs(self.max_start_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_millis(self.ping_timeout_ms)
    }
}
