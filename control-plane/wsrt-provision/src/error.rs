use crate::provisioner::ProvisionStage;

#[derive(Debug, thiserror::Error)]
pub enum ProvisionError {
    /// Bad or missing required input. Never retried.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Data that had to be looked up before provisioning was unavailable.
    #[error("external data unavailable: {0}")]
    ExternalData(String),

    #[error("invalid recipe: {0}")]
    Recipe(#[from] serde_yaml::Error),
}

impl ProvisionError {
    pub fn config(msg: impl Into<String>) -> Self {
        ProvisionError::Configuration(msg.into())
    }
}

/// First failure of a pipeline run, tagged with where it happened.
#[derive(Debug, thiserror::Error)]
#[error("provision:{stage} ({name}) failed: {error}")]
pub struct StageFailure {
    pub stage: ProvisionStage,
    pub name: &'static str,
    #[source]
    pub error: ProvisionError,
}
