use anyhow::{Context, Result};
use envconfig::Envconfig;
use std::sync::Arc;
use tracing::info;
use wsrt_agent::{AgentBootstrapper, CommandExecutor, ReqwestLivenessClient};
use wsrt_storage::{StorageHealth, unified::DynRuntimeCache};

use crate::config::EngineConfig;
use crate::engine::RuntimeEngine;
use crate::infra::{InfraRealizer, MachineTokenSource};

/// Build a fully-wired engine from environment variables.
pub async fn build_engine_from_env(
    infra: Arc<dyn InfraRealizer>,
    exec: Arc<dyn CommandExecutor>,
    tokens: Arc<dyn MachineTokenSource>,
) -> Result<RuntimeEngine> {
    let config = EngineConfig::init_from_env()?.apply_profile_defaults();
    build_engine(config, infra, exec, tokens).await
}

/// Opens the runtime cache, checks it and wires the engine around it.
/// Call [`RuntimeEngine::recover`] afterwards to reconcile earlier runtimes.
pub async fn build_engine(
    config: EngineConfig,
    infra: Arc<dyn InfraRealizer>,
    exec: Arc<dyn CommandExecutor>,
    tokens: Arc<dyn MachineTokenSource>,
) -> Result<RuntimeEngine> {
    let storage = &config.storage;
    let cache = DynRuntimeCache::open(
        storage.backend(),
        &storage.path,
        storage.sync_writes(),
    )
    .with_context(|| format!("opening {} runtime cache", storage.backend()))?;
    cache.health().await.context("runtime cache health check")?;
    info!(backend = cache.backend_name(), path = %storage.path, "runtime cache ready");

    let liveness = ReqwestLivenessClient::new(config.bootstrap.ping_timeout())
        .context("building liveness client")?;
    let cache = Arc::new(cache);
    let bootstrapper = Arc::new(AgentBootstrapper::new(
        cache.clone(),
        exec,
        Arc::new(liveness),
        config.bootstrap.clone(),
    ));
    Ok(RuntimeEngine::new(config, cache, infra, tokens, bootstrapper))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infra::{InfraError, RealizedMachines, RuntimeHandle};
    use async_trait::async_trait;
    use std::collections::BTreeMap;
    use wsrt_agent::{ExecError, ExecTarget};
    use wsrt_models::{MachineStatus, RuntimeIdentity};
    use wsrt_provision::InfraEnvironment;
    use wsrt_storage::RuntimeStateCache;

    struct Nothing;

    #[async_trait]
    impl InfraRealizer for Nothing {
        async fn apply(
            &self,
            _handle: &RuntimeHandle,
            _infra: &InfraEnvironment,
        ) -> Result<RealizedMachines, InfraError> {
            Ok(BTreeMap::new())
        }

        async fn status(
            &self,
            _handle: &RuntimeHandle,
        ) -> Result<BTreeMap<String, MachineStatus>, InfraError> {
            Ok(BTreeMap::new())
        }

        async fn destroy(
            &self,
            _handle: &RuntimeHandle,
        ) -> Result<(), InfraError> {
            Ok(())
        }
    }

    #[async_trait]
    impl MachineTokenSource for Nothing {
        async fn token(
            &self,
            _identity: &RuntimeIdentity,
        ) -> Result<String, InfraError> {
            Ok("t".into())
        }
    }

    #[async_trait]
    impl CommandExecutor for Nothing {
        async fn exec(
            &self,
            _target: &ExecTarget,
            _command: &[String],
        ) -> Result<(), ExecError> {
            Ok(())
        }
    }

    fn config(backend: &str, path: &str) -> EngineConfig {
        let mut config = EngineConfig::init_from_hashmap(&Default::default())
            .unwrap()
            .apply_profile_defaults();
        config.storage.backend = Some(backend.into());
        config.storage.path = path.into();
        config
    }

    #[tokio::test]
    async fn wires_engine_on_redb_cache() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("rt.redb");
        let engine = build_engine(
            config("redb", path.to_str().unwrap()),
            Arc::new(Nothing),
            Arc::new(Nothing),
            Arc::new(Nothing),
        )
        .await
        .unwrap();
        assert!(engine.cache().get_identities().await.unwrap().is_empty());
        assert!(path.exists());
    }

    #[tokio::test]
    async fn unknown_backend_is_rejected() {
        let err = build_engine(
            config("etcd", "/unused"),
            Arc::new(Nothing),
            Arc::new(Nothing),
            Arc::new(Nothing),
        )
        .await
        .err()
        .unwrap();
        assert!(format!("{err:#}").contains("unsupported runtime cache backend"));
    }
}
