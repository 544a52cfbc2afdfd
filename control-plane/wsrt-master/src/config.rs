use envconfig::Envconfig;
use std::time::Duration;
use wsrt_agent::BootstrapConfig;
use wsrt_provision::ProvisionConfig;

#[derive(Envconfig, Clone, Debug)]
pub struct EngineConfig {
    /// `dev` or `full`; decides the defaults of unset options.
    #[envconfig(from = "WSRT_PROFILE", default = "dev")]
    pub profile: String,

    /// Namespace every runtime lives in. Unset means `<owner>-wsrt`.
    /// Env: WSRT_NAMESPACE
    #[envconfig(from = "WSRT_NAMESPACE")]
    pub namespace: Option<String>,

    /// Budget for bootstrapping the agents of all machines together.
    /// Env: WSRT_WORKSPACE_START_TIMEOUT_SECS
    #[envconfig(from = "WSRT_WORKSPACE_START_TIMEOUT_SECS", default = "480")]
    pub start_timeout_secs: u64,

    #[envconfig(nested)]
    pub storage: StorageConfig,

    #[envconfig(nested)]
    pub bootstrap: BootstrapConfig,

    #[envconfig(nested)]
    pub provision: ProvisionConfig,
}

#[derive(Envconfig, Clone, Debug, Default)]
pub struct StorageConfig {
    /// `memory` or `redb`. If None, the profile decides.
    #[envconfig(from = "WSRT_STORAGE_BACKEND")]
    pub backend: Option<String>,

    #[envconfig(
        from = "WSRT_STORAGE_PATH",
        default = "/var/lib/wsrt/runtimes.redb"
    )]
    pub path: String,

    #[envconfig(from = "WSRT_STORAGE_SYNC_WRITES")]
    pub sync_writes: Option<bool>,
}

impl StorageConfig {
    pub fn backend(&self) -> &str {
        self.backend.as_deref().unwrap_or("memory")
    }

    pub fn sync_writes(&self) -> bool {
        self.sync_writes.unwrap_or(true)
    }
}

impl EngineConfig {
    /// Apply profile → defaults mapping, while respecting explicit env overrides.
    ///
    /// - dev: memory cache, no fsync, single ingress host
    /// - full: redb cache, fsync on commit, one host per server
    pub fn apply_profile_defaults(mut self) -> Self {
        let (def_backend, def_sync, def_single_host) =
            match self.profile.as_str() {
                "full" | "prod" | "production" => ("redb", true, false),
                _ /* dev */ => ("memory", false, true),
            };

        if self.storage.backend.is_none() {
            self.storage.backend = Some(def_backend.to_string());
        }
        if self.storage.sync_writes.is_none() {
            self.storage.sync_writes = Some(def_sync);
        }
        if self.provision.single_host.is_none() {
            self.provision.single_host = Some(def_single_host);
        }
        self
    }

    pub fn start_timeout(&self) -> Duration {
        Duration::from_secs(self.start_timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn base(profile: &str) -> EngineConfig {
        EngineConfig {
            profile: profile.to_string(),
            namespace: None,
            start_timeout_secs: 480,
            storage: StorageConfig::default(),
            bootstrap: BootstrapConfig::default(),
            provision: ProvisionConfig::default(),
        }
    }

    #[test]
    fn profile_defaults_dev() {
        let cfg = base("dev").apply_profile_defaults();
        assert_eq!(cfg.storage.backend(), "memory");
        assert!(!cfg.storage.sync_writes());
        assert_eq!(cfg.provision.single_host, Some(true));
    }

    #[test]
    fn profile_defaults_full() {
        for p in ["full", "prod", "production"] {
            let cfg = base(p).apply_profile_defaults();
            assert_eq!(cfg.storage.backend(), "redb");
            assert!(cfg.storage.sync_writes());
            assert_eq!(cfg.provision.single_host, Some(false));
        }
    }

    #[test]
    fn explicit_values_win_over_profile() {
        let mut cfg = base("full");
        cfg.storage.backend = Some("memory".into());
        cfg.provision.single_host = Some(true);
        let cfg = cfg.apply_profile_defaults();
        assert_eq!(cfg.storage.backend(), "memory");
        assert_eq!(cfg.provision.single_host, Some(true));
        assert!(cfg.storage.sync_writes());
    }

    #[test]
    fn reads_nested_sections() {
        let vars = HashMap::from([
            ("WSRT_PROFILE".to_string(), "full".to_string()),
            ("WSRT_STORAGE_PATH".to_string(), "/tmp/rt.redb".to_string()),
            ("WSRT_AGENT_MAX_START_SECS".to_string(), "30".to_string()),
            ("WSRT_INGRESS_DOMAIN".to_string(), "ide.example.com".to_string()),
        ]);
        let cfg = EngineConfig::init_from_hashmap(&vars)
            .unwrap()
            .apply_profile_defaults();
        assert_eq!(cfg.storage.path, "/tmp/rt.redb");
        assert_eq!(cfg.bootstrap.max_start_time(), Duration::from_secs(30));
        assert_eq!(cfg.provision.ingress_domain, "ide.example.com");
        assert_eq!(cfg.start_timeout(), Duration::from_secs(480));
    }
}
