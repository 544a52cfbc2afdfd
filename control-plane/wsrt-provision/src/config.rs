use envconfig::Envconfig;

#[derive(Envconfig, Clone, Debug)]
pub struct ProvisionConfig {
    /// Base domain of generated ingress hosts.
    /// Env: WSRT_INGRESS_DOMAIN
    #[envconfig(from = "WSRT_INGRESS_DOMAIN", default = "wsrt.local")]
    pub ingress_domain: String,

    /// Route every server through one host with path prefixes.
    /// Unset means the profile decides.
    #[envconfig(from = "WSRT_INGRESS_SINGLE_HOST")]
    pub single_host: Option<bool>,

    #[envconfig(from = "WSRT_PVC_NAME", default = "claim-wsrt-workspace")]
    pub pvc_name: String,

    #[envconfig(from = "WSRT_PROJECTS_ROOT", default = "/projects")]
    pub projects_root: String,

    #[envconfig(from = "WSRT_AGENTS_PATH", default = "/mnt/wsrt/agents")]
    pub agents_path: String,

    #[envconfig(
        from = "WSRT_DEFAULT_MEMORY_LIMIT_BYTES",
        default = "1073741824"
    )]
    pub default_memory_limit: u64,

    #[envconfig(
        from = "WSRT_DEFAULT_MEMORY_REQUEST_BYTES",
        default = "536870912"
    )]
    pub default_memory_request: u64,

    #[envconfig(from = "WSRT_SERVICE_ACCOUNT")]
    pub service_account: Option<String>,

    #[envconfig(from = "WSRT_TERMINATION_GRACE_SECS")]
    pub termination_grace_secs: Option<i64>,

    /// `Always`, `IfNotPresent` or `Never`.
    #[envconfig(from = "WSRT_IMAGE_PULL_POLICY")]
    pub image_pull_policy: Option<String>,

    #[envconfig(from = "WSRT_HTTP_PROXY")]
    pub http_proxy: Option<String>,
    #[envconfig(from = "WSRT_HTTPS_PROXY")]
    pub https_proxy: Option<String>,
    #[envconfig(from = "WSRT_NO_PROXY")]
    pub no_proxy: Option<String>,

    /// Endpoint agents use to reach the engine API.
    #[envconfig(
        from = "WSRT_API_ENDPOINT",
        default = "http://wsrt-master:8080/api"
    )]
    pub api_endpoint: String,
}

impl Default for ProvisionConfig {
    fn default() -> Self {
        Self {
            ingress_domain: "wsrt.local".into(),
            single_host: None,
            pvc_name: "claim-wsrt-workspace".into(),
            projects_root: "/projects".into(),
            agents_path: "/mnt/wsrt/agents".into(),
            default_memory_limit: 1 << 30,
            default_memory_request: 1 << 29,
            service_account: None,
            termination_grace_secs: None,
            image_pull_policy: None,
            http_proxy: None,
            https_proxy: None,
            no_proxy: None,
            api_endpoint: "http://wsrt-master:8080/api".into(),
        }
    }
}

impl ProvisionConfig {
    pub fn single_host(&self) -> bool {
        self.single_host.unwrap_or(false)
    }
}
