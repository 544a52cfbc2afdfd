//! Label, annotation, volume and env var names written into the infra
//! environment.

use wsrt_models::RuntimeIdentity;

pub const LABEL_WORKSPACE_ID: &str = "wsrt.io/workspace-id";
pub const LABEL_ENV_NAME: &str = "wsrt.io/env-name";
pub const LABEL_OWNER_ID: &str = "wsrt.io/owner-id";
/// Selector label binding a pod to its server Service.
pub const LABEL_POD: &str = "wsrt.io/pod";
/// Slugged machine and server names on an Ingress.
pub const LABEL_MACHINE: &str = "wsrt.io/machine";
pub const LABEL_SERVER: &str = "wsrt.io/server";

pub const ANNOTATION_MACHINE: &str = "wsrt.io/machine";
pub const ANNOTATION_SERVER: &str = "wsrt.io/server";

pub const DATA_VOLUME: &str = "wsrt-data";
pub const AGENTS_VOLUME: &str = "wsrt-agents";

pub const ENV_PROJECTS_ROOT: &str = "WSRT_PROJECTS_ROOT";
pub const ENV_API_ENDPOINT: &str = "WSRT_API";
pub const ENV_MACHINE_TOKEN: &str = "WSRT_MACHINE_TOKEN";
pub const ENV_WORKSPACE_ID: &str = "WSRT_WORKSPACE_ID";

/// Object name unique to the workspace: `<workspace slug>-<name>`.
/// Runtimes of one owner may share a namespace.
pub fn workspace_scoped(identity: &RuntimeIdentity, name: &str) -> String {
    format!("{}-{name}", slug(&identity.workspace_id))
}

/// Lower-cases and replaces anything outside `[a-z0-9-]` so the result can
/// be used in object names and hostnames.
pub fn slug(raw: &str) -> String {
    let mut out: String = raw
        .chars()
        .map(|c| {
            let c = c.to_ascii_lowercase();
            if c.is_ascii_alphanumeric() { c } else { '-' }
        })
        .collect();
    while out.contains("--") {
        out = out.replace("--", "-");
    }
    out.trim_matches('-').to_string()
}

#[cfg(test)]
mod tests {
    use super::slug;

    #[test]
    fn slug_normalizes() {
        assert_eq!(slug("wsagent/http"), "wsagent-http");
        assert_eq!(slug("Dev_Machine//x"), "dev-machine-x");
        assert_eq!(slug("-a-"), "a");
    }
}
