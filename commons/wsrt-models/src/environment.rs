use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use validator::Validate;

/// Declarative description of a workspace environment. Read-only input of
/// the provisioning pipeline.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct EnvironmentConfig {
    pub recipe: Recipe,
    #[serde(default)]
    pub machines: BTreeMap<String, MachineConfig>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct Recipe {
    /// `dockerimage` or `kubernetes`.
    pub kind: String,
    pub content: String,
}

impl Recipe {
    pub const DOCKER_IMAGE: &'static str = "dockerimage";
    pub const KUBERNETES: &'static str = "kubernetes";

    pub fn docker_image(image: impl Into<String>) -> Self {
        Self {
            kind: Self::DOCKER_IMAGE.into(),
            content: image.into(),
        }
    }

    pub fn kubernetes(yaml: impl Into<String>) -> Self {
        Self {
            kind: Self::KUBERNETES.into(),
            content: yaml.into(),
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct MachineConfig {
    #[serde(default)]
    pub agents: Vec<AgentConfig>,
    #[serde(default)]
    pub servers: BTreeMap<String, ServerConfig>,
    #[serde(default)]
    pub env: BTreeMap<String, String>,
    #[serde(default)]
    pub volumes: BTreeMap<String, VolumeConfig>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl MachineConfig {
    pub fn attribute(&self, key: &str) -> Option<&str> {
        self.attributes.get(key).map(String::as_str)
    }

    pub fn is_flag_set(&self, key: &str) -> bool {
        self.attribute(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct ServerConfig {
    /// `8080/tcp`; the protocol part defaults to tcp.
    pub port: String,
    /// URL scheme the server speaks (`http`, `ws`, ...).
    #[serde(default)]
    pub protocol: Option<String>,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub attributes: BTreeMap<String, String>,
}

impl ServerConfig {
    pub fn new(port: impl Into<String>, protocol: &str) -> Self {
        Self {
            port: port.into(),
            protocol: Some(protocol.to_string()),
            ..Default::default()
        }
    }

    /// Numeric part of the declared port.
    pub fn port_number(&self) -> Option<i32> {
        self.port.split('/').next()?.trim().parse().ok()
    }

    /// Transport part of the declared port, upper-cased for the
    /// infrastructure API (`TCP`, `UDP`).
    pub fn transport(&self) -> String {
        self.port
            .split_once('/')
            .map(|(_, t)| t.to_ascii_uppercase())
            .unwrap_or_else(|| "TCP".to_string())
    }

    pub fn is_flag_set(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct VolumeConfig {
    pub path: String,
}

/// Agent installed into a machine and launched after the machine runs.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Validate)]
pub struct AgentConfig {
    #[validate(length(min = 1, message = "Agent ID cannot be empty"))]
    pub id: String,
    #[validate(length(min = 1, message = "Agent run script cannot be empty"))]
    pub run_script: String,
    /// Port of the server the agent answers liveness requests on.
    #[validate(length(min = 1, message = "Agent port cannot be empty"))]
    pub port: String,
    #[serde(default)]
    pub ping_path: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_port_parts() {
        let s = ServerConfig::new("4401/tcp", "http");
        assert_eq!(s.port_number(), Some(4401));
        assert_eq!(s.transport(), "TCP");

        let bare = ServerConfig::new("8080", "http");
        assert_eq!(bare.port_number(), Some(8080));
        assert_eq!(bare.transport(), "TCP");

        let bad = ServerConfig::new("http/tcp", "http");
        assert_eq!(bad.port_number(), None);
    }

    #[test]
    fn agent_requires_script_and_port() {
        let agent = AgentConfig {
            id: "org.eclipse.che.ws-agent".into(),
            ..Default::default()
        };
        let errs = agent.validate().unwrap_err();
        assert!(errs.field_errors().contains_key("run_script"));
        assert!(errs.field_errors().contains_key("port"));
    }

    #[test]
    fn descriptor_parses_from_json_with_defaults() {
        let raw = r#"{
            "recipe": {"kind": "dockerimage", "content": "eclipse/ubuntu_jdk8"},
            "machines": {"dev": {"attributes": {"memoryLimitBytes": "2147483648"}}}
        }"#;
        let env: EnvironmentConfig = serde_json::from_str(raw).unwrap();
        let dev = &env.machines["dev"];
        assert!(dev.agents.is_empty());
        assert_eq!(dev.attribute("memoryLimitBytes"), Some("2147483648"));
    }
}
