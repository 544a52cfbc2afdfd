use k8s_openapi::api::core::v1::{
    Container, EnvVar, Pod, PodSpec, Service, Volume, VolumeMount,
};
use k8s_openapi::api::networking::v1::Ingress;
use std::collections::BTreeMap;
use wsrt_models::{AgentConfig, MachineConfig, ServerConfig, VolumeConfig};

/// Machine configuration as seen by the provisioners. Starts as a copy of
/// the descriptor and may be enriched with attributes along the way.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InternalMachineConfig {
    pub agents: Vec<AgentConfig>,
    pub servers: BTreeMap<String, ServerConfig>,
    pub env: BTreeMap<String, String>,
    pub volumes: BTreeMap<String, VolumeConfig>,
    pub attributes: BTreeMap<String, String>,
}

impl From<&MachineConfig> for InternalMachineConfig {
    fn from(m: &MachineConfig) -> Self {
        Self {
            agents: m.agents.clone(),
            servers: m.servers.clone(),
            env: m.env.clone(),
            volumes: m.volumes.clone(),
            attributes: m.attributes.clone(),
        }
    }
}

impl InternalMachineConfig {
    pub fn is_flag_set(&self, key: &str) -> bool {
        self.attributes
            .get(key)
            .map(|v| v.eq_ignore_ascii_case("true"))
            .unwrap_or(false)
    }
}

/// Kubernetes-shaped environment being built for one runtime start.
///
/// Owned by the task running the pipeline; objects are keyed by name.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct InfraEnvironment {
    pub pods: BTreeMap<String, Pod>,
    pub services: BTreeMap<String, Service>,
    pub ingresses: BTreeMap<String, Ingress>,
    /// Keyed by [`machine_name`].
    pub machines: BTreeMap<String, InternalMachineConfig>,
}

/// `<pod>/<container>`.
pub fn machine_name(pod: &str, container: &str) -> String {
    format!("{pod}/{container}")
}

impl InfraEnvironment {
    /// Visits every container that has a machine config.
    pub fn for_each_container(
        &mut self,
        mut f: impl FnMut(&str, &InternalMachineConfig, &mut Container),
    ) {
        for (pod_name, pod) in self.pods.iter_mut() {
            let Some(spec) = pod.spec.as_mut() else {
                continue;
            };
            for container in spec.containers.iter_mut() {
                let name = machine_name(pod_name, &container.name);
                if let Some(machine) = self.machines.get(&name) {
                    f(&name, machine, container);
                }
            }
        }
    }

    /// Visits every pod together with the machine configs of its containers.
    pub fn for_each_pod(
        &mut self,
        mut f: impl FnMut(&str, Vec<&InternalMachineConfig>, &mut PodSpec),
    ) {
        for (pod_name, pod) in self.pods.iter_mut() {
            let spec = pod.spec.get_or_insert_with(Default::default);
            let machines = spec
                .containers
                .iter()
                .filter_map(|c| {
                    self.machines.get(&machine_name(pod_name, &c.name))
                })
                .collect();
            f(pod_name, machines, spec);
        }
    }
}

/// Sets `name` to `value`, replacing an existing entry.
pub fn upsert_env(container: &mut Container, name: &str, value: &str) {
    let env = container.env.get_or_insert_with(Vec::new);
    let var = EnvVar {
        name: name.to_string(),
        value: Some(value.to_string()),
        ..Default::default()
    };
    match env.iter_mut().find(|e| e.name == name) {
        Some(existing) => *existing = var,
        None => env.push(var),
    }
}

pub fn has_env(container: &Container, name: &str) -> bool {
    container
        .env
        .as_ref()
        .is_some_and(|env| env.iter().any(|e| e.name == name))
}

/// Adds a mount unless one already targets the same path.
pub fn ensure_mount(container: &mut Container, mount: VolumeMount) {
    let mounts = container.volume_mounts.get_or_insert_with(Vec::new);
    match mounts.iter_mut().find(|m| m.mount_path == mount.mount_path) {
        Some(existing) => *existing = mount,
        None => mounts.push(mount),
    }
}

/// Adds a pod volume unless one with the same name exists.
pub fn ensure_volume(spec: &mut PodSpec, volume: Volume) {
    let volumes = spec.volumes.get_or_insert_with(Vec::new);
    if !volumes.iter().any(|v| v.name == volume.name) {
        volumes.push(volume);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upsert_env_replaces_value() {
        let mut c = Container::default();
        upsert_env(&mut c, "A", "1");
        upsert_env(&mut c, "A", "2");
        let env = c.env.unwrap();
        assert_eq!(env.len(), 1);
        assert_eq!(env[0].value.as_deref(), Some("2"));
    }

    #[test]
    fn mounts_are_unique_per_path() {
        let mut c = Container::default();
        for sub in ["a", "b"] {
            ensure_mount(
                &mut c,
                VolumeMount {
                    name: "v".into(),
                    mount_path: "/data".into(),
                    sub_path: Some(sub.into()),
                    ..Default::default()
                },
            );
        }
        let mounts = c.volume_mounts.unwrap();
        assert_eq!(mounts.len(), 1);
        assert_eq!(mounts[0].sub_path.as_deref(), Some("b"));
    }
}
