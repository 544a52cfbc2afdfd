use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, InternalMachineConfig, machine_name};
use k8s_openapi::api::core::v1::{Container, Pod, PodSpec};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::Deserialize;
use std::collections::BTreeSet;
use tracing::debug;
use wsrt_models::{EnvironmentConfig, Recipe};

/// Builds the initial infra environment from the recipe of a descriptor.
///
/// Every container must correspond to a descriptor machine named
/// `<pod>/<container>` and every machine must end up with a container. A
/// `dockerimage` recipe produces one pod with one container; a machine name
/// without `/` is used for both the pod and the container.
#[derive(Debug, Default, Clone, Copy)]
pub struct EnvironmentFactory;

impl EnvironmentFactory {
    pub fn create(
        &self,
        env: &EnvironmentConfig,
    ) -> Result<InfraEnvironment, ProvisionError> {
        let pods = match env.recipe.kind.as_str() {
            Recipe::DOCKER_IMAGE => vec![docker_image_pod(env)?],
            Recipe::KUBERNETES => kubernetes_pods(&env.recipe.content)?,
            other => {
                return Err(ProvisionError::config(format!(
                    "unsupported recipe type '{other}'"
                )));
            }
        };

        let mut infra = InfraEnvironment::default();
        let mut unmatched: BTreeSet<&str> =
            env.machines.keys().map(String::as_str).collect();
        for pod in pods {
            let pod_name = pod.metadata.name.clone().ok_or_else(|| {
                ProvisionError::config("pod in recipe has no name")
            })?;
            if infra.pods.contains_key(&pod_name) {
                return Err(ProvisionError::config(format!(
                    "pod '{pod_name}' is declared twice"
                )));
            }
            let containers = pod
                .spec
                .as_ref()
                .map(|s| s.containers.as_slice())
                .unwrap_or_default();
            for container in containers {
                let name = machine_name(&pod_name, &container.name);
                let machine =
                    lookup(env, &pod_name, &container.name).ok_or_else(|| {
                        ProvisionError::config(format!(
                            "no machine config for container '{name}'"
                        ))
                    })?;
                unmatched.remove(machine.0);
                infra
                    .machines
                    .insert(name, InternalMachineConfig::from(machine.1));
            }
            infra.pods.insert(pod_name, pod);
        }

        if let Some(missing) = unmatched.first() {
            return Err(ProvisionError::config(format!(
                "machine '{missing}' is not backed by any container"
            )));
        }
        debug!(
            pods = infra.pods.len(),
            machines = infra.machines.len(),
            recipe = %env.recipe.kind,
            "created infra environment"
        );
        Ok(infra)
    }
}

fn lookup<'a>(
    env: &'a EnvironmentConfig,
    pod: &str,
    container: &str,
) -> Option<(&'a str, &'a wsrt_models::MachineConfig)> {
    let full = machine_name(pod, container);
    env.machines
        .get_key_value(&full)
        .or_else(|| {
            (pod == container)
                .then(|| env.machines.get_key_value(pod))
                .flatten()
        })
        .map(|(k, v)| (k.as_str(), v))
}

fn docker_image_pod(env: &EnvironmentConfig) -> Result<Pod, ProvisionError> {
    let mut machines = env.machines.keys();
    let (Some(machine), None) = (machines.next(), machines.next()) else {
        return Err(ProvisionError::config(format!(
            "dockerimage recipe needs exactly one machine, got {}",
            env.machines.len()
        )));
    };
    if env.recipe.content.trim().is_empty() {
        return Err(ProvisionError::config("dockerimage recipe has no image"));
    }
    let machine = machine.as_str();
    let (pod, container) =
        machine.split_once('/').unwrap_or((machine, machine));
    Ok(Pod {
        metadata: ObjectMeta {
            name: Some(pod.to_string()),
            ..Default::default()
        },
        spec: Some(PodSpec {
            containers: vec![Container {
                name: container.to_string(),
                image: Some(env.recipe.content.trim().to_string()),
                ..Default::default()
            }],
            ..Default::default()
        }),
        ..Default::default()
    })
}

fn kubernetes_pods(yaml: &str) -> Result<Vec<Pod>, ProvisionError> {
    let mut pods = Vec::new();
    for doc in serde_yaml::Deserializer::from_str(yaml) {
        let value = serde_yaml::Value::deserialize(doc)?;
        if value.is_null() {
            continue;
        }
        let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or("");
        if kind != "Pod" {
            return Err(ProvisionError::config(format!(
                "unsupported object kind '{kind}' in kubernetes recipe"
            )));
        }
        pods.push(serde_yaml::from_value(value)?);
    }
    if pods.is_empty() {
        return Err(ProvisionError::config("kubernetes recipe has no pods"));
    }
    Ok(pods)
}

#[cfg(test)]
mod tests {
    use super::*;
    use wsrt_models::MachineConfig;

    const TWO_PODS: &str = r#"
apiVersion: v1
kind: Pod
metadata:
  name: ws
spec:
  containers:
    - name: dev
      image: example/jdk:21
    - name: db
      image: postgres:16
---
apiVersion: v1
kind: Pod
metadata:
  name: tools
spec:
  containers:
    - name: ls
      image: example/ls
"#;

    fn env_with(recipe: Recipe, machines: &[&str]) -> EnvironmentConfig {
        EnvironmentConfig {
            recipe,
            machines: machines
                .iter()
                .map(|m| (m.to_string(), MachineConfig::default()))
                .collect(),
        }
    }

    #[test]
    fn docker_image_single_machine() {
        let env = env_with(Recipe::docker_image("alpine:3"), &["dev"]);
        let infra = EnvironmentFactory.create(&env).unwrap();
        assert!(infra.machines.contains_key("dev/dev"));
        let c = &infra.pods["dev"].spec.as_ref().unwrap().containers[0];
        assert_eq!(c.image.as_deref(), Some("alpine:3"));
    }

    #[test]
    fn docker_image_needs_one_machine() {
        let env = env_with(Recipe::docker_image("alpine:3"), &["a", "b"]);
        assert!(EnvironmentFactory.create(&env).is_err());
    }

    #[test]
    fn kubernetes_pods_map_to_machines() {
        let env = env_with(
            Recipe::kubernetes(TWO_PODS),
            &["ws/dev", "ws/db", "tools/ls"],
        );
        let infra = EnvironmentFactory.create(&env).unwrap();
        assert_eq!(infra.pods.len(), 2);
        assert_eq!(
            infra.machines.keys().collect::<Vec<_>>(),
            vec!["tools/ls", "ws/db", "ws/dev"]
        );
    }

    #[test]
    fn container_without_machine_is_rejected() {
        let env = env_with(Recipe::kubernetes(TWO_PODS), &["ws/dev", "ws/db"]);
        let err = EnvironmentFactory.create(&env).unwrap_err();
        assert!(err.to_string().contains("tools/ls"));
    }

    #[test]
    fn machine_without_container_is_rejected() {
        let env = env_with(
            Recipe::kubernetes(TWO_PODS),
            &["ws/dev", "ws/db", "tools/ls", "ws/cache"],
        );
        let err = EnvironmentFactory.create(&env).unwrap_err();
        assert!(err.to_string().contains("ws/cache"));
    }

    #[test]
    fn non_pod_objects_are_rejected() {
        let yaml = "apiVersion: v1\nkind: Service\nmetadata:\n  name: s\n";
        let env = env_with(Recipe::kubernetes(yaml), &[]);
        assert!(matches!(
            EnvironmentFactory.create(&env),
            Err(ProvisionError::Configuration(_))
        ));
    }
}
