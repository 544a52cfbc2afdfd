use crate::error::ProvisionError;
use crate::infra::{InfraEnvironment, machine_name};
use crate::names::{LABEL_POD, workspace_scoped};
use crate::provisioner::{ProvisionStage, Provisioner};
use k8s_openapi::api::core::v1::{
    ContainerPort, Service, ServicePort, ServiceSpec,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::apimachinery::pkg::util::intstr::IntOrString;
use std::collections::BTreeMap;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity, attrs};

/// Name of the Service exposing the servers of `pod`.
pub fn service_name(identity: &RuntimeIdentity, pod: &str) -> String {
    workspace_scoped(identity, &format!("{pod}-svc"))
}

fn port_name(port: i32, transport: &str) -> String {
    format!("srv-{port}-{}", transport.to_ascii_lowercase())
}

/// Declares every machine server as a container port and as a named port
/// on one Service per pod, and records the port name on the server.
#[derive(Debug, Default)]
pub struct ServersProvisioner;

impl Provisioner for ServersProvisioner {
    fn name(&self) -> &'static str {
        "servers"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::Servers
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        let mut service_ports: BTreeMap<String, Vec<ServicePort>> =
            BTreeMap::new();

        for (pod_name, pod) in infra.pods.iter_mut() {
            let Some(spec) = pod.spec.as_mut() else {
                continue;
            };
            for container in spec.containers.iter_mut() {
                let name = machine_name(pod_name, &container.name);
                let Some(machine) = infra.machines.get_mut(&name) else {
                    continue;
                };
                for (server_name, server) in machine.servers.iter_mut() {
                    let port = server.port_number().ok_or_else(|| {
                        ProvisionError::config(format!(
                            "server '{server_name}' of machine '{name}' has \
                             invalid port '{}'",
                            server.port
                        ))
                    })?;
                    let transport = server.transport();

                    let ports = container.ports.get_or_insert_with(Vec::new);
                    if !ports.iter().any(|p| {
                        p.container_port == port
                            && p.protocol.as_deref().unwrap_or("TCP")
                                == transport
                    }) {
                        ports.push(ContainerPort {
                            container_port: port,
                            protocol: Some(transport.clone()),
                            ..Default::default()
                        });
                    }

                    let pname = port_name(port, &transport);
                    server
                        .attributes
                        .insert(attrs::SERVER_SERVICE_PORT.into(), pname.clone());
                    service_ports.entry(pod_name.clone()).or_default().push(
                        ServicePort {
                            name: Some(pname),
                            port,
                            target_port: Some(IntOrString::Int(port)),
                            protocol: Some(transport),
                            ..Default::default()
                        },
                    );
                }
            }

            pod.metadata
                .labels
                .get_or_insert_with(BTreeMap::new)
                .insert(LABEL_POD.into(), pod_name.clone());
        }

        for (pod_name, ports) in service_ports {
            let name = service_name(identity, &pod_name);
            let service =
                infra.services.entry(name.clone()).or_insert_with(|| Service {
                    metadata: ObjectMeta {
                        name: Some(name),
                        ..Default::default()
                    },
                    ..Default::default()
                });
            let spec = service.spec.get_or_insert_with(ServiceSpec::default);
            spec.selector
                .get_or_insert_with(BTreeMap::new)
                .insert(LABEL_POD.into(), pod_name.clone());
            let existing = spec.ports.get_or_insert_with(Vec::new);
            for port in ports {
                match existing.iter_mut().find(|p| p.name == port.name) {
                    Some(p) => *p = port,
                    None => existing.push(port),
                }
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::*;
    use wsrt_models::ServerConfig;

    #[test]
    fn declares_ports_and_service() {
        let (env, mut infra) = single_machine(|m| {
            m.servers
                .insert("wsagent/http".into(), ServerConfig::new("4401/tcp", "http"));
            m.servers
                .insert("dns".into(), ServerConfig::new("53/udp", "dns"));
        });
        ServersProvisioner
            .apply(&env, &mut infra, &identity())
            .unwrap();

        let container = &infra.pods["dev"].spec.as_ref().unwrap().containers[0];
        let ports = container.ports.as_ref().unwrap();
        assert_eq!(ports.len(), 2);
        assert!(ports.iter().any(|p| p.container_port == 53
            && p.protocol.as_deref() == Some("UDP")));

        let svc = &infra.services["ws-1-dev-svc"];
        let spec = svc.spec.as_ref().unwrap();
        assert_eq!(spec.ports.as_ref().unwrap().len(), 2);
        assert_eq!(spec.selector.as_ref().unwrap()[LABEL_POD], "dev");
        let server = &infra.machines["dev/dev"].servers["wsagent/http"];
        assert_eq!(server.attributes[attrs::SERVER_SERVICE_PORT], "srv-4401-tcp");
    }

    #[test]
    fn invalid_port_is_a_configuration_error() {
        let (env, mut infra) = single_machine(|m| {
            m.servers
                .insert("web".into(), ServerConfig::new("http/tcp", "http"));
        });
        let err = ServersProvisioner
            .apply(&env, &mut infra, &identity())
            .unwrap_err();
        assert!(matches!(err, ProvisionError::Configuration(_)));
    }
}
