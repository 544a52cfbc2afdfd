use crate::config::ProvisionConfig;
use crate::error::ProvisionError;
use crate::infra::InfraEnvironment;
use crate::names::{
    ANNOTATION_MACHINE, ANNOTATION_SERVER, LABEL_MACHINE, LABEL_SERVER,
    LABEL_WORKSPACE_ID, slug, workspace_scoped,
};
use crate::provisioner::{ProvisionStage, Provisioner};
use crate::provisioners::servers::service_name;
use k8s_openapi::api::networking::v1::{
    HTTPIngressPath, HTTPIngressRuleValue, Ingress, IngressBackend,
    IngressRule, IngressServiceBackend, IngressSpec, ServiceBackendPort,
};
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use std::collections::BTreeMap;
use wsrt_models::{EnvironmentConfig, RuntimeIdentity, attrs};

/// Exposes every non-internal server through its own Ingress. In
/// single-host mode all servers share the configured domain and are told
/// apart by path prefix.
#[derive(Debug)]
pub struct IngressProvisioner {
    domain: String,
    single_host: bool,
}

impl IngressProvisioner {
    pub fn new(config: &ProvisionConfig) -> Self {
        Self {
            domain: config.ingress_domain.clone(),
            single_host: config.single_host(),
        }
    }

    fn rule(
        &self,
        identity: &RuntimeIdentity,
        machine: &str,
        server: &str,
    ) -> (String, String) {
        let ws = slug(&identity.workspace_id);
        if self.single_host {
            (
                self.domain.clone(),
                format!("/{ws}/{}/{}/", slug(machine), slug(server)),
            )
        } else {
            (
                format!("{}-{ws}.{}", slug(server), self.domain),
                "/".to_string(),
            )
        }
    }
}

impl Provisioner for IngressProvisioner {
    fn name(&self) -> &'static str {
        "ingress"
    }

    fn stage(&self) -> ProvisionStage {
        ProvisionStage::Ingress
    }

    fn apply(
        &self,
        _env: &EnvironmentConfig,
        infra: &mut InfraEnvironment,
        identity: &RuntimeIdentity,
    ) -> Result<(), ProvisionError> {
        for (machine_name, machine) in &infra.machines {
            let Some((pod, _)) = machine_name.split_once('/') else {
                continue;
            };
            for (server_name, server) in &machine.servers {
                if server.is_flag_set(attrs::SERVER_INTERNAL) {
                    continue;
                }
                let port = server
                    .attributes
                    .get(attrs::SERVER_SERVICE_PORT)
                    .ok_or_else(|| {
                        ProvisionError::config(format!(
                            "server '{server_name}' of machine \
                             '{machine_name}' has no service port"
                        ))
                    })?;
                let (host, path) = self.rule(identity, machine_name, server_name);
                let name = workspace_scoped(
                    identity,
                    &format!("{}-{}", slug(machine_name), slug(server_name)),
                );

                let mut labels = BTreeMap::new();
                labels.insert(
                    LABEL_WORKSPACE_ID.to_string(),
                    identity.workspace_id.clone(),
                );
                labels.insert(LABEL_MACHINE.to_string(), slug(machine_name));
                labels.insert(LABEL_SERVER.to_string(), slug(server_name));
                let mut annotations = BTreeMap::new();
                annotations
                    .insert(ANNOTATION_MACHINE.to_string(), machine_name.clone());
                annotations
                    .insert(ANNOTATION_SERVER.to_string(), server_name.clone());

                let ingress = Ingress {
                    metadata: ObjectMeta {
                        name: Some(name.clone()),
                        labels: Some(labels),
                        annotations: Some(annotations),
                        ..Default::default()
                    },
                    spec: Some(IngressSpec {
                        rules: Some(vec![IngressRule {
                            host: Some(host),
                            http: Some(HTTPIngressRuleValue {
                                paths: vec![HTTPIngressPath {
                                    path: Some(path),
                                    path_type: "Prefix".to_string(),
                                    backend: IngressBackend {
                                        service: Some(IngressServiceBackend {
                                            name: service_name(identity, pod),
                                            port: Some(ServiceBackendPort {
                                                name: Some(port.clone()),
                                                ..Default::default()
                                            }),
                                        }),
                                        ..Default::default()
                                    },
                                }],
                            }),
                        }]),
                        ..Default::default()
                    }),
                    ..Default::default()
                };
                infra.ingresses.insert(name, ingress);
            }
        }
        Ok(())
    }
}
