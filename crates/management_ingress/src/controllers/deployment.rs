use std::collections::BTreeMap;

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec},
        core::v1::{
            Affinity, ConfigMapKeySelector, Container, ContainerPort, EnvVar, EnvVarSource, HTTPGetAction,
            ObjectFieldSelector, PodAffinityTerm, PodAntiAffinity, PodSpec, PodTemplateSpec, Probe,
            ResourceRequirements, SecretKeySelector, SecretVolumeSource, SecurityContext, Toleration,
            TopologySpreadConstraint, Volume, VolumeMount, WeightedPodAffinityTerm,
        },
    },
    apimachinery::pkg::{
        api::resource::Quantity,
        apis::meta::v1::{LabelSelector, LabelSelectorRequirement, ObjectMeta},
        util::intstr::IntOrString,
    },
};

use crate::api::v1alpha1::{ManagementIngress, ManagementIngressSpec};
use crate::constants::*;
use crate::controllers::sync::{ensure, Synced};
use crate::util::{errors::StdError, store::ObjectStore};

const HTTPS_PORT: i32 = 8443;
const HTTP_PORT: i32 = 8080;
const TLS_VOLUME: &str = "tls-secret";

/// Everything the pod template depends on besides the custom resource itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeploymentParams {
    pub namespace: String,
    pub image: String,
    /// In-cluster DNS domain handed to the operand
    pub cluster_domain: String,
    pub allowed_host_header: String,
    /// Whether the operand is restricted to the namespaces listed in the namespace-scope map
    pub namespaced_watch: bool,
}

/// Resolves the operand image: `[registry/]repository[:tag]` from the custom resource, else the fallback.
pub fn operand_image(spec: &ManagementIngressSpec, fallback: Option<&str>) -> Result<String, StdError> {
    let repository = spec.image.repository.trim();
    if !repository.is_empty() {
        let registry = spec.image_registry.trim().trim_end_matches('/');
        let mut image = if registry.is_empty() {
            repository.to_string()
        } else {
            format!("{registry}/{repository}")
        };
        if !spec.image.tag.is_empty() {
            image.push(':');
            image.push_str(&spec.image.tag);
        }
        return Ok(image);
    }
    fallback
        .filter(|image| !image.is_empty())
        .map(str::to_string)
        .ok_or_else(|| StdError::InvalidArgument("no operand image in spec.image or ICP_MANAGEMENT_INGRESS_IMAGE".to_string()))
}

/// Space separated host names the operand accepts in the Host header.
///
/// `host` must already have any node port stripped.
pub fn allowed_host_header(spec: &ManagementIngressSpec, host: &str, namespace: &str) -> String {
    let mut hosts: Vec<String> = Vec::with_capacity(8);
    if !spec.allowed_host_header.is_empty() {
        hosts.push(spec.allowed_host_header.clone());
    }
    hosts.push(host.to_string());
    for service in [SERVICE_NAME, IAM_TOKEN_SERVICE] {
        hosts.push(service.to_string());
        hosts.push(format!("{service}.{namespace}"));
        hosts.push(format!("{service}.{namespace}.svc"));
    }
    hosts.join(" ")
}

/// Deployments created before the managed-by label had a value carry an empty
/// one in their immutable selector and have to be recreated.
pub fn is_legacy_selector(deployment: &Deployment) -> bool {
    deployment
        .spec
        .as_ref()
        .and_then(|s| s.selector.match_labels.as_ref())
        .and_then(|labels| labels.get(MANAGED_BY_LABEL))
        .is_some_and(|value| value.is_empty())
}

fn default_resources() -> ResourceRequirements {
    let quantities = |memory: &str, cpu: &str| {
        BTreeMap::from([
            ("memory".to_string(), Quantity(memory.to_string())),
            ("cpu".to_string(), Quantity(cpu.to_string())),
        ])
    };
    ResourceRequirements {
        limits: Some(quantities("512Mi", "200m")),
        requests: Some(quantities("300Mi", "50m")),
        ..Default::default()
    }
}

fn env_value(name: &str, value: impl Into<String>) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: Some(value.into()),
        value_from: None,
    }
}

fn env_from(name: &str, source: EnvVarSource) -> EnvVar {
    EnvVar {
        name: name.to_string(),
        value: None,
        value_from: Some(source),
    }
}

fn config_map_key(map: &str, key: &str) -> EnvVarSource {
    EnvVarSource {
        config_map_key_ref: Some(ConfigMapKeySelector {
            name: map.to_string(),
            key: key.to_string(),
            optional: None,
        }),
        ..Default::default()
    }
}

fn secret_key(secret: &str, key: &str) -> EnvVarSource {
    EnvVarSource {
        secret_key_ref: Some(SecretKeySelector {
            name: secret.to_string(),
            key: key.to_string(),
            optional: None,
        }),
        ..Default::default()
    }
}

fn field_ref(path: &str) -> EnvVarSource {
    EnvVarSource {
        field_ref: Some(ObjectFieldSelector {
            api_version: Some("v1".to_string()),
            field_path: path.to_string(),
        }),
        ..Default::default()
    }
}

fn healthz_probe(failure_threshold: Option<i32>) -> Probe {
    Probe {
        http_get: Some(HTTPGetAction {
            path: Some("/healthz".to_string()),
            port: IntOrString::Int(HTTP_PORT),
            scheme: Some("HTTP".to_string()),
            ..Default::default()
        }),
        timeout_seconds: Some(1),
        initial_delay_seconds: Some(10),
        period_seconds: Some(10),
        failure_threshold,
        ..Default::default()
    }
}

fn container(spec: &ManagementIngressSpec, params: &DeploymentParams) -> Container {
    let mut command = vec![
        "/icp-management-ingress".to_string(),
        format!("--default-ssl-certificate=$(POD_NAMESPACE)/{TLS_SECRET_NAME}"),
        format!("--configmap=$(POD_NAMESPACE)/{CONFIG_NAME}"),
        format!("--http-port={HTTP_PORT}"),
        format!("--https-port={HTTPS_PORT}"),
    ];
    if params.namespaced_watch {
        command.push("--watch-namespace=$(WATCH_NAMESPACE)".to_string());
    }

    Container {
        name: APP_NAME.to_string(),
        image: Some(params.image.clone()),
        image_pull_policy: Some("IfNotPresent".to_string()),
        command: Some(command),
        resources: Some(spec.resources.clone().unwrap_or_else(default_resources)),
        ports: Some(vec![
            ContainerPort {
                name: Some("https".to_string()),
                container_port: HTTPS_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
            ContainerPort {
                name: Some("http".to_string()),
                container_port: HTTP_PORT,
                protocol: Some("TCP".to_string()),
                ..Default::default()
            },
        ]),
        env: Some(vec![
            env_from("WATCH_NAMESPACE", config_map_key(NAMESPACE_SCOPE_CONFIG_MAP, "namespaces")),
            env_value("ENABLE_IMPERSONATION", "false"),
            env_value("APISERVER_SECURE_PORT", "6443"),
            env_value("CLUSTER_DOMAIN", params.cluster_domain.as_str()),
            env_value("HOST_HEADERS_CHECK_ENABLED", "false"),
            env_value("ALLOWED_HOST_HEADERS", params.allowed_host_header.as_str()),
            env_from("OIDC_ISSUER_URL", config_map_key(PLATFORM_AUTH_CONFIG_MAP, "OIDC_ISSUER_URL")),
            env_from("WLP_CLIENT_ID", secret_key(PLATFORM_AUTH_SECRET, "WLP_CLIENT_ID")),
            env_from("POD_NAME", field_ref("metadata.name")),
            env_from("POD_NAMESPACE", field_ref("metadata.namespace")),
            env_value("FIPS_ENABLED", spec.fips_enabled.to_string()),
        ]),
        security_context: Some(SecurityContext {
            privileged: Some(false),
            allow_privilege_escalation: Some(false),
            ..Default::default()
        }),
        liveness_probe: Some(healthz_probe(Some(10))),
        readiness_probe: Some(healthz_probe(None)),
        volume_mounts: Some(vec![VolumeMount {
            name: TLS_VOLUME.to_string(),
            mount_path: "/var/run/secrets/tls".to_string(),
            ..Default::default()
        }]),
        ..Default::default()
    }
}

fn pressure_toleration(key: &str) -> Toleration {
    Toleration {
        key: Some(key.to_string()),
        operator: Some("Exists".to_string()),
        effect: Some("NoSchedule".to_string()),
        ..Default::default()
    }
}

fn app_selector() -> LabelSelector {
    LabelSelector {
        match_labels: Some(BTreeMap::from([("app".to_string(), APP_NAME.to_string())])),
        ..Default::default()
    }
}

fn spread(topology_key: &str) -> TopologySpreadConstraint {
    TopologySpreadConstraint {
        max_skew: 1,
        topology_key: topology_key.to_string(),
        when_unsatisfiable: "ScheduleAnyway".to_string(),
        label_selector: Some(app_selector()),
        ..Default::default()
    }
}

fn anti_affinity() -> Affinity {
    let expression = |key: &str| LabelSelectorRequirement {
        key: key.to_string(),
        operator: "In".to_string(),
        values: Some(vec![APP_NAME.to_string()]),
    };
    Affinity {
        pod_anti_affinity: Some(PodAntiAffinity {
            preferred_during_scheduling_ignored_during_execution: Some(vec![WeightedPodAffinityTerm {
                weight: 100,
                pod_affinity_term: PodAffinityTerm {
                    label_selector: Some(LabelSelector {
                        match_expressions: Some(vec![expression("app"), expression("component")]),
                        ..Default::default()
                    }),
                    topology_key: "kubernetes.io/hostname".to_string(),
                    ..Default::default()
                },
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

fn pod_spec(spec: &ManagementIngressSpec, params: &DeploymentParams) -> PodSpec {
    let mut tolerations = spec.tolerations.clone().unwrap_or_default();
    tolerations.push(pressure_toleration("node.kubernetes.io/memory-pressure"));
    tolerations.push(pressure_toleration("node.kubernetes.io/disk-pressure"));

    PodSpec {
        containers: vec![container(spec, params)],
        service_account_name: Some(SERVICE_ACCOUNT_NAME.to_string()),
        node_selector: spec.node_selector.clone(),
        tolerations: Some(tolerations),
        affinity: Some(anti_affinity()),
        topology_spread_constraints: Some(vec![
            spread("topology.kubernetes.io/zone"),
            spread("topology.kubernetes.io/region"),
        ]),
        volumes: Some(vec![Volume {
            name: TLS_VOLUME.to_string(),
            secret: Some(SecretVolumeSource {
                secret_name: Some(TLS_SECRET_NAME.to_string()),
                default_mode: Some(0o644),
                ..Default::default()
            }),
            ..Default::default()
        }]),
        termination_grace_period_seconds: Some(30),
        ..Default::default()
    }
}

/// The operand deployment; replicas default to 1 when unset or zero.
pub fn desired_deployment(ingress: &ManagementIngress, params: &DeploymentParams) -> Deployment {
    let spec = &ingress.spec;
    let labels = common_labels();
    let mut pod_labels = labels.clone();
    pod_labels.insert("intent".to_string(), "projected".to_string());

    let mut pod_annotations = common_annotations();
    pod_annotations.insert("scheduler.alpha.kubernetes.io/critical-pod".to_string(), String::new());
    pod_annotations.insert(
        "clusterhealth.ibm.com/dependencies".to_string(),
        "cert-manager, auth-idp".to_string(),
    );

    let replicas = spec.replicas.filter(|r| *r > 0).unwrap_or(1);

    Deployment {
        metadata: ObjectMeta {
            name: Some(APP_NAME.to_string()),
            namespace: Some(params.namespace.clone()),
            labels: Some(labels.clone()),
            annotations: Some(common_annotations()),
            ..Default::default()
        },
        spec: Some(DeploymentSpec {
            replicas: Some(replicas),
            selector: LabelSelector {
                match_labels: Some(labels),
                ..Default::default()
            },
            template: PodTemplateSpec {
                metadata: Some(ObjectMeta {
                    name: Some(APP_NAME.to_string()),
                    labels: Some(pod_labels),
                    annotations: Some(pod_annotations),
                    ..Default::default()
                }),
                spec: Some(pod_spec(spec, params)),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn sync_deployment<S>(
    store: &S,
    ingress: &ManagementIngress,
    params: &DeploymentParams,
) -> Result<Synced, StdError>
where
    S: ObjectStore + ?Sized,
{
    ensure(store, ingress, desired_deployment(ingress, params)).await
}
