//! The reconcile sequence for one `ManagementIngress`.
//!
//! Each pass resolves the external host, then runs the steps of the cluster's
//! plan in order. A failing step records its condition in the status and stops
//! the pass; later steps are retried on the next one.

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Pod},
};
use kube::ResourceExt;
use tokio::time::Duration;
use tracing::{debug, error, info, warn};

use crate::api::v1alpha1::{ConditionType, ManagementIngress, ManagementIngressStatus, OperandStatus, PodState};
use crate::constants::*;
use crate::controllers::{
    certificate::sync_certificates,
    configmap::{bind_info_data, cncf_cluster_info, desired_config_map, standard_cluster_info, sync_config_map, OnChange},
    deployment::{allowed_host_header, is_legacy_selector, operand_image, sync_deployment, DeploymentParams},
    route::{sync_cluster_ca_only, sync_routes, RouteTargets},
    service::sync_service,
    sync::Synced,
    ResourceKind,
};
use crate::util::{
    clock::Clock,
    discovery::ClusterDiscovery,
    errors::{Error, Result, StdError},
    settings::Settings,
    status::{mark_kind_failed, mark_kind_ready, set_operand_state},
    store::ObjectStore,
};

const LEGACY_REQUEUE: Duration = Duration::from_secs(5);
const SUCCESS_MESSAGE: &str = "The management ingress is deployed successfully";

/// Splits `domain[:nodePort]`. Only an all-digit suffix counts as a port.
pub fn split_node_port(domain: &str) -> (&str, Option<&str>) {
    match domain.rsplit_once(':') {
        Some((host, port)) if !port.is_empty() && port.bytes().all(|b| b.is_ascii_digit()) => (host, Some(port)),
        _ => (domain, None),
    }
}

pub fn strip_node_port(host: &str) -> &str {
    split_node_port(host).0
}

fn prefixed_host(prefix: &str, base_domain: &str, namespace: &str, multiple_instances: bool) -> String {
    if multiple_instances {
        format!("{prefix}-{namespace}.{base_domain}")
    } else {
        format!("{prefix}.{base_domain}")
    }
}

pub fn console_host(base_domain: &str, namespace: &str, multiple_instances: bool) -> String {
    prefixed_host(CONSOLE_ROUTE_NAME, base_domain, namespace, multiple_instances)
}

pub fn proxy_host(base_domain: &str, namespace: &str, multiple_instances: bool) -> String {
    prefixed_host(PROXY_ROUTE_NAME, base_domain, namespace, multiple_instances)
}

/// Whether the cluster serves routes (OpenShift) or is a plain CNCF cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub enum ClusterFlavor {
    #[default]
    Standard,
    /// `domain_name` may carry a `:<nodePort>` suffix.
    Cncf { domain_name: String },
}

impl ClusterFlavor {
    pub fn serves_routes(&self) -> bool {
        matches!(self, ClusterFlavor::Standard)
    }
}

/// Reads the flavor from the ibm-cpp-config map in the operator namespace.
pub async fn detect_flavor<S>(store: &S, operator_namespace: &str) -> Result<ClusterFlavor, StdError>
where
    S: ObjectStore + ?Sized,
{
    let Some(config) = store.get::<ConfigMap>(operator_namespace, CPP_CONFIG_NAME).await? else {
        info!("No '{}' config map, assuming routes are available", CPP_CONFIG_NAME);
        return Ok(ClusterFlavor::Standard);
    };
    let data = config.data.unwrap_or_default();
    if data.get(KUBERNETES_CLUSTER_TYPE).map(String::as_str) != Some(CNCF) {
        return Ok(ClusterFlavor::Standard);
    }
    let domain_name = data
        .get(CPP_DOMAIN_NAME)
        .filter(|d| !d.is_empty())
        .cloned()
        .ok_or_else(|| StdError::InvalidArgument(format!("'{CPP_CONFIG_NAME}' selects cncf but has no {CPP_DOMAIN_NAME}")))?;
    info!("Running on a CNCF cluster with domain '{}'", domain_name);
    Ok(ClusterFlavor::Cncf { domain_name })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Certificates,
    Service,
    Config,
    Routes,
    ClusterCa,
    Deployment,
}

impl Step {
    pub fn kind(&self) -> ResourceKind {
        match self {
            Step::Certificates => ResourceKind::Certificate,
            Step::Service => ResourceKind::Service,
            Step::Config => ResourceKind::ConfigMap,
            Step::Routes => ResourceKind::Route,
            Step::ClusterCa => ResourceKind::Secret,
            Step::Deployment => ResourceKind::Deployment,
        }
    }
}

/// Ordered steps of a pass for the given flavor.
pub fn plan(flavor: &ClusterFlavor) -> &'static [Step] {
    match flavor {
        ClusterFlavor::Standard => &[
            Step::Certificates,
            Step::Service,
            Step::Config,
            Step::Routes,
            Step::Deployment,
        ],
        ClusterFlavor::Cncf { .. } => &[
            Step::Certificates,
            Step::Service,
            Step::Config,
            Step::ClusterCa,
            Step::Deployment,
        ],
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// Every step ran; carries what each synchronizer did.
    Completed(Vec<Synced>),
    Requeue(Duration),
}

/// Sorts pods into ready, failed and not-ready name lists.
pub fn pod_buckets(status: &mut ManagementIngressStatus, pods: &[Pod]) {
    let mut buckets = PodState::default();
    for pod in pods {
        let name = pod.name_any();
        let pod_status = pod.status.as_ref();
        let phase = pod_status.and_then(|s| s.phase.as_deref()).unwrap_or_default();
        let containers_ready = pod_status
            .and_then(|s| s.container_statuses.as_ref())
            .is_some_and(|cs| !cs.is_empty() && cs.iter().all(|c| c.ready));
        match phase {
            "Running" if containers_ready => buckets.ready.push(name),
            "Failed" => buckets.failed.push(name),
            _ => buckets.not_ready.push(name),
        }
    }
    buckets.ready.sort();
    buckets.failed.sort();
    buckets.not_ready.sort();
    status.pod_state = buckets;
}

fn classify(error: &StdError) -> ConditionType {
    match error {
        StdError::Timeout { .. } => ConditionType::WaitingResource,
        StdError::Discovery(_) => ConditionType::DiscoveringClusterInfo,
        _ => ConditionType::ResourceFailedOnCreation,
    }
}

/// State carried between the steps of one pass.
struct Pass<'p> {
    ingress: &'p ManagementIngress,
    namespace: String,
    host: String,
    base_domain: Option<String>,
}

impl Pass<'_> {
    fn multiple_instances(&self) -> bool {
        self.ingress.spec.multiple_instances_enabled
    }
}

pub struct Orchestrator<'a, S: ?Sized, D: ?Sized, C: ?Sized> {
    store: &'a S,
    discovery: &'a D,
    clock: &'a C,
    settings: &'a Settings,
    flavor: &'a ClusterFlavor,
    certificates_served: bool,
}

impl<'a, S, D, C> Orchestrator<'a, S, D, C>
where
    S: ObjectStore + ?Sized,
    D: ClusterDiscovery + ?Sized,
    C: Clock + ?Sized,
{
    pub fn new(store: &'a S, discovery: &'a D, clock: &'a C, settings: &'a Settings, flavor: &'a ClusterFlavor) -> Self {
        Self {
            store,
            discovery,
            clock,
            settings,
            flavor,
            certificates_served: true,
        }
    }

    /// Whether the cert-manager Certificate API is available.
    pub fn with_certificates(mut self, served: bool) -> Self {
        self.certificates_served = served;
        self
    }

    pub async fn reconcile(&self, ingress: &ManagementIngress) -> Result<ReconcileOutcome> {
        let instance = ingress.name_any();
        let namespace = ingress
            .namespace()
            .ok_or_else(|| StdError::MetadataMissing(format!("ManagementIngress '{instance}' has no namespace")))?;

        let legacy = self.remove_legacy_deployment(&namespace).await.map_err(|source| Error::Sync {
            kind: ResourceKind::Deployment,
            instance: instance.clone(),
            source,
        })?;
        if legacy {
            return Ok(ReconcileOutcome::Requeue(LEGACY_REQUEUE));
        }

        let mut persisted = ingress.status.clone().unwrap_or_default();
        let mut status = persisted.clone();
        let mut pass = Pass {
            ingress,
            namespace,
            host: String::new(),
            base_domain: None,
        };

        match self.resolve_host(&mut pass).await {
            Ok(host) => pass.host = host,
            Err(e) => {
                error!("Failure resolving route host for '{}': {}", instance, e);
                set_operand_state(&mut status, OperandStatus::Failed, e.to_string());
                self.write_status_quietly(ingress, &mut persisted, &status).await;
                return Err(e.into());
            }
        }

        if persisted.host.is_empty() || persisted.host != pass.host {
            info!("Setting status host of '{}' to {}", instance, pass.host);
            status = ManagementIngressStatus {
                host: pass.host.clone(),
                ..Default::default()
            };
            let message = format!(
                "Get router host for management ingress at {}",
                self.clock.now().format("%Y-%m-%d %H:%M:%S")
            );
            set_operand_state(&mut status, OperandStatus::Deploying, message);
            self.write_status(ingress, &mut persisted, &status).await?;
        }

        let mut synced = Vec::new();
        for step in plan(self.flavor) {
            if *step == Step::Certificates && !self.certificates_served {
                debug!("Certificate API not served, skipping certificates");
                continue;
            }
            let kind = step.kind();
            match self.run_step(*step, &mut pass).await {
                Ok(done) => {
                    mark_kind_ready(&mut status, kind.as_str(), self.clock.now());
                    synced.extend(done);
                }
                Err(source) => {
                    error!("Step {:?} failed for '{}': {}", step, instance, source);
                    let message = source.to_string();
                    mark_kind_failed(&mut status, kind.as_str(), classify(&source), &message, self.clock.now());
                    set_operand_state(&mut status, OperandStatus::Failed, message);
                    self.write_status_quietly(ingress, &mut persisted, &status).await;
                    return Err(Error::Sync { kind, instance, source });
                }
            }
        }

        match self
            .store
            .list::<Pod>(&pass.namespace, &format!("app={APP_NAME}"))
            .await
        {
            Ok(pods) => pod_buckets(&mut status, &pods),
            Err(e) => warn!("Failure listing pods of '{}': {}", APP_NAME, e),
        }

        set_operand_state(&mut status, OperandStatus::Successful, SUCCESS_MESSAGE);
        self.write_status(ingress, &mut persisted, &status).await?;
        Ok(ReconcileOutcome::Completed(synced))
    }

    async fn remove_legacy_deployment(&self, namespace: &str) -> Result<bool, StdError> {
        let Some(deployment) = self.store.get::<Deployment>(namespace, APP_NAME).await? else {
            return Ok(false);
        };
        if !is_legacy_selector(&deployment) {
            return Ok(false);
        }
        info!(
            "Deployment '{}' has an empty '{}' selector label, deleting it for recreation",
            APP_NAME, MANAGED_BY_LABEL
        );
        self.store.delete::<Deployment>(namespace, APP_NAME).await?;
        Ok(true)
    }

    async fn base_domain(&self, pass: &mut Pass<'_>) -> Result<String, StdError> {
        if let Some(domain) = &pass.base_domain {
            return Ok(domain.clone());
        }
        let domain = self.discovery.route_base_domain().await?;
        pass.base_domain = Some(domain.clone());
        Ok(domain)
    }

    async fn resolve_host(&self, pass: &mut Pass<'_>) -> Result<String, StdError> {
        let ingress = pass.ingress;
        if !ingress.spec.route_host.is_empty() {
            return Ok(ingress.spec.route_host.clone());
        }
        match self.flavor {
            ClusterFlavor::Standard => {
                let base = self.base_domain(pass).await?;
                Ok(console_host(&base, &pass.namespace, pass.multiple_instances()))
            }
            ClusterFlavor::Cncf { domain_name } => Ok(format!("{CONSOLE_ROUTE_NAME}.{domain_name}")),
        }
    }

    async fn run_step(&self, step: Step, pass: &mut Pass<'_>) -> Result<Vec<Synced>, StdError> {
        let ingress = pass.ingress;
        let plain_host = strip_node_port(&pass.host).to_string();
        match step {
            Step::Certificates => sync_certificates(self.store, ingress, &pass.namespace, &plain_host).await,
            Step::Service => Ok(vec![sync_service(self.store, ingress, &pass.namespace).await?]),
            Step::Config => self.sync_config(pass).await,
            Step::Routes => {
                let base = self.base_domain(pass).await?;
                let proxy = proxy_host(&base, &pass.namespace, pass.multiple_instances());
                let targets = RouteTargets {
                    namespace: &pass.namespace,
                    console_host: &plain_host,
                    proxy_host: &proxy,
                    wait: self.settings.secret_wait(),
                };
                sync_routes(self.store, self.clock, ingress, targets).await
            }
            Step::ClusterCa => {
                sync_cluster_ca_only(self.store, self.clock, ingress, &pass.namespace, self.settings.secret_wait()).await
            }
            Step::Deployment => {
                let cluster_domain = match self.flavor {
                    ClusterFlavor::Standard => self.discovery.cluster_domain().await?,
                    ClusterFlavor::Cncf { .. } => CNCF_CLUSTER_DOMAIN.to_string(),
                };
                let params = DeploymentParams {
                    namespace: pass.namespace.clone(),
                    image: operand_image(&ingress.spec, self.settings.image.as_deref())?,
                    cluster_domain,
                    allowed_host_header: allowed_host_header(&ingress.spec, &plain_host, &pass.namespace),
                    namespaced_watch: self.settings.watch_namespace().is_some(),
                };
                Ok(vec![sync_deployment(self.store, ingress, &params).await?])
            }
        }
    }

    async fn sync_config(&self, pass: &mut Pass<'_>) -> Result<Vec<Synced>, StdError> {
        let ingress = pass.ingress;
        let ns = pass.namespace.clone();

        let mut synced = sync_config_map(
            self.store,
            self.clock,
            ingress,
            desired_config_map(&ns, CONFIG_NAME, ingress.spec.config.clone()),
            OnChange::RestartDeployment,
        )
        .await?;

        synced.extend(
            sync_config_map(
                self.store,
                self.clock,
                ingress,
                desired_config_map(&ns, BIND_INFO_CONFIG_MAP, bind_info_data(&pass.host)),
                OnChange::Nothing,
            )
            .await?,
        );

        let cluster_info = match self.flavor {
            ClusterFlavor::Standard => {
                let base = self.base_domain(pass).await?;
                let api_server = self.discovery.console_api_server().await?;
                let proxy = proxy_host(&base, &ns, pass.multiple_instances());
                standard_cluster_info(self.settings, &ns, &pass.host, &base, &api_server, &proxy)
            }
            ClusterFlavor::Cncf { domain_name } => cncf_cluster_info(self.settings, &ns, domain_name),
        };
        synced.extend(
            sync_config_map(
                self.store,
                self.clock,
                ingress,
                desired_config_map(&ns, CLUSTER_CONFIG_NAME, cluster_info),
                OnChange::Nothing,
            )
            .await?,
        );
        Ok(synced)
    }

    /// Writes `status` unless it equals what was last persisted.
    async fn write_status(
        &self,
        ingress: &ManagementIngress,
        persisted: &mut ManagementIngressStatus,
        status: &ManagementIngressStatus,
    ) -> Result<(), StdError> {
        if persisted == status {
            return Ok(());
        }
        self.store.update_status(ingress, status).await?;
        *persisted = status.clone();
        Ok(())
    }

    async fn write_status_quietly(
        &self,
        ingress: &ManagementIngress,
        persisted: &mut ManagementIngressStatus,
        status: &ManagementIngressStatus,
    ) {
        if let Err(e) = self.write_status(ingress, persisted, status).await {
            warn!("Failure updating status of '{}': {}", ingress.name_any(), e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{ContainerStatus, PodStatus};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    #[test]
    fn node_port_split_only_on_digits() {
        assert_eq!(split_node_port("example.com:30443"), ("example.com", Some("30443")));
        assert_eq!(split_node_port("example.com"), ("example.com", None));
        assert_eq!(split_node_port("example.com:"), ("example.com:", None));
        assert_eq!(strip_node_port("cp-console.example.com:30443"), "cp-console.example.com");
    }

    #[test]
    fn hosts_carry_namespace_in_multi_instance_mode() {
        assert_eq!(console_host("apps.example.com", "cs", false), "cp-console.apps.example.com");
        assert_eq!(console_host("apps.example.com", "cs", true), "cp-console-cs.apps.example.com");
        assert_eq!(proxy_host("apps.example.com", "cs", true), "cp-proxy-cs.apps.example.com");
    }

    #[test]
    fn cncf_plan_has_no_routes() {
        let cncf = ClusterFlavor::Cncf {
            domain_name: "example.com".to_string(),
        };
        assert!(!plan(&cncf).contains(&Step::Routes));
        assert!(plan(&ClusterFlavor::Standard).contains(&Step::Routes));
        assert_eq!(plan(&cncf).last(), Some(&Step::Deployment));
    }

    fn pod(name: &str, phase: &str, ready: bool) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.to_string()),
                ..Default::default()
            },
            status: Some(PodStatus {
                phase: Some(phase.to_string()),
                container_statuses: Some(vec![ContainerStatus {
                    name: APP_NAME.to_string(),
                    ready,
                    ..Default::default()
                }]),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn pods_are_bucketed_by_phase_and_readiness() {
        let mut status = ManagementIngressStatus::default();
        let pods = vec![
            pod("b", "Running", true),
            pod("a", "Running", true),
            pod("c", "Running", false),
            pod("d", "Failed", false),
            pod("e", "Pending", false),
        ];
        pod_buckets(&mut status, &pods);
        assert_eq!(status.pod_state.ready, vec!["a", "b"]);
        assert_eq!(status.pod_state.not_ready, vec!["c", "e"]);
        assert_eq!(status.pod_state.failed, vec!["d"]);
    }

    #[test]
    fn timeouts_classify_as_waiting() {
        let timeout = StdError::Timeout {
            what: "secret x".to_string(),
            waited: Duration::from_secs(1),
        };
        assert_eq!(classify(&timeout), ConditionType::WaitingResource);
        assert_eq!(
            classify(&StdError::Discovery("no domain".to_string())),
            ConditionType::DiscoveringClusterInfo
        );
        assert_eq!(
            classify(&StdError::InvalidArgument("x".to_string())),
            ConditionType::ResourceFailedOnCreation
        );
    }
}
