use std::collections::BTreeMap;

use k8s_openapi::{
    api::{apps::v1::Deployment, core::v1::ConfigMap},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use tracing::{info, warn};

use crate::api::v1alpha1::ManagementIngress;
use crate::constants::*;
use crate::controllers::reconciler::split_node_port;
use crate::controllers::sync::{ensure, SyncOutcome, Synced};
use crate::util::{
    clock::Clock, discovery::ApiServerAddress, errors::StdError, settings::Settings, store::ObjectStore,
};

/// Side effect to run when a config map's data was rewritten.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnChange {
    Nothing,
    /// The operand reads this map only at start-up, so roll its pods.
    RestartDeployment,
}

pub fn desired_config_map(namespace: &str, name: &str, data: BTreeMap<String, String>) -> ConfigMap {
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(common_labels()),
            ..Default::default()
        },
        data: Some(data),
        ..Default::default()
    }
}

pub fn bind_info_data(host: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (BIND_INFO_ROUTE_HOST.to_string(), host.to_string()),
        (BIND_INFO_SERVICE_NAME.to_string(), SERVICE_NAME.to_string()),
    ])
}

fn cluster_endpoint(namespace: &str) -> String {
    format!("https://{SERVICE_NAME}.{namespace}.svc:443")
}

fn common_cluster_info(settings: &Settings, namespace: &str, address: &str) -> BTreeMap<String, String> {
    BTreeMap::from([
        (CLUSTER_ADDRESS.to_string(), address.to_string()),
        (CLUSTER_CA_DOMAIN.to_string(), address.to_string()),
        (CLUSTER_ENDPOINT.to_string(), cluster_endpoint(namespace)),
        (CLUSTER_NAME.to_string(), settings.cluster_name.clone()),
        (ROUTE_HTTP_PORT.to_string(), settings.route_http_port.to_string()),
        (ROUTE_HTTPS_PORT.to_string(), settings.route_https_port.to_string()),
        (CS_VERSION.to_string(), settings.version.clone()),
        (PROXY_HTTP_PORT.to_string(), "80".to_string()),
        (PROXY_HTTPS_PORT.to_string(), "443".to_string()),
    ])
}

/// ibmcloud-cluster-info contents on a cluster with routes.
pub fn standard_cluster_info(
    settings: &Settings,
    namespace: &str,
    host: &str,
    base_domain: &str,
    api_server: &ApiServerAddress,
    proxy_host: &str,
) -> BTreeMap<String, String> {
    let mut data = common_cluster_info(settings, namespace, host);
    data.insert(ROUTE_BASE_DOMAIN.to_string(), base_domain.to_string());
    data.insert(CLUSTER_API_SERVER_HOST.to_string(), api_server.host.clone());
    data.insert(CLUSTER_API_SERVER_PORT.to_string(), api_server.port.clone());
    data.insert(PROXY_ADDRESS.to_string(), proxy_host.to_string());
    data
}

/// ibmcloud-cluster-info contents derived from a `domain[:nodePort]` string.
pub fn cncf_cluster_info(settings: &Settings, namespace: &str, domain_name: &str) -> BTreeMap<String, String> {
    let (domain, node_port) = split_node_port(domain_name);
    let address = format!("{CONSOLE_ROUTE_NAME}.{domain}");
    let mut data = common_cluster_info(settings, namespace, &address);
    data.insert(PROXY_ADDRESS.to_string(), address);
    if let Some(port) = node_port {
        data.insert(CLUSTER_NODE_PORT.to_string(), port.to_string());
    }
    data
}

/// Ensures the config map and runs `on_change` when its data had to be rewritten.
pub async fn sync_config_map<S, C>(
    store: &S,
    clock: &C,
    ingress: &ManagementIngress,
    desired: ConfigMap,
    on_change: OnChange,
) -> Result<Vec<Synced>, StdError>
where
    S: ObjectStore + ?Sized,
    C: Clock + ?Sized,
{
    let namespace = desired.metadata.namespace.clone().unwrap_or_default();
    let synced = ensure(store, ingress, desired).await?;
    let restart = on_change == OnChange::RestartDeployment && synced.outcome == SyncOutcome::Updated;

    let mut out = vec![synced];
    if restart {
        out.extend(restart_deployment(store, clock, &namespace).await);
    }
    Ok(out)
}

/// Stamps the pod template so the deployment rolls. Failures are logged only;
/// a missing deployment will be created with the new config anyway.
async fn restart_deployment<S, C>(store: &S, clock: &C, namespace: &str) -> Option<Synced>
where
    S: ObjectStore + ?Sized,
    C: Clock + ?Sized,
{
    let mut deployment = match store.get::<Deployment>(namespace, APP_NAME).await {
        Ok(Some(deployment)) => deployment,
        Ok(None) => return None,
        Err(e) => {
            warn!("Failure getting Deployment '{}' after config change: {}", APP_NAME, e);
            return None;
        }
    };

    deployment
        .spec
        .get_or_insert_with(Default::default)
        .template
        .metadata
        .get_or_insert_with(Default::default)
        .annotations
        .get_or_insert_with(Default::default)
        .insert(CONFIG_UPDATE_ANNOTATION.to_string(), clock.now().to_rfc2822());

    info!("Restarting Deployment '{}' after config change", APP_NAME);
    match store.update(&deployment).await {
        Ok(_) => Some(Synced {
            kind: "Deployment".to_string(),
            name: APP_NAME.to_string(),
            outcome: SyncOutcome::Updated,
        }),
        Err(e) => {
            warn!("Failure updating Deployment '{}' after config change: {}", APP_NAME, e);
            None
        }
    }
}
