//! Cluster facts the operator reads but does not own.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::ConfigMap;
use kube::{
    api::{Api, ApiResource, DynamicObject, GroupVersionKind},
    client::Client,
};
use serde::Deserialize;
use tracing::info;

use crate::constants::{CONSOLE_CONFIG_KEY, CONSOLE_CONFIG_NAME, CONSOLE_NAMESPACE};
use crate::util::errors::StdError;

const OPENSHIFT_OPERATOR_GROUP: &str = "operator.openshift.io";
const INGRESS_OPERATOR_NAMESPACE: &str = "openshift-ingress-operator";
const DEFAULT_NAME: &str = "default";

/// Externally reachable API server, as published by the console.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiServerAddress {
    pub host: String,
    pub port: String,
}

#[async_trait]
pub trait ClusterDiscovery: Send + Sync {
    /// Base domain routes are published under, e.g. `apps.example.com`.
    async fn route_base_domain(&self) -> Result<String, StdError>;

    /// In-cluster DNS domain, e.g. `cluster.local`.
    async fn cluster_domain(&self) -> Result<String, StdError>;

    async fn console_api_server(&self) -> Result<ApiServerAddress, StdError>;
}

#[derive(Clone)]
pub struct KubeDiscovery {
    client: Client,
}

impl KubeDiscovery {
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    fn operator_resource(kind: &str, plural: &str) -> ApiResource {
        let gvk = GroupVersionKind::gvk(OPENSHIFT_OPERATOR_GROUP, "v1", kind);
        ApiResource::from_gvk_with_plural(&gvk, plural)
    }
}

fn status_string(obj: &DynamicObject, pointer: &str) -> Option<String> {
    obj.data
        .pointer(pointer)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

#[async_trait]
impl ClusterDiscovery for KubeDiscovery {
    async fn route_base_domain(&self) -> Result<String, StdError> {
        let ar = Self::operator_resource("IngressController", "ingresscontrollers");
        let api: Api<DynamicObject> = Api::namespaced_with(self.client.clone(), INGRESS_OPERATOR_NAMESPACE, &ar);
        let controller = api.get(DEFAULT_NAME).await.map_err(|e| {
            StdError::Discovery(format!("unable to read ingresscontroller {INGRESS_OPERATOR_NAMESPACE}/{DEFAULT_NAME}: {e}"))
        })?;
        status_string(&controller, "/status/domain").ok_or_else(|| {
            StdError::Discovery(format!(
                "ingresscontroller {INGRESS_OPERATOR_NAMESPACE}/{DEFAULT_NAME} reports no router domain"
            ))
        })
    }

    async fn cluster_domain(&self) -> Result<String, StdError> {
        let ar = Self::operator_resource("DNS", "dnses");
        let api: Api<DynamicObject> = Api::all_with(self.client.clone(), &ar);
        let dns = api
            .get(DEFAULT_NAME)
            .await
            .map_err(|e| StdError::Discovery(format!("unable to read dns.{OPENSHIFT_OPERATOR_GROUP}/{DEFAULT_NAME}: {e}")))?;
        status_string(&dns, "/status/clusterDomain").ok_or_else(|| {
            StdError::Discovery(format!("dns.{OPENSHIFT_OPERATOR_GROUP}/{DEFAULT_NAME} reports no cluster domain"))
        })
    }

    async fn console_api_server(&self) -> Result<ApiServerAddress, StdError> {
        let api: Api<ConfigMap> = Api::namespaced(self.client.clone(), CONSOLE_NAMESPACE);
        let console = api.get(CONSOLE_CONFIG_NAME).await.map_err(|e| {
            StdError::Discovery(format!("unable to read {CONSOLE_NAMESPACE}/{CONSOLE_CONFIG_NAME}: {e}"))
        })?;
        let raw = console
            .data
            .as_ref()
            .and_then(|d| d.get(CONSOLE_CONFIG_KEY))
            .ok_or_else(|| {
                StdError::Discovery(format!(
                    "{CONSOLE_NAMESPACE}/{CONSOLE_CONFIG_NAME} has no {CONSOLE_CONFIG_KEY}"
                ))
            })?;
        let address = parse_console_config(raw)?;
        info!("Console publishes API server {}:{}", address.host, address.port);
        Ok(address)
    }
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConsoleConfig {
    #[serde(default)]
    cluster_info: ConsoleClusterInfo,
}

#[derive(Deserialize, Default)]
#[serde(rename_all = "camelCase")]
struct ConsoleClusterInfo {
    #[serde(default, rename = "masterPublicURL")]
    master_public_url: String,
}

/// Extracts host and port from the console's `clusterInfo.masterPublicURL`.
pub fn parse_console_config(raw: &str) -> Result<ApiServerAddress, StdError> {
    let config: ConsoleConfig = serde_yaml::from_str(raw)
        .map_err(|e| StdError::Discovery(format!("unable to parse {CONSOLE_CONFIG_KEY}: {e}")))?;
    let url = config.cluster_info.master_public_url;
    let address = url.trim_start_matches("https://").trim_end_matches('/');
    match address.rsplit_once(':') {
        Some((host, port)) if !host.is_empty() && !port.is_empty() => Ok(ApiServerAddress {
            host: host.to_string(),
            port: port.to_string(),
        }),
        _ => Err(StdError::Discovery(format!(
            "console masterPublicURL '{url}' is not of the form https://host:port"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_console_master_url() {
        let raw = r#"
apiVersion: console.openshift.io/v1
kind: ConsoleConfig
clusterInfo:
  consoleBaseAddress: https://console-openshift-console.apps.example.com
  masterPublicURL: https://api.example.com:6443
"#;
        let address = parse_console_config(raw).unwrap();
        assert_eq!(
            address,
            ApiServerAddress {
                host: "api.example.com".to_string(),
                port: "6443".to_string(),
            }
        );
    }

    #[test]
    fn rejects_url_without_port() {
        let raw = "clusterInfo:\n  masterPublicURL: https://api.example.com\n";
        assert!(matches!(parse_console_config(raw), Err(StdError::Discovery(_))));
    }

    #[test]
    fn rejects_missing_cluster_info() {
        assert!(matches!(parse_console_config("kind: ConsoleConfig\n"), Err(StdError::Discovery(_))));
    }
}
