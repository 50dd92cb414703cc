//! Names and well-known keys shared by the managed objects.

use std::collections::BTreeMap;

pub const APP_NAME: &str = "management-ingress";
pub const SERVICE_NAME: &str = "icp-management-ingress";
pub const CONFIG_NAME: &str = "management-ingress-config";
pub const IAM_TOKEN_SERVICE: &str = "iam-token-service";
pub const SERVICE_ACCOUNT_NAME: &str = "management-ingress";
pub const CERT_NAME: &str = "management-ingress-cert";
pub const TLS_SECRET_NAME: &str = "icp-management-ingress-tls-secret";
pub const CONSOLE_ROUTE_NAME: &str = "cp-console";
pub const ROUTE_CERT_NAME: &str = "route-cert";
pub const ROUTE_SECRET_NAME: &str = "route-tls-secret";
pub const BIND_INFO_CONFIG_MAP: &str = "management-ingress-info";
pub const MANAGED_BY: &str = "ibm-management-ingress-operator";

pub const CONFIG_UPDATE_ANNOTATION: &str = "management-ingress.operator.k8s.io/config-updated";

pub const DEFAULT_ISSUER_NAME: &str = "cs-ca-issuer";

pub const NAMESPACE_SCOPE_CONFIG_MAP: &str = "namespace-scope";
pub const PLATFORM_AUTH_CONFIG_MAP: &str = "platform-auth-idp";
pub const PLATFORM_AUTH_SECRET: &str = "platform-oidc-credentials";

pub const PRODUCT_NAME: &str = "IBM Cloud Platform Common Services";
pub const PRODUCT_ID: &str = "068a62892a1e4db39641342e592daa25";
pub const PRODUCT_METRIC: &str = "FREE";

// ibmcloud-cluster-info keys
pub const CLUSTER_CONFIG_NAME: &str = "ibmcloud-cluster-info";
pub const CLUSTER_ADDRESS: &str = "cluster_address";
pub const CLUSTER_CA_DOMAIN: &str = "cluster_ca_domain";
pub const ROUTE_BASE_DOMAIN: &str = "openshift_router_base_domain";
pub const CLUSTER_ENDPOINT: &str = "cluster_endpoint";
pub const ROUTE_HTTP_PORT: &str = "cluster_router_http_port";
pub const ROUTE_HTTPS_PORT: &str = "cluster_router_https_port";
pub const CLUSTER_NAME: &str = "cluster_name";
pub const CS_VERSION: &str = "version";
pub const CLUSTER_API_SERVER_HOST: &str = "cluster_kube_apiserver_host";
pub const CLUSTER_API_SERVER_PORT: &str = "cluster_kube_apiserver_port";
pub const CLUSTER_NODE_PORT: &str = "cluster_node_port";
pub const PROXY_ADDRESS: &str = "proxy_address";
pub const PROXY_HTTP_PORT: &str = "proxy_ingress_http_port";
pub const PROXY_HTTPS_PORT: &str = "proxy_ingress_https_port";

pub const CLUSTER_SECRET_NAME: &str = "ibmcloud-cluster-ca-cert";

pub const CONSOLE_CONFIG_NAME: &str = "console-config";
pub const CONSOLE_NAMESPACE: &str = "openshift-console";
pub const CONSOLE_CONFIG_KEY: &str = "console-config.yaml";

pub const PROXY_ROUTE_NAME: &str = "cp-proxy";
pub const PROXY_SERVICE_NAME: &str = "nginx-ingress-controller";

// ibm-cpp-config keys
pub const CPP_CONFIG_NAME: &str = "ibm-cpp-config";
pub const KUBERNETES_CLUSTER_TYPE: &str = "kubernetes_cluster_type";
pub const CPP_DOMAIN_NAME: &str = "domain_name";
pub const CNCF: &str = "cncf";

pub const CNCF_CLUSTER_DOMAIN: &str = "cluster.local";

// bind-info keys
pub const BIND_INFO_ROUTE_HOST: &str = "MANAGEMENT_INGRESS_ROUTE_HOST";
pub const BIND_INFO_SERVICE_NAME: &str = "MANAGEMENT_INGRESS_SERVICE_NAME";

pub const MANAGED_BY_LABEL: &str = "app.kubernetes.io/managed-by";

/// Labels carried by every object the operator owns.
pub fn common_labels() -> BTreeMap<String, String> {
    [
        ("app", APP_NAME),
        ("component", APP_NAME),
        ("app.kubernetes.io/component", APP_NAME),
        ("app.kubernetes.io/name", APP_NAME),
        ("app.kubernetes.io/instance", SERVICE_NAME),
        (MANAGED_BY_LABEL, MANAGED_BY),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}

/// Metering annotations required on the operand.
pub fn common_annotations() -> BTreeMap<String, String> {
    [
        ("productName", PRODUCT_NAME),
        ("productID", PRODUCT_ID),
        ("productMetric", PRODUCT_METRIC),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect()
}
