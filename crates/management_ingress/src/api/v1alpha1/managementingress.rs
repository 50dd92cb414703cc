use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use k8s_openapi::api::core::v1::{ResourceRequirements, Toleration};
use kube::CustomResource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

pub const API_VERSION: &str = "operator.ibm.com/v1alpha1";
pub const KIND: &str = "ManagementIngress";

/// Generate the Kubernetes wrapper struct `ManagementIngress` from our Spec and Status struct
///
/// This provides a hook for generating the CRD yaml (in crdgen)
#[derive(CustomResource, Deserialize, Serialize, Clone, Debug, Default, PartialEq, JsonSchema)]
#[kube(
    kind = "ManagementIngress",
    group = "operator.ibm.com",
    version = "v1alpha1",
    namespaced
)]
#[kube(status = "ManagementIngressStatus", shortname = "mgmtingress")]
#[serde(rename_all = "camelCase")]
pub struct ManagementIngressSpec {
    #[serde(default)]
    pub management_state: ManagementState,
    /// Registry prefix applied to `image.repository`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub image_registry: String,
    #[serde(default)]
    pub image: OperandImage,
    /// Defaults to 1 when unset or zero
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replicas: Option<i32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub node_selector: Option<BTreeMap<String, String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerations: Option<Vec<Toleration>>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub allowed_host_header: String,
    #[serde(default)]
    pub cert: CertSpec,
    /// Explicit external host; discovery is skipped when set
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub route_host: String,
    /// Contents of the management-ingress-config config map
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub config: BTreeMap<String, String>,
    #[serde(default)]
    pub fips_enabled: bool,
    /// Skip issuing the route certificate; the console route then uses passthrough TLS
    #[serde(default)]
    pub ignore_route_cert: bool,
    /// Suffix generated hosts with the namespace so several instances can share a cluster
    #[serde(default)]
    pub multiple_instances_enabled: bool,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum ManagementState {
    #[default]
    Managed,
    Unmanaged,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct OperandImage {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub repository: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tag: String,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct CertSpec {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<CertIssuer>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespaced_issuer: Option<CertIssuer>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub dns_names: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ip_addresses: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Debug, Default, PartialEq, Eq, JsonSchema)]
pub struct CertIssuer {
    pub name: String,
    #[serde(default)]
    pub kind: IssuerKind,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, Default, PartialEq, Eq, JsonSchema)]
pub enum IssuerKind {
    #[default]
    Issuer,
    ClusterIssuer,
}

impl fmt::Display for IssuerKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            IssuerKind::Issuer => write!(f, "Issuer"),
            IssuerKind::ClusterIssuer => write!(f, "ClusterIssuer"),
        }
    }
}

/// The status object of `ManagementIngress`
#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct ManagementIngressStatus {
    /// Conditions keyed by owned resource kind
    #[serde(default, rename = "condition", skip_serializing_if = "BTreeMap::is_empty")]
    pub conditions: BTreeMap<String, Vec<IngressCondition>>,
    #[serde(default, rename = "podstate")]
    pub pod_state: PodState,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub operand_state: OperandState,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct PodState {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub ready: Vec<String>,
    #[serde(default, rename = "notReady", skip_serializing_if = "Vec::is_empty")]
    pub not_ready: Vec<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub failed: Vec<String>,
}

#[derive(Deserialize, Serialize, Clone, Default, Debug, PartialEq, Eq, JsonSchema)]
pub struct OperandState {
    #[serde(default)]
    pub status: OperandStatus,
    #[serde(default)]
    pub message: String,
}

#[derive(Deserialize, Serialize, Clone, Copy, Default, Debug, PartialEq, Eq, JsonSchema)]
pub enum OperandStatus {
    #[default]
    Deploying,
    Successful,
    Failed,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionType {
    /// The owned objects of this kind match their desired state.
    Ready,
    ResourceCreating,
    WaitingResource,
    ResourceFailedOnCreation,
    DiscoveringClusterInfo,
}

#[derive(Deserialize, Serialize, Clone, Copy, Debug, PartialEq, Eq, JsonSchema)]
pub enum ConditionStatus {
    True,
    False,
    Unknown,
}

#[derive(Deserialize, Serialize, Clone, Debug, PartialEq, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct IngressCondition {
    #[serde(rename = "type")]
    pub type_: ConditionType,
    pub status: ConditionStatus,
    pub last_transition_time: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub reason: String,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub message: String,
}

impl ManagementIngress {
    pub fn is_managed(&self) -> bool {
        self.spec.management_state == ManagementState::Managed
    }

    pub fn is_deleting(&self) -> bool {
        self.metadata.deletion_timestamp.is_some()
    }

    /// Host recorded by the last status write, empty if none.
    pub fn status_host(&self) -> &str {
        self.status.as_ref().map(|s| s.host.as_str()).unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_json_diff::assert_json_include;
    use serde_json::json;

    #[test]
    fn spec_accepts_minimal_document() {
        let spec: ManagementIngressSpec = serde_json::from_value(json!({
            "managementState": "Managed",
            "routeHost": "",
            "cert": {}
        }))
        .unwrap();
        assert_eq!(spec.management_state, ManagementState::Managed);
        assert!(spec.replicas.is_none());
        assert!(!spec.multiple_instances_enabled);
    }

    #[test]
    fn status_uses_wire_field_names() {
        let status = ManagementIngressStatus {
            pod_state: PodState {
                ready: vec!["a".into()],
                not_ready: vec!["b".into()],
                failed: vec![],
            },
            host: "cp-console.apps.example.com".into(),
            operand_state: OperandState {
                status: OperandStatus::Successful,
                message: "ok".into(),
            },
            ..Default::default()
        };
        assert_json_include!(
            actual: serde_json::to_value(&status).unwrap(),
            expected: json!({
                "podstate": {"ready": ["a"], "notReady": ["b"]},
                "host": "cp-console.apps.example.com",
                "operandState": {"status": "Successful", "message": "ok"}
            })
        );
    }
}
