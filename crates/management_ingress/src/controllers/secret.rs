use std::collections::BTreeMap;

use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::apis::meta::v1::ObjectMeta, ByteString};

use crate::api::v1alpha1::ManagementIngress;
use crate::constants::{common_labels, CLUSTER_SECRET_NAME};
use crate::controllers::sync::{ensure, Synced};
use crate::util::{errors::StdError, store::ObjectStore};

pub const CA_KEY: &str = "ca.crt";

/// Reads a data key from a secret, empty when absent.
pub fn secret_value(secret: &Secret, key: &str) -> Vec<u8> {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get(key))
        .map(|v| v.0.clone())
        .unwrap_or_default()
}

/// The cluster-wide CA bundle other components trust.
pub fn desired_cluster_ca_secret(namespace: &str, ca: Vec<u8>) -> Secret {
    Secret {
        metadata: ObjectMeta {
            name: Some(CLUSTER_SECRET_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(common_labels()),
            ..Default::default()
        },
        data: Some(BTreeMap::from([(CA_KEY.to_string(), ByteString(ca))])),
        ..Default::default()
    }
}

/// Publishes the CA of `source` as the cluster CA secret.
pub async fn sync_cluster_ca<S>(
    store: &S,
    ingress: &ManagementIngress,
    namespace: &str,
    source: &Secret,
) -> Result<Synced, StdError>
where
    S: ObjectStore + ?Sized,
{
    let ca = secret_value(source, CA_KEY);
    ensure(store, ingress, desired_cluster_ca_secret(namespace, ca)).await
}
