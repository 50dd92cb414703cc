use std::collections::BTreeMap;

use k8s_openapi::{
    api::core::v1::{Service, ServicePort, ServiceSpec},
    apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString},
};

use crate::api::v1alpha1::ManagementIngress;
use crate::constants::{common_labels, APP_NAME, SERVICE_NAME};
use crate::controllers::sync::{ensure, Synced};
use crate::util::{errors::StdError, store::ObjectStore};

pub fn desired_service(namespace: &str) -> Service {
    Service {
        metadata: ObjectMeta {
            name: Some(SERVICE_NAME.to_string()),
            namespace: Some(namespace.to_string()),
            labels: Some(common_labels()),
            ..Default::default()
        },
        spec: Some(ServiceSpec {
            selector: Some(BTreeMap::from([("component".to_string(), APP_NAME.to_string())])),
            ports: Some(vec![ServicePort {
                name: Some("https".to_string()),
                port: 443,
                protocol: Some("TCP".to_string()),
                target_port: Some(IntOrString::String("https".to_string())),
                ..Default::default()
            }]),
            ..Default::default()
        }),
        ..Default::default()
    }
}

pub async fn sync_service<S>(store: &S, ingress: &ManagementIngress, namespace: &str) -> Result<Synced, StdError>
where
    S: ObjectStore + ?Sized,
{
    ensure(store, ingress, desired_service(namespace)).await
}
