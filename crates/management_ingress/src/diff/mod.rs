//! Structural comparison between a live object and its desired form.
//!
//! A diff returns the live object with only the tracked fields overwritten, so
//! everything the server owns (resourceVersion, status, cluster IPs, foreign
//! annotations) is carried into the update unchanged.

pub mod pod;

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{ConfigMap, Secret, Service},
};

use crate::api::{certmanager::Certificate, route::Route};

#[derive(Debug, Clone)]
pub struct Diff<T> {
    pub merged: T,
    pub changed: bool,
}

impl<T> Diff<T> {
    fn unchanged(merged: T) -> Self {
        Diff { merged, changed: false }
    }
}

/// Objects that know which of their fields the operator owns.
pub trait Diffable: Sized {
    /// Consumes the live object and merges the tracked fields of `desired` into it.
    fn diff_against(self, desired: &Self) -> Diff<Self>;
}

impl Diffable for Deployment {
    fn diff_against(mut self, desired: &Self) -> Diff<Self> {
        let Some(want) = desired.spec.as_ref() else {
            return Diff::unchanged(self);
        };
        let current = self.spec.get_or_insert_with(Default::default);
        let mut changed = false;

        // Replicas are compared like every other field; an unconditional
        // overwrite would turn each pass into an update.
        if current.replicas != want.replicas {
            current.replicas = want.replicas;
            changed = true;
        }

        if let Some(want_pod) = want.template.spec.as_ref() {
            let live_pod = current.template.spec.get_or_insert_with(Default::default);
            if pod::merge_pod_spec(live_pod, want_pod) {
                changed = true;
            }
        }

        Diff { merged: self, changed }
    }
}

impl Diffable for Service {
    fn diff_against(mut self, desired: &Self) -> Diff<Self> {
        let Some(want) = desired.spec.as_ref() else {
            return Diff::unchanged(self);
        };
        let current = self.spec.get_or_insert_with(Default::default);
        let mut changed = false;

        if current.ports != want.ports {
            current.ports = want.ports.clone();
            changed = true;
        }

        if !pod::option_maps_equal(&current.selector, &want.selector) {
            current.selector = want.selector.clone();
            changed = true;
        }

        Diff { merged: self, changed }
    }
}

impl Diffable for ConfigMap {
    fn diff_against(mut self, desired: &Self) -> Diff<Self> {
        if pod::option_maps_equal(&self.data, &desired.data) {
            return Diff::unchanged(self);
        }
        self.data = desired.data.clone();
        Diff {
            merged: self,
            changed: true,
        }
    }
}

impl Diffable for Secret {
    fn diff_against(mut self, desired: &Self) -> Diff<Self> {
        if pod::option_maps_equal(&self.data, &desired.data) {
            return Diff::unchanged(self);
        }
        self.data = desired.data.clone();
        Diff {
            merged: self,
            changed: true,
        }
    }
}

impl Diffable for Route {
    fn diff_against(mut self, desired: &Self) -> Diff<Self> {
        let want = &desired.spec;
        let current = &mut self.spec;
        let mut changed = false;

        if current.host != want.host {
            current.host = want.host.clone();
            changed = true;
        }
        if current.to.kind != want.to.kind || current.to.name != want.to.name {
            current.to = want.to.clone();
            changed = true;
        }
        if current.port != want.port {
            current.port = want.port.clone();
            changed = true;
        }
        if current.tls != want.tls {
            current.tls = want.tls.clone();
            changed = true;
        }

        Diff { merged: self, changed }
    }
}

impl Diffable for Certificate {
    fn diff_against(mut self, desired: &Self) -> Diff<Self> {
        // Fields the operator does not model stay as the server has them.
        let mut want = desired.spec.clone();
        want.extra = self.spec.extra.clone();
        if self.spec == want {
            return Diff::unchanged(self);
        }
        self.spec = want;
        Diff {
            merged: self,
            changed: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use k8s_openapi::{
        api::{
            apps::v1::DeploymentSpec,
            core::v1::{Container, PodSpec, PodTemplateSpec, ResourceRequirements, ServicePort, ServiceSpec},
        },
        apimachinery::pkg::{api::resource::Quantity, apis::meta::v1::ObjectMeta},
        ByteString,
    };

    fn deployment(replicas: i32, containers: Vec<(&str, &str)>) -> Deployment {
        Deployment {
            metadata: ObjectMeta {
                name: Some("management-ingress".to_string()),
                resource_version: Some("7".to_string()),
                ..Default::default()
            },
            spec: Some(DeploymentSpec {
                replicas: Some(replicas),
                template: PodTemplateSpec {
                    spec: Some(PodSpec {
                        containers: containers
                            .into_iter()
                            .map(|(name, image)| Container {
                                name: name.to_string(),
                                image: Some(image.to_string()),
                                ..Default::default()
                            })
                            .collect(),
                        ..Default::default()
                    }),
                    ..Default::default()
                },
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    fn images(d: &Deployment) -> Vec<(String, Option<String>)> {
        d.spec
            .as_ref()
            .and_then(|s| s.template.spec.as_ref())
            .map(|p| p.containers.iter().map(|c| (c.name.clone(), c.image.clone())).collect())
            .unwrap_or_default()
    }

    #[test]
    fn image_change_on_matching_container_is_merged() {
        let live = deployment(1, vec![("a", "v1")]);
        let desired = deployment(1, vec![("a", "v2")]);
        let diff = live.diff_against(&desired);
        assert!(diff.changed);
        assert_eq!(images(&diff.merged), vec![("a".to_string(), Some("v2".to_string()))]);
        assert_eq!(diff.merged.metadata.resource_version.as_deref(), Some("7"));
    }

    #[test]
    fn containers_missing_from_desired_are_untouched() {
        let live = deployment(1, vec![("a", "v1"), ("sidecar", "s1")]);
        let desired = deployment(1, vec![("b", "v2")]);
        let diff = live.diff_against(&desired);
        assert!(!diff.changed);
        assert_eq!(
            images(&diff.merged),
            vec![
                ("a".to_string(), Some("v1".to_string())),
                ("sidecar".to_string(), Some("s1".to_string()))
            ]
        );
    }

    #[test]
    fn identical_deployment_is_unchanged() {
        let diff = deployment(2, vec![("a", "v1")]).diff_against(&deployment(2, vec![("a", "v1")]));
        assert!(!diff.changed);
    }

    #[test]
    fn replica_change_is_merged() {
        let diff = deployment(1, vec![("a", "v1")]).diff_against(&deployment(3, vec![("a", "v1")]));
        assert!(diff.changed);
        assert_eq!(diff.merged.spec.and_then(|s| s.replicas), Some(3));
    }

    #[test]
    fn resource_request_change_is_merged_and_keeps_untracked_fields() {
        let with_cpu = |cpu: &str| {
            let mut d = deployment(1, vec![("a", "v1")]);
            let pod = d.spec.as_mut().and_then(|s| s.template.spec.as_mut()).unwrap();
            pod.containers[0].resources = Some(ResourceRequirements {
                requests: Some(BTreeMap::from([("cpu".to_string(), Quantity(cpu.to_string()))])),
                ..Default::default()
            });
            d
        };
        let mut live = with_cpu("10m");
        live.spec.as_mut().unwrap().template.spec.as_mut().unwrap().service_account_name =
            Some("kept".to_string());

        let diff = live.diff_against(&with_cpu("50m"));
        assert!(diff.changed);
        let pod = diff.merged.spec.unwrap().template.spec.unwrap();
        let requests = pod.containers[0].resources.as_ref().unwrap().requests.as_ref().unwrap();
        assert_eq!(requests["cpu"], Quantity("50m".to_string()));
        assert_eq!(pod.service_account_name.as_deref(), Some("kept"));
    }

    fn certificate(dns: &str) -> Certificate {
        Certificate::new(
            "route-cert",
            crate::api::certmanager::CertificateSpec {
                secret_name: "route-tls-secret".to_string(),
                issuer_ref: crate::api::certmanager::IssuerRef {
                    name: "cs-ca-issuer".to_string(),
                    ..Default::default()
                },
                dns_names: vec![dns.to_string()],
                ..Default::default()
            },
        )
    }

    #[test]
    fn certificate_keeps_unmodelled_spec_fields() {
        let live: Certificate = serde_json::from_value(serde_json::json!({
            "apiVersion": "cert-manager.io/v1",
            "kind": "Certificate",
            "metadata": { "name": "route-cert" },
            "spec": {
                "secretName": "route-tls-secret",
                "issuerRef": { "name": "cs-ca-issuer" },
                "dnsNames": ["old.example.com"],
                "privateKey": { "rotationPolicy": "Always" }
            }
        }))
        .unwrap();
        assert!(live.spec.extra.contains_key("privateKey"));

        let unchanged = live.clone().diff_against(&certificate("old.example.com"));
        assert!(!unchanged.changed);

        let diff = live.diff_against(&certificate("new.example.com"));
        assert!(diff.changed);
        assert_eq!(diff.merged.spec.dns_names, vec!["new.example.com"]);
        let value = serde_json::to_value(&diff.merged).unwrap();
        assert_eq!(value["spec"]["privateKey"]["rotationPolicy"], "Always");
    }

    #[test]
    fn route_keeps_unmodelled_spec_fields() {
        use crate::api::route::{RouteSpec, RouteTargetReference};
        let route = |host: &str| {
            Route::new(
                "cp-console",
                RouteSpec {
                    host: host.to_string(),
                    to: RouteTargetReference {
                        kind: "Service".to_string(),
                        name: "icp-management-ingress".to_string(),
                        weight: None,
                    },
                    ..Default::default()
                },
            )
        };
        let mut live = route("old.example.com");
        live.spec.extra.insert("path".to_string(), serde_json::json!("/console"));

        let diff = live.diff_against(&route("new.example.com"));
        assert!(diff.changed);
        assert_eq!(diff.merged.spec.host, "new.example.com");
        assert_eq!(diff.merged.spec.extra["path"], "/console");
    }

    #[test]
    fn service_keeps_cluster_ip() {
        let port = |p: i32| ServicePort {
            name: Some("https".to_string()),
            port: p,
            ..Default::default()
        };
        let live = Service {
            spec: Some(ServiceSpec {
                cluster_ip: Some("10.0.0.12".to_string()),
                ports: Some(vec![port(443)]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let desired = Service {
            spec: Some(ServiceSpec {
                ports: Some(vec![port(8443)]),
                ..Default::default()
            }),
            ..Default::default()
        };
        let diff = live.diff_against(&desired);
        assert!(diff.changed);
        let spec = diff.merged.spec.unwrap();
        assert_eq!(spec.cluster_ip.as_deref(), Some("10.0.0.12"));
        assert_eq!(spec.ports.unwrap()[0].port, 8443);
    }

    #[test]
    fn config_map_absent_data_equals_empty() {
        let live = ConfigMap::default();
        let desired = ConfigMap {
            data: Some(BTreeMap::new()),
            ..Default::default()
        };
        assert!(!live.diff_against(&desired).changed);
    }

    #[test]
    fn secret_data_change_is_merged() {
        let data = |v: &str| {
            Some(BTreeMap::from([(
                "ca.crt".to_string(),
                ByteString(v.as_bytes().to_vec()),
            )]))
        };
        let live = Secret {
            data: data("old"),
            ..Default::default()
        };
        let desired = Secret {
            data: data("new"),
            ..Default::default()
        };
        let diff = live.diff_against(&desired);
        assert!(diff.changed);
        assert_eq!(diff.merged.data, data("new"));
    }
}
