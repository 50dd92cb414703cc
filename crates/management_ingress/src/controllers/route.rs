use k8s_openapi::{api::core::v1::Secret, apimachinery::pkg::{apis::meta::v1::ObjectMeta, util::intstr::IntOrString}};
use tracing::info;

use crate::api::{
    route::{
        Route, RoutePort, RouteSpec, RouteTargetReference, TlsConfig, INSECURE_REDIRECT, TERMINATION_PASSTHROUGH,
        TERMINATION_REENCRYPT,
    },
    v1alpha1::ManagementIngress,
};
use crate::constants::{
    common_labels, CONSOLE_ROUTE_NAME, PROXY_ROUTE_NAME, PROXY_SERVICE_NAME, ROUTE_SECRET_NAME, SERVICE_NAME,
    TLS_SECRET_NAME,
};
use crate::controllers::{
    secret::{secret_value, sync_cluster_ca, CA_KEY},
    sync::{ensure, ensure_created, Synced},
};
use crate::util::{
    clock::Clock,
    errors::StdError,
    store::ObjectStore,
    waiter::{wait_for_tls_secret, WaitPolicy},
};

/// Certificate material for a re-encrypting route.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TlsMaterial {
    pub certificate: String,
    pub key: String,
    pub ca_certificate: String,
    pub destination_ca_certificate: String,
}

impl TlsMaterial {
    pub fn from_secrets(route_secret: &Secret, service_secret: &Secret) -> Self {
        let text = |secret: &Secret, key: &str| String::from_utf8_lossy(&secret_value(secret, key)).into_owned();
        TlsMaterial {
            certificate: text(route_secret, "tls.crt"),
            key: text(route_secret, "tls.key"),
            ca_certificate: text(route_secret, CA_KEY),
            destination_ca_certificate: text(service_secret, CA_KEY),
        }
    }

    fn complete(&self) -> bool {
        !self.certificate.is_empty()
            && !self.key.is_empty()
            && !self.ca_certificate.is_empty()
            && !self.destination_ca_certificate.is_empty()
    }
}

/// Route to `service`'s https port. Re-encrypts when all TLS material is present, passes through otherwise.
pub fn desired_route(namespace: &str, name: &str, service: &str, host: &str, tls: Option<&TlsMaterial>) -> Route {
    let tls = match tls.filter(|m| m.complete()) {
        Some(m) => TlsConfig {
            termination: TERMINATION_REENCRYPT.to_string(),
            certificate: m.certificate.clone(),
            key: m.key.clone(),
            ca_certificate: m.ca_certificate.clone(),
            destination_ca_certificate: m.destination_ca_certificate.clone(),
            insecure_edge_termination_policy: Some(INSECURE_REDIRECT.to_string()),
        },
        None => TlsConfig {
            termination: TERMINATION_PASSTHROUGH.to_string(),
            insecure_edge_termination_policy: Some(INSECURE_REDIRECT.to_string()),
            ..Default::default()
        },
    };

    let mut route = Route::new(
        name,
        RouteSpec {
            host: host.to_string(),
            to: RouteTargetReference {
                kind: "Service".to_string(),
                name: service.to_string(),
                weight: None,
            },
            port: Some(RoutePort {
                target_port: IntOrString::String("https".to_string()),
            }),
            tls: Some(tls),
            wildcard_policy: None,
            extra: Default::default(),
        },
    );
    route.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(common_labels()),
        ..Default::default()
    };
    route
}

/// Inputs for the route step on a cluster with routes.
pub struct RouteTargets<'a> {
    pub namespace: &'a str,
    pub console_host: &'a str,
    pub proxy_host: &'a str,
    pub wait: WaitPolicy,
}

/// Waits for the TLS secrets, publishes the cluster CA, then ensures the console and proxy routes.
pub async fn sync_routes<S, C>(
    store: &S,
    clock: &C,
    ingress: &ManagementIngress,
    targets: RouteTargets<'_>,
) -> Result<Vec<Synced>, StdError>
where
    S: ObjectStore + ?Sized,
    C: Clock + ?Sized,
{
    let ns = targets.namespace;
    let service_secret = wait_for_tls_secret(store, clock, targets.wait, ns, TLS_SECRET_NAME).await?;

    let (tls, ca_source) = if ingress.spec.ignore_route_cert {
        info!("Route certificate disabled, '{}' uses passthrough", CONSOLE_ROUTE_NAME);
        (None, service_secret)
    } else {
        let route_secret = wait_for_tls_secret(store, clock, targets.wait, ns, ROUTE_SECRET_NAME).await?;
        (Some(TlsMaterial::from_secrets(&route_secret, &service_secret)), route_secret)
    };

    let mut synced = Vec::with_capacity(3);
    synced.push(sync_cluster_ca(store, ingress, ns, &ca_source).await?);

    let console = desired_route(ns, CONSOLE_ROUTE_NAME, SERVICE_NAME, targets.console_host, tls.as_ref());
    synced.push(ensure(store, ingress, console).await?);

    let proxy = desired_route(ns, PROXY_ROUTE_NAME, PROXY_SERVICE_NAME, targets.proxy_host, None);
    synced.push(ensure_created(store, ingress, proxy).await?);

    Ok(synced)
}

/// Route-less clusters only get the CA bundle, copied from the route (or service) certificate.
pub async fn sync_cluster_ca_only<S, C>(
    store: &S,
    clock: &C,
    ingress: &ManagementIngress,
    namespace: &str,
    wait: WaitPolicy,
) -> Result<Vec<Synced>, StdError>
where
    S: ObjectStore + ?Sized,
    C: Clock + ?Sized,
{
    let source = if ingress.spec.ignore_route_cert {
        TLS_SECRET_NAME
    } else {
        ROUTE_SECRET_NAME
    };
    let secret = wait_for_tls_secret(store, clock, wait, namespace, source).await?;
    Ok(vec![sync_cluster_ca(store, ingress, namespace, &secret).await?])
}
