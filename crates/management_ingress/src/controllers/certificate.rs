use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use tracing::info;

use crate::api::{
    certmanager::{Certificate, CertificateSpec, IssuerRef},
    v1alpha1::{CertIssuer, CertSpec, IssuerKind, ManagementIngress},
};
use crate::constants::{
    common_labels, APP_NAME, CERT_NAME, DEFAULT_ISSUER_NAME, ROUTE_CERT_NAME, ROUTE_SECRET_NAME, SERVICE_NAME,
    TLS_SECRET_NAME,
};
use crate::controllers::sync::{ensure, Synced};
use crate::util::{errors::StdError, store::ObjectStore};

const CERT_DURATION: &str = "8760h";
const CERT_RENEW_BEFORE: &str = "24h";
const CERT_MANAGER_GROUP: &str = "cert-manager.io";

/// In-cluster names of the ingress service followed by any user-supplied names.
pub fn service_dns_names(namespace: &str, extra: &[String]) -> Vec<String> {
    let mut names = vec![
        SERVICE_NAME.to_string(),
        format!("{SERVICE_NAME}.{namespace}"),
        format!("{SERVICE_NAME}.{namespace}.svc"),
    ];
    names.extend(extra.iter().cloned());
    names
}

/// Namespaced issuer first, then the cluster-wide one, then the common services CA issuer.
pub fn issuer_for(cert: &CertSpec) -> CertIssuer {
    [&cert.namespaced_issuer, &cert.issuer]
        .into_iter()
        .flatten()
        .find(|issuer| !issuer.name.is_empty())
        .cloned()
        .unwrap_or_else(|| {
            info!("No issuer in ManagementIngress, using default issuer '{}'", DEFAULT_ISSUER_NAME);
            CertIssuer {
                name: DEFAULT_ISSUER_NAME.to_string(),
                kind: IssuerKind::Issuer,
            }
        })
}

pub fn desired_certificate(
    namespace: &str,
    name: &str,
    secret_name: &str,
    dns_names: Vec<String>,
    ip_addresses: Vec<String>,
    issuer: &CertIssuer,
) -> Certificate {
    let mut cert = Certificate::new(
        name,
        CertificateSpec {
            common_name: Some(APP_NAME.to_string()),
            duration: Some(CERT_DURATION.to_string()),
            renew_before: Some(CERT_RENEW_BEFORE.to_string()),
            secret_name: secret_name.to_string(),
            issuer_ref: IssuerRef {
                name: issuer.name.clone(),
                kind: Some(issuer.kind.to_string()),
                group: Some(CERT_MANAGER_GROUP.to_string()),
            },
            dns_names,
            ip_addresses,
            usages: vec![
                "digital signature".to_string(),
                "key encipherment".to_string(),
                "server auth".to_string(),
            ],
            extra: Default::default(),
        },
    );
    cert.metadata = ObjectMeta {
        name: Some(name.to_string()),
        namespace: Some(namespace.to_string()),
        labels: Some(common_labels()),
        ..Default::default()
    };
    cert
}

/// Ensures the service certificate and, unless disabled, the route certificate for `host`.
pub async fn sync_certificates<S>(store: &S, ingress: &ManagementIngress, namespace: &str, host: &str) -> Result<Vec<Synced>, StdError>
where
    S: ObjectStore + ?Sized,
{
    let spec = &ingress.spec;
    let issuer = issuer_for(&spec.cert);
    let mut synced = Vec::with_capacity(2);

    let service_cert = desired_certificate(
        namespace,
        CERT_NAME,
        TLS_SECRET_NAME,
        service_dns_names(namespace, &spec.cert.dns_names),
        spec.cert.ip_addresses.clone(),
        &issuer,
    );
    synced.push(ensure(store, ingress, service_cert).await?);

    if spec.ignore_route_cert {
        info!("Route certificate disabled, skipping '{}'", ROUTE_CERT_NAME);
        return Ok(synced);
    }

    let route_cert = desired_certificate(
        namespace,
        ROUTE_CERT_NAME,
        ROUTE_SECRET_NAME,
        vec![host.to_string()],
        Vec::new(),
        &issuer,
    );
    synced.push(ensure(store, ingress, route_cert).await?);

    Ok(synced)
}
