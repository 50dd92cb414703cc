use std::fmt;

pub mod certificate;
pub mod configmap;
pub mod deployment;
pub mod ingress_controller;
pub mod reconciler;
pub mod route;
pub mod secret;
pub mod service;
pub mod sync;

/// Owned resource kinds; also the keys of the per-kind status conditions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ResourceKind {
    Certificate,
    Service,
    ConfigMap,
    Route,
    Secret,
    Deployment,
}

impl ResourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResourceKind::Certificate => "Certificate",
            ResourceKind::Service => "Service",
            ResourceKind::ConfigMap => "ConfigMap",
            ResourceKind::Route => "Route",
            ResourceKind::Secret => "Secret",
            ResourceKind::Deployment => "Deployment",
        }
    }

    pub fn label(&self) -> String {
        self.as_str().to_lowercase()
    }
}

impl fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
