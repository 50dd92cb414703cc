use thiserror::Error;
use tokio::time::Duration;

use crate::controllers::ResourceKind;

#[derive(Error, Debug)]
pub enum StdError {
    #[error("JsonSerializationError: {0}")]
    JsonSerializationError(#[source] serde_json::Error),

    #[error("Kube Error: {0}")]
    KubeError(#[source] kube::Error),

    #[error("MetadataMissing: {0}")]
    MetadataMissing(String),

    #[error("InvalidArgument: {0}")]
    InvalidArgument(String),

    /// The object was reported as existing on create but could not be read back.
    #[error("NotFound: {kind} '{name}' reported as existing but could not be read")]
    NotFound { kind: String, name: String },

    #[error("Timeout: gave up waiting for {what} after {}s", waited.as_secs())]
    Timeout { what: String, waited: Duration },

    #[error("DiscoveryError: {0}")]
    Discovery(String),

    #[error("MetricsError: {0}")]
    MetricsError(#[source] prometheus::Error),
}

impl StdError {
    pub fn metric_label(&self) -> String {
        match self {
            StdError::JsonSerializationError(_) => "json_serialization",
            StdError::KubeError(_) => "kube",
            StdError::MetadataMissing(_) => "metadata_missing",
            StdError::InvalidArgument(_) => "invalid_argument",
            StdError::NotFound { .. } => "not_found",
            StdError::Timeout { .. } => "timeout",
            StdError::Discovery(_) => "discovery",
            StdError::MetricsError(_) => "metrics",
        }
        .to_string()
    }
}

impl From<kube::Error> for StdError {
    fn from(e: kube::Error) -> Self {
        StdError::KubeError(e)
    }
}

impl From<prometheus::Error> for StdError {
    fn from(e: prometheus::Error) -> Self {
        StdError::MetricsError(e)
    }
}

impl From<serde_json::Error> for StdError {
    fn from(e: serde_json::Error) -> Self {
        StdError::JsonSerializationError(e)
    }
}

#[derive(Error, Debug)]
pub enum Error {
    #[error("Standard Error: {0}")]
    StdError(#[source] StdError),

    /// A reconcile step failed; carries the owned resource kind and the custom resource name.
    #[error("unable to create or update {kind} for '{instance}': {source}")]
    Sync {
        kind: ResourceKind,
        instance: String,
        #[source]
        source: StdError,
    },
}

impl Error {
    pub fn metric_label(&self) -> String {
        match self {
            Error::StdError(e) => e.metric_label(),
            Error::Sync { kind, source, .. } => format!("{}_{}", kind.label(), source.metric_label()),
        }
    }
}

impl From<StdError> for Error {
    fn from(e: StdError) -> Self {
        Error::StdError(e)
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_error_names_kind_and_instance() {
        let err = Error::Sync {
            kind: ResourceKind::Route,
            instance: "default".to_string(),
            source: StdError::Timeout {
                what: "secret route-tls-secret".to_string(),
                waited: Duration::from_secs(600),
            },
        };
        assert_eq!(
            err.to_string(),
            "unable to create or update Route for 'default': Timeout: gave up waiting for secret route-tls-secret after 600s"
        );
        assert_eq!(err.metric_label(), "route_timeout");
    }
}
