use clap::Args;
use tokio::time::Duration;

use crate::util::waiter::WaitPolicy;

/// Operator settings, read from flags or the environment.
#[derive(Args, Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Common services version published in ibmcloud-cluster-info
    #[arg(long = "operand-version", env = "VERSION", default_value = "3.8.0")]
    pub version: String,

    #[arg(long, env = "CLUSTER_NAME", default_value = "mycluster")]
    pub cluster_name: String,

    #[arg(long, env = "ROUTE_HTTP_PORT", default_value_t = 80)]
    pub route_http_port: u16,

    #[arg(long, env = "ROUTE_HTTPS_PORT", default_value_t = 443)]
    pub route_https_port: u16,

    /// Namespace the operator runs in
    #[arg(long, env = "POD_NAMESPACE", default_value = "ibm-common-services")]
    pub operator_namespace: String,

    /// Namespaces the operand should watch; empty means all namespaces
    #[arg(long, env = "WATCH_NAMESPACE")]
    pub watch_namespace: Option<String>,

    /// Operand image used when the custom resource does not name one
    #[arg(long, env = "ICP_MANAGEMENT_INGRESS_IMAGE")]
    pub image: Option<String>,

    #[arg(long, env = "SECRET_WAIT_TIMEOUT_SECONDS", default_value_t = 600)]
    pub secret_wait_timeout_seconds: u64,

    #[arg(long, env = "SECRET_POLL_INTERVAL_SECONDS", default_value_t = 2)]
    pub secret_poll_interval_seconds: u64,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            version: "3.8.0".to_string(),
            cluster_name: "mycluster".to_string(),
            route_http_port: 80,
            route_https_port: 443,
            operator_namespace: "ibm-common-services".to_string(),
            watch_namespace: None,
            image: None,
            secret_wait_timeout_seconds: 600,
            secret_poll_interval_seconds: 2,
        }
    }
}

impl Settings {
    pub fn secret_wait(&self) -> WaitPolicy {
        WaitPolicy {
            timeout: Duration::from_secs(self.secret_wait_timeout_seconds),
            interval: Duration::from_secs(self.secret_poll_interval_seconds),
        }
    }

    /// The watch namespace, if one is set and non-empty.
    pub fn watch_namespace(&self) -> Option<&str> {
        self.watch_namespace.as_deref().filter(|ns| !ns.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[derive(Parser)]
    struct Cli {
        #[command(flatten)]
        settings: Settings,
    }

    #[test]
    fn flags_override_defaults() {
        let cli = Cli::parse_from([
            "operator",
            "--cluster-name",
            "prod",
            "--route-https-port",
            "8443",
            "--watch-namespace",
            "",
        ]);
        assert_eq!(cli.settings.cluster_name, "prod");
        assert_eq!(cli.settings.route_https_port, 8443);
        assert_eq!(cli.settings.watch_namespace(), None);
        assert_eq!(cli.settings.secret_wait().interval, Duration::from_secs(2));
    }
}
