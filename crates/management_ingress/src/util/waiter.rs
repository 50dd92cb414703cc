use std::future::Future;

use k8s_openapi::api::core::v1::Secret;
use tokio::time::Duration;
use tracing::{debug, info, warn};

use crate::util::{clock::Clock, errors::StdError, store::ObjectStore};

const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10 * 60);
const DEFAULT_INTERVAL: Duration = Duration::from_secs(2);

/// Bounds for a readiness wait: poll every `interval` until `timeout` has elapsed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WaitPolicy {
    pub timeout: Duration,
    pub interval: Duration,
}

impl Default for WaitPolicy {
    fn default() -> Self {
        Self {
            timeout: DEFAULT_TIMEOUT,
            interval: DEFAULT_INTERVAL,
        }
    }
}

/// Polls `probe` until it yields a value or the policy's deadline passes.
///
/// The probe runs immediately, then after every interval. Probe errors are
/// logged and treated as "not yet" since the dependency may still be on its way.
pub async fn wait_for<C, F, Fut, T>(clock: &C, policy: WaitPolicy, context: &str, mut probe: F) -> Result<T, StdError>
where
    C: Clock + ?Sized,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>, StdError>>,
{
    let timeout = chrono::Duration::from_std(policy.timeout)
        .map_err(|e| StdError::InvalidArgument(format!("wait timeout out of range: {e}")))?;
    let start = clock.now();
    let mut attempt: u32 = 1;

    loop {
        match probe().await {
            Ok(Some(found)) => {
                if attempt > 1 {
                    info!(context, attempts = attempt, "Dependency became available");
                }
                return Ok(found);
            }
            Ok(None) => {
                debug!(context, attempt, "Dependency not available yet");
            }
            Err(e) => {
                warn!(context, attempt, error = %e, "Error checking dependency");
            }
        }

        if clock.now() - start >= timeout {
            return Err(StdError::Timeout {
                what: context.to_string(),
                waited: policy.timeout,
            });
        }

        clock.sleep(policy.interval).await;
        attempt += 1;
    }
}

/// Waits until the named secret exists and carries a certificate.
pub async fn wait_for_tls_secret<S, C>(
    store: &S,
    clock: &C,
    policy: WaitPolicy,
    namespace: &str,
    name: &str,
) -> Result<Secret, StdError>
where
    S: ObjectStore + ?Sized,
    C: Clock + ?Sized,
{
    info!("Waiting for secret '{}' in namespace '{}'", name, namespace);
    let context = format!("secret {name}");
    wait_for(clock, policy, &context, move || async move {
        let secret = store.get::<Secret>(namespace, name).await?;
        Ok(secret.filter(has_certificate))
    })
    .await
}

fn has_certificate(secret: &Secret) -> bool {
    secret
        .data
        .as_ref()
        .and_then(|d| d.get("tls.crt"))
        .is_some_and(|crt| !crt.0.is_empty())
}
