use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use k8s_openapi::{
    api::{
        apps::v1::Deployment,
        core::v1::{ConfigMap, Secret, Service},
    },
    NamespaceResourceScope,
};
use kube::{
    api::{Api, ListParams, ResourceExt},
    client::Client,
    runtime::{
        controller::{Action, Controller},
        events::{Event, EventType, Recorder, Reporter},
        watcher::Config,
    },
    Resource,
};
use serde::Serialize;
use tokio::{sync::RwLock, time::Duration};
use tracing::*;

use crate::api::{certmanager::Certificate, route::Route, v1alpha1::ManagementIngress};
use crate::controllers::{
    reconciler::{detect_flavor, ClusterFlavor, Orchestrator, ReconcileOutcome},
    sync::{SyncOutcome, Synced},
};
use crate::util::{
    clock::SystemClock,
    discovery::KubeDiscovery,
    errors::{Error, Result, StdError},
    metrics,
    settings::Settings,
    store::KubeStore,
};

const REPORTER: &str = "management-ingress-operator";
const ERROR_REQUEUE: Duration = Duration::from_secs(60);

/// State shared between the controller and the web server
#[derive(Clone, Default)]
pub struct State {
    /// Diagnostics populated by the reconciler
    diagnostics: Arc<RwLock<Diagnostics>>,
    /// Metrics registry
    registry: prometheus::Registry,
}

impl State {
    pub fn metrics(&self) -> Vec<prometheus::proto::MetricFamily> {
        self.registry.gather()
    }

    pub async fn diagnostics(&self) -> Diagnostics {
        self.diagnostics.read().await.clone()
    }

    fn to_context(&self, client: Client, settings: Settings, cluster: ClusterCapabilities) -> Result<Arc<Context>, StdError> {
        Ok(Arc::new(Context {
            store: KubeStore::new(client.clone()),
            discovery: KubeDiscovery::new(client.clone()),
            clock: SystemClock,
            client,
            settings,
            flavor: cluster.flavor,
            certificates_served: cluster.certificates_served,
            metrics: metrics::Metrics::new()?.register(&self.registry)?,
            diagnostics: self.diagnostics.clone(),
        }))
    }
}

/// What the cluster offers, probed once at start-up.
#[derive(Debug, Clone)]
struct ClusterCapabilities {
    flavor: ClusterFlavor,
    certificates_served: bool,
}

// Context for our reconciler
pub struct Context {
    pub client: Client,
    pub store: KubeStore,
    pub discovery: KubeDiscovery,
    pub clock: SystemClock,
    pub settings: Settings,
    pub flavor: ClusterFlavor,
    pub certificates_served: bool,
    /// Diagnostics read by the web server
    pub diagnostics: Arc<RwLock<Diagnostics>>,
    pub metrics: metrics::Metrics,
}

/// Diagnostics to be exposed by the web server
#[derive(Clone, Serialize)]
pub struct Diagnostics {
    pub last_event: DateTime<Utc>,
    #[serde(skip)]
    pub reporter: Reporter,
}

impl Default for Diagnostics {
    fn default() -> Self {
        Self {
            last_event: Utc::now(),
            reporter: REPORTER.into(),
        }
    }
}

impl Diagnostics {
    fn recorder(&self, client: Client) -> Recorder {
        Recorder::new(client, self.reporter.clone())
    }
}

fn sync_event(synced: &Synced) -> Option<Event> {
    let (action, reason, past) = match synced.outcome {
        SyncOutcome::Created => ("Create", "Created", "created"),
        SyncOutcome::Updated => ("Update", "Updated", "updated"),
        SyncOutcome::Unchanged | SyncOutcome::Existing => return None,
    };
    Some(Event {
        type_: EventType::Normal,
        reason: format!("{reason}{}", synced.kind),
        note: Some(format!("Successfully {past} {} '{}'", synced.kind, synced.name)),
        action: action.into(),
        secondary: None,
    })
}

async fn publish(recorder: &Recorder, ingress: &ManagementIngress, event: Event) {
    if let Err(e) = recorder.publish(&event, &ingress.object_ref(&())).await {
        warn!("Failure publishing event '{}': {}", event.reason, e);
    }
}

pub async fn reconcile(ingress: Arc<ManagementIngress>, ctx: Arc<Context>) -> Result<Action> {
    let _timer = ctx.metrics.count_and_measure(&ingress.name_any());
    ctx.diagnostics.write().await.last_event = Utc::now();

    if ingress.is_deleting() {
        debug!("ManagementIngress '{}' is being deleted, skipping", ingress.name_any());
        return Ok(Action::await_change());
    }
    if !ingress.is_managed() {
        info!("ManagementIngress '{}' is unmanaged, skipping", ingress.name_any());
        return Ok(Action::await_change());
    }

    info!(
        "Reconciling ManagementIngress \"{}\" in {}",
        ingress.name_any(),
        ingress.namespace().unwrap_or_default()
    );

    let orchestrator = Orchestrator::new(&ctx.store, &ctx.discovery, &ctx.clock, &ctx.settings, &ctx.flavor)
        .with_certificates(ctx.certificates_served);
    let result = orchestrator.reconcile(&ingress).await;
    let recorder = ctx.diagnostics.read().await.recorder(ctx.client.clone());

    match result {
        Ok(ReconcileOutcome::Completed(synced)) => {
            for event in synced.iter().filter_map(sync_event) {
                publish(&recorder, &ingress, event).await;
            }
            Ok(Action::await_change())
        }
        Ok(ReconcileOutcome::Requeue(after)) => Ok(Action::requeue(after)),
        Err(e) => {
            let event = Event {
                type_: EventType::Warning,
                reason: "ReconcileFailed".into(),
                note: Some(e.to_string()),
                action: "Reconciling".into(),
                secondary: None,
            };
            publish(&recorder, &ingress, event).await;
            Err(e)
        }
    }
}

fn error_policy(ingress: Arc<ManagementIngress>, error: &Error, ctx: Arc<Context>) -> Action {
    warn!("reconcile failed: {}", error);
    ctx.metrics.reconcile_failure(&ingress, error);
    Action::requeue(ERROR_REQUEUE)
}

fn scoped_api<K>(client: &Client, namespace: Option<&str>) -> Api<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope>,
{
    match namespace {
        Some(ns) => Api::namespaced(client.clone(), ns),
        None => Api::all(client.clone()),
    }
}

async fn certificates_served(client: &Client) -> bool {
    match Api::<Certificate>::all(client.clone())
        .list(&ListParams::default().limit(1))
        .await
    {
        Ok(_) => true,
        Err(kube::Error::Api(err)) if err.code == 404 => {
            info!("cert-manager Certificate API is not served, certificates will not be managed");
            false
        }
        Err(e) => {
            warn!("Unable to probe the Certificate API, assuming it is not served: {}", e);
            false
        }
    }
}

/// Initialize the controller and shared state (given the crd is installed)
pub async fn run(state: State, settings: Settings) -> Result<()> {
    let client = Client::try_default().await.map_err(StdError::from)?;
    let namespace = settings.watch_namespace().map(str::to_string);
    let namespace = namespace.as_deref();

    let ingresses: Api<ManagementIngress> = scoped_api(&client, namespace);
    if let Err(e) = ingresses.list(&ListParams::default().limit(1)).await {
        error!("CRD is not queryable; {e:?}. Is the CRD installed?");
        info!("Installation: cargo run --bin crdgen | kubectl apply -f -");
        return Err(StdError::KubeError(e).into());
    }

    let store = KubeStore::new(client.clone());
    let cluster = ClusterCapabilities {
        flavor: detect_flavor(&store, &settings.operator_namespace).await?,
        certificates_served: certificates_served(&client).await,
    };
    info!(?cluster, "Starting management ingress controller");

    let mut controller = Controller::new(ingresses, Config::default().any_semantic())
        .owns(scoped_api::<ConfigMap>(&client, namespace), Config::default())
        .owns(scoped_api::<Secret>(&client, namespace), Config::default())
        .owns(scoped_api::<Service>(&client, namespace), Config::default())
        .owns(scoped_api::<Deployment>(&client, namespace), Config::default());
    if cluster.flavor.serves_routes() {
        controller = controller.owns(scoped_api::<Route>(&client, namespace), Config::default());
    }
    if cluster.certificates_served {
        controller = controller.owns(scoped_api::<Certificate>(&client, namespace), Config::default());
    }

    let context = state.to_context(client, settings, cluster)?;
    controller
        .shutdown_on_signal()
        .run(reconcile, error_policy, context)
        .filter_map(|x| async move { std::result::Result::ok(x) })
        .for_each(|_| futures::future::ready(()))
        .await;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn synced(outcome: SyncOutcome) -> Synced {
        Synced {
            kind: "Deployment".to_string(),
            name: "management-ingress".to_string(),
            outcome,
        }
    }

    #[test]
    fn events_only_for_mutations() {
        let created = sync_event(&synced(SyncOutcome::Created)).unwrap();
        assert_eq!(created.reason, "CreatedDeployment");
        assert_eq!(
            created.note.as_deref(),
            Some("Successfully created Deployment 'management-ingress'")
        );
        assert_eq!(sync_event(&synced(SyncOutcome::Updated)).unwrap().reason, "UpdatedDeployment");
        assert!(sync_event(&synced(SyncOutcome::Unchanged)).is_none());
        assert!(sync_event(&synced(SyncOutcome::Existing)).is_none());
    }
}
