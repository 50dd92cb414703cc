use crate::api::v1alpha1::ManagementIngress;
use crate::util::errors::Error;
use kube::ResourceExt;
use prometheus::{histogram_opts, opts, HistogramVec, IntCounter, IntCounterVec, Registry};
use tokio::time::Instant;

#[derive(Clone)]
pub struct Metrics {
    pub reconciliations: IntCounter,
    pub failures: IntCounterVec,
    pub reconcile_duration: HistogramVec,
}

impl Metrics {
    pub fn new() -> Result<Self, prometheus::Error> {
        let reconcile_duration = HistogramVec::new(
            histogram_opts!(
                "management_ingress_reconcile_duration_seconds",
                "The duration of reconcile to complete in seconds",
            )
            .buckets(vec![0.01, 0.1, 0.25, 0.5, 1., 5., 15., 60., 600.]),
            &["instance"],
        )?;
        let failures = IntCounterVec::new(
            opts!("management_ingress_reconcile_errors_total", "reconciliation errors",),
            &["instance", "error"],
        )?;
        let reconciliations =
            IntCounter::new("management_ingress_reconciliations_total", "reconciliations")?;
        Ok(Metrics {
            reconciliations,
            failures,
            reconcile_duration,
        })
    }

    /// Register API metrics to start tracking them.
    pub fn register(self, registry: &Registry) -> Result<Self, prometheus::Error> {
        registry.register(Box::new(self.reconcile_duration.clone()))?;
        registry.register(Box::new(self.failures.clone()))?;
        registry.register(Box::new(self.reconciliations.clone()))?;
        Ok(self)
    }

    pub fn reconcile_failure(&self, ingress: &ManagementIngress, e: &Error) {
        self.failures
            .with_label_values(&[ingress.name_any().as_str(), e.metric_label().as_str()])
            .inc()
    }

    pub fn count_and_measure(&self, instance: &str) -> ReconcileMeasurer {
        self.reconciliations.inc();
        ReconcileMeasurer {
            start: Instant::now(),
            metric: self.reconcile_duration.clone(),
            instance: instance.to_string(),
        }
    }
}

/// Smart function duration measurer
///
/// Relies on Drop to calculate duration and register the observation in the histogram
pub struct ReconcileMeasurer {
    start: Instant,
    metric: HistogramVec,
    instance: String,
}

impl Drop for ReconcileMeasurer {
    fn drop(&mut self) {
        #[allow(clippy::cast_precision_loss)]
        let duration = self.start.elapsed().as_millis() as f64 / 1000.0;
        self.metric
            .with_label_values(&[self.instance.as_str()])
            .observe(duration);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::errors::StdError;

    #[test]
    fn failures_are_labelled_by_instance_and_error() {
        let registry = Registry::new();
        let metrics = Metrics::new().unwrap().register(&registry).unwrap();
        let mut ingress = ManagementIngress::new("default", Default::default());
        ingress.metadata.namespace = Some("ibm-common-services".to_string());

        metrics.reconcile_failure(&ingress, &Error::StdError(StdError::Discovery("no domain".into())));
        drop(metrics.count_and_measure("default"));

        let count = metrics
            .failures
            .with_label_values(&["default", "discovery"])
            .get();
        assert_eq!(count, 1);
        assert_eq!(metrics.reconciliations.get(), 1);
        assert_eq!(registry.gather().len(), 3);
    }
}
