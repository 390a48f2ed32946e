//! Graph backend metrics

use prometheus::{CounterVec, Opts, Registry};
use std::sync::OnceLock;

static METRICS: OnceLock<GraphMetricsInner> = OnceLock::new();

struct GraphMetricsInner {
    mirror_writes: CounterVec,
}

impl GraphMetricsInner {
    fn new() -> Self {
        let mirror_writes = CounterVec::new(
            Opts::new(
                "timeline_graph_mirror_writes_total",
                "Writes mirrored to the inactive graph backend",
            ),
            &["backend", "operation", "outcome"],
        )
        .expect("valid metric definition");

        Self { mirror_writes }
    }
}

fn get_metrics() -> &'static GraphMetricsInner {
    METRICS.get_or_init(GraphMetricsInner::new)
}

fn outcome(success: bool) -> &'static str {
    if success {
        "success"
    } else {
        "failure"
    }
}

#[derive(Clone, Default)]
pub struct GraphMetrics;

impl GraphMetrics {
    pub fn register(registry: &Registry) -> Result<(), prometheus::Error> {
        registry.register(Box::new(get_metrics().mirror_writes.clone()))
    }

    /// One mirror write against `backend`; `operation` is `follow` or `unfollow`
    pub fn record_mirror(backend: &str, operation: &str, success: bool) {
        get_metrics()
            .mirror_writes
            .with_label_values(&[backend, operation, outcome(success)])
            .inc();
    }

    pub fn mirror_writes(backend: &str, operation: &str, success: bool) -> f64 {
        get_metrics()
            .mirror_writes
            .with_label_values(&[backend, operation, outcome(success)])
            .get()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mirror_outcomes_are_counted_separately() {
        let registry = Registry::new();
        GraphMetrics::register(&registry).unwrap();

        let before_ok = GraphMetrics::mirror_writes("metrics-test", "follow", true);
        let before_failed = GraphMetrics::mirror_writes("metrics-test", "follow", false);
        GraphMetrics::record_mirror("metrics-test", "follow", true);
        GraphMetrics::record_mirror("metrics-test", "follow", true);
        GraphMetrics::record_mirror("metrics-test", "follow", false);

        assert_eq!(GraphMetrics::mirror_writes("metrics-test", "follow", true), before_ok + 2.0);
        assert_eq!(
            GraphMetrics::mirror_writes("metrics-test", "follow", false),
            before_failed + 1.0
        );
        let names: Vec<String> = registry
            .gather()
            .iter()
            .map(|family| family.get_name().to_string())
            .collect();
        assert!(names.contains(&"timeline_graph_mirror_writes_total".to_string()));
    }
}
