//! Engine metrics, registered on a caller-supplied Prometheus registry.

use prometheus_client::metrics::{counter::Counter, gauge::Gauge};
use prometheus_client::registry::Registry;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct Metrics {
    /// Bootstrap runs started (initial load, refreshes, stage enables).
    pub bootstraps: Counter,
    /// Bootstrap runs that failed; the replica keeps its previous state.
    pub bootstrap_failures: Counter,
    /// Completed bootstrap runs discarded because a newer epoch superseded them.
    pub stale_epochs_discarded: Counter,
    /// Purchase notifications applied to the replica.
    pub notifications_applied: Counter,
    /// Notifications dropped for addressing an unknown coordinate.
    pub notifications_out_of_range: Counter,
    /// Aggregate-value refreshes that failed (total left stale).
    pub value_refresh_failures: Counter,
    /// Per-stage notification subscriptions that could not be established.
    pub subscribe_failures: Counter,
    /// Notification streams resubscribed after an error.
    pub resubscribes: Counter,
    /// 1 while the replica is live, 0 while bootstrapping or degraded.
    pub live: Gauge,
}

impl Metrics {
    /// Metrics without a registry, for tests and embedded use.
    pub fn unregistered() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn register(registry: &mut Registry) -> Arc<Self> {
        let metrics = Self::default();
        registry.register(
            "bootstraps",
            "Number of bootstrap runs started",
            metrics.bootstraps.clone(),
        );
        registry.register(
            "bootstrap_failures",
            "Number of bootstrap runs that failed",
            metrics.bootstrap_failures.clone(),
        );
        registry.register(
            "stale_epochs_discarded",
            "Number of completed bootstrap runs discarded as superseded",
            metrics.stale_epochs_discarded.clone(),
        );
        registry.register(
            "notifications_applied",
            "Number of purchase notifications applied to the replica",
            metrics.notifications_applied.clone(),
        );
        registry.register(
            "notifications_out_of_range",
            "Number of notifications dropped for unknown coordinates",
            metrics.notifications_out_of_range.clone(),
        );
        registry.register(
            "value_refresh_failures",
            "Number of aggregate-value refreshes that failed",
            metrics.value_refresh_failures.clone(),
        );
        registry.register(
            "subscribe_failures",
            "Number of notification subscriptions that could not be established",
            metrics.subscribe_failures.clone(),
        );
        registry.register(
            "resubscribes",
            "Number of notification streams resubscribed after an error",
            metrics.resubscribes.clone(),
        );
        registry.register(
            "live",
            "Whether the replica is live (1) or bootstrapping/degraded (0)",
            metrics.live.clone(),
        );
        Arc::new(metrics)
    }
}
