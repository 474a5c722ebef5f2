//! Prometheus metrics for rolling upgrades.
//!
//! Only the registry and the recording helpers live here; exposing them over
//! HTTP is left to the embedding process via [`UpgradeMetrics::encode`].

use prometheus_client::encoding::text::encode;
use prometheus_client::encoding::{EncodeLabel, EncodeLabelSet, LabelSetEncoder};
use prometheus_client::metrics::counter::Counter;
use prometheus_client::metrics::family::Family;
use prometheus_client::metrics::gauge::Gauge;
use prometheus_client::registry::Registry;

use crate::upgrade::expectations::ClusterKey;
use crate::upgrade::orchestrator::PassPhase;

/// Labels identifying a cluster (namespace + name)
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct ClusterLabels {
    pub namespace: String,
    pub name: String,
}

impl From<&ClusterKey> for ClusterLabels {
    fn from(key: &ClusterKey) -> Self {
        Self {
            namespace: key.namespace.clone(),
            name: key.name.clone(),
        }
    }
}

impl EncodeLabelSet for ClusterLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for aborted passes
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct AbortLabels {
    pub namespace: String,
    pub name: String,
    pub phase: String,
}

impl EncodeLabelSet for AbortLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("namespace", self.namespace.as_str()).encode(encoder.encode_label())?;
        ("name", self.name.as_str()).encode(encoder.encode_label())?;
        ("phase", self.phase.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Labels for predicate rejections
#[derive(Clone, Debug, Hash, PartialEq, Eq)]
pub struct PredicateLabels {
    pub predicate: String,
}

impl EncodeLabelSet for PredicateLabels {
    fn encode(&self, encoder: &mut LabelSetEncoder<'_>) -> Result<(), std::fmt::Error> {
        ("predicate", self.predicate.as_str()).encode(encoder.encode_label())?;
        Ok(())
    }
}

/// Shared rolling upgrade metrics
pub struct UpgradeMetrics {
    /// Nodes deleted for upgrade
    pub nodes_deleted_total: Family<ClusterLabels, Counter>,
    /// Node deletions rejected by the API server
    pub deletion_failures_total: Family<ClusterLabels, Counter>,
    /// Passes stopped by an error, by phase
    pub passes_aborted_total: Family<AbortLabels, Counter>,
    /// Candidates skipped, by rejecting predicate
    pub predicate_rejections_total: Family<PredicateLabels, Counter>,
    /// Non-master to master changes left unreconciled
    pub unreconciled_role_changes_total: Family<ClusterLabels, Counter>,
    /// Allowed deletions computed by the last pass
    pub allowed_deletions: Family<ClusterLabels, Gauge>,
    /// Prometheus registry
    registry: Registry,
}

impl Default for UpgradeMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl UpgradeMetrics {
    /// Create a new metrics instance with registered metrics
    pub fn new() -> Self {
        let mut registry = Registry::default();

        let nodes_deleted_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "upgrade_nodes_deleted",
            "Total number of nodes deleted for rolling upgrade",
            nodes_deleted_total.clone(),
        );

        let deletion_failures_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "upgrade_deletion_failures",
            "Total number of failed node deletions",
            deletion_failures_total.clone(),
        );

        let passes_aborted_total = Family::<AbortLabels, Counter>::default();
        registry.register(
            "upgrade_passes_aborted",
            "Total number of rolling upgrade passes aborted by an error",
            passes_aborted_total.clone(),
        );

        let predicate_rejections_total = Family::<PredicateLabels, Counter>::default();
        registry.register(
            "upgrade_predicate_rejections",
            "Total number of candidates skipped by a predicate",
            predicate_rejections_total.clone(),
        );

        let unreconciled_role_changes_total = Family::<ClusterLabels, Counter>::default();
        registry.register(
            "upgrade_unreconciled_role_changes",
            "Total number of nodes becoming master without quorum reconciliation",
            unreconciled_role_changes_total.clone(),
        );

        let allowed_deletions = Family::<ClusterLabels, Gauge>::default();
        registry.register(
            "upgrade_allowed_deletions",
            "Deletions allowed by the disruption budget in the last pass",
            allowed_deletions.clone(),
        );

        Self {
            nodes_deleted_total,
            deletion_failures_total,
            passes_aborted_total,
            predicate_rejections_total,
            unreconciled_role_changes_total,
            allowed_deletions,
            registry,
        }
    }

    pub fn record_node_deleted(&self, cluster: &ClusterKey) {
        self.nodes_deleted_total
            .get_or_create(&ClusterLabels::from(cluster))
            .inc();
    }

    pub fn record_deletion_failure(&self, cluster: &ClusterKey) {
        self.deletion_failures_total
            .get_or_create(&ClusterLabels::from(cluster))
            .inc();
    }

    pub fn record_pass_aborted(&self, cluster: &ClusterKey, phase: PassPhase) {
        let labels = AbortLabels {
            namespace: cluster.namespace.clone(),
            name: cluster.name.clone(),
            phase: phase.to_string(),
        };
        self.passes_aborted_total.get_or_create(&labels).inc();
    }

    pub fn record_predicate_rejection(&self, predicate: &str) {
        let labels = PredicateLabels {
            predicate: predicate.to_string(),
        };
        self.predicate_rejections_total.get_or_create(&labels).inc();
    }

    pub fn record_unreconciled_role_change(&self, cluster: &ClusterKey) {
        self.unreconciled_role_changes_total
            .get_or_create(&ClusterLabels::from(cluster))
            .inc();
    }

    pub fn set_allowed_deletions(&self, cluster: &ClusterKey, allowed: i32) {
        self.allowed_deletions
            .get_or_create(&ClusterLabels::from(cluster))
            .set(i64::from(allowed));
    }

    /// Encode metrics to Prometheus text format
    pub fn encode(&self) -> String {
        let mut buffer = String::new();
        if encode(&mut buffer, &self.registry).is_err() {
            tracing::error!("Failed to encode metrics");
            return "# Error encoding metrics".to_string();
        }
        buffer
    }
}
