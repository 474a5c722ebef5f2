//! Per-pass rolling upgrade context.

use std::collections::BTreeSet;
use std::sync::Arc;

use crate::metrics::UpgradeMetrics;

use super::cluster_state::ClusterStateView;
use super::expectations::{ClusterKey, Expectations};
use super::node::UpgradeNode;
use super::predicates::{PredicateChain, PredicateContext};

/// Everything one upgrade pass needs, built fresh by the reconciler.
pub struct RollingUpgradeContext<C, D> {
    /// Cluster the pass runs for.
    pub cluster: ClusterKey,
    /// Nodes running an outdated revision.
    pub nodes_to_upgrade: Vec<UpgradeNode>,
    /// Names of every node currently observed.
    pub all_nodes: BTreeSet<String>,
    /// Names of nodes considered healthy.
    pub healthy_nodes: BTreeSet<String>,
    /// Names of nodes that should be masters once the upgrade completes.
    pub expected_masters: BTreeSet<String>,
    /// Names of nodes currently holding the master role.
    pub actual_masters: BTreeSet<String>,
    /// Resolved `maxUnavailable`; `None` is unbounded.
    pub max_unavailable: Option<i32>,
    pub cluster_state: Arc<dyn ClusterStateView>,
    pub coordinator: C,
    pub deleter: D,
    pub expectations: Arc<Expectations>,
    pub predicates: PredicateChain,
    pub metrics: Option<Arc<UpgradeMetrics>>,
}

impl<C, D> RollingUpgradeContext<C, D> {
    /// Build the read-only view handed to predicates.
    pub fn predicate_context(&self) -> PredicateContext<'_> {
        PredicateContext {
            nodes_to_upgrade: &self.nodes_to_upgrade,
            healthy_nodes: &self.healthy_nodes,
            expected_masters: &self.expected_masters,
            actual_masters: &self.actual_masters,
            cluster_state: self.cluster_state.as_ref(),
        }
    }
}
