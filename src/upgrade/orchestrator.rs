//! One rolling upgrade pass: rank, gate, admit, then guard and delete.
//!
//! The pass is strictly sequential. Any error stops it immediately; nodes
//! already deleted stay deleted and are reported with the error so the
//! reconciler can retry on its next trigger.

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, instrument, warn};

use crate::controller::error::Error;
use crate::metrics::UpgradeMetrics;

use super::budget::DisruptionBudget;
use super::context::RollingUpgradeContext;
use super::coordinator::ClusterCoordinator;
use super::deletion::{DeletionExecutor, NodeDeleter};
use super::expectations::ClusterKey;
use super::node::UpgradeNode;
use super::quorum::{QuorumChange, guard_quorum_role};
use super::ranking::rank_candidates;

/// Steps of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PassPhase {
    Idle,
    Ranking,
    Gating,
    Admitting,
    /// Preparing the cluster for restarts (shard allocation).
    Preparing,
    Guarding,
    Deleting,
    Done,
    Aborted,
}

impl fmt::Display for PassPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PassPhase::Idle => write!(f, "Idle"),
            PassPhase::Ranking => write!(f, "Ranking"),
            PassPhase::Gating => write!(f, "Gating"),
            PassPhase::Admitting => write!(f, "Admitting"),
            PassPhase::Preparing => write!(f, "Preparing"),
            PassPhase::Guarding => write!(f, "Guarding"),
            PassPhase::Deleting => write!(f, "Deleting"),
            PassPhase::Done => write!(f, "Done"),
            PassPhase::Aborted => write!(f, "Aborted"),
        }
    }
}

/// A pass stopped by an error.
#[derive(Debug, Error)]
#[error(
    "rolling upgrade pass aborted during {phase} after deleting {} node(s): {error}",
    .deleted.len()
)]
pub struct PassAborted {
    /// Phase the error happened in.
    pub phase: PassPhase,
    /// Nodes deleted before the error, in deletion order.
    pub deleted: Vec<UpgradeNode>,
    #[source]
    pub error: Error,
}

/// Progress of a running pass.
struct Pass<'a> {
    cluster: &'a ClusterKey,
    metrics: Option<&'a UpgradeMetrics>,
    phase: PassPhase,
    deleted: Vec<UpgradeNode>,
}

impl<'a> Pass<'a> {
    fn new(cluster: &'a ClusterKey, metrics: Option<&'a UpgradeMetrics>) -> Self {
        Self {
            cluster,
            metrics,
            phase: PassPhase::Idle,
            deleted: Vec::new(),
        }
    }

    fn enter(&mut self, phase: PassPhase) {
        debug!(from = %self.phase, to = %phase, "Upgrade pass transition");
        self.phase = phase;
    }

    fn abort(self, error: Error) -> PassAborted {
        warn!(
            cluster = %self.cluster,
            phase = %self.phase,
            to = %PassPhase::Aborted,
            deleted = self.deleted.len(),
            error = %error,
            "Rolling upgrade pass aborted"
        );
        if let Some(metrics) = self.metrics {
            metrics.record_pass_aborted(self.cluster, self.phase);
        }
        PassAborted {
            phase: self.phase,
            deleted: self.deleted,
            error,
        }
    }
}

impl<C: ClusterCoordinator, D: NodeDeleter> RollingUpgradeContext<C, D> {
    /// Run one pass and return the nodes deleted, in deletion order.
    ///
    /// Callers must only invoke this once the expectation ledger for the
    /// cluster is satisfied.
    #[instrument(skip_all, fields(cluster = %self.cluster))]
    pub async fn delete(&self) -> Result<Vec<UpgradeNode>, PassAborted> {
        if self.nodes_to_upgrade.is_empty() {
            return Ok(Vec::new());
        }
        let metrics = self.metrics.as_deref();
        let mut pass = Pass::new(&self.cluster, metrics);

        pass.enter(PassPhase::Ranking);
        let candidates = rank_candidates(&self.nodes_to_upgrade);

        pass.enter(PassPhase::Gating);
        let budget =
            DisruptionBudget::compute(&self.all_nodes, &self.healthy_nodes, self.max_unavailable);
        if let Some(metrics) = metrics {
            metrics.set_allowed_deletions(&self.cluster, budget.allowed);
        }

        pass.enter(PassPhase::Admitting);
        debug!(
            allowed_deletions = budget.allowed,
            max_unavailable_reached = budget.exhausted,
            candidates = candidates.len(),
            "Applying predicates"
        );
        let to_delete =
            match self
                .predicates
                .admit(&self.predicate_context(), &candidates, budget, metrics)
            {
                Ok(nodes) => nodes,
                Err(e) => return Err(pass.abort(e)),
            };
        if to_delete.is_empty() {
            debug!(cluster = %self.cluster, "No node deleted during rolling upgrade");
            pass.enter(PassPhase::Done);
            return Ok(Vec::new());
        }

        pass.enter(PassPhase::Preparing);
        if let Err(e) = self.coordinator.prepare_for_node_restart().await {
            return Err(pass.abort(e));
        }

        let executor = DeletionExecutor::new(&self.deleter, &self.expectations, &self.cluster);
        for node in to_delete {
            pass.enter(PassPhase::Guarding);
            match guard_quorum_role(&self.coordinator, &node, &self.expected_masters).await {
                Ok(QuorumChange::MasterAddition) => {
                    if let Some(metrics) = metrics {
                        metrics.record_unreconciled_role_change(&self.cluster);
                    }
                }
                Ok(_) => {}
                Err(e) => return Err(pass.abort(e)),
            }

            pass.enter(PassPhase::Deleting);
            if let Err(e) = executor.issue(&node).await {
                if let Some(metrics) = metrics {
                    metrics.record_deletion_failure(&self.cluster);
                }
                return Err(pass.abort(e));
            }
            if let Some(metrics) = metrics {
                metrics.record_node_deleted(&self.cluster);
            }
            pass.deleted.push(node);
        }

        pass.enter(PassPhase::Done);
        info!(
            cluster = %self.cluster,
            deleted = pass.deleted.len(),
            "Rolling upgrade pass complete"
        );
        Ok(pass.deleted)
    }
}
