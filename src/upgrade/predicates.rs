//! Admission predicates deciding which candidates may go down in a pass.
//!
//! Predicates run in registration order and stop at the first rejection or
//! error. Each one also sees the nodes already admitted earlier in the same
//! pass, so a predicate can reason about the cumulative effect of the pass.

use std::borrow::Cow;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::controller::error::Error;
use crate::metrics::UpgradeMetrics;

use super::budget::DisruptionBudget;
use super::cluster_state::ClusterStateView;
use super::node::UpgradeNode;

/// Read-only view of the pass given to every predicate.
#[derive(Clone, Copy)]
pub struct PredicateContext<'a> {
    pub nodes_to_upgrade: &'a [UpgradeNode],
    pub healthy_nodes: &'a BTreeSet<String>,
    pub expected_masters: &'a BTreeSet<String>,
    pub actual_masters: &'a BTreeSet<String>,
    pub cluster_state: &'a dyn ClusterStateView,
}

/// Signature of a predicate body.
///
/// Arguments: pass context, candidate, nodes admitted earlier in this pass,
/// and whether `maxUnavailable` is already reached.
pub type PredicateFn = dyn Fn(&PredicateContext<'_>, &UpgradeNode, &[UpgradeNode], bool) -> Result<bool, Error>
    + Send
    + Sync;

/// A named admission check.
#[derive(Clone)]
pub struct Predicate {
    name: Cow<'static, str>,
    check: Arc<PredicateFn>,
}

impl Predicate {
    pub fn new<F>(name: impl Into<Cow<'static, str>>, check: F) -> Self
    where
        F: Fn(&PredicateContext<'_>, &UpgradeNode, &[UpgradeNode], bool) -> Result<bool, Error>
            + Send
            + Sync
            + 'static,
    {
        Self {
            name: name.into(),
            check: Arc::new(check),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    fn evaluate(
        &self,
        ctx: &PredicateContext<'_>,
        candidate: &UpgradeNode,
        admitted: &[UpgradeNode],
        max_unavailable_reached: bool,
    ) -> Result<bool, Error> {
        (self.check)(ctx, candidate, admitted, max_unavailable_reached)
    }
}

impl fmt::Debug for Predicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Predicate").field("name", &self.name).finish()
    }
}

/// Outcome of running the chain for one candidate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PredicateVerdict {
    /// Every predicate passed.
    Admitted,
    /// The named predicate rejected the candidate for this pass.
    Rejected { predicate: String },
}

impl PredicateVerdict {
    pub fn can_delete(&self) -> bool {
        matches!(self, PredicateVerdict::Admitted)
    }
}

/// Ordered list of predicates.
#[derive(Debug, Clone, Default)]
pub struct PredicateChain {
    predicates: Vec<Predicate>,
}

impl PredicateChain {
    /// A chain with no predicates; every candidate is admitted.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Append a predicate, evaluated after the ones already registered.
    pub fn register(mut self, predicate: Predicate) -> Self {
        self.predicates.push(predicate);
        self
    }

    /// Predicate names in evaluation order.
    pub fn names(&self) -> Vec<&str> {
        self.predicates.iter().map(Predicate::name).collect()
    }

    /// Run the chain for one candidate.
    pub fn run(
        &self,
        ctx: &PredicateContext<'_>,
        candidate: &UpgradeNode,
        admitted: &[UpgradeNode],
        max_unavailable_reached: bool,
    ) -> Result<PredicateVerdict, Error> {
        for predicate in &self.predicates {
            if !predicate.evaluate(ctx, candidate, admitted, max_unavailable_reached)? {
                debug!(
                    node = %candidate.name,
                    predicate = %predicate.name(),
                    "Predicate failed"
                );
                return Ok(PredicateVerdict::Rejected {
                    predicate: predicate.name().to_string(),
                });
            }
        }
        Ok(PredicateVerdict::Admitted)
    }

    /// Select the candidates that can be deleted in this pass.
    ///
    /// `ranked` is walked in order; each admitted node is visible to the
    /// evaluation of the next ones. Stops once the budget is consumed, which
    /// admits at most one node when it was exhausted to begin with.
    pub fn admit(
        &self,
        ctx: &PredicateContext<'_>,
        ranked: &[UpgradeNode],
        budget: DisruptionBudget,
        metrics: Option<&UpgradeMetrics>,
    ) -> Result<Vec<UpgradeNode>, Error> {
        let mut admitted = Vec::new();
        let mut allowed = budget.allowed;
        for candidate in ranked {
            match self.run(ctx, candidate, &admitted, budget.exhausted)? {
                PredicateVerdict::Admitted => {
                    admitted.push(candidate.clone());
                    allowed -= 1;
                    if allowed <= 0 {
                        break;
                    }
                }
                PredicateVerdict::Rejected { predicate } => {
                    if let Some(metrics) = metrics {
                        metrics.record_predicate_rejection(&predicate);
                    }
                }
            }
        }
        Ok(admitted)
    }
}

/// Predicate names of the default chain.
pub const DO_NOT_RESTART_HEALTHY_NODE_IF_MAX_UNAVAILABLE_REACHED: &str =
    "do_not_restart_healthy_node_if_max_unavailable_reached";
pub const SKIP_ALREADY_TERMINATING_NODES: &str = "skip_already_terminating_nodes";
pub const ONE_MASTER_AT_A_TIME: &str = "one_master_at_a_time";

impl PredicateChain {
    /// Chain with the built-in predicates, which only look at pass context.
    ///
    /// Checks on shard placement, cluster health or versions are appended by
    /// the caller with [`PredicateChain::register`].
    pub fn with_defaults() -> Self {
        Self::empty()
            .register(Predicate::new(
                DO_NOT_RESTART_HEALTHY_NODE_IF_MAX_UNAVAILABLE_REACHED,
                |ctx, candidate, _admitted, max_unavailable_reached| {
                    Ok(!(max_unavailable_reached && ctx.healthy_nodes.contains(&candidate.name)))
                },
            ))
            .register(Predicate::new(
                SKIP_ALREADY_TERMINATING_NODES,
                |_ctx, candidate, _admitted, _reached| Ok(!candidate.terminating),
            ))
            .register(Predicate::new(ONE_MASTER_AT_A_TIME, one_master_at_a_time))
    }
}

fn is_or_becomes_master(ctx: &PredicateContext<'_>, node: &UpgradeNode) -> bool {
    node.master || ctx.expected_masters.contains(&node.name)
}

/// Never take down more than one master in a pass, and only while the other
/// masters are healthy, unless the candidate itself is unhealthy.
fn one_master_at_a_time(
    ctx: &PredicateContext<'_>,
    candidate: &UpgradeNode,
    admitted: &[UpgradeNode],
    _max_unavailable_reached: bool,
) -> Result<bool, Error> {
    if !is_or_becomes_master(ctx, candidate) {
        return Ok(true);
    }
    if admitted.iter().any(|n| is_or_becomes_master(ctx, n)) {
        return Ok(false);
    }
    let all_masters_healthy = ctx
        .actual_masters
        .iter()
        .all(|name| ctx.healthy_nodes.contains(name));
    if all_masters_healthy {
        return Ok(true);
    }
    // an unhealthy master can always be replaced
    Ok(!ctx.healthy_nodes.contains(&candidate.name))
}
