//! Quorum bookkeeping for role changes during a rolling upgrade.
//!
//! Restarting a master with the same role needs nothing: it leaves and
//! rejoins the voting configuration on its own. A master that comes back as
//! a non-master is a permanent removal and must be taken out of the quorum
//! before it goes down. Master additions are reconciled before the upgrade
//! starts, when StatefulSets are scaled up.

use std::collections::BTreeSet;
use std::fmt;

use tracing::{info, warn};

use crate::controller::error::Error;

use super::coordinator::ClusterCoordinator;
use super::node::UpgradeNode;

/// Effect a node replacement has on the quorum.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QuorumChange {
    /// Same role before and after the upgrade.
    Unchanged,
    /// A master is replaced by a non-master.
    MasterRemoval,
    /// A non-master is replaced by a master.
    ///
    /// Not reconciled here: the minimum master count is not adjusted for
    /// this case. It is only reported.
    MasterAddition,
}

impl QuorumChange {
    /// Classify the replacement of `node`.
    pub fn for_node(node: &UpgradeNode, expected_masters: &BTreeSet<String>) -> Self {
        let stays_master = expected_masters.contains(&node.name);
        match (node.master, stays_master) {
            (true, false) => QuorumChange::MasterRemoval,
            (false, true) => QuorumChange::MasterAddition,
            _ => QuorumChange::Unchanged,
        }
    }
}

impl fmt::Display for QuorumChange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            QuorumChange::Unchanged => write!(f, "Unchanged"),
            QuorumChange::MasterRemoval => write!(f, "MasterRemoval"),
            QuorumChange::MasterAddition => write!(f, "MasterAddition"),
        }
    }
}

/// Reconfigure the quorum before `node` is deleted, if its role goes away.
///
/// Returns the detected change. A coordinator error must abort the pass.
pub async fn guard_quorum_role<C: ClusterCoordinator>(
    coordinator: &C,
    node: &UpgradeNode,
    expected_masters: &BTreeSet<String>,
) -> Result<QuorumChange, Error> {
    let change = QuorumChange::for_node(node, expected_masters);
    match change {
        QuorumChange::MasterRemoval => {
            info!(node = %node.name, "Master role removed by upgrade, reconfiguring quorum");
            coordinator.reconfigure_quorum_for_removal(node).await?;
        }
        QuorumChange::MasterAddition => {
            warn!(
                node = %node.name,
                "Node becomes master after upgrade; quorum size is not reconciled for this change"
            );
        }
        QuorumChange::Unchanged => {}
    }
    Ok(change)
}
