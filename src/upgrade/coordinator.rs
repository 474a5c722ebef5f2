//! Write operations against the managed cluster's own API.
//!
//! Implementations talk to the data cluster (not to Kubernetes). They are
//! supplied by the caller; the upgrade only sequences them.

use std::future::Future;

use crate::controller::error::Error;

use super::node::UpgradeNode;

/// Cluster-side operations performed around node deletions.
pub trait ClusterCoordinator: Send + Sync {
    /// Prepare the cluster for nodes going away, typically by disabling
    /// shard allocation so restarted nodes recover their local data.
    ///
    /// Called once per pass, before the first deletion.
    fn prepare_for_node_restart(&self) -> impl Future<Output = Result<(), Error>> + Send;

    /// Shrink quorum membership ahead of a master that will not come back as
    /// a master, e.g. by adding a voting exclusion or lowering the minimum
    /// master count.
    fn reconfigure_quorum_for_removal(
        &self,
        node: &UpgradeNode,
    ) -> impl Future<Output = Result<(), Error>> + Send;
}
