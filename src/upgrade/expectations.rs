//! Expectation ledger for pod deletions.
//!
//! The watch cache lags behind the API server. Before deleting a node the
//! upgrade records the node's UID here; the reconciler then holds off new
//! passes for that cluster until the cache no longer shows the node with that
//! UID. Entries are keyed per cluster so independent clusters never contend
//! on the same data.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

use parking_lot::RwLock;
use tracing::debug;

use super::node::UpgradeNode;

/// Identity of a managed cluster resource.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClusterKey {
    pub namespace: String,
    pub name: String,
}

impl ClusterKey {
    pub fn new(namespace: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            name: name.into(),
        }
    }
}

impl fmt::Display for ClusterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// Process-wide deletion expectations.
#[derive(Debug, Default)]
pub struct Expectations {
    /// Node name to expected-gone UID, per cluster.
    deletions: RwLock<HashMap<ClusterKey, BTreeMap<String, String>>>,
}

impl Expectations {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that `node` is expected to disappear.
    pub fn expect_deletion(&self, cluster: &ClusterKey, node: &UpgradeNode) {
        self.deletions
            .write()
            .entry(cluster.clone())
            .or_default()
            .insert(node.name.clone(), node.uid.clone());
    }

    /// Drop the expectation for `node`, if it still refers to the same UID.
    pub fn cancel_expected_deletion(&self, cluster: &ClusterKey, node: &UpgradeNode) {
        let mut deletions = self.deletions.write();
        if let Some(expected) = deletions.get_mut(cluster) {
            if expected.get(&node.name) == Some(&node.uid) {
                expected.remove(&node.name);
            }
            if expected.is_empty() {
                deletions.remove(cluster);
            }
        }
    }

    /// Pending deletions for a cluster as `(name, uid)` pairs.
    pub fn pending_deletions(&self, cluster: &ClusterKey) -> Vec<(String, String)> {
        self.deletions
            .read()
            .get(cluster)
            .map(|expected| {
                expected
                    .iter()
                    .map(|(name, uid)| (name.clone(), uid.clone()))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Clear expectations the observed nodes confirm, and report whether none
    /// remain.
    ///
    /// An expectation is confirmed when its node is absent from `observed` or
    /// present with a different UID (already recreated).
    pub fn satisfy_deletions(&self, cluster: &ClusterKey, observed: &[UpgradeNode]) -> bool {
        let mut deletions = self.deletions.write();
        let Some(expected) = deletions.get_mut(cluster) else {
            return true;
        };
        expected.retain(|name, uid| {
            let still_there = observed
                .iter()
                .any(|n| n.name == *name && n.uid == *uid);
            if !still_there {
                debug!(cluster = %cluster, node = %name, "Deletion expectation satisfied");
            }
            still_there
        });
        let satisfied = expected.is_empty();
        if satisfied {
            deletions.remove(cluster);
        }
        satisfied
    }

    /// Forget every expectation of a cluster, e.g. once it is deleted.
    pub fn forget(&self, cluster: &ClusterKey) {
        self.deletions.write().remove(cluster);
    }
}
