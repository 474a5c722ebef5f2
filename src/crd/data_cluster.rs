//! DataCluster Custom Resource Definition.
//!
//! Describes a shard-distributed data cluster made of named node sets. Each
//! node set is materialized as one StatefulSet, so every member pod is named
//! `<cluster>-<nodeSet>-<ordinal>`.

use std::collections::BTreeSet;

use kube::{CustomResource, ResourceExt};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// DataCluster is a custom resource for deploying quorum-based data clusters.
///
/// Example:
/// ```yaml
/// apiVersion: datacluster.smoketurner.com/v1alpha1
/// kind: DataCluster
/// metadata:
///   name: logs
/// spec:
///   version: 8.15.0
///   nodeSets:
///     - name: master
///       count: 3
///       master: true
///     - name: data
///       count: 3
///   updateStrategy:
///     changeBudget:
///       maxUnavailable: 1
/// ```
#[derive(CustomResource, Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[kube(
    group = "datacluster.smoketurner.com",
    version = "v1alpha1",
    kind = "DataCluster",
    plural = "dataclusters",
    shortname = "dc",
    namespaced,
    printcolumn = r#"{"name":"Version", "type":"string", "jsonPath":".spec.version"}"#,
    printcolumn = r#"{"name":"Age", "type":"date", "jsonPath":".metadata.creationTimestamp"}"#
)]
#[serde(rename_all = "camelCase")]
pub struct DataClusterSpec {
    /// Target version of the data nodes.
    pub version: String,

    /// Node sets making up the cluster.
    #[serde(default)]
    pub node_sets: Vec<NodeSetSpec>,

    /// How spec changes are rolled out to running nodes.
    #[serde(default)]
    pub update_strategy: UpdateStrategy,
}

/// A group of identically configured nodes backed by one StatefulSet.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct NodeSetSpec {
    /// Node set name, unique within the cluster.
    pub name: String,

    /// Number of nodes in this set.
    #[serde(default = "default_count")]
    pub count: i32,

    /// Whether nodes in this set take part in master election.
    #[serde(default)]
    pub master: bool,
}

fn default_count() -> i32 {
    1
}

/// Rolling upgrade strategy.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub struct UpdateStrategy {
    /// Bounds on how many nodes may be added or removed concurrently.
    #[serde(default)]
    pub change_budget: ChangeBudget,
}

/// Disruption limits applied while nodes are replaced.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ChangeBudget {
    /// Maximum number of unavailable nodes. Unset means 1, a negative value
    /// means unbounded.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max_unavailable: Option<i32>,
}

/// Default number of nodes allowed to be unavailable during an upgrade.
pub const DEFAULT_MAX_UNAVAILABLE: i32 = 1;

impl ChangeBudget {
    /// Resolve `maxUnavailable`, returning `None` when it is unbounded.
    pub fn max_unavailable_or_default(&self) -> Option<i32> {
        match self.max_unavailable {
            None => Some(DEFAULT_MAX_UNAVAILABLE),
            Some(v) if v < 0 => None,
            Some(v) => Some(v),
        }
    }
}

impl DataCluster {
    /// StatefulSet name backing a node set.
    pub fn statefulset_name(&self, node_set: &str) -> String {
        format!("{}-{}", self.name_any(), node_set)
    }

    /// Pod names that should hold the master role after the upgrade.
    pub fn expected_master_names(&self) -> BTreeSet<String> {
        self.spec
            .node_sets
            .iter()
            .filter(|ns| ns.master)
            .flat_map(|ns| self.pod_names(ns))
            .collect()
    }

    fn pod_names(&self, node_set: &NodeSetSpec) -> Vec<String> {
        let sset = self.statefulset_name(&node_set.name);
        (0..node_set.count.max(0))
            .map(|ordinal| format!("{}-{}", sset, ordinal))
            .collect()
    }

    /// Validate the spec before it drives any deletion.
    pub fn validate(&self) -> Result<(), String> {
        if self.spec.node_sets.is_empty() {
            return Err("spec.nodeSets must contain at least one node set".to_string());
        }
        let mut seen = BTreeSet::new();
        for ns in &self.spec.node_sets {
            if ns.name.is_empty() {
                return Err("node set name must not be empty".to_string());
            }
            if !seen.insert(ns.name.as_str()) {
                return Err(format!("duplicate node set name '{}'", ns.name));
            }
            if ns.count < 0 {
                return Err(format!(
                    "node set '{}' has negative count {}",
                    ns.name, ns.count
                ));
            }
        }
        if !self.spec.node_sets.iter().any(|ns| ns.master && ns.count > 0) {
            return Err("at least one node set must provide master nodes".to_string());
        }
        Ok(())
    }
}
