//! Cluster member nodes as seen by the rolling upgrade.
//!
//! A node is an observed Pod. The upgrade never owns it; the only write it
//! performs is the UID-conditioned delete.

use k8s_openapi::api::core::v1::Pod;
use kube::ResourceExt;

use crate::controller::error::Error;

/// Label holding the owning cluster name.
pub const CLUSTER_NAME_LABEL: &str = "datacluster.smoketurner.com/cluster-name";

/// Label set to `"true"` on master-eligible nodes.
pub const MASTER_ROLE_LABEL: &str = "datacluster.smoketurner.com/node-master";

/// Label set by the StatefulSet controller with the pod's revision.
pub const REVISION_HASH_LABEL: &str = "controller-revision-hash";

/// A cluster member considered by the rolling upgrade.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpgradeNode {
    /// Pod name, `<group>-<ordinal>`.
    pub name: String,
    /// Pod UID, used as deletion precondition.
    pub uid: String,
    /// Whether the node participates in master election.
    pub master: bool,
    /// Whether the pod reports the Ready condition.
    pub healthy: bool,
    /// Whether the pod already has a deletion timestamp.
    pub terminating: bool,
}

impl UpgradeNode {
    /// Create a healthy, non-terminating node.
    pub fn new(name: impl Into<String>, uid: impl Into<String>, master: bool) -> Self {
        Self {
            name: name.into(),
            uid: uid.into(),
            master,
            healthy: true,
            terminating: false,
        }
    }

    /// Split the node name into its owning group and ordinal.
    pub fn group_and_ordinal(&self) -> Option<(&str, u32)> {
        group_and_ordinal(&self.name)
    }
}

/// Parse a `<group>-<ordinal>` name.
///
/// Returns `None` when there is no `-` or the suffix is not a number.
pub fn group_and_ordinal(name: &str) -> Option<(&str, u32)> {
    let (group, ordinal) = name.rsplit_once('-')?;
    if group.is_empty() {
        return None;
    }
    let ordinal = ordinal.parse().ok()?;
    Some((group, ordinal))
}

/// Whether a pod carries the master role label.
pub fn is_master_pod(pod: &Pod) -> bool {
    pod.labels()
        .get(MASTER_ROLE_LABEL)
        .is_some_and(|v| v == "true")
}

/// Whether a pod reports `Ready=True`.
pub fn is_pod_ready(pod: &Pod) -> bool {
    pod.status
        .as_ref()
        .and_then(|s| s.conditions.as_ref())
        .is_some_and(|conditions| {
            conditions
                .iter()
                .any(|c| c.type_ == "Ready" && c.status == "True")
        })
}

impl TryFrom<&Pod> for UpgradeNode {
    type Error = Error;

    fn try_from(pod: &Pod) -> Result<Self, Self::Error> {
        let name = pod
            .metadata
            .name
            .clone()
            .ok_or_else(|| Error::MissingField("pod.metadata.name".to_string()))?;
        let uid = pod
            .metadata
            .uid
            .clone()
            .ok_or_else(|| Error::MissingField(format!("pod {} metadata.uid", name)))?;
        Ok(Self {
            master: is_master_pod(pod),
            healthy: is_pod_ready(pod),
            terminating: pod.metadata.deletion_timestamp.is_some(),
            name,
            uid,
        })
    }
}
