//! Kubernetes-facing entry point for a rolling upgrade pass.
//!
//! Reads pods and StatefulSets of a DataCluster, decides which pods run an
//! outdated revision, and hands everything to the upgrade pass. The
//! reconciler calling this owns scheduling and retries.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;

use k8s_openapi::api::apps::v1::StatefulSet;
use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, ListParams};
use kube::ResourceExt;
use tracing::{debug, info};

use crate::controller::context::Context;
use crate::controller::error::{Error, Result};
use crate::crd::DataCluster;
use crate::upgrade::node::{CLUSTER_NAME_LABEL, REVISION_HASH_LABEL};
use crate::upgrade::{
    ClusterCoordinator, ClusterKey, ClusterStateView, PodDeleter, PredicateChain,
    RollingUpgradeContext, UpgradeNode,
};

/// Nodes of a cluster as observed in the cache.
#[derive(Debug, Clone, Default)]
pub struct ObservedNodes {
    /// Every observed node.
    pub nodes: Vec<UpgradeNode>,
    /// Nodes whose revision differs from their StatefulSet's update revision.
    pub to_upgrade: Vec<UpgradeNode>,
}

impl ObservedNodes {
    /// Build the observation from listed pods and StatefulSets.
    pub fn from_resources(pods: &[Pod], statefulsets: &[StatefulSet]) -> Result<Self> {
        let update_revisions: BTreeMap<String, &str> = statefulsets
            .iter()
            .filter_map(|sset| {
                let revision = sset.status.as_ref()?.update_revision.as_deref()?;
                Some((sset.name_any(), revision))
            })
            .collect();

        let mut nodes = Vec::with_capacity(pods.len());
        let mut to_upgrade = Vec::new();
        for pod in pods {
            let node = UpgradeNode::try_from(pod)?;
            let outdated = owning_statefulset(pod)
                .and_then(|sset| update_revisions.get(sset))
                .zip(pod.labels().get(REVISION_HASH_LABEL))
                .is_some_and(|(target, current)| current.as_str() != *target);
            if outdated {
                to_upgrade.push(node.clone());
            }
            nodes.push(node);
        }
        Ok(Self { nodes, to_upgrade })
    }

    /// Names of every observed node.
    pub fn names(&self) -> BTreeSet<String> {
        self.nodes.iter().map(|n| n.name.clone()).collect()
    }

    /// Names of ready nodes that are not being deleted.
    pub fn healthy_names(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter(|n| n.healthy && !n.terminating)
            .map(|n| n.name.clone())
            .collect()
    }

    /// Names of nodes currently labelled as masters.
    pub fn master_names(&self) -> BTreeSet<String> {
        self.nodes
            .iter()
            .filter(|n| n.master)
            .map(|n| n.name.clone())
            .collect()
    }
}

fn owning_statefulset(pod: &Pod) -> Option<&str> {
    pod.owner_references()
        .iter()
        .find(|o| o.kind == "StatefulSet")
        .map(|o| o.name.as_str())
}

/// Run one rolling upgrade pass for `cluster`.
///
/// Returns the nodes deleted in this pass. Nothing is deleted while earlier
/// deletions are still visible in the cache. When the pass stops partway the
/// error is [`Error::PassAborted`], and [`Error::deleted_nodes`] lists what
/// was deleted before it.
pub async fn run_rolling_upgrade<C: ClusterCoordinator>(
    cluster: &DataCluster,
    ctx: &Context,
    coordinator: C,
    cluster_state: Arc<dyn ClusterStateView>,
    predicates: PredicateChain,
) -> Result<Vec<UpgradeNode>> {
    let name = cluster.name_any();
    let namespace = cluster.namespace().unwrap_or_else(|| "default".to_string());
    let key = ClusterKey::new(&namespace, &name);

    cluster.validate().map_err(Error::Validation)?;

    let selector = format!("{}={}", CLUSTER_NAME_LABEL, name);
    let params = ListParams::default().labels(&selector);
    let pods = Api::<Pod>::namespaced(ctx.client.clone(), &namespace)
        .list(&params)
        .await?
        .items;
    let statefulsets = Api::<StatefulSet>::namespaced(ctx.client.clone(), &namespace)
        .list(&params)
        .await?
        .items;
    let observed = ObservedNodes::from_resources(&pods, &statefulsets)?;

    if !ctx.expectations.satisfy_deletions(&key, &observed.nodes) {
        debug!(
            cluster = %key,
            pending = ?ctx.expectations.pending_deletions(&key),
            "Deletion expectations not satisfied yet, skipping rolling upgrade"
        );
        return Ok(Vec::new());
    }

    let upgrade = RollingUpgradeContext {
        cluster: key.clone(),
        all_nodes: observed.names(),
        healthy_nodes: observed.healthy_names(),
        actual_masters: observed.master_names(),
        expected_masters: cluster.expected_master_names(),
        nodes_to_upgrade: observed.to_upgrade,
        max_unavailable: cluster
            .spec
            .update_strategy
            .change_budget
            .max_unavailable_or_default(),
        cluster_state,
        coordinator,
        deleter: PodDeleter::new(ctx.client.clone(), &namespace),
        expectations: ctx.expectations.clone(),
        predicates,
        metrics: ctx.metrics.clone(),
    };

    match upgrade.delete().await {
        Ok(deleted) => {
            publish_deletions(cluster, ctx, &deleted).await;
            if !deleted.is_empty() {
                info!(cluster = %key, deleted = deleted.len(), "Rolling upgrade pass deleted nodes");
            }
            Ok(deleted)
        }
        Err(aborted) => {
            publish_deletions(cluster, ctx, &aborted.deleted).await;
            ctx.publish_warning_event(
                cluster,
                "RollingUpgradeAborted",
                "RollingUpgrade",
                Some(aborted.to_string()),
            )
            .await;
            Err(aborted.into())
        }
    }
}

async fn publish_deletions(cluster: &DataCluster, ctx: &Context, deleted: &[UpgradeNode]) {
    for node in deleted {
        ctx.publish_normal_event(
            cluster,
            "NodeDeleted",
            "RollingUpgrade",
            Some(format!("Deleted node {} for rolling upgrade", node.name)),
        )
        .await;
    }
}
