//! Node deletion with UID preconditions and expectation bookkeeping.

use std::future::Future;

use k8s_openapi::api::core::v1::Pod;
use kube::api::{Api, DeleteParams, Preconditions};
use kube::Client;
use tracing::{info, warn};

use crate::controller::error::Error;

use super::expectations::{ClusterKey, Expectations};
use super::node::UpgradeNode;

/// Deletes a node only if its live UID still matches the observed one.
pub trait NodeDeleter: Send + Sync {
    /// Delete `node`, failing with [`Error::PreconditionFailed`] when the live
    /// object was recreated since it was observed.
    fn delete_node(&self, node: &UpgradeNode) -> impl Future<Output = Result<(), Error>> + Send;
}

/// [`NodeDeleter`] backed by the Kubernetes Pod API.
#[derive(Clone)]
pub struct PodDeleter {
    api: Api<Pod>,
}

impl PodDeleter {
    pub fn new(client: Client, namespace: &str) -> Self {
        Self {
            api: Api::namespaced(client, namespace),
        }
    }
}

impl NodeDeleter for PodDeleter {
    async fn delete_node(&self, node: &UpgradeNode) -> Result<(), Error> {
        // The name alone may point at a pod recreated since our cache was
        // filled; the UID precondition makes the API server reject that.
        let params = DeleteParams {
            preconditions: Some(Preconditions {
                uid: Some(node.uid.clone()),
                resource_version: None,
            }),
            ..Default::default()
        };
        match self.api.delete(&node.name, &params).await {
            Ok(_) => Ok(()),
            Err(kube::Error::Api(e)) if e.code == 409 => Err(Error::PreconditionFailed {
                node: node.name.clone(),
                uid: node.uid.clone(),
            }),
            Err(e) => Err(e.into()),
        }
    }
}

/// Issues deletions for one cluster and keeps the expectation ledger in step.
pub struct DeletionExecutor<'a, D> {
    deleter: &'a D,
    expectations: &'a Expectations,
    cluster: &'a ClusterKey,
}

impl<'a, D: NodeDeleter> DeletionExecutor<'a, D> {
    pub fn new(deleter: &'a D, expectations: &'a Expectations, cluster: &'a ClusterKey) -> Self {
        Self {
            deleter,
            expectations,
            cluster,
        }
    }

    /// Delete `node`.
    ///
    /// The expectation is recorded first so a concurrent reconcile never sees
    /// the deletion without it. On failure it is cancelled again and the
    /// error returned as is.
    pub async fn issue(&self, node: &UpgradeNode) -> Result<(), Error> {
        info!(
            cluster = %self.cluster,
            node = %node.name,
            uid = %node.uid,
            "Deleting node for rolling upgrade"
        );
        self.expectations.expect_deletion(self.cluster, node);
        if let Err(e) = self.deleter.delete_node(node).await {
            warn!(
                cluster = %self.cluster,
                node = %node.name,
                error = %e,
                "Node deletion failed, cancelling expectation"
            );
            self.expectations.cancel_expected_deletion(self.cluster, node);
            return Err(e);
        }
        Ok(())
    }
}
