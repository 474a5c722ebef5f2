//! Read-only view of the managed cluster's own state.
//!
//! Filled by the watch layer and handed to predicates. Shard placement and
//! health are only read here; the predicates that interpret them are
//! registered by the caller.

use std::collections::BTreeMap;
use std::fmt;

use crate::controller::error::Error;

/// Overall cluster health as reported by the cluster itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ClusterHealth {
    Green,
    Yellow,
    Red,
    /// Health could not be retrieved.
    #[default]
    Unknown,
}

impl fmt::Display for ClusterHealth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ClusterHealth::Green => write!(f, "green"),
            ClusterHealth::Yellow => write!(f, "yellow"),
            ClusterHealth::Red => write!(f, "red"),
            ClusterHealth::Unknown => write!(f, "unknown"),
        }
    }
}

/// One copy of a shard hosted on a node.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub struct ShardCopy {
    pub index: String,
    pub shard: u32,
    pub primary: bool,
}

/// Cluster state observer.
pub trait ClusterStateView: Send + Sync {
    /// Current cluster health.
    fn health(&self) -> ClusterHealth;

    /// Shard copies currently allocated to a node.
    fn shards_on_node(&self, node: &str) -> Result<Vec<ShardCopy>, Error>;
}

/// Point-in-time snapshot of cluster state.
#[derive(Debug, Clone, Default)]
pub struct ClusterSnapshot {
    pub health: ClusterHealth,
    /// Shard copies keyed by node name. `None` means placement is unknown.
    pub shards: Option<BTreeMap<String, Vec<ShardCopy>>>,
}

impl ClusterSnapshot {
    /// Snapshot with a known health and no shard placement information.
    pub fn with_health(health: ClusterHealth) -> Self {
        Self {
            health,
            shards: None,
        }
    }
}

impl ClusterStateView for ClusterSnapshot {
    fn health(&self) -> ClusterHealth {
        self.health
    }

    fn shards_on_node(&self, node: &str) -> Result<Vec<ShardCopy>, Error> {
        let shards = self
            .shards
            .as_ref()
            .ok_or_else(|| Error::ClusterApi("shard placement not observed yet".to_string()))?;
        Ok(shards.get(node).cloned().unwrap_or_default())
    }
}
