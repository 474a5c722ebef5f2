//! Rolling upgrade deletion driver.
//!
//! Decides which outdated nodes can be taken down in a reconciliation pass and
//! deletes them:
//! - `ranking`: deterministic candidate order
//! - `budget`: how many more nodes may be unavailable
//! - `predicates`: ordered, short-circuiting admission checks
//! - `quorum`: quorum reconfiguration for master removals
//! - `deletion`: UID-conditioned deletes with expectation bookkeeping
//! - `orchestrator`: the pass tying them together

pub mod budget;
pub mod cluster_state;
pub mod context;
pub mod coordinator;
pub mod deletion;
pub mod expectations;
pub mod node;
pub mod orchestrator;
pub mod predicates;
pub mod quorum;
pub mod ranking;

pub use budget::DisruptionBudget;
pub use cluster_state::{ClusterHealth, ClusterSnapshot, ClusterStateView, ShardCopy};
pub use context::RollingUpgradeContext;
pub use coordinator::ClusterCoordinator;
pub use deletion::{DeletionExecutor, NodeDeleter, PodDeleter};
pub use expectations::{ClusterKey, Expectations};
pub use node::UpgradeNode;
pub use orchestrator::{PassAborted, PassPhase};
pub use predicates::{Predicate, PredicateChain, PredicateContext, PredicateVerdict};
pub use quorum::QuorumChange;
pub use ranking::{CandidateOrder, rank_candidates};
