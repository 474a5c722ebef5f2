//! upgrade-driver library crate
//!
//! Deletes outdated nodes of a stateful data cluster during a rolling
//! upgrade, one reconciliation pass at a time, without exceeding the
//! cluster's disruption budget or breaking master quorum.
//!
//! The pure decision logic lives in [`upgrade`]. [`controller`] wires it to
//! the Kubernetes API for the [`crd::DataCluster`] resource.

pub mod controller;
pub mod crd;
pub mod metrics;
pub mod upgrade;

pub use controller::context::Context;
pub use controller::error::{Error, Result};
pub use controller::rolling_upgrade::{ObservedNodes, run_rolling_upgrade};
pub use metrics::UpgradeMetrics;
