//! Custom Resource Definitions (CRDs) for upgrade-driver.
//!
//! - `DataCluster`: node sets and the change budget applied during rolling upgrades

mod data_cluster;

pub use data_cluster::*;
