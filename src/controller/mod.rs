//! Controller module for the upgrade driver.
//!
//! Contains the shared context, error handling, and the Kubernetes-facing
//! rolling upgrade entry point.

pub mod context;
pub mod error;
pub mod rolling_upgrade;
