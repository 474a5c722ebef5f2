//! Disruption budget for a single upgrade pass.

use std::collections::BTreeSet;

/// How many more nodes may become unavailable in this pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DisruptionBudget {
    /// Deletions allowed before the budget is consumed. May be negative.
    pub allowed: i32,
    /// Whether `maxUnavailable` is already reached.
    ///
    /// An exhausted budget still lets one unhealthy node be restarted so a
    /// crash-looping node can pick up the new spec.
    pub exhausted: bool,
}

impl DisruptionBudget {
    /// Compute the budget from the current node sets.
    ///
    /// The unhealthy count is the size difference between both sets, never
    /// below zero. A `None` limit means unbounded: every node may be deleted.
    pub fn compute(
        all_nodes: &BTreeSet<String>,
        healthy_nodes: &BTreeSet<String>,
        max_unavailable: Option<i32>,
    ) -> Self {
        let total = saturating_len(all_nodes.len());
        let Some(max_unavailable) = max_unavailable else {
            return Self {
                allowed: total,
                exhausted: false,
            };
        };

        let unhealthy = total
            .saturating_sub(saturating_len(healthy_nodes.len()))
            .max(0);
        let allowed = max_unavailable.saturating_sub(unhealthy);
        Self {
            allowed,
            exhausted: allowed <= 0,
        }
    }
}

fn saturating_len(len: usize) -> i32 {
    i32::try_from(len).unwrap_or(i32::MAX)
}
