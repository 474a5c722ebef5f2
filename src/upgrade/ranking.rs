//! Deterministic ordering of upgrade candidates.
//!
//! Non-master nodes go first so master elections are disturbed as late as
//! possible. Within a role, node groups are taken in name order and the
//! highest ordinal of a group goes first.

use std::cmp::Ordering;

use tracing::debug;

use super::node::UpgradeNode;

/// Relative order of two candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateOrder {
    /// The first candidate should be deleted before the second.
    Before,
    /// The first candidate should be deleted after the second.
    After,
    /// No order is defined; the pair keeps its input order.
    ///
    /// Happens for equal names and when a name does not parse as
    /// `<group>-<ordinal>`. The resulting order is degraded, not a policy.
    Unordered,
}

/// Compare two candidates.
pub fn compare_candidates(a: &UpgradeNode, b: &UpgradeNode) -> CandidateOrder {
    match (a.master, b.master) {
        (false, true) => return CandidateOrder::Before,
        (true, false) => return CandidateOrder::After,
        _ => {}
    }

    let (Some((group_a, ord_a)), Some((group_b, ord_b))) =
        (a.group_and_ordinal(), b.group_and_ordinal())
    else {
        debug!(
            first = %a.name,
            second = %b.name,
            "Cannot parse candidate names, leaving pair unordered"
        );
        return CandidateOrder::Unordered;
    };

    let ordering = group_a
        .cmp(group_b)
        .then_with(|| ord_b.cmp(&ord_a));
    match ordering {
        Ordering::Less => CandidateOrder::Before,
        Ordering::Greater => CandidateOrder::After,
        Ordering::Equal => CandidateOrder::Unordered,
    }
}

/// Rank candidates, highest priority first.
///
/// Works on a copy. Candidates are split by role, non-masters first, keeping
/// input order. Within a role, nodes with parseable names are sorted into the
/// positions they already occupy, while unparseable names stay where they
/// are. Ranking an already ranked list returns it unchanged.
pub fn rank_candidates(candidates: &[UpgradeNode]) -> Vec<UpgradeNode> {
    let (mut ranked, mut masters): (Vec<_>, Vec<_>) =
        candidates.iter().cloned().partition(|n| !n.master);
    order_within_role(&mut ranked);
    order_within_role(&mut masters);
    ranked.extend(masters);
    ranked
}

fn order_within_role(nodes: &mut [UpgradeNode]) {
    let slots: Vec<usize> = nodes
        .iter()
        .enumerate()
        .filter(|(_, n)| n.group_and_ordinal().is_some())
        .map(|(i, _)| i)
        .collect();
    if slots.len() < nodes.len() {
        debug!(
            unparseable = nodes.len() - slots.len(),
            "Leaving candidates with unparseable names in place"
        );
    }

    let mut parseable: Vec<UpgradeNode> =
        slots.iter().filter_map(|&i| nodes.get(i).cloned()).collect();
    // stable, so equal names keep their input order
    parseable.sort_by(|a, b| match (a.group_and_ordinal(), b.group_and_ordinal()) {
        (Some((group_a, ord_a)), Some((group_b, ord_b))) => {
            group_a.cmp(group_b).then_with(|| ord_b.cmp(&ord_a))
        }
        _ => Ordering::Equal,
    });
    for (slot, node) in slots.into_iter().zip(parseable) {
        if let Some(target) = nodes.get_mut(slot) {
            *target = node;
        }
    }
}
