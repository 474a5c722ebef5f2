//! Complete passes over an in-memory cluster.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use upgrade_driver::Error;
use upgrade_driver::metrics::ClusterLabels;
use upgrade_driver::upgrade::{PassPhase, Predicate, PredicateChain, UpgradeNode};

use crate::mock_state::*;

fn counting_chain(calls: &Arc<AtomicUsize>) -> PredicateChain {
    let calls = Arc::clone(calls);
    PredicateChain::with_defaults().register(Predicate::new(
        "counting",
        move |_ctx, _candidate, _admitted, _reached| {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok(true)
        },
    ))
}

fn metric_labels(pass: &MockPass) -> ClusterLabels {
    ClusterLabels::from(&pass.cluster)
}

#[tokio::test]
async fn test_six_node_cluster_deletes_highest_data_node() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster()).upgrade_all().build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(names(&deleted), vec!["logs-data-2"]);
    assert_eq!(log.entries(), vec!["prepare", "delete:logs-data-2"]);
    assert!(!pass.deleter.is_live("logs-data-2"));
    assert_eq!(
        pass.expectations.pending_deletions(&pass.cluster),
        vec![("logs-data-2".to_string(), "logs-data-2-uid".to_string())]
    );

    let metrics = pass.metrics.as_ref().unwrap();
    let labels = metric_labels(&pass);
    assert_eq!(metrics.allowed_deletions.get_or_create(&labels).get(), 1);
    assert_eq!(metrics.nodes_deleted_total.get_or_create(&labels).get(), 1);
}

#[tokio::test]
async fn test_empty_input_has_no_side_effects() {
    init_tracing();
    let log = CallLog::default();
    let calls = Arc::new(AtomicUsize::new(0));
    let pass = PassBuilder::new(six_node_cluster())
        .predicates(counting_chain(&calls))
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert!(deleted.is_empty());
    assert!(log.entries().is_empty());
    assert_eq!(calls.load(Ordering::SeqCst), 0);
    assert!(pass.expectations.pending_deletions(&pass.cluster).is_empty());
}

#[tokio::test]
async fn test_budget_limits_deletions() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade(&["logs-data-0", "logs-data-1", "logs-data-2"])
        .max_unavailable(Some(2))
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(names(&deleted), vec!["logs-data-2", "logs-data-1"]);
    assert!(pass.deleter.is_live("logs-data-0"));
}

#[tokio::test]
async fn test_unbounded_budget_still_takes_one_master() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade_all()
        .max_unavailable(None)
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(
        names(&deleted),
        vec!["logs-data-2", "logs-data-1", "logs-data-0", "logs-master-2"]
    );
    let metrics = pass.metrics.as_ref().unwrap();
    let labels = metric_labels(&pass);
    assert_eq!(metrics.allowed_deletions.get_or_create(&labels).get(), 6);
}

#[tokio::test]
async fn test_exhausted_budget_admits_one_unhealthy_node() {
    init_tracing();
    let log = CallLog::default();
    let mut nodes = six_node_cluster();
    nodes[3] = unhealthy("logs-data-0", false);
    nodes[4] = unhealthy("logs-data-1", false);
    let pass = PassBuilder::new(nodes).upgrade_all().build(&log);

    let deleted = pass.delete().await.unwrap();

    // healthy data-2 is skipped, then the first unhealthy node ends the pass
    assert_eq!(names(&deleted), vec!["logs-data-1"]);
    assert!(pass.deleter.is_live("logs-data-0"));
}

#[tokio::test]
async fn test_nothing_admitted_skips_cluster_preparation() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade_all()
        .max_unavailable(Some(0))
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert!(deleted.is_empty());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_terminating_nodes_are_skipped() {
    init_tracing();
    let log = CallLog::default();
    let mut nodes = six_node_cluster();
    nodes[5].terminating = true;
    let pass = PassBuilder::new(nodes)
        .upgrade(&["logs-data-1", "logs-data-2"])
        .max_unavailable(Some(2))
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(names(&deleted), vec!["logs-data-1"]);
    assert_eq!(log.entries(), vec!["prepare", "delete:logs-data-1"]);
}

#[tokio::test]
async fn test_unhealthy_master_is_replaced_first() {
    init_tracing();
    let log = CallLog::default();
    let mut nodes = six_node_cluster();
    nodes[1] = unhealthy("logs-master-1", true);
    let pass = PassBuilder::new(nodes)
        .upgrade(&["logs-master-0", "logs-master-1", "logs-master-2"])
        .max_unavailable(None)
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(names(&deleted), vec!["logs-master-1"]);
}

#[tokio::test]
async fn test_deletion_failure_keeps_partial_progress() {
    init_tracing();
    let log = CallLog::default();
    let mut pass = PassBuilder::new(six_node_cluster())
        .upgrade(&["logs-data-0", "logs-data-1", "logs-data-2"])
        .max_unavailable(Some(3))
        .build(&log);
    pass.deleter.fail_on = Some("logs-data-1".to_string());

    let aborted = pass.delete().await.unwrap_err();

    assert_eq!(aborted.phase, PassPhase::Deleting);
    assert_eq!(names(&aborted.deleted), vec!["logs-data-2"]);
    assert!(matches!(aborted.error, Error::Transient(_)));
    // data-0 is never attempted
    assert_eq!(
        log.entries(),
        vec!["prepare", "delete:logs-data-2", "delete:logs-data-1"]
    );
    // only the completed deletion stays expected
    assert_eq!(
        pass.expectations.pending_deletions(&pass.cluster),
        vec![("logs-data-2".to_string(), "logs-data-2-uid".to_string())]
    );

    let metrics = pass.metrics.as_ref().unwrap();
    let labels = metric_labels(&pass);
    assert_eq!(metrics.deletion_failures_total.get_or_create(&labels).get(), 1);

    // the controller error still reports what went
    let err = Error::from(aborted);
    assert_eq!(names(err.deleted_nodes()), vec!["logs-data-2"]);
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_recreated_node_is_not_deleted() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade(&["logs-data-2"])
        .build(&log);
    // the pod came back under the same name after the cache was read
    pass.deleter.recreate("logs-data-2", "logs-data-2-new-uid");

    let aborted = pass.delete().await.unwrap_err();

    assert!(aborted.error.is_conflict());
    assert!(aborted.deleted.is_empty());
    assert!(pass.deleter.is_live("logs-data-2"));
    assert!(pass.expectations.pending_deletions(&pass.cluster).is_empty());
}

#[tokio::test]
async fn test_preparation_failure_deletes_nothing() {
    init_tracing();
    let log = CallLog::default();
    let mut pass = PassBuilder::new(six_node_cluster())
        .upgrade_all()
        .build(&log);
    pass.coordinator.fail_prepare = true;

    let aborted = pass.delete().await.unwrap_err();

    assert_eq!(aborted.phase, PassPhase::Preparing);
    assert!(aborted.deleted.is_empty());
    assert_eq!(log.entries(), vec!["prepare"]);
}

#[tokio::test]
async fn test_master_removal_reconfigures_quorum_before_delete() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade(&["logs-master-2"])
        .expected_masters(&["logs-master-0", "logs-master-1"])
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(names(&deleted), vec!["logs-master-2"]);
    assert_eq!(
        log.entries(),
        vec!["prepare", "quorum:logs-master-2", "delete:logs-master-2"]
    );
}

#[tokio::test]
async fn test_quorum_failure_aborts_before_delete() {
    init_tracing();
    let log = CallLog::default();
    let mut pass = PassBuilder::new(six_node_cluster())
        .upgrade(&["logs-master-2"])
        .expected_masters(&["logs-master-0", "logs-master-1"])
        .build(&log);
    pass.coordinator.fail_quorum_for = Some("logs-master-2".to_string());

    let aborted = pass.delete().await.unwrap_err();

    assert_eq!(aborted.phase, PassPhase::Guarding);
    assert!(matches!(aborted.error, Error::QuorumReconfiguration { .. }));
    assert!(pass.deleter.is_live("logs-master-2"));
    assert!(pass.expectations.pending_deletions(&pass.cluster).is_empty());
}

#[tokio::test]
async fn test_node_becoming_master_is_deleted_without_quorum_change() {
    init_tracing();
    let log = CallLog::default();
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade(&["logs-data-2"])
        .expected_masters(&["logs-master-0", "logs-master-1", "logs-master-2", "logs-data-2"])
        .build(&log);

    let deleted = pass.delete().await.unwrap();

    assert_eq!(names(&deleted), vec!["logs-data-2"]);
    assert_eq!(log.entries(), vec!["prepare", "delete:logs-data-2"]);
    let metrics = pass.metrics.as_ref().unwrap();
    let labels = metric_labels(&pass);
    assert_eq!(
        metrics
            .unreconciled_role_changes_total
            .get_or_create(&labels)
            .get(),
        1
    );
}

#[tokio::test]
async fn test_predicate_error_aborts_during_admission() {
    init_tracing();
    let log = CallLog::default();
    let chain = PredicateChain::with_defaults().register(Predicate::new(
        "shard_placement",
        |_ctx, candidate, _admitted, _reached| {
            Err(Error::Predicate {
                predicate: "shard_placement".to_string(),
                node: candidate.name.clone(),
                reason: "shard placement unknown".to_string(),
            })
        },
    ));
    let pass = PassBuilder::new(six_node_cluster())
        .upgrade_all()
        .predicates(chain)
        .build(&log);

    let aborted = pass.delete().await.unwrap_err();

    assert_eq!(aborted.phase, PassPhase::Admitting);
    assert!(aborted.deleted.is_empty());
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn test_next_pass_waits_for_observed_deletion() {
    init_tracing();
    let log = CallLog::default();
    let nodes = six_node_cluster();
    let pass = PassBuilder::new(nodes.clone()).upgrade_all().build(&log);
    pass.delete().await.unwrap();

    // the cache still shows the deleted pod
    assert!(!pass.expectations.satisfy_deletions(&pass.cluster, &nodes));

    // the StatefulSet recreated it with a new UID
    let mut observed = nodes;
    observed[5] = UpgradeNode::new("logs-data-2", "logs-data-2-new-uid", false);
    assert!(pass.expectations.satisfy_deletions(&pass.cluster, &observed));
    assert!(pass.expectations.pending_deletions(&pass.cluster).is_empty());
}
