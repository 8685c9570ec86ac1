//! Failover scenarios: tablet outage, automatic leader change, and
//! recovery when the tablet returns.

use crate::test_utilities::{PeerRegistry, TestCluster, table_spec};
use metaplane::types::{Pid, TaskStatus};

#[tokio::test(flavor = "multi_thread")]
async fn test_tablet_offline_elects_new_leader() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/failover",
        "ns1:7181",
        &["a:9527", "b:9527"],
        true,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 2), None)
        .await
        .unwrap();
    let before = cluster.ns.show_table("", Some("t")).remove(0);
    let old_leader = before
        .partition(Pid(0))
        .unwrap()
        .alive_leader()
        .unwrap()
        .endpoint
        .clone();
    let survivor = if old_leader == "a:9527" {
        "b:9527"
    } else {
        "a:9527"
    };

    cluster.kill_tablet(&old_leader);
    cluster.wait_all_ops_terminal().await;

    // A completed ChangeLeader op is visible.
    let ops = cluster.ns.show_op_status(None, Some("t"), Some(Pid(0)));
    assert!(ops.iter().any(|op| {
        op.op_type == metaplane::types::OpType::ChangeLeader && op.status == TaskStatus::Done
    }));

    // The survivor is the new alive leader; at most one leader overall.
    let after = cluster.ns.show_table("", Some("t")).remove(0);
    let part = after.partition(Pid(0)).unwrap();
    assert_eq!(part.alive_leader().unwrap().endpoint, survivor);
    assert_eq!(
        part.partition_meta
            .iter()
            .filter(|m| m.is_leader && m.is_alive)
            .count(),
        1
    );

    // A term/offset pair was recorded for catch-up.
    assert!(!part.term_offset.is_empty());
    assert!(part.term_offset.last().unwrap().term >= 2);

    // The survivor was told to lead.
    assert!(cluster.tablet(survivor).has_call("follow_of_no_one"));
    assert!(cluster.tablet(survivor).has_call("change_role tid=1 pid=0 leader=true"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_tablet_reappears_and_recovers() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/recoverep",
        "ns1:7181",
        &["a:9527", "b:9527"],
        true,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 2), None)
        .await
        .unwrap();
    let before = cluster.ns.show_table("", Some("t")).remove(0);
    let old_leader = before
        .partition(Pid(0))
        .unwrap()
        .alive_leader()
        .unwrap()
        .endpoint
        .clone();

    cluster.kill_tablet(&old_leader);
    cluster.wait_all_ops_terminal().await;

    // The endpoint comes back; auto-failover re-attaches its replica. The
    // recovery op is spawned off the membership event, so wait on the final
    // catalog state rather than the op list.
    cluster.revive_tablet(&old_leader);
    {
        let ns = cluster.ns.clone();
        let endpoint = old_leader.clone();
        crate::test_utilities::wait_until("replica re-attached", move || {
            ns.show_table("", Some("t"))
                .first()
                .and_then(|t| t.partition(Pid(0)))
                .and_then(|p| p.replica(&endpoint).cloned())
                .is_some_and(|m| m.is_alive && !m.is_leader)
        })
        .await;
    }
    cluster.wait_all_ops_terminal().await;

    let ops = cluster.ns.show_op_status(None, Some("t"), Some(Pid(0)));
    assert!(ops.iter().any(|op| {
        op.op_type == metaplane::types::OpType::RecoverTable && op.status == TaskStatus::Done
    }));

    // There is still exactly one alive leader.
    let after = cluster.ns.show_table("", Some("t")).remove(0);
    let part = after.partition(Pid(0)).unwrap();
    assert_eq!(
        part.partition_meta
            .iter()
            .filter(|m| m.is_leader && m.is_alive)
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sole_replica_offline_marks_partition_dead() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/soledead",
        "ns1:7181",
        &["a:9527", "b:9527"],
        true,
    )
    .await;

    // Two single-replica partitions, one per tablet.
    cluster
        .ns
        .create_table(table_spec("", "t", 2, 1), None)
        .await
        .unwrap();
    let before = cluster.ns.show_table("", Some("t")).remove(0);
    let (dead_pid, dead_ep) = before
        .table_partition
        .iter()
        .map(|p| (p.pid, p.partition_meta[0].endpoint.clone()))
        .next()
        .unwrap();

    cluster.kill_tablet(&dead_ep);
    cluster.wait_all_ops_terminal().await;

    let after = cluster.ns.show_table("", Some("t")).remove(0);
    let part = after.partition(dead_pid).unwrap();
    // The sole replica is marked dead: the partition is unavailable, but
    // its meta is retained for recovery.
    assert!(!part.partition_meta[0].is_alive);
    assert!(part.alive_leader().is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_offline_endpoint_concurrency_override() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/concurrency",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    // Both tablets hold both partitions, so draining one touches two pids.
    cluster
        .ns
        .create_table(table_spec("", "t", 2, 2), None)
        .await
        .unwrap();

    cluster.ns.offline_endpoint("b:9527", 1).unwrap();

    // With a concurrency override of 1, every corrective op lands on queue
    // 0 even though the pids would normally spread across queues.
    let ops = cluster.ns.show_op_status(None, Some("t"), None);
    assert_eq!(ops.len(), 2);
    assert!(ops.iter().any(|op| op.pid == Some(Pid(0))));
    assert!(ops.iter().any(|op| op.pid == Some(Pid(1))));
    assert!(ops.iter().all(|op| op.vec_idx == Some(0)));

    cluster.wait_all_ops_terminal().await;
}

#[tokio::test(flavor = "multi_thread")]
async fn test_no_auto_failover_without_flag() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/nofailover",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 2), None)
        .await
        .unwrap();
    let leader = cluster
        .ns
        .show_table("", Some("t"))
        .remove(0)
        .partition(Pid(0))
        .unwrap()
        .alive_leader()
        .unwrap()
        .endpoint
        .clone();

    cluster.kill_tablet(&leader);
    // Give the debounce window plenty of time to fire.
    tokio::time::sleep(std::time::Duration::from_millis(400)).await;

    // No corrective op was created; the catalog still shows the old leader.
    assert!(cluster.ns.show_op_status(None, Some("t"), None).is_empty());
    let part = cluster
        .ns
        .show_table("", Some("t"))
        .remove(0)
        .partition(Pid(0))
        .unwrap()
        .clone();
    assert_eq!(part.alive_leader().unwrap().endpoint, leader);
}
