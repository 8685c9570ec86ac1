//! OP engine scenarios: replica addition, migration, cancellation, and
//! failure propagation.

use crate::test_utilities::{PeerRegistry, TestCluster, table_spec, wait_until};
use metaplane::types::{Pid, TaskStatus};

#[tokio::test(flavor = "multi_thread")]
async fn test_add_replica_end_to_end() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/addreplica",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    let op_ids = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b:9527")
        .unwrap();
    assert_eq!(op_ids.len(), 1);
    assert_eq!(cluster.wait_op_terminal(op_ids[0]).await, TaskStatus::Done);

    // Snapshot shipping ran on the leader, the load on the new follower.
    let leader = cluster.tablet("a:9527");
    assert!(leader.has_call("pause_snapshot tid=1 pid=0"));
    assert!(leader.has_call("send_snapshot tid=1 remote_tid=1 pid=0 dst=b:9527"));
    assert!(leader.has_call("add_replica tid=1 pid=0 follower=b:9527"));
    assert!(leader.has_call("recover_snapshot tid=1 pid=0"));
    assert!(cluster.tablet("b:9527").has_call("load_table tid=1 pid=0"));

    // The catalog now lists b as an alive follower.
    let table = cluster.ns.show_table("", Some("t")).remove(0);
    let part = table.partition(Pid(0)).unwrap();
    let follower = part.replica("b:9527").unwrap();
    assert!(!follower.is_leader);
    assert!(follower.is_alive);
    assert_eq!(part.alive_leader().unwrap().endpoint, "a:9527");
}

#[tokio::test(flavor = "multi_thread")]
async fn test_failed_rpc_fails_op() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/failedop",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    cluster.tablet("a:9527").fail_on("pause_snapshot");
    let op_ids = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b:9527")
        .unwrap();
    assert_eq!(
        cluster.wait_op_terminal(op_ids[0]).await,
        TaskStatus::Failed
    );

    // The follower was never touched.
    assert!(!cluster.tablet("b:9527").has_call("load_table"));
    let table = cluster.ns.show_table("", Some("t")).remove(0);
    assert!(table.partition(Pid(0)).unwrap().replica("b:9527").is_none());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_pending_migrate() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/cancel",
        "ns1:7181",
        &["a:9527", "b:9527", "c:9527"],
        false,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 2), None)
        .await
        .unwrap();
    let before = cluster.ns.show_table("", Some("t")).remove(0);
    let leader = before
        .partition(Pid(0))
        .unwrap()
        .alive_leader()
        .unwrap()
        .endpoint
        .clone();
    let follower = before
        .partition(Pid(0))
        .unwrap()
        .partition_meta
        .iter()
        .find(|m| !m.is_leader)
        .unwrap()
        .endpoint
        .clone();

    // Hold tablet tasks so the op sticks in its first step.
    cluster.tablet(&leader).hold_tasks();

    let op_ids = cluster
        .ns
        .migrate(&follower, "", "t", &[Pid(0)], "c:9527")
        .unwrap();
    let op_id = op_ids[0];
    {
        let tablet = cluster.tablet(&leader);
        wait_until("migrate snapshot pause to start", move || {
            tablet.has_call("pause_snapshot")
        })
        .await;
    }

    cluster.ns.cancel_op(op_id).await.unwrap();
    assert_eq!(
        cluster.wait_op_terminal(op_id).await,
        TaskStatus::Canceled
    );
    assert!(cluster.tablet(&leader).has_call(&format!("cancel_op op={}", op_id.0)));

    // The partition layout is untouched: the source still holds the
    // partition and the destination never loaded it.
    let after = cluster.ns.show_table("", Some("t")).remove(0);
    let part = after.partition(Pid(0)).unwrap();
    assert!(part.replica(&follower).is_some());
    assert!(part.replica("c:9527").is_none());
    assert!(!cluster.tablet("c:9527").has_call("load_table"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_ops_on_same_partition_run_in_order() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/ordering",
        "ns1:7181",
        &["a:9527", "b:9527", "c:9527"],
        false,
    )
    .await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    // Two replica additions for the same partition must serialize: the
    // second one queues behind the first in the same FIFO.
    let first = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b:9527")
        .unwrap()[0];
    let second = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "c:9527")
        .unwrap()[0];
    assert!(second > first);

    assert_eq!(cluster.wait_op_terminal(first).await, TaskStatus::Done);
    assert_eq!(cluster.wait_op_terminal(second).await, TaskStatus::Done);

    let table = cluster.ns.show_table("", Some("t")).remove(0);
    let part = table.partition(Pid(0)).unwrap();
    assert_eq!(part.partition_meta.len(), 3);
    // Single-leader invariant holds throughout.
    assert_eq!(
        part.partition_meta
            .iter()
            .filter(|m| m.is_leader && m.is_alive)
            .count(),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_make_snapshot_op() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/snapshot", "ns1:7181", &["a:9527"], false).await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    let op_id = cluster.ns.make_snapshot_ns("", "t", Pid(0), 0).unwrap();
    assert_eq!(cluster.wait_op_terminal(op_id).await, TaskStatus::Done);
    assert!(
        cluster
            .tablet("a:9527")
            .has_call("make_snapshot tid=1 pid=0 end_offset=0")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_cancel_unknown_op() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/cancel404", "ns1:7181", &["a:9527"], false).await;
    let result = cluster.ns.cancel_op(metaplane::types::OpId(999)).await;
    assert!(matches!(
        result,
        Err(metaplane_nameserver::error::NsError::OpNotFound { .. })
    ));
}
