//! Coordinator failover: a standby takes the lock, reloads all persisted
//! state, and resumes in-flight OPs from their recorded task index.

use crate::test_utilities::{
    PeerRegistry, RegistryPeerProvider, TestCluster, table_spec, wait_until,
};
use metaplane::types::{OpId, Pid, TaskStatus};
use metaplane_nameserver::nameserver::NameServer;
use metaplane_nameserver::tablet::TabletProvider;
use std::sync::Arc;
use std::time::Duration;

/// Second coordinator sharing the cluster's metastore and tablets.
fn start_standby(
    registry: &Arc<PeerRegistry>,
    cluster: &TestCluster,
    endpoint: &str,
) -> Arc<NameServer> {
    let ns = NameServer::new(
        TestCluster::test_config(&cluster.root, endpoint, false),
        cluster.meta_server.connect(),
        Arc::clone(&cluster.provider) as Arc<dyn TabletProvider>,
        Arc::new(RegistryPeerProvider::new(registry)),
    );
    ns.start().expect("standby start");
    ns
}

#[tokio::test(flavor = "multi_thread")]
async fn test_standby_takes_over_catalog() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/takeover", "ns1:7181", &["a:9527"], false).await;

    let tid1 = cluster
        .ns
        .create_table(table_spec("", "t1", 1, 1), None)
        .await
        .unwrap();

    let standby = start_standby(&registry, &cluster, "ns2:7181");
    assert!(!standby.is_running());

    cluster.ns.stop();
    {
        let standby = Arc::clone(&standby);
        wait_until("standby takes the lock", move || standby.is_running()).await;
    }

    // The catalog survived the coordinator change.
    let tables = standby.show_table("", Some("t1"));
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].tid, tid1);

    // tids keep increasing across coordinators.
    let tid2 = standby
        .create_table(table_spec("", "t2", 1, 1), None)
        .await
        .unwrap();
    assert!(tid2 > tid1);
    standby.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_in_flight_op_resumes_after_takeover() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/resume",
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

    // Freeze the leader tablet so the op parks in its first task.
    cluster.tablet("a:9527").hold_tasks();
    let op_id = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b:9527")
        .unwrap()[0];
    {
        let tablet = cluster.tablet("a:9527");
        wait_until("first task dispatched", move || {
            tablet.has_call("pause_snapshot")
        })
        .await;
    }

    let standby = start_standby(&registry, &cluster, "ns2:7181");
    cluster.ns.stop();
    {
        let standby = Arc::clone(&standby);
        wait_until("standby takes the lock", move || standby.is_running()).await;
    }

    // The recovered op is still pending, resumed at the same task.
    let views = standby.show_op_status(None, Some("t"), None);
    assert!(views.iter().any(|v| v.op_id == op_id && !v.status.is_terminal()));

    // Release the tablet; the new coordinator drives the op to completion.
    cluster.tablet("a:9527").release_tasks();
    cluster.tablet("b:9527").release_tasks();
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    loop {
        let status = standby
            .show_op_status(None, Some("t"), None)
            .into_iter()
            .find(|v| v.op_id == op_id)
            .map(|v| v.status);
        if status == Some(TaskStatus::Done) {
            break;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "op never completed on the standby: {:?}",
            standby.show_op_status(None, None, None)
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }

    let table = standby.show_table("", Some("t")).remove(0);
    let part = table.partition(Pid(0)).unwrap();
    assert!(part.replica("b:9527").is_some_and(|m| m.is_alive));
    standby.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_finished_op_replay_is_noop() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/replay",
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
    let op_id = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b:9527")
        .unwrap()[0];
    assert_eq!(cluster.wait_op_terminal(op_id).await, TaskStatus::Done);
    let table_before = cluster.ns.show_table("", Some("t")).remove(0);

    // Takeover after completion must not re-run anything: the op node was
    // deleted, so the standby recovers no pending work.
    let standby = start_standby(&registry, &cluster, "ns2:7181");
    cluster.ns.stop();
    {
        let standby = Arc::clone(&standby);
        wait_until("standby takes the lock", move || standby.is_running()).await;
    }
    assert!(standby.show_op_status(None, Some("t"), None).is_empty());

    let table_after = standby.show_table("", Some("t")).remove(0);
    assert_eq!(table_before.tid, table_after.tid);
    assert_eq!(table_before.table_partition, table_after.table_partition);
    standby.stop();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_op_ids_monotonic_across_restart() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/opids",
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
    let first = cluster
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b:9527")
        .unwrap()[0];
    assert_eq!(cluster.wait_op_terminal(first).await, TaskStatus::Done);

    let standby = start_standby(&registry, &cluster, "ns2:7181");
    cluster.ns.stop();
    {
        let standby = Arc::clone(&standby);
        wait_until("standby takes the lock", move || standby.is_running()).await;
    }

    let second = standby.make_snapshot_ns("", "t", Pid(0), 0).unwrap();
    assert!(second > first);
    assert!(second >= OpId(2));
    standby.stop();
}
