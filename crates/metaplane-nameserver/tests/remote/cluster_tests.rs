//! Replica cluster scenarios: linking, mirroring, follower-mode guards,
//! AddReplicaNS fan-out, and the snapshot offset floor.

use crate::test_utilities::{MockPartition, PeerRegistry, TestCluster, table_spec, wait_until};
use metaplane::types::{ClusterMode, Pid, TaskStatus, Tid};
use metaplane_nameserver::error::NsError;

async fn linked_clusters(registry: &std::sync::Arc<PeerRegistry>) -> (TestCluster, TestCluster) {
    let leader = TestCluster::start(
        registry,
        "/zone-leader",
        "ns-leader:7181",
        &["a1:9527", "b1:9527"],
        false,
    )
    .await;
    let follower = TestCluster::start(
        registry,
        "/zone-follower",
        "ns-follower:7181",
        &["a2:9527", "b2:9527"],
        false,
    )
    .await;
    (leader, follower)
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_replica_cluster_mirrors_tables() {
    let registry = PeerRegistry::new();
    let (leader, follower) = linked_clusters(&registry).await;

    leader
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    leader
        .ns
        .add_replica_cluster(&follower.cluster_address("r"))
        .await
        .unwrap();
    leader.wait_all_ops_terminal().await;

    // Both the create and the per-partition replication reached Done.
    let ops = leader.ns.show_op_status(None, Some("t"), None);
    assert!(ops.iter().any(|op| op.op_type == metaplane::types::OpType::CreateTableRemote
        && op.status == TaskStatus::Done));
    assert!(ops.iter().any(|op| op.op_type == metaplane::types::OpType::AddReplicaRemote
        && op.status == TaskStatus::Done));

    // The peer now carries the table (under its own tid) and runs in
    // follower mode.
    let peer_tables = follower.ns.show_table("", Some("t"));
    assert_eq!(peer_tables.len(), 1);
    assert_eq!(follower.ns.cluster_mode(), ClusterMode::Follower);

    // Local bookkeeping points at the peer.
    let table = leader.ns.show_table("", Some("t")).remove(0);
    let part = table.partition(Pid(0)).unwrap();
    assert_eq!(part.remote_partition_meta.len(), 1);
    let remote = &part.remote_partition_meta[0];
    assert_eq!(remote.alias, "r");
    assert_eq!(remote.remote_tid, peer_tables[0].tid);
    assert!(remote.is_alive);

    // The local leader tablet was told to replicate into the peer.
    let local_leader = part.alive_leader().unwrap().endpoint.clone();
    assert!(leader.tablet(&local_leader).has_call("add_replica tid=1 pid=0"));
    assert!(leader.tablet(&local_leader).has_call("send_snapshot"));

    // Cluster modes flipped on both sides.
    assert_eq!(leader.ns.show_replica_cluster().len(), 1);
    assert_eq!(leader.ns.cluster_mode(), ClusterMode::Leader);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_follower_rejects_unstamped_mutations() {
    let registry = PeerRegistry::new();
    let (leader, follower) = linked_clusters(&registry).await;

    leader
        .ns
        .add_replica_cluster(&follower.cluster_address("r"))
        .await
        .unwrap();

    // Unstamped client mutations bounce off the follower.
    let err = follower
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap_err();
    assert!(matches!(err, NsError::ZoneInfoMismatch { .. }));

    // Duplicate aliases are rejected on the leader.
    assert!(matches!(
        leader
            .ns
            .add_replica_cluster(&follower.cluster_address("r"))
            .await,
        Err(NsError::ReplicaClusterExists { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_and_drop_mirror_to_peer() {
    let registry = PeerRegistry::new();
    let (leader, follower) = linked_clusters(&registry).await;

    leader
        .ns
        .add_replica_cluster(&follower.cluster_address("r"))
        .await
        .unwrap();

    // A table created after linking is mirrored automatically.
    leader
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();
    leader.wait_all_ops_terminal().await;
    {
        let follower_ns = follower.ns.clone();
        wait_until("peer created the table", move || {
            !follower_ns.show_table("", Some("t")).is_empty()
        })
        .await;
    }

    // Dropping mirrors too.
    leader.ns.drop_table("", "t", None).await.unwrap();
    leader.wait_all_ops_terminal().await;
    {
        let follower_ns = follower.ns.clone();
        wait_until("peer dropped the table", move || {
            follower_ns.show_table("", Some("t")).is_empty()
        })
        .await;
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_replica_ns_fans_out_to_peer() {
    let registry = PeerRegistry::new();
    let (leader, follower) = linked_clusters(&registry).await;

    leader
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();
    leader
        .ns
        .add_replica_cluster(&follower.cluster_address("r"))
        .await
        .unwrap();
    leader.wait_all_ops_terminal().await;

    let op_ids = leader
        .ns
        .add_replica_ns("", "t", &[Pid(0)], "b1:9527")
        .unwrap();
    assert_eq!(op_ids.len(), 1);
    leader.wait_all_ops_terminal().await;
    follower.wait_all_ops_terminal().await;

    // The mirrored op ran on the peer: its partition grew a replica.
    let peer_table = follower.ns.show_table("", Some("t")).remove(0);
    let peer_part = peer_table.partition(Pid(0)).unwrap();
    assert_eq!(peer_part.partition_meta.len(), 2);

    // The leader's mirror op completed through the peer status poll.
    let ops = leader.ns.show_op_status(None, Some("t"), None);
    assert!(ops.iter().any(|op| {
        op.op_type == metaplane::types::OpType::AddReplicaNsRemote
            && op.status == TaskStatus::Done
    }));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_snapshot_cron_respects_peer_offsets() {
    let registry = PeerRegistry::new();
    let (leader, follower) = linked_clusters(&registry).await;

    leader
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();
    leader
        .ns
        .add_replica_cluster(&follower.cluster_address("r"))
        .await
        .unwrap();
    leader.wait_all_ops_terminal().await;

    // Local leader is at 900; the peer's replica lags at 500.
    let table = leader.ns.show_table("", Some("t")).remove(0);
    let local_leader = table
        .partition(Pid(0))
        .unwrap()
        .alive_leader()
        .unwrap()
        .endpoint
        .clone();
    leader.tablet(&local_leader).set_partition(
        Tid(1),
        Pid(0),
        MockPartition {
            is_leader: true,
            offset: 900,
            record_cnt: 900,
            term: 1,
            has_table: true,
        },
    );
    let peer_table = follower.ns.show_table("", Some("t")).remove(0);
    let peer_leader = peer_table
        .partition(Pid(0))
        .unwrap()
        .alive_leader()
        .unwrap()
        .endpoint
        .clone();
    follower.tablet(&peer_leader).set_partition(
        peer_table.tid,
        Pid(0),
        MockPartition {
            is_leader: true,
            offset: 500,
            record_cnt: 500,
            term: 1,
            has_table: true,
        },
    );

    // Wait for both aggregators and the drift check to observe the offsets.
    {
        let ns = leader.ns.clone();
        wait_until("local offset aggregated", move || {
            ns.show_table("", Some("t"))
                .first()
                .and_then(|t| t.partition(Pid(0)))
                .and_then(|p| p.alive_leader().map(|m| m.offset))
                == Some(900)
        })
        .await;
    }
    {
        let ns = follower.ns.clone();
        wait_until("peer offset aggregated", move || {
            ns.show_table("", Some("t"))
                .first()
                .and_then(|t| t.partition(Pid(0)))
                .and_then(|p| p.alive_leader().map(|m| m.offset))
                == Some(500)
        })
        .await;
    }
    // One extra drift-check period so the leader caches the peer status.
    tokio::time::sleep(std::time::Duration::from_millis(150)).await;

    leader.ns.make_snapshot_everywhere();
    leader.wait_all_ops_terminal().await;

    // The snapshot stops at the slowest replica across clusters, never at
    // the local head.
    assert!(
        leader
            .tablet(&local_leader)
            .has_call("make_snapshot tid=1 pid=0 end_offset=500")
    );
    assert!(
        !leader
            .tablet(&local_leader)
            .has_call("make_snapshot tid=1 pid=0 end_offset=900")
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_remove_replica_cluster_unlinks() {
    let registry = PeerRegistry::new();
    let (leader, follower) = linked_clusters(&registry).await;

    leader
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();
    leader
        .ns
        .add_replica_cluster(&follower.cluster_address("r"))
        .await
        .unwrap();
    leader.wait_all_ops_terminal().await;

    leader.ns.remove_replica_cluster("r").await.unwrap();
    leader.wait_all_ops_terminal().await;

    assert!(leader.ns.show_replica_cluster().is_empty());
    // The peer returned to normal mode and accepts mutations again.
    {
        let follower_ns = follower.ns.clone();
        wait_until("peer left follower mode", move || {
            follower_ns.cluster_mode() == ClusterMode::Normal
        })
        .await;
    }
    follower
        .ns
        .create_table(table_spec("", "fresh", 1, 1), None)
        .await
        .unwrap();

    // The remote bookkeeping was torn down locally.
    let table = leader.ns.show_table("", Some("t")).remove(0);
    assert!(table.partition(Pid(0)).unwrap().remote_partition_meta.is_empty());
}
