//! Online index addition and soft deletion.

use crate::test_utilities::{MockPartition, PeerRegistry, TestCluster, table_spec, wait_until};
use metaplane::table::{ColumnDesc, ColumnKey, TableInfo};
use metaplane::types::{ColumnType, Pid, TaskStatus, Tid};
use metaplane_nameserver::error::NsError;

fn indexed_spec() -> TableInfo {
    let mut spec = table_spec("", "t", 1, 2);
    spec.column_desc.push(ColumnDesc::new("c", ColumnType::Int));
    spec
}

fn ix_c() -> ColumnKey {
    ColumnKey {
        index_name: "ix_c".to_string(),
        col_names: vec!["c".to_string()],
        ts_name: None,
        flag: 0,
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_index_skip_data_and_soft_delete() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/indexskip",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    cluster.ns.create_table(indexed_spec(), None).await.unwrap();

    let op_id = cluster.ns.add_index("", "t", ix_c(), vec![]).unwrap();
    assert_eq!(cluster.wait_op_terminal(op_id).await, TaskStatus::Done);

    // The empty table took the cheap path: index installed on every
    // replica, no data pipeline.
    assert!(cluster.tablet("a:9527").has_call("add_index tid=1 pid=0 index=ix_c"));
    assert!(cluster.tablet("b:9527").has_call("add_index tid=1 pid=0 index=ix_c"));
    assert!(!cluster.tablet("a:9527").has_call("dump_index_data"));

    let table = cluster.ns.show_table("", Some("t")).remove(0);
    let ck = table
        .column_keys
        .iter()
        .find(|ck| ck.index_name == "ix_c")
        .unwrap();
    assert_eq!(ck.flag, 0);

    // DeleteIndex soft-deletes; the key stays, flagged.
    cluster.ns.delete_index("", "t", "ix_c").unwrap();
    let table = cluster.ns.show_table("", Some("t")).remove(0);
    let ck = table
        .column_keys
        .iter()
        .find(|ck| ck.index_name == "ix_c")
        .unwrap();
    assert_eq!(ck.flag, 1);

    // A flagged index no longer exists as far as DeleteIndex is concerned.
    assert!(matches!(
        cluster.ns.delete_index("", "t", "ix_c"),
        Err(NsError::IdxNameNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_index_full_pipeline_on_data() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/indexfull",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    cluster.ns.create_table(indexed_spec(), None).await.unwrap();

    // Report data on the leader so the status aggregator sees a non-empty
    // table and the full backfill pipeline runs.
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
    cluster.tablet(&leader).set_partition(
        Tid(1),
        Pid(0),
        MockPartition {
            is_leader: true,
            offset: 100,
            record_cnt: 50,
            term: 1,
            has_table: true,
        },
    );
    // Keep the follower caught up so the binlog sync check can pass.
    cluster.tablet(&follower).set_partition(
        Tid(1),
        Pid(0),
        MockPartition {
            is_leader: false,
            offset: 100,
            record_cnt: 50,
            term: 1,
            has_table: true,
        },
    );
    {
        let ns = cluster.ns.clone();
        wait_until("aggregated offsets", move || {
            ns.show_table("", Some("t"))
                .first()
                .and_then(|t| t.partition(Pid(0)))
                .and_then(|p| p.alive_leader().map(|m| m.record_cnt))
                == Some(50)
        })
        .await;
    }

    let op_id = cluster.ns.add_index("", "t", ix_c(), vec![]).unwrap();
    assert_eq!(cluster.wait_op_terminal(op_id).await, TaskStatus::Done);

    let leader_tablet = cluster.tablet(&leader);
    assert!(leader_tablet.has_call("dump_index_data tid=1 pid=0"));
    assert!(leader_tablet.has_call("send_index_data tid=1 pid=0"));
    assert!(leader_tablet.has_call("load_index_data tid=1 pid=0"));
    // Extraction fans out to every replica.
    assert!(cluster.tablet("a:9527").has_call("extract_index_data tid=1 pid=0"));
    assert!(cluster.tablet("b:9527").has_call("extract_index_data tid=1 pid=0"));

    let table = cluster.ns.show_table("", Some("t")).remove(0);
    assert!(table.active_column_key("ix_c").is_some());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_index_rejections() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/indexbad", "ns1:7181", &["a:9527"], false).await;

    let mut spec = indexed_spec();
    spec.replica_num = 1;
    spec.column_desc.push(ColumnDesc::new("f", ColumnType::Float));
    cluster.ns.create_table(spec, None).await.unwrap();

    // Float columns cannot be indexed.
    let float_key = ColumnKey {
        index_name: "ix_f".to_string(),
        col_names: vec!["f".to_string()],
        ts_name: None,
        flag: 0,
    };
    assert!(matches!(
        cluster.ns.add_index("", "t", float_key, vec![]),
        Err(NsError::WrongColumnKey { .. })
    ));

    // Unknown columns are rejected.
    let missing_key = ColumnKey {
        index_name: "ix_x".to_string(),
        col_names: vec!["missing".to_string()],
        ts_name: None,
        flag: 0,
    };
    assert!(matches!(
        cluster.ns.add_index("", "t", missing_key, vec![]),
        Err(NsError::WrongColumnKey { .. })
    ));

    // Duplicate active index names are rejected.
    let op_id = cluster.ns.add_index("", "t", ix_c(), vec![]).unwrap();
    assert_eq!(cluster.wait_op_terminal(op_id).await, TaskStatus::Done);
    assert!(matches!(
        cluster.ns.add_index("", "t", ix_c(), vec![]),
        Err(NsError::IdxNameExists { .. })
    ));
}
