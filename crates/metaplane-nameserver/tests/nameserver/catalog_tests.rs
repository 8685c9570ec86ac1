//! Catalog lifecycle scenarios: databases, table create/drop, schema
//! evolution, procedures, and sdk endpoints.

use crate::test_utilities::{PeerRegistry, TestCluster, table_spec};
use metaplane::table::{ColumnDesc, ProcedureInfo};
use metaplane::types::{ColumnType, Pid, Tid};
use metaplane_metastore::MetaStore;
use metaplane_nameserver::error::NsError;

#[tokio::test(flavor = "multi_thread")]
async fn test_create_and_drop_lifecycle() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/lifecycle",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    cluster.ns.create_database("x").unwrap();
    let tid = cluster
        .ns
        .create_table(table_spec("x", "t", 2, 1), None)
        .await
        .unwrap();
    assert_eq!(tid, Tid(1));

    let tables = cluster.ns.show_table("x", Some("t"));
    assert_eq!(tables.len(), 1);
    let table = &tables[0];
    assert_eq!(table.table_partition.len(), 2);
    // One alive leader per partition, spread over both tablets.
    let leaders: Vec<&str> = table
        .table_partition
        .iter()
        .map(|p| p.alive_leader().unwrap().endpoint.as_str())
        .collect();
    assert_eq!(leaders, vec!["a:9527", "b:9527"]);

    // Both tablets saw their create calls.
    assert!(cluster.tablet("a:9527").has_call("create_table tid=1 pid=0"));
    assert!(cluster.tablet("b:9527").has_call("create_table tid=1 pid=1"));

    // Dropping the database while the table exists is refused.
    assert!(matches!(
        cluster.ns.drop_database("x"),
        Err(NsError::DatabaseNotEmpty { .. })
    ));

    cluster.ns.drop_table("x", "t", None).await.unwrap();
    assert!(cluster.ns.show_table("x", Some("t")).is_empty());
    cluster.ns.drop_database("x").unwrap();

    // tids stay monotonic even after the drop.
    cluster.ns.create_database("x").unwrap();
    let tid2 = cluster
        .ns
        .create_table(table_spec("x", "t", 1, 1), None)
        .await
        .unwrap();
    assert!(tid2 > tid);
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_table_validation() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(
        &registry,
        "/validation",
        "ns1:7181",
        &["a:9527", "b:9527"],
        false,
    )
    .await;

    // Unknown database.
    assert!(matches!(
        cluster
            .ns
            .create_table(table_spec("missing", "t", 1, 1), None)
            .await,
        Err(NsError::DatabaseNotFound { .. })
    ));

    // More replicas than healthy tablets.
    assert!(matches!(
        cluster.ns.create_table(table_spec("", "t", 1, 3), None).await,
        Err(NsError::InvalidParameter { .. })
    ));

    // Float columns cannot be indexed.
    let mut spec = table_spec("", "t", 1, 1);
    spec.column_desc = vec![
        ColumnDesc::new("f", ColumnType::Double).index(),
        ColumnDesc::new("v", ColumnType::BigInt),
    ];
    assert!(matches!(
        cluster.ns.create_table(spec, None).await,
        Err(NsError::WrongColumnKey { .. })
    ));

    // Duplicate names are rejected.
    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();
    assert!(matches!(
        cluster.ns.create_table(table_spec("", "t", 1, 1), None).await,
        Err(NsError::TableExists { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_create_table_rpc_failure_rolls_back() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/rollback", "ns1:7181", &["a:9527"], false).await;

    cluster.tablet("a:9527").fail_on("create_table");
    assert!(
        cluster
            .ns
            .create_table(table_spec("", "t", 1, 1), None)
            .await
            .is_err()
    );

    // Neither the catalog nor the metastore kept the half-created table.
    assert!(cluster.ns.show_table("", Some("t")).is_empty());
    assert!(
        !cluster
            .meta_server
            .connect()
            .exists("/rollback/table/table_data/t")
            .unwrap()
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn test_add_table_field_versions() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/schema", "ns1:7181", &["a:9527"], false).await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    cluster
        .ns
        .add_table_field("", "t", ColumnDesc::new("c1", ColumnType::Int))
        .await
        .unwrap();
    cluster
        .ns
        .add_table_field("", "t", ColumnDesc::new("c2", ColumnType::String))
        .await
        .unwrap();

    let table = cluster.ns.show_table("", Some("t")).remove(0);
    assert_eq!(table.added_columns.len(), 2);
    let ids: Vec<u32> = table.version_pairs.iter().map(|v| v.id).collect();
    assert_eq!(ids, vec![1, 2]);
    assert_eq!(table.version_pairs[1].field_count, 4);

    // The schema push reached the tablet before the commit.
    assert!(
        cluster
            .tablet("a:9527")
            .has_call("update_table_meta_for_add_field tid=1 column=c1 version=1")
    );

    // Duplicate columns are rejected.
    assert!(matches!(
        cluster
            .ns
            .add_table_field("", "t", ColumnDesc::new("c1", ColumnType::Int))
            .await,
        Err(NsError::InvalidParameter { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_procedures_guard_table_drop() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/procedures", "ns1:7181", &["a:9527"], false).await;

    cluster.ns.create_database("x").unwrap();
    cluster
        .ns
        .create_table(table_spec("x", "t", 1, 1), None)
        .await
        .unwrap();

    cluster
        .ns
        .create_procedure(ProcedureInfo {
            db: "x".to_string(),
            name: "sp1".to_string(),
            sql: "select k from t".to_string(),
            tables: vec![("x".to_string(), "t".to_string())],
        })
        .await
        .unwrap();
    assert!(cluster.tablet("a:9527").has_call("create_procedure x.sp1"));

    assert!(matches!(
        cluster.ns.drop_table("x", "t", None).await,
        Err(NsError::TableReferencedByProcedure { .. })
    ));

    cluster.ns.drop_procedure("x", "sp1").await.unwrap();
    cluster.ns.drop_table("x", "t", None).await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn test_sdk_endpoint_management() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/sdk", "ns1:7181", &["a:9527"], false).await;

    cluster
        .ns
        .set_sdk_endpoint("sdk1", "10.0.0.1:7181")
        .unwrap();
    assert!(matches!(
        cluster.ns.set_sdk_endpoint("sdk1", "10.0.0.1:7181"),
        Err(NsError::SdkEndpointDuplicate { .. })
    ));
    assert_eq!(cluster.ns.show_sdk_endpoint().len(), 1);

    cluster.ns.set_sdk_endpoint("sdk1", "").unwrap();
    assert!(cluster.ns.show_sdk_endpoint().is_empty());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_set_table_partition_is_idempotent() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/override", "ns1:7181", &["a:9527"], false).await;

    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();

    let mut partition = cluster.ns.get_table_partition("", "t", Pid(0)).unwrap();
    partition.partition_meta[0].is_alive = false;

    cluster
        .ns
        .set_table_partition("", "t", partition.clone())
        .unwrap();
    let once = cluster.ns.show_table("", Some("t")).remove(0);

    // A second application of the same override changes nothing.
    cluster.ns.set_table_partition("", "t", partition).unwrap();
    let twice = cluster.ns.show_table("", Some("t")).remove(0);
    assert_eq!(once, twice);
    assert!(!twice.partition(Pid(0)).unwrap().partition_meta[0].is_alive);

    // Unknown partitions are rejected.
    assert!(matches!(
        cluster.ns.get_table_partition("", "t", Pid(9)),
        Err(NsError::PidNotFound { .. })
    ));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_conf_set_auto_failover() {
    let registry = PeerRegistry::new();
    let cluster = TestCluster::start(&registry, "/conf", "ns1:7181", &["a:9527"], false).await;

    assert_eq!(
        cluster.ns.conf_get(),
        vec![("auto_failover".to_string(), "false".to_string())]
    );
    cluster.ns.conf_set("auto_failover", "true").unwrap();
    assert_eq!(
        cluster.ns.conf_get(),
        vec![("auto_failover".to_string(), "true".to_string())]
    );

    // Layout mutations are rejected while auto-failover is on.
    cluster
        .ns
        .create_table(table_spec("", "t", 1, 1), None)
        .await
        .unwrap();
    assert!(matches!(
        cluster
            .ns
            .change_leader("", "t", Pid(0), None),
        Err(NsError::AutoFailoverEnabled)
    ));

    assert!(matches!(
        cluster.ns.conf_set("unknown_key", "true"),
        Err(NsError::InvalidParameter { .. })
    ));
}
