//! Test utilities for metaplane-nameserver integration tests.
//!
//! Builds an in-process cluster: a `MemoryMetaServer`, a set of recording
//! mock tablets, and a started `NameServer`. Cross-cluster tests register
//! several clusters against one `PeerRegistry` so peers resolve in-process.
#![allow(dead_code)]

use async_trait::async_trait;
use metaplane::table::{
    ClusterAddress, ColumnDesc, ColumnKey, CompressType, ProcedureInfo, TableInfo, TtlDesc,
    VersionPair, ZoneInfo,
};
use metaplane::types::{ColumnType, OpId, Pid, TaskStatus, Tid};
use metaplane_metastore::{MemoryMetaServer, MemoryMetaStore, MetaStore};
use metaplane_nameserver::config::NameServerConfig;
use metaplane_nameserver::error::NsError;
use metaplane_nameserver::nameserver::NameServer;
use metaplane_nameserver::peer::{PeerNameserver, PeerProvider};
use metaplane_nameserver::tablet::{
    ManifestInfo, TableStatusEntry, TabletProvider, TabletRpc, TaskRef, TaskStatusEntry,
    TermPairInfo,
};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

// ===========================
// Mock tablet
// ===========================

#[derive(Debug, Clone)]
pub struct MockPartition {
    pub is_leader: bool,
    pub offset: u64,
    pub record_cnt: u64,
    pub term: u64,
    pub has_table: bool,
}

/// Recording tablet double. Task-driven RPCs are logged and acknowledged
/// through the task-status query like a real tablet; `hold_tasks` keeps
/// them `Doing` until released so cancellation and failover windows can be
/// tested deterministically.
pub struct MockTablet {
    pub endpoint: String,
    calls: Mutex<Vec<String>>,
    tasks: Mutex<Vec<TaskStatusEntry>>,
    partitions: Mutex<HashMap<(u32, u32), MockPartition>>,
    fail: Mutex<HashSet<String>>,
    hold: AtomicBool,
}

impl MockTablet {
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            calls: Mutex::new(Vec::new()),
            tasks: Mutex::new(Vec::new()),
            partitions: Mutex::new(HashMap::new()),
            fail: Mutex::new(HashSet::new()),
            hold: AtomicBool::new(false),
        }
    }

    fn record(&self, rpc: &str, detail: String) -> Result<(), NsError> {
        self.calls.lock().push(detail);
        if self.fail.lock().contains(rpc) {
            return Err(NsError::rpc(&self.endpoint, rpc, "injected failure"));
        }
        Ok(())
    }

    fn acknowledge(&self, task: TaskRef) {
        let status = if self.hold.load(Ordering::SeqCst) {
            TaskStatus::Doing
        } else {
            TaskStatus::Done
        };
        self.tasks.lock().push(TaskStatusEntry {
            op_id: task.op_id,
            task_type: task.task_type,
            status,
            endpoint: self.endpoint.clone(),
        });
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    pub fn has_call(&self, needle: &str) -> bool {
        self.calls.lock().iter().any(|c| c.contains(needle))
    }

    pub fn fail_on(&self, rpc: &str) {
        self.fail.lock().insert(rpc.to_string());
    }

    pub fn hold_tasks(&self) {
        self.hold.store(true, Ordering::SeqCst);
    }

    /// Flip every held task to Done; the next status poll completes them.
    pub fn release_tasks(&self) {
        self.hold.store(false, Ordering::SeqCst);
        for task in self.tasks.lock().iter_mut() {
            if task.status == TaskStatus::Doing {
                task.status = TaskStatus::Done;
            }
        }
    }

    pub fn set_partition(&self, tid: Tid, pid: Pid, partition: MockPartition) {
        self.partitions.lock().insert((tid.0, pid.0), partition);
    }

    pub fn partition(&self, tid: Tid, pid: Pid) -> Option<MockPartition> {
        self.partitions.lock().get(&(tid.0, pid.0)).cloned()
    }
}

#[async_trait]
impl TabletRpc for MockTablet {
    async fn create_table(
        &self,
        table: &TableInfo,
        pid: Pid,
        is_leader: bool,
        endpoints: &[String],
    ) -> Result<(), NsError> {
        self.record(
            "create_table",
            format!(
                "create_table tid={} pid={pid} leader={is_leader} replicas={}",
                table.tid.0,
                endpoints.len()
            ),
        )?;
        self.partitions.lock().insert(
            (table.tid.0, pid.0),
            MockPartition {
                is_leader,
                offset: 0,
                record_cnt: 0,
                term: 1,
                has_table: true,
            },
        );
        Ok(())
    }

    async fn drop_table(&self, task: TaskRef, tid: Tid, pid: Pid) -> Result<(), NsError> {
        self.record("drop_table", format!("drop_table tid={} pid={pid}", tid.0))?;
        self.partitions.lock().remove(&(tid.0, pid.0));
        self.acknowledge(task);
        Ok(())
    }

    async fn load_table(&self, task: TaskRef, table: &TableInfo, pid: Pid) -> Result<(), NsError> {
        self.record(
            "load_table",
            format!("load_table tid={} pid={pid}", table.tid.0),
        )?;
        self.partitions
            .lock()
            .entry((table.tid.0, pid.0))
            .or_insert(MockPartition {
                is_leader: false,
                offset: 0,
                record_cnt: 0,
                term: 1,
                has_table: true,
            })
            .has_table = true;
        self.acknowledge(task);
        Ok(())
    }

    async fn make_snapshot(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        end_offset: u64,
    ) -> Result<(), NsError> {
        self.record(
            "make_snapshot",
            format!("make_snapshot tid={} pid={pid} end_offset={end_offset}", tid.0),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn pause_snapshot(&self, task: TaskRef, tid: Tid, pid: Pid) -> Result<(), NsError> {
        self.record(
            "pause_snapshot",
            format!("pause_snapshot tid={} pid={pid}", tid.0),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn recover_snapshot(&self, task: TaskRef, tid: Tid, pid: Pid) -> Result<(), NsError> {
        self.record(
            "recover_snapshot",
            format!("recover_snapshot tid={} pid={pid}", tid.0),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn send_snapshot(
        &self,
        task: TaskRef,
        tid: Tid,
        remote_tid: Tid,
        pid: Pid,
        dst: &str,
    ) -> Result<(), NsError> {
        self.record(
            "send_snapshot",
            format!(
                "send_snapshot tid={} remote_tid={} pid={pid} dst={dst}",
                tid.0, remote_tid.0
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn add_replica(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        follower: &str,
        remote_tid: Option<Tid>,
    ) -> Result<(), NsError> {
        self.record(
            "add_replica",
            format!(
                "add_replica tid={} pid={pid} follower={follower} remote={:?}",
                tid.0,
                remote_tid.map(|t| t.0)
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn del_replica(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        follower: &str,
    ) -> Result<(), NsError> {
        self.record(
            "del_replica",
            format!("del_replica tid={} pid={pid} follower={follower}", tid.0),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn change_role(
        &self,
        tid: Tid,
        pid: Pid,
        to_leader: bool,
        term: u64,
        followers: &[String],
    ) -> Result<(), NsError> {
        self.record(
            "change_role",
            format!(
                "change_role tid={} pid={pid} leader={to_leader} term={term} followers={}",
                tid.0,
                followers.len()
            ),
        )?;
        let mut partitions = self.partitions.lock();
        if let Some(part) = partitions.get_mut(&(tid.0, pid.0)) {
            part.is_leader = to_leader;
            part.term = term;
        }
        Ok(())
    }

    async fn follow_of_no_one(&self, tid: Tid, pid: Pid, term: u64) -> Result<u64, NsError> {
        self.record(
            "follow_of_no_one",
            format!("follow_of_no_one tid={} pid={pid} term={term}", tid.0),
        )?;
        let mut partitions = self.partitions.lock();
        let part = partitions
            .entry((tid.0, pid.0))
            .or_insert(MockPartition {
                is_leader: false,
                offset: 0,
                record_cnt: 0,
                term,
                has_table: true,
            });
        part.is_leader = false;
        part.term = term;
        Ok(part.offset)
    }

    async fn get_term_pair(&self, tid: Tid, pid: Pid) -> Result<TermPairInfo, NsError> {
        let partitions = self.partitions.lock();
        Ok(match partitions.get(&(tid.0, pid.0)) {
            Some(part) if part.has_table => TermPairInfo {
                has_table: true,
                term: part.term,
                offset: part.offset,
            },
            _ => TermPairInfo {
                has_table: false,
                term: 0,
                offset: 0,
            },
        })
    }

    async fn get_manifest(&self, tid: Tid, pid: Pid) -> Result<ManifestInfo, NsError> {
        let partitions = self.partitions.lock();
        Ok(ManifestInfo {
            offset: partitions
                .get(&(tid.0, pid.0))
                .map(|p| p.offset)
                .unwrap_or(0),
        })
    }

    async fn delete_binlog(&self, tid: Tid, pid: Pid) -> Result<(), NsError> {
        self.record("delete_binlog", format!("delete_binlog tid={} pid={pid}", tid.0))
    }

    async fn update_ttl(&self, tid: Tid, pid: Pid, ttl: &TtlDesc) -> Result<(), NsError> {
        self.record(
            "update_ttl",
            format!(
                "update_ttl tid={} pid={pid} abs={} lat={}",
                tid.0, ttl.abs_ttl_min, ttl.lat_ttl
            ),
        )
    }

    async fn update_table_meta_for_add_field(
        &self,
        tid: Tid,
        column: &ColumnDesc,
        version: VersionPair,
    ) -> Result<(), NsError> {
        self.record(
            "update_table_meta_for_add_field",
            format!(
                "update_table_meta_for_add_field tid={} column={} version={}",
                tid.0, column.name, version.id
            ),
        )
    }

    async fn add_index(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        column_key: &ColumnKey,
        _cols: &[ColumnDesc],
    ) -> Result<(), NsError> {
        self.record(
            "add_index",
            format!(
                "add_index tid={} pid={pid} index={}",
                tid.0, column_key.index_name
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn dump_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        partition_num: u32,
        column_key: &ColumnKey,
        _idx: u32,
    ) -> Result<(), NsError> {
        self.record(
            "dump_index_data",
            format!(
                "dump_index_data tid={} pid={pid} partitions={partition_num} index={}",
                tid.0, column_key.index_name
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn send_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        pid_endpoints: &HashMap<u32, String>,
    ) -> Result<(), NsError> {
        self.record(
            "send_index_data",
            format!(
                "send_index_data tid={} pid={pid} targets={}",
                tid.0,
                pid_endpoints.len()
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn extract_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        partition_num: u32,
        _column_key: &ColumnKey,
        _idx: u32,
    ) -> Result<(), NsError> {
        self.record(
            "extract_index_data",
            format!(
                "extract_index_data tid={} pid={pid} partitions={partition_num}",
                tid.0
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn load_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        partition_num: u32,
    ) -> Result<(), NsError> {
        self.record(
            "load_index_data",
            format!(
                "load_index_data tid={} pid={pid} partitions={partition_num}",
                tid.0
            ),
        )?;
        self.acknowledge(task);
        Ok(())
    }

    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>, NsError> {
        Ok(self.tasks.lock().clone())
    }

    async fn cancel_op(&self, op_id: OpId) -> Result<(), NsError> {
        self.record("cancel_op", format!("cancel_op op={}", op_id.0))?;
        for task in self.tasks.lock().iter_mut() {
            if task.op_id == op_id && task.status == TaskStatus::Doing {
                task.status = TaskStatus::Canceled;
            }
        }
        Ok(())
    }

    async fn delete_op(&self, op_id: OpId) -> Result<(), NsError> {
        self.tasks.lock().retain(|t| t.op_id != op_id);
        Ok(())
    }

    async fn get_table_status(&self) -> Result<Vec<TableStatusEntry>, NsError> {
        let partitions = self.partitions.lock();
        Ok(partitions
            .iter()
            .filter(|(_, p)| p.has_table)
            .map(|((tid, pid), p)| TableStatusEntry {
                tid: Tid(*tid),
                pid: Pid(*pid),
                is_leader: p.is_leader,
                offset: p.offset,
                record_cnt: p.record_cnt,
                record_byte_size: p.record_cnt * 64,
                diskused: p.record_cnt * 64,
            })
            .collect())
    }

    async fn update_real_endpoint_map(
        &self,
        map: &HashMap<String, String>,
    ) -> Result<(), NsError> {
        self.record(
            "update_real_endpoint_map",
            format!("update_real_endpoint_map entries={}", map.len()),
        )
    }

    async fn create_procedure(&self, procedure: &ProcedureInfo) -> Result<(), NsError> {
        self.record(
            "create_procedure",
            format!("create_procedure {}.{}", procedure.db, procedure.name),
        )
    }

    async fn drop_procedure(&self, db: &str, name: &str) -> Result<(), NsError> {
        self.record("drop_procedure", format!("drop_procedure {db}.{name}"))
    }
}

#[derive(Default)]
pub struct MockTabletProvider {
    tablets: Mutex<HashMap<String, Arc<MockTablet>>>,
}

impl MockTabletProvider {
    pub fn get(&self, endpoint: &str) -> Arc<MockTablet> {
        Arc::clone(
            self.tablets
                .lock()
                .entry(endpoint.to_string())
                .or_insert_with(|| Arc::new(MockTablet::new(endpoint))),
        )
    }
}

impl TabletProvider for MockTabletProvider {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn TabletRpc>, NsError> {
        Ok(self.get(endpoint))
    }
}

// ===========================
// In-process peer plumbing
// ===========================

/// Shared lookup of every cluster in the test, so peers resolve in-process.
#[derive(Default)]
pub struct PeerRegistry {
    meta_servers: Mutex<HashMap<String, Arc<MemoryMetaServer>>>,
    nameservers: Mutex<HashMap<String, Arc<NameServer>>>,
}

impl PeerRegistry {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

pub struct RegistryPeerProvider {
    registry: Arc<PeerRegistry>,
}

impl RegistryPeerProvider {
    pub fn new(registry: &Arc<PeerRegistry>) -> Self {
        Self {
            registry: Arc::clone(registry),
        }
    }
}

impl PeerProvider for RegistryPeerProvider {
    fn connect_metastore(
        &self,
        address: &ClusterAddress,
    ) -> Result<Arc<dyn MetaStore>, NsError> {
        let servers = self.registry.meta_servers.lock();
        let server = servers
            .get(&address.metastore_path)
            .ok_or(NsError::ReplicaClusterNotHealthy {
                alias: address.alias.clone(),
            })?;
        Ok(server.connect())
    }

    fn connect(&self, endpoint: &str) -> Result<Arc<dyn PeerNameserver>, NsError> {
        let nameservers = self.registry.nameservers.lock();
        let ns = nameservers
            .get(endpoint)
            .ok_or(NsError::EndpointNotFound {
                endpoint: endpoint.to_string(),
            })?;
        Ok(Arc::new(LocalPeer {
            ns: Arc::clone(ns),
        }))
    }
}

/// Peer coordinator reached by direct calls instead of the wire.
pub struct LocalPeer {
    ns: Arc<NameServer>,
}

#[async_trait]
impl PeerNameserver for LocalPeer {
    async fn show_all_table(&self) -> Result<Vec<TableInfo>, NsError> {
        Ok(self.ns.show_all_tables())
    }

    async fn create_table_remote(
        &self,
        table: &TableInfo,
        zone: &ZoneInfo,
        _task: TaskRef,
    ) -> Result<(), NsError> {
        self.ns
            .create_table(table.clone(), Some(zone))
            .await
            .map(|_| ())
    }

    async fn drop_table_remote(
        &self,
        db: &str,
        name: &str,
        zone: &ZoneInfo,
        _task: TaskRef,
    ) -> Result<(), NsError> {
        self.ns.drop_table(db, name, Some(zone)).await
    }

    async fn add_replica_ns_remote(
        &self,
        db: &str,
        name: &str,
        pid: Pid,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError> {
        self.ns
            .handle_add_replica_ns_remote(db, name, pid, zone, task)
            .map(|_| ())
    }

    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>, NsError> {
        Ok(self.ns.collect_remote_task_status())
    }

    async fn delete_op(&self, op_id: OpId) -> Result<(), NsError> {
        self.ns.forget_remote_op(op_id);
        Ok(())
    }

    async fn make_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError> {
        self.ns.make_replica_cluster(zone)
    }

    async fn remove_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError> {
        self.ns.remove_replica_cluster_by_ns(zone)
    }

    async fn show_real_endpoint_map(&self) -> Result<HashMap<String, String>, NsError> {
        Ok(self.ns.show_real_endpoint_map())
    }
}

// ===========================
// Cluster builder
// ===========================

pub struct TestCluster {
    pub root: String,
    pub meta_server: Arc<MemoryMetaServer>,
    pub ns: Arc<NameServer>,
    pub provider: Arc<MockTabletProvider>,
    tablet_sessions: Mutex<HashMap<String, Arc<MemoryMetaStore>>>,
}

impl TestCluster {
    pub fn test_config(root: &str, endpoint: &str, auto_failover: bool) -> NameServerConfig {
        NameServerConfig {
            endpoint: endpoint.to_string(),
            root_path: root.to_string(),
            heartbeat_timeout: Duration::from_millis(150),
            task_poll_interval: Duration::from_millis(25),
            table_status_interval: Duration::from_millis(25),
            cluster_check_interval: Duration::from_millis(50),
            snapshot_check_interval: Duration::from_secs(3600),
            max_concurrency: 4,
            replica_cluster_concurrency: 2,
            max_op_num: 100,
            op_execute_timeout: Duration::from_secs(30),
            check_binlog_sync_offset_delta: 0,
            check_binlog_sync_interval: Duration::from_millis(10),
            use_name_indirection: false,
            auto_failover,
            ..Default::default()
        }
    }

    pub async fn start(
        registry: &Arc<PeerRegistry>,
        root: &str,
        ns_endpoint: &str,
        tablets: &[&str],
        auto_failover: bool,
    ) -> TestCluster {
        let meta_server = MemoryMetaServer::new();
        registry
            .meta_servers
            .lock()
            .insert(root.to_string(), Arc::clone(&meta_server));

        let provider = Arc::new(MockTabletProvider::default());
        let mut sessions = HashMap::new();
        for endpoint in tablets {
            let session = meta_server.connect();
            let paths = metaplane_metastore::Paths::new(root);
            session
                .create_ephemeral(&paths.node(endpoint), b"")
                .expect("tablet registration");
            sessions.insert(endpoint.to_string(), session);
            provider.get(endpoint);
        }

        let ns = NameServer::new(
            Self::test_config(root, ns_endpoint, auto_failover),
            meta_server.connect(),
            Arc::clone(&provider) as Arc<dyn TabletProvider>,
            Arc::new(RegistryPeerProvider::new(registry)),
        );
        registry
            .nameservers
            .lock()
            .insert(ns_endpoint.to_string(), Arc::clone(&ns));
        ns.start().expect("nameserver start");

        let cluster = TestCluster {
            root: root.to_string(),
            meta_server,
            ns,
            provider,
            tablet_sessions: Mutex::new(sessions),
        };
        cluster.wait_running().await;
        cluster
    }

    pub async fn wait_running(&self) {
        let ns = Arc::clone(&self.ns);
        wait_until("nameserver running", move || ns.is_running()).await;
    }

    pub fn tablet(&self, endpoint: &str) -> Arc<MockTablet> {
        self.provider.get(endpoint)
    }

    /// Drop the tablet's metastore session, expiring its liveness node.
    pub fn kill_tablet(&self, endpoint: &str) {
        if let Some(session) = self.tablet_sessions.lock().remove(endpoint) {
            session.expire_session();
        }
    }

    pub fn revive_tablet(&self, endpoint: &str) {
        let session = self.meta_server.connect();
        let paths = metaplane_metastore::Paths::new(&self.root);
        session
            .create_ephemeral(&paths.node(endpoint), b"")
            .expect("tablet re-registration");
        self.tablet_sessions
            .lock()
            .insert(endpoint.to_string(), session);
    }

    pub fn cluster_address(&self, alias: &str) -> ClusterAddress {
        ClusterAddress {
            alias: alias.to_string(),
            metastore_endpoints: vec![format!("{}-metastore", self.root)],
            metastore_path: self.root.clone(),
        }
    }

    /// Wait for one op to reach a terminal status and return it.
    pub async fn wait_op_terminal(&self, op_id: OpId) -> TaskStatus {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let status = self
                .ns
                .show_op_status(None, None, None)
                .into_iter()
                .find(|v| v.op_id == op_id)
                .map(|v| v.status);
            if let Some(status) = status {
                if status.is_terminal() {
                    return status;
                }
            }
            if tokio::time::Instant::now() > deadline {
                panic!("op {op_id} did not finish: {:?}", self.ns.show_op_status(None, None, None));
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }

    /// Wait until every op the coordinator knows about is terminal.
    pub async fn wait_all_ops_terminal(&self) {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let views = self.ns.show_op_status(None, None, None);
            if !views.is_empty() && views.iter().all(|v| v.status.is_terminal()) {
                return;
            }
            if tokio::time::Instant::now() > deadline {
                panic!("ops did not finish: {views:?}");
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    }
}

pub async fn wait_until(what: &str, condition: impl Fn() -> bool) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !condition() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Minimal two-column table spec: an indexed string key and a bigint value.
pub fn table_spec(db: &str, name: &str, partition_num: u32, replica_num: u32) -> TableInfo {
    TableInfo {
        tid: Tid(0),
        name: name.to_string(),
        db: db.to_string(),
        column_desc: vec![
            ColumnDesc::new("k", ColumnType::String).index(),
            ColumnDesc::new("v", ColumnType::BigInt),
        ],
        column_keys: vec![],
        partition_key: vec![],
        ttl: TtlDesc::default(),
        partition_num,
        replica_num,
        compress_type: CompressType::NoCompress,
        seg_cnt: 8,
        format_version: 1,
        added_columns: vec![],
        version_pairs: vec![],
        table_partition: vec![],
    }
}
