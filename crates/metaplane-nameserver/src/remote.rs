//! Remote cluster manager.
//!
//! Each replica cluster is tracked by a `ClusterInfo` holding a session to
//! the peer's metastore and an atomically-swapped handle to the peer's
//! current coordinator. Catalog-changing OPs are mirrored to every healthy
//! peer; a periodic drift check repairs topology divergence (and only
//! topology: data drift is logged for the admin to resolve via SyncTable).

use crate::error::NsError;
use crate::nameserver::NameServer;
use crate::peer::PeerNameserver;
use arc_swap::ArcSwap;
use chrono::{DateTime, Utc};
use metaplane::op::OpPayload;
use metaplane::table::{ClusterAddress, TableInfo, TablePartition, ZoneInfo};
use metaplane::types::{ClusterMode, OpType, Pid, TabletState, Tid};
use metaplane_metastore::{MetaEvent, MetaStore, Paths};
use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::mpsc::unbounded_channel;

/// Swappable handle to the peer cluster's active coordinator.
pub struct PeerClient {
    pub endpoint: String,
    pub inner: Arc<dyn PeerNameserver>,
}

/// Runtime state for one replica cluster.
pub struct ClusterInfo {
    pub address: ClusterAddress,
    pub meta: Arc<dyn MetaStore>,
    client: Arc<ArcSwap<PeerClient>>,
    pub state: TabletState,
    pub ctime: DateTime<Utc>,
    /// Last peer catalog snapshot seen by the drift check, keyed by
    /// (db, table name).
    pub last_status: HashMap<(String, String), Vec<TablePartition>>,
    removed: Arc<AtomicBool>,
}

impl ClusterInfo {
    /// Open sessions to the peer's metastore and current coordinator, and
    /// keep the coordinator handle fresh by watching the peer's election
    /// node.
    pub async fn connect(ns: &Arc<NameServer>, address: &ClusterAddress) -> Result<Self, NsError> {
        let peer_meta = ns.peer_provider.connect_metastore(address)?;
        let peer_paths = Paths::new(&address.metastore_path);

        let leader_endpoint = peer_leader_endpoint(peer_meta.as_ref(), &peer_paths)?;
        let inner = ns.peer_provider.connect(&leader_endpoint)?;
        let client = Arc::new(ArcSwap::from_pointee(PeerClient {
            endpoint: leader_endpoint,
            inner,
        }));
        let removed = Arc::new(AtomicBool::new(false));

        // Re-resolve the peer coordinator whenever its election node moves.
        let (tx, mut rx) = unbounded_channel();
        peer_meta
            .watch_value(&peer_paths.leader(), tx.clone())
            .map_err(NsError::MetaRead)?;
        {
            let peer_meta = Arc::clone(&peer_meta);
            let client = Arc::clone(&client);
            let removed = Arc::clone(&removed);
            let provider = Arc::clone(&ns.peer_provider);
            let alias = address.alias.clone();
            tokio::spawn(async move {
                while let Some(event) = rx.recv().await {
                    if removed.load(Ordering::SeqCst) {
                        break;
                    }
                    match event {
                        MetaEvent::ValueChanged { .. } | MetaEvent::SessionReset { .. } => {
                            if matches!(event, MetaEvent::SessionReset { .. }) {
                                let _ = peer_meta.watch_value(&peer_paths.leader(), tx.clone());
                            }
                            match peer_leader_endpoint(peer_meta.as_ref(), &peer_paths) {
                                Ok(endpoint) => {
                                    if endpoint != client.load().endpoint {
                                        match provider.connect(&endpoint) {
                                            Ok(inner) => {
                                                tracing::info!(%alias, %endpoint,
                                                    "peer coordinator moved");
                                                client.store(Arc::new(PeerClient {
                                                    endpoint,
                                                    inner,
                                                }));
                                            }
                                            Err(e) => tracing::warn!(%alias, error = %e,
                                                "peer coordinator reconnect failed"),
                                        }
                                    }
                                }
                                Err(e) => tracing::warn!(%alias, error = %e,
                                    "peer has no active coordinator"),
                            }
                        }
                        _ => {}
                    }
                }
            });
        }

        Ok(Self {
            address: address.clone(),
            meta: peer_meta,
            client,
            state: TabletState::Healthy,
            ctime: Utc::now(),
            last_status: HashMap::new(),
            removed,
        })
    }

    pub fn is_healthy(&self) -> bool {
        self.state == TabletState::Healthy
    }

    pub fn client(&self) -> Arc<dyn PeerNameserver> {
        Arc::clone(&self.client.load().inner)
    }

    pub fn leader_endpoint(&self) -> String {
        self.client.load().endpoint.clone()
    }

    pub fn mark_removed(&self) {
        self.removed.store(true, Ordering::SeqCst);
    }
}

fn peer_leader_endpoint(meta: &dyn MetaStore, paths: &Paths) -> Result<String, NsError> {
    let value = meta.get(&paths.leader()).map_err(|_| {
        NsError::ReplicaClusterNotHealthy {
            alias: paths.root().to_string(),
        }
    })?;
    Ok(String::from_utf8_lossy(&value).into_owned())
}

/// Schema equality for cross-cluster replication: everything that affects
/// row compatibility, ignoring partition placement.
fn schema_matches(local: &TableInfo, peer: &TableInfo) -> bool {
    local.column_desc == peer.column_desc
        && local.column_keys == peer.column_keys
        && local.ttl == peer.ttl
        && local.partition_num == peer.partition_num
        && local.compress_type == peer.compress_type
        && local.added_columns == peer.added_columns
}

impl NameServer {
    /// Register a peer cluster and drive the initial replication of every
    /// local table into it.
    pub async fn add_replica_cluster(
        self: &Arc<Self>,
        address: &ClusterAddress,
    ) -> Result<(), NsError> {
        self.guard_leader(None)?;
        if address.alias.is_empty() {
            return Err(NsError::InvalidParameter {
                reason: "cluster alias is empty".to_string(),
            });
        }
        {
            let core = self.core.lock();
            if core.mode == ClusterMode::Follower {
                return Err(NsError::ZoneInfoMismatch {
                    reason: "a follower cluster cannot own replica clusters".to_string(),
                });
            }
            if core.replicas.contains_key(&address.alias) {
                return Err(NsError::ReplicaClusterExists {
                    alias: address.alias.clone(),
                });
            }
        }

        let cluster = ClusterInfo::connect(self, address).await?;
        let peer_tables = cluster.client().show_all_table().await?;

        // Validate every table present in both clusters before linking.
        let local_tables: Vec<TableInfo> = {
            let core = self.core.lock();
            core.catalog.iter().cloned().collect()
        };
        for local in &local_tables {
            let Some(peer) = peer_tables
                .iter()
                .find(|t| t.db == local.db && t.name == local.name)
            else {
                continue;
            };
            if !schema_matches(local, peer) {
                cluster.mark_removed();
                return Err(NsError::InvalidParameter {
                    reason: format!(
                        "table '{}.{}' schema differs between clusters",
                        local.db, local.name
                    ),
                });
            }
            self.compare_snapshot_offset(local, peer).await.inspect_err(|_| {
                cluster.mark_removed();
            })?;
        }

        // Persist the peer, flip to leader mode, and tell the peer to follow.
        let bytes = Self::encode(address)?;
        self.meta
            .set(&self.paths.replica_cluster(&address.alias), &bytes)
            .map_err(NsError::MetaWrite)?;

        let zone = {
            let mut core = self.core.lock();
            core.mode = ClusterMode::Leader;
            core.zone_info.mode = ClusterMode::Leader;
            core.zone_info.zone_term += 1;
            ZoneInfo {
                replica_alias: address.alias.clone(),
                mode: ClusterMode::Follower,
                ..core.zone_info.clone()
            }
        };
        cluster.client().make_replica_cluster(&zone).await?;

        {
            let mut core = self.core.lock();
            core.replicas.insert(address.alias.clone(), cluster);
        }

        // Replicate every local table: create on the peer when absent, then
        // attach each partition.
        for local in &local_tables {
            let present = peer_tables
                .iter()
                .any(|t| t.db == local.db && t.name == local.name);
            let mut core = self.core.lock();
            let mut parent = None;
            if !present {
                let mut remote_info = local.clone();
                remote_info.tid = Tid(0);
                remote_info.table_partition.clear();
                parent = Some(self.create_op_locked(
                    &mut core,
                    OpType::CreateTableRemote,
                    OpPayload::CreateTableRemote {
                        alias: address.alias.clone(),
                        table_info: remote_info,
                    },
                    &local.name,
                    &local.db,
                    None,
                    None,
                    None,
                )?);
            }
            for part in &local.table_partition {
                let (op_type, payload) = if present {
                    (
                        OpType::AddReplicaSimplyRemote,
                        OpPayload::AddReplicaSimplyRemote {
                            alias: address.alias.clone(),
                            tid: local.tid,
                            pid: part.pid,
                        },
                    )
                } else {
                    (
                        OpType::AddReplicaRemote,
                        OpPayload::AddReplicaRemote {
                            alias: address.alias.clone(),
                            tid: local.tid,
                            pid: part.pid,
                        },
                    )
                };
                // Queue behind the create so the peer table exists first.
                self.create_op_locked(
                    &mut core,
                    op_type,
                    payload,
                    &local.name,
                    &local.db,
                    Some(part.pid),
                    parent,
                    None,
                )?;
            }
        }
        tracing::info!(alias = %address.alias, "replica cluster added");
        Ok(())
    }

    /// Reject linkage when any peer partition leader lags behind the local
    /// snapshot offset: the peer would never catch up from binlog alone.
    /// A peer partition whose leader endpoint is absent from the peer meta
    /// is treated as divergent as well.
    async fn compare_snapshot_offset(
        &self,
        local: &TableInfo,
        peer: &TableInfo,
    ) -> Result<(), NsError> {
        for part in &local.table_partition {
            let Some(leader) = part.alive_leader() else {
                continue;
            };
            let client = {
                let core = self.core.lock();
                core.registry.client(&leader.endpoint)?
            };
            let manifest = client.get_manifest(local.tid, part.pid).await?;

            let Some(peer_part) = peer.partition(part.pid) else {
                tracing::warn!(name = %local.name, pid = %part.pid,
                    "peer lacks a shadow of this partition, treating as divergent");
                return Err(NsError::SnapshotOffsetMismatch {
                    reason: format!(
                        "peer has no partition {} for table '{}'",
                        part.pid, local.name
                    ),
                });
            };
            let peer_offset = peer_part
                .alive_leader()
                .map(|m| m.offset)
                .unwrap_or_default();
            if peer_offset < manifest.offset {
                return Err(NsError::SnapshotOffsetMismatch {
                    reason: format!(
                        "table '{}' partition {}: peer offset {} < local snapshot offset {}",
                        local.name, part.pid, peer_offset, manifest.offset
                    ),
                });
            }
        }
        Ok(())
    }

    /// Unlink a peer cluster. The peer record is deleted before the
    /// per-table DelReplicaRemote OPs complete; a crash in that window can
    /// leave orphan remote replicas on the peer.
    pub async fn remove_replica_cluster(self: &Arc<Self>, alias: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let (zone, cluster_client) = {
            let mut core = self.core.lock();
            if !core.replicas.contains_key(alias) {
                return Err(NsError::ReplicaClusterNotFound {
                    alias: alias.to_string(),
                });
            }

            // Tear down replication of every partition that points at this peer.
            let targets: Vec<(String, String, Tid, Pid, String)> = core
                .catalog
                .iter()
                .flat_map(|table| {
                    table.table_partition.iter().flat_map(move |part| {
                        part.remote_partition_meta
                            .iter()
                            .filter(move |m| m.alias == alias)
                            .map(move |m| {
                                (
                                    table.name.clone(),
                                    table.db.clone(),
                                    table.tid,
                                    part.pid,
                                    m.endpoint.clone(),
                                )
                            })
                    })
                })
                .collect();
            for (name, db, tid, pid, endpoint) in targets {
                if let Err(e) = self.create_op_locked(
                    &mut core,
                    OpType::DelReplicaRemote,
                    OpPayload::DelReplicaRemote {
                        alias: alias.to_string(),
                        tid,
                        pid,
                        endpoint,
                    },
                    &name,
                    &db,
                    Some(pid),
                    None,
                    None,
                ) {
                    tracing::warn!(%name, %pid, error = %e, "failed to enqueue DelReplicaRemote");
                }
            }

            let Some(cluster) = core.replicas.remove(alias) else {
                return Err(NsError::ReplicaClusterNotFound {
                    alias: alias.to_string(),
                });
            };
            cluster.mark_removed();
            tracing::warn!(%alias,
                "peer record removed before DelReplicaRemote ops complete; \
                 a crash here can orphan remote replicas");
            let zone = ZoneInfo {
                replica_alias: alias.to_string(),
                mode: ClusterMode::Follower,
                ..core.zone_info.clone()
            };
            (zone, cluster.client())
        };

        match self.meta.delete(&self.paths.replica_cluster(alias)) {
            Ok(()) => {}
            Err(e) => tracing::warn!(%alias, error = %e, "failed to delete replica cluster node"),
        }
        if let Err(e) = cluster_client.remove_replica_cluster(&zone).await {
            tracing::warn!(%alias, error = %e, "peer did not acknowledge unlink");
        }
        Ok(())
    }

    /// Follower side of AddReplicaCluster: adopt the leader cluster's zone.
    pub fn make_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError> {
        if !self.is_running() {
            return Err(NsError::NotLeader);
        }
        let mut core = self.core.lock();
        match core.mode {
            ClusterMode::Follower => {
                if core.zone_info.zone_name != zone.zone_name {
                    return Err(NsError::ZoneInfoMismatch {
                        reason: format!(
                            "already follower of zone '{}'",
                            core.zone_info.zone_name
                        ),
                    });
                }
            }
            ClusterMode::Leader => {
                return Err(NsError::ZoneInfoMismatch {
                    reason: "a leader cluster cannot become a follower".to_string(),
                });
            }
            ClusterMode::Normal => {}
        }
        let bytes = Self::encode(zone)?;
        self.meta
            .set(&self.paths.follower(), &bytes)
            .map_err(NsError::MetaWrite)?;
        core.mode = ClusterMode::Follower;
        core.zone_info = zone.clone();
        tracing::info!(zone = %zone.zone_name, "switched to follower mode");
        Ok(())
    }

    /// Follower side of RemoveReplicaCluster.
    pub fn remove_replica_cluster_by_ns(&self, zone: &ZoneInfo) -> Result<(), NsError> {
        if !self.is_running() {
            return Err(NsError::NotLeader);
        }
        let mut core = self.core.lock();
        if core.mode != ClusterMode::Follower || core.zone_info.zone_name != zone.zone_name {
            return Err(NsError::ZoneInfoMismatch {
                reason: "not a follower of that zone".to_string(),
            });
        }
        match self.meta.delete(&self.paths.follower()) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(NsError::MetaWrite(e)),
        }
        core.mode = ClusterMode::Normal;
        core.zone_info = ZoneInfo {
            zone_name: self.config.root_path.clone(),
            zone_term: core.zone_info.zone_term + 1,
            replica_alias: String::new(),
            mode: ClusterMode::Normal,
        };
        tracing::info!("left follower mode");
        Ok(())
    }

    /// Re-drive replication of one table (or one partition) into a peer.
    pub fn sync_table(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        alias: &str,
        pid: Option<Pid>,
    ) -> Result<Vec<metaplane::types::OpId>, NsError> {
        self.guard_leader(None)?;
        let mut core = self.core.lock();
        if !core
            .replicas
            .get(alias)
            .is_some_and(ClusterInfo::is_healthy)
        {
            return Err(NsError::ReplicaClusterNotFound {
                alias: alias.to_string(),
            });
        }
        let table = core.catalog.expect(db, name)?.clone();
        let pids: Vec<Pid> = match pid {
            Some(pid) => {
                if table.partition(pid).is_none() {
                    return Err(NsError::PidNotFound {
                        name: name.to_string(),
                        pid,
                    });
                }
                vec![pid]
            }
            None => table
                .table_partition
                .iter()
                .filter(|p| !p.remote_partition_meta.iter().any(|m| m.alias == alias))
                .map(|p| p.pid)
                .collect(),
        };
        let mut op_ids = Vec::new();
        for pid in pids {
            let op_id = self.create_op_locked(
                &mut core,
                OpType::AddReplicaRemote,
                OpPayload::AddReplicaRemote {
                    alias: alias.to_string(),
                    tid: table.tid,
                    pid,
                },
                name,
                db,
                Some(pid),
                None,
                None,
            )?;
            op_ids.push(op_id);
        }
        Ok(op_ids)
    }

    /// Mirror a CreateTable / DropTable to every healthy peer.
    pub(crate) fn mirror_create_table(self: &Arc<Self>, table: &TableInfo) {
        let mut core = self.core.lock();
        let aliases: Vec<String> = core
            .replicas
            .values()
            .filter(|c| c.is_healthy())
            .map(|c| c.address.alias.clone())
            .collect();
        for alias in aliases {
            let mut remote_info = table.clone();
            remote_info.tid = Tid(0);
            remote_info.table_partition.clear();
            let parent = match self.create_op_locked(
                &mut core,
                OpType::CreateTableRemote,
                OpPayload::CreateTableRemote {
                    alias: alias.clone(),
                    table_info: remote_info,
                },
                &table.name,
                &table.db,
                None,
                None,
                None,
            ) {
                Ok(op_id) => op_id,
                Err(e) => {
                    tracing::warn!(%alias, name = %table.name, error = %e,
                        "failed to mirror CreateTable");
                    continue;
                }
            };
            for part in &table.table_partition {
                if let Err(e) = self.create_op_locked(
                    &mut core,
                    OpType::AddReplicaSimplyRemote,
                    OpPayload::AddReplicaSimplyRemote {
                        alias: alias.clone(),
                        tid: table.tid,
                        pid: part.pid,
                    },
                    &table.name,
                    &table.db,
                    Some(part.pid),
                    Some(parent),
                    None,
                ) {
                    tracing::warn!(%alias, name = %table.name, pid = %part.pid, error = %e,
                        "failed to mirror partition replication");
                }
            }
        }
    }

    pub(crate) fn mirror_drop_table(self: &Arc<Self>, db: &str, name: &str) {
        let mut core = self.core.lock();
        let aliases: Vec<String> = core
            .replicas
            .values()
            .filter(|c| c.is_healthy())
            .map(|c| c.address.alias.clone())
            .collect();
        for alias in aliases {
            if let Err(e) = self.create_op_locked(
                &mut core,
                OpType::DropTableRemote,
                OpPayload::DropTableRemote {
                    alias: alias.clone(),
                    name: name.to_string(),
                    db: db.to_string(),
                },
                name,
                db,
                None,
                None,
                None,
            ) {
                tracing::warn!(%alias, name, error = %e, "failed to mirror DropTable");
            }
        }
    }

    /// Resolve the peer-side (tid, leader endpoint) for one partition.
    pub(crate) async fn resolve_remote(
        &self,
        alias: &str,
        db: &str,
        name: &str,
        pid: Pid,
    ) -> Result<(Tid, String), NsError> {
        let client = {
            let core = self.core.lock();
            let cluster = core
                .replicas
                .get(alias)
                .ok_or(NsError::ReplicaClusterNotFound {
                    alias: alias.to_string(),
                })?;
            cluster.client()
        };
        let tables = client.show_all_table().await?;
        let table = tables
            .iter()
            .find(|t| t.db == db && t.name == name)
            .ok_or(NsError::TableNotFound {
                db: db.to_string(),
                name: name.to_string(),
            })?;
        let part = table.partition(pid).ok_or(NsError::PidNotFound {
            name: name.to_string(),
            pid,
        })?;
        let leader = part
            .alive_leader()
            .ok_or(NsError::NoAliveFollower {
                name: name.to_string(),
                pid,
            })?;
        Ok((table.tid, leader.endpoint.clone()))
    }

    /// Periodic drift check: compare each healthy peer's catalog against the
    /// local remote bookkeeping, repairing topology changes (leader moved on
    /// the peer) and logging data drift for the admin.
    pub(crate) async fn check_cluster_info(self: &Arc<Self>) {
        let aliases: Vec<String> = {
            let core = self.core.lock();
            core.replicas
                .values()
                .filter(|c| c.is_healthy())
                .map(|c| c.address.alias.clone())
                .collect()
        };
        for alias in aliases {
            let client = {
                let core = self.core.lock();
                match core.replicas.get(&alias) {
                    Some(c) => c.client(),
                    None => continue,
                }
            };
            let peer_tables = match client.show_all_table().await {
                Ok(tables) => tables,
                Err(e) => {
                    tracing::warn!(%alias, error = %e, "drift check: peer unreachable");
                    let mut core = self.core.lock();
                    if let Some(cluster) = core.replicas.get_mut(&alias) {
                        cluster.state = TabletState::Offline;
                        cluster.ctime = Utc::now();
                    }
                    continue;
                }
            };

            let mut repairs: Vec<(String, String, Tid, Pid, String)> = Vec::new();
            {
                let mut core = self.core.lock();
                // Collect repairs against the cached remote meta first.
                for table in core.catalog.iter() {
                    let Some(peer) = peer_tables
                        .iter()
                        .find(|t| t.db == table.db && t.name == table.name)
                    else {
                        continue;
                    };
                    if !schema_matches(table, peer) {
                        tracing::warn!(name = %table.name, %alias,
                            "data drift detected, admin must issue SyncTable");
                    }
                    for part in &table.table_partition {
                        let Some(cached) = part
                            .remote_partition_meta
                            .iter()
                            .find(|m| m.alias == alias)
                        else {
                            continue;
                        };
                        let peer_leader = peer
                            .partition(part.pid)
                            .and_then(|p| p.alive_leader())
                            .map(|m| m.endpoint.clone());
                        if let Some(peer_leader) = peer_leader {
                            if peer_leader != cached.endpoint {
                                repairs.push((
                                    table.name.clone(),
                                    table.db.clone(),
                                    table.tid,
                                    part.pid,
                                    cached.endpoint.clone(),
                                ));
                            }
                        }
                    }
                }
                for (name, db, tid, pid, old_endpoint) in &repairs {
                    tracing::info!(%name, %pid, %alias, %old_endpoint,
                        "peer leader moved, repairing replication target");
                    if let Err(e) = self.create_op_locked(
                        &mut core,
                        OpType::DelReplicaRemote,
                        OpPayload::DelReplicaRemote {
                            alias: alias.clone(),
                            tid: *tid,
                            pid: *pid,
                            endpoint: old_endpoint.clone(),
                        },
                        name,
                        db,
                        Some(*pid),
                        None,
                        None,
                    ) {
                        tracing::warn!(%name, %pid, error = %e, "drift repair del failed");
                        continue;
                    }
                    if let Err(e) = self.create_op_locked(
                        &mut core,
                        OpType::AddReplicaSimplyRemote,
                        OpPayload::AddReplicaSimplyRemote {
                            alias: alias.clone(),
                            tid: *tid,
                            pid: *pid,
                        },
                        name,
                        db,
                        Some(*pid),
                        None,
                        None,
                    ) {
                        tracing::warn!(%name, %pid, error = %e, "drift repair add failed");
                    }
                }
                if let Some(cluster) = core.replicas.get_mut(&alias) {
                    cluster.state = TabletState::Healthy;
                    cluster.last_status = peer_tables
                        .iter()
                        .map(|t| {
                            (
                                (t.db.clone(), t.name.clone()),
                                t.table_partition.clone(),
                            )
                        })
                        .collect();
                }
            }
        }
    }

    /// Fold each healthy peer's reported task statuses into the local tasks
    /// awaiting them.
    pub(crate) async fn poll_peer_task_status(self: &Arc<Self>) {
        let peers: Vec<(String, Arc<dyn PeerNameserver>)> = {
            let core = self.core.lock();
            core.replicas
                .values()
                .filter(|c| c.is_healthy())
                .map(|c| (c.address.alias.clone(), c.client()))
                .collect()
        };
        for (alias, client) in peers {
            match client.get_task_status().await {
                Ok(entries) => {
                    let mut core = self.core.lock();
                    for entry in &entries {
                        core.engine.apply_remote_status(entry.op_id, entry.status);
                    }
                }
                Err(e) => {
                    tracing::debug!(%alias, error = %e, "peer task status poll failed");
                }
            }
        }
    }

    /// The zone info stamped on outbound cross-cluster mutations.
    pub(crate) fn outbound_zone(&self, alias: &str) -> ZoneInfo {
        let core = self.core.lock();
        ZoneInfo {
            replica_alias: alias.to_string(),
            mode: ClusterMode::Follower,
            ..core.zone_info.clone()
        }
    }
}
