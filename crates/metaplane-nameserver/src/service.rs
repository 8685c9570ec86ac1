//! Admin command surface.
//!
//! Every command validates against the current catalog and registry, then
//! either applies the change synchronously (pure metadata) or enqueues an
//! OP. Commands are rejected unless this coordinator is active; a follower
//! cluster only accepts mutations stamped with its leader's zone info, and
//! partition-layout mutations are rejected while auto-failover is on so the
//! admin cannot race the failover controller.

use crate::error::NsError;
use crate::nameserver::NameServer;
use crate::tablet::TaskRef;
use chrono::{DateTime, Utc};
use metaplane::op::OpPayload;
use metaplane::table::{ColumnDesc, ColumnKey, ProcedureInfo, TableInfo, TtlDesc, VersionPair, ZoneInfo};
use metaplane::types::{
    ClusterMode, OpId, OpType, Pid, TabletState, TaskStatus, TaskType, Tid,
};
use metaplane_metastore::MetaError;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Registry entry as reported by ShowTablet.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TabletView {
    pub endpoint: String,
    pub real_endpoint: Option<String>,
    pub state: TabletState,
    pub ctime: DateTime<Utc>,
}

/// OP summary as reported by ShowOPStatus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpView {
    pub op_id: OpId,
    pub op_type: metaplane::types::OpType,
    pub status: TaskStatus,
    pub name: String,
    pub db: String,
    pub pid: Option<Pid>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub current_task: Option<TaskType>,
    pub vec_idx: Option<u32>,
}

/// Replica cluster entry as reported by ShowReplicaCluster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReplicaClusterView {
    pub alias: String,
    pub metastore_endpoints: Vec<String>,
    pub metastore_path: String,
    pub state: TabletState,
    pub ctime: DateTime<Utc>,
}

impl NameServer {
    // ===========================
    // Guards
    // ===========================

    /// Reject unless this coordinator is active, and enforce the follower
    /// zone contract: a follower only accepts mutations from its leader
    /// cluster, everyone else rejects unexpected zone stamps.
    pub(crate) fn guard_leader(&self, zone: Option<&ZoneInfo>) -> Result<(), NsError> {
        if !self.is_running() {
            return Err(NsError::NotLeader);
        }
        let core = self.core.lock();
        match (core.mode, zone) {
            (ClusterMode::Follower, Some(z)) => {
                if z.zone_name == core.zone_info.zone_name
                    && z.zone_term >= core.zone_info.zone_term
                {
                    Ok(())
                } else {
                    Err(NsError::ZoneInfoMismatch {
                        reason: format!(
                            "expected zone '{}' term >= {}, got '{}' term {}",
                            core.zone_info.zone_name,
                            core.zone_info.zone_term,
                            z.zone_name,
                            z.zone_term
                        ),
                    })
                }
            }
            (ClusterMode::Follower, None) => Err(NsError::ZoneInfoMismatch {
                reason: "cluster is in follower mode, mutation needs leader zone info"
                    .to_string(),
            }),
            (_, Some(_)) => Err(NsError::ZoneInfoMismatch {
                reason: "cluster is not in follower mode".to_string(),
            }),
            (_, None) => Ok(()),
        }
    }

    /// Partition-layout mutations conflict with automatic recovery.
    fn guard_auto_failover(&self) -> Result<(), NsError> {
        if self.core.lock().auto_failover {
            return Err(NsError::AutoFailoverEnabled);
        }
        Ok(())
    }

    // ===========================
    // Databases
    // ===========================

    pub fn create_database(&self, db: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let mut core = self.core.lock();
        if db.is_empty() {
            return Err(NsError::InvalidParameter {
                reason: "database name is empty".to_string(),
            });
        }
        if core.catalog.has_db(db) {
            return Err(NsError::DatabaseExists { db: db.to_string() });
        }
        self.meta
            .create(&self.paths.db(db), b"")
            .map_err(|e| match e {
                MetaError::NodeExists { .. } => NsError::DatabaseExists { db: db.to_string() },
                e => NsError::MetaWrite(e),
            })?;
        core.catalog.create_db(db)
    }

    pub fn drop_database(&self, db: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let mut core = self.core.lock();
        core.catalog.drop_db(db)?;
        match self.meta.delete(&self.paths.db(db)) {
            Ok(()) => Ok(()),
            Err(e) if e.is_not_found() => Ok(()),
            Err(e) => Err(NsError::MetaWrite(e)),
        }
    }

    pub fn show_databases(&self) -> Vec<String> {
        self.core.lock().catalog.databases()
    }

    // ===========================
    // Tables
    // ===========================

    /// Validate, place, persist, and create a table on its tablets.
    /// Followers are created before leaders; the leader call carries the
    /// full replica set so replication starts immediately.
    pub async fn create_table(
        self: &Arc<Self>,
        mut table: TableInfo,
        zone: Option<&ZoneInfo>,
    ) -> Result<Tid, NsError> {
        self.guard_leader(zone)?;

        let table = {
            let mut core = self.core.lock();
            // Stamped mutations come from the leader cluster, which does not
            // mirror database creation; adopt the database on first use.
            if zone.is_some() && !table.db.is_empty() && !core.catalog.has_db(&table.db) {
                self.meta
                    .create(&self.paths.db(&table.db), b"")
                    .map_err(NsError::MetaWrite)?;
                core.catalog.create_db(&table.db)?;
            }
            // Mirrored creation is at-least-once: the same stamped request
            // may arrive again after a coordinator failover.
            if zone.is_some() {
                if let Some(existing) = core.catalog.get(&table.db, &table.name) {
                    tracing::info!(name = %table.name, db = %table.db,
                        "mirrored table already exists, treating as replay");
                    return Ok(existing.tid);
                }
            }
            let column_keys = core
                .catalog
                .validate_create(&table, core.registry.healthy_count())?;
            let endpoints = core.registry.healthy_endpoints();
            let partitions = core.catalog.build_partitions(
                table.partition_num,
                table.replica_num,
                &endpoints,
            )?;
            let tid = self
                .meta
                .increment(&self.paths.table_index())
                .map(|v| Tid(v as u32))
                .map_err(NsError::MetaWrite)?;
            table.tid = tid;
            table.column_keys = column_keys;
            table.table_partition = partitions;
            self.persist_table(&table)?;
            core.catalog.insert(table.clone());
            table
        };

        if let Err(e) = self.drive_table_creation(&table).await {
            tracing::warn!(name = %table.name, error = %e,
                "table creation failed on tablets, rolling back");
            {
                let mut core = self.core.lock();
                core.catalog.remove(&table.db, &table.name);
            }
            let _ = self.delete_table_node(&table);
            self.drop_table_on_replicas(&table).await;
            return Err(e);
        }

        self.notify_catalog_changed()?;
        if zone.is_none() && self.core.lock().mode == ClusterMode::Leader {
            self.mirror_create_table(&table);
        }
        tracing::info!(name = %table.name, db = %table.db, tid = %table.tid, "table created");
        Ok(table.tid)
    }

    async fn drive_table_creation(&self, table: &TableInfo) -> Result<(), NsError> {
        for part in &table.table_partition {
            let replica_set: Vec<String> = part
                .partition_meta
                .iter()
                .map(|m| m.endpoint.clone())
                .collect();
            for meta in part.partition_meta.iter().filter(|m| !m.is_leader) {
                let client = {
                    let core = self.core.lock();
                    core.registry.client(&meta.endpoint)?
                };
                client.create_table(table, part.pid, false, &[]).await?;
            }
            for meta in part.partition_meta.iter().filter(|m| m.is_leader) {
                let client = {
                    let core = self.core.lock();
                    core.registry.client(&meta.endpoint)?
                };
                client
                    .create_table(table, part.pid, true, &replica_set)
                    .await?;
            }
        }
        Ok(())
    }

    async fn drop_table_on_replicas(&self, table: &TableInfo) {
        let task = TaskRef {
            op_id: OpId(0),
            task_type: TaskType::DropTable,
        };
        for part in &table.table_partition {
            for meta in &part.partition_meta {
                let client = {
                    let core = self.core.lock();
                    core.registry.client(&meta.endpoint).ok()
                };
                if let Some(client) = client {
                    if let Err(e) = client.drop_table(task, table.tid, part.pid).await {
                        tracing::debug!(endpoint = %meta.endpoint, error = %e,
                            "best-effort drop failed");
                    }
                }
            }
        }
    }

    /// Drop a table everywhere. Refused while any procedure references it.
    pub async fn drop_table(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        zone: Option<&ZoneInfo>,
    ) -> Result<(), NsError> {
        self.guard_leader(zone)?;
        let table = {
            let core = self.core.lock();
            let table = match core.catalog.get(db, name) {
                Some(table) => table.clone(),
                // Mirrored drops are at-least-once; a replay is a no-op.
                None if zone.is_some() => return Ok(()),
                None => {
                    return Err(NsError::TableNotFound {
                        db: db.to_string(),
                        name: name.to_string(),
                    });
                }
            };
            if let Some(procedure) = core.catalog.procedures_referencing(db, name).first() {
                return Err(NsError::TableReferencedByProcedure {
                    db: db.to_string(),
                    name: name.to_string(),
                    procedure: procedure.clone(),
                });
            }
            table
        };

        self.drop_table_on_replicas(&table).await;
        self.delete_table_node(&table)?;
        {
            let mut core = self.core.lock();
            core.catalog.remove(db, name);
        }
        self.notify_catalog_changed()?;
        if zone.is_none() && self.core.lock().mode == ClusterMode::Leader {
            self.mirror_drop_table(db, name);
        }
        tracing::info!(%name, %db, "table dropped");
        Ok(())
    }

    /// Append a column. The new schema version reaches every live replica
    /// before the catalog commits, so no tablet ever sees rows of an
    /// unknown version.
    pub async fn add_table_field(
        &self,
        db: &str,
        name: &str,
        column: ColumnDesc,
    ) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let (tid, version, clients) = {
            let core = self.core.lock();
            let table = core.catalog.expect(db, name)?;
            if table.column(&column.name).is_some() {
                return Err(NsError::InvalidParameter {
                    reason: format!("column '{}' already exists", column.name),
                });
            }
            if table.added_columns.len() >= crate::catalog::MAX_ADDED_COLUMNS {
                return Err(NsError::TooManyAddedColumns {
                    max: crate::catalog::MAX_ADDED_COLUMNS,
                });
            }
            let version = table.next_schema_version();
            if version > crate::catalog::MAX_SCHEMA_VERSION {
                return Err(NsError::SchemaVersionExhausted);
            }
            let pair = VersionPair {
                id: version,
                field_count: table.field_count() + 1,
            };
            let mut endpoints: Vec<String> = table
                .table_partition
                .iter()
                .flat_map(|p| p.partition_meta.iter())
                .filter(|m| m.is_alive)
                .map(|m| m.endpoint.clone())
                .collect();
            endpoints.sort();
            endpoints.dedup();
            let clients: Vec<_> = endpoints
                .into_iter()
                .map(|ep| core.registry.client(&ep).map(|c| (ep, c)))
                .collect::<Result<_, _>>()?;
            (table.tid, pair, clients)
        };

        for (endpoint, client) in &clients {
            client
                .update_table_meta_for_add_field(tid, &column, version)
                .await
                .map_err(|e| NsError::rpc(endpoint, "add field", e))?;
        }

        let snapshot = {
            let mut core = self.core.lock();
            let table = core.catalog.expect_mut(db, name)?;
            table.added_columns.push(column);
            table.version_pairs.push(version);
            table.clone()
        };
        self.persist_table(&snapshot)?;
        self.notify_catalog_changed()?;
        Ok(())
    }

    pub async fn update_ttl(&self, db: &str, name: &str, ttl: TtlDesc) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let (tid, clients) = {
            let core = self.core.lock();
            let table = core.catalog.expect(db, name)?;
            if table.ttl.ttl_type != ttl.ttl_type {
                return Err(NsError::TtlTypeMismatch {
                    expected: format!("{:?}", table.ttl.ttl_type),
                    got: format!("{:?}", ttl.ttl_type),
                });
            }
            if ttl.abs_ttl_min > crate::catalog::MAX_ABS_TTL_MIN
                || ttl.lat_ttl > crate::catalog::MAX_LAT_TTL
            {
                return Err(NsError::InvalidTtl {
                    reason: "ttl exceeds limits".to_string(),
                });
            }
            let clients: Vec<_> = table
                .table_partition
                .iter()
                .flat_map(|p| {
                    p.partition_meta
                        .iter()
                        .filter(|m| m.is_alive)
                        .map(move |m| (p.pid, m.endpoint.clone()))
                })
                .map(|(pid, ep)| core.registry.client(&ep).map(|c| (pid, ep, c)))
                .collect::<Result<_, _>>()?;
            (table.tid, clients)
        };

        for (pid, endpoint, client) in &clients {
            client
                .update_ttl(tid, *pid, &ttl)
                .await
                .map_err(|e| NsError::rpc(endpoint, "update ttl", e))?;
        }

        let snapshot = {
            let mut core = self.core.lock();
            let table = core.catalog.expect_mut(db, name)?;
            table.ttl = ttl;
            table.clone()
        };
        self.persist_table(&snapshot)?;
        self.notify_catalog_changed()?;
        Ok(())
    }

    // ===========================
    // Indexes
    // ===========================

    /// Online index addition. Empty tables take the cheap path (no data to
    /// backfill); otherwise the full dump/ship/extract/load pipeline runs.
    pub fn add_index(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        column_key: ColumnKey,
        cols: Vec<ColumnDesc>,
    ) -> Result<OpId, NsError> {
        self.guard_leader(None)?;
        let mut core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        if table
            .column_keys
            .iter()
            .any(|ck| ck.index_name == column_key.index_name && !ck.is_deleted())
        {
            return Err(NsError::IdxNameExists {
                index_name: column_key.index_name.clone(),
            });
        }
        core.catalog.validate_column_key(table, &column_key)?;
        let tid = table.tid;
        let skip_data = table.table_partition.iter().all(|p| {
            p.partition_meta
                .iter()
                .all(|m| m.record_cnt == 0 && m.offset == 0)
        });

        // Barrier for the final catalog commit.
        self.meta
            .set(&self.paths.op_sync(tid), b"1")
            .map_err(NsError::MetaWrite)?;

        self.create_op_locked(
            &mut core,
            OpType::AddIndex,
            OpPayload::AddIndex {
                tid,
                column_key,
                cols,
                skip_data,
            },
            name,
            db,
            None,
            None,
            None,
        )
    }

    /// Soft-delete an index: the column key is flagged, never removed.
    pub fn delete_index(&self, db: &str, name: &str, index_name: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let snapshot = {
            let mut core = self.core.lock();
            let table = core.catalog.expect_mut(db, name)?;
            let ck = table
                .column_keys
                .iter_mut()
                .find(|ck| ck.index_name == index_name && !ck.is_deleted())
                .ok_or(NsError::IdxNameNotFound {
                    index_name: index_name.to_string(),
                })?;
            ck.flag = 1;
            table.clone()
        };
        self.persist_table(&snapshot)?;
        self.notify_catalog_changed()?;
        Ok(())
    }

    // ===========================
    // Replica management
    // ===========================

    pub fn add_replica_ns(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        pids: &[Pid],
        endpoint: &str,
    ) -> Result<Vec<OpId>, NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        let mut core = self.core.lock();
        if core.registry.get_healthy(endpoint).is_none() {
            return Err(NsError::TabletNotHealthy {
                endpoint: endpoint.to_string(),
            });
        }
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        for pid in pids {
            let part = table.partition(*pid).ok_or(NsError::PidNotFound {
                name: name.to_string(),
                pid: *pid,
            })?;
            if part.replica(endpoint).is_some() {
                return Err(NsError::InvalidParameter {
                    reason: format!("'{endpoint}' already holds partition {pid}"),
                });
            }
        }
        let mirror_aliases: Vec<String> = (core.mode == ClusterMode::Leader)
            .then(|| {
                core.replicas
                    .values()
                    .filter(|c| c.is_healthy())
                    .map(|c| c.address.alias.clone())
                    .collect()
            })
            .unwrap_or_default();

        let mut op_ids = Vec::new();
        for pid in pids {
            let op_id = self.create_op_locked(
                &mut core,
                OpType::AddReplica,
                OpPayload::AddReplica {
                    tid,
                    pid: *pid,
                    endpoint: endpoint.to_string(),
                },
                name,
                db,
                Some(*pid),
                None,
                None,
            )?;
            op_ids.push(op_id);
            for alias in &mirror_aliases {
                if let Err(e) = self.create_op_locked(
                    &mut core,
                    OpType::AddReplicaNsRemote,
                    OpPayload::AddReplicaNsRemote {
                        alias: alias.clone(),
                        pid: *pid,
                    },
                    name,
                    db,
                    Some(*pid),
                    None,
                    None,
                ) {
                    tracing::warn!(%alias, %name, pid = %pid, error = %e,
                        "failed to mirror AddReplicaNS");
                }
            }
        }
        Ok(op_ids)
    }

    pub fn del_replica_ns(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        pids: &[Pid],
        endpoint: &str,
    ) -> Result<Vec<OpId>, NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        let mut core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        for pid in pids {
            let part = table.partition(*pid).ok_or(NsError::PidNotFound {
                name: name.to_string(),
                pid: *pid,
            })?;
            let meta = part.replica(endpoint).ok_or(NsError::EndpointNotFound {
                endpoint: endpoint.to_string(),
            })?;
            if meta.is_leader {
                return Err(NsError::InvalidParameter {
                    reason: format!("'{endpoint}' is the leader of partition {pid}"),
                });
            }
        }
        let mut op_ids = Vec::new();
        for pid in pids {
            op_ids.push(self.create_op_locked(
                &mut core,
                OpType::DelReplica,
                OpPayload::DelReplica {
                    tid,
                    pid: *pid,
                    endpoint: endpoint.to_string(),
                },
                name,
                db,
                Some(*pid),
                None,
                None,
            )?);
        }
        Ok(op_ids)
    }

    pub fn migrate(
        self: &Arc<Self>,
        src: &str,
        db: &str,
        name: &str,
        pids: &[Pid],
        dst: &str,
    ) -> Result<Vec<OpId>, NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        let mut core = self.core.lock();
        if core.registry.get_healthy(dst).is_none() {
            return Err(NsError::TabletNotHealthy {
                endpoint: dst.to_string(),
            });
        }
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        for pid in pids {
            let part = table.partition(*pid).ok_or(NsError::PidNotFound {
                name: name.to_string(),
                pid: *pid,
            })?;
            let meta = part.replica(src).ok_or(NsError::EndpointNotFound {
                endpoint: src.to_string(),
            })?;
            if meta.is_leader {
                return Err(NsError::InvalidParameter {
                    reason: format!("cannot migrate the leader of partition {pid}"),
                });
            }
            if part.replica(dst).is_some() {
                return Err(NsError::InvalidParameter {
                    reason: format!("'{dst}' already holds partition {pid}"),
                });
            }
        }
        let mut op_ids = Vec::new();
        for pid in pids {
            op_ids.push(self.create_op_locked(
                &mut core,
                OpType::Migrate,
                OpPayload::Migrate {
                    tid,
                    pid: *pid,
                    src: src.to_string(),
                    dst: dst.to_string(),
                },
                name,
                db,
                Some(*pid),
                None,
                None,
            )?);
        }
        Ok(op_ids)
    }

    pub fn change_leader(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        pid: Pid,
        candidate_leader: Option<String>,
    ) -> Result<OpId, NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        let mut core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        let part = table.partition(pid).ok_or(NsError::PidNotFound {
            name: name.to_string(),
            pid,
        })?;
        let current_leader = part.alive_leader().map(|m| m.endpoint.clone());
        let candidates: Vec<String> = part
            .partition_meta
            .iter()
            .filter(|m| m.is_alive && Some(&m.endpoint) != current_leader.as_ref())
            .map(|m| m.endpoint.clone())
            .collect();
        if candidates.is_empty() {
            return Err(NsError::NoAliveFollower {
                name: name.to_string(),
                pid,
            });
        }
        if let Some(candidate) = &candidate_leader {
            if !candidates.contains(candidate) {
                return Err(NsError::InvalidParameter {
                    reason: format!("'{candidate}' is not an eligible follower"),
                });
            }
        }
        self.create_op_locked(
            &mut core,
            OpType::ChangeLeader,
            OpPayload::ChangeLeader {
                tid,
                pid,
                candidates,
                candidate_leader,
                chosen: None,
                term: 0,
                offset: 0,
            },
            name,
            db,
            Some(pid),
            None,
            None,
        )
    }

    pub fn offline_endpoint(
        self: &Arc<Self>,
        endpoint: &str,
        concurrency: u32,
    ) -> Result<(), NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        {
            let core = self.core.lock();
            if core.registry.get(endpoint).is_none() {
                return Err(NsError::EndpointNotFound {
                    endpoint: endpoint.to_string(),
                });
            }
        }
        self.handle_endpoint_offline(endpoint, concurrency)
    }

    pub fn recover_endpoint(
        self: &Arc<Self>,
        endpoint: &str,
        need_restore: bool,
        concurrency: u32,
    ) -> Result<(), NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        self.handle_endpoint_online(endpoint, need_restore, concurrency)
    }

    pub fn recover_table(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        pid: Pid,
        endpoint: &str,
    ) -> Result<OpId, NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        let mut core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        let part = table.partition(pid).ok_or(NsError::PidNotFound {
            name: name.to_string(),
            pid,
        })?;
        if part.replica(endpoint).is_none() {
            return Err(NsError::EndpointNotFound {
                endpoint: endpoint.to_string(),
            });
        }
        self.create_op_locked(
            &mut core,
            OpType::RecoverTable,
            OpPayload::RecoverTable {
                tid,
                pid,
                endpoint: endpoint.to_string(),
                need_restore: false,
                concurrency: 1,
            },
            name,
            db,
            Some(pid),
            None,
            None,
        )
    }

    pub fn make_snapshot_ns(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        pid: Pid,
        end_offset: u64,
    ) -> Result<OpId, NsError> {
        self.guard_leader(None)?;
        let mut core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        let part = table.partition(pid).ok_or(NsError::PidNotFound {
            name: name.to_string(),
            pid,
        })?;
        let leader = part
            .alive_leader()
            .map(|m| m.endpoint.clone())
            .ok_or(NsError::NoAliveFollower {
                name: name.to_string(),
                pid,
            })?;
        self.create_op_locked(
            &mut core,
            OpType::MakeSnapshot,
            OpPayload::MakeSnapshot {
                tid,
                pid,
                endpoint: leader,
                end_offset,
            },
            name,
            db,
            Some(pid),
            None,
            None,
        )
    }

    /// Admin override of one partition's replica metadata. Applying the
    /// same override twice leaves the catalog unchanged.
    pub fn set_table_partition(
        &self,
        db: &str,
        name: &str,
        partition: metaplane::TablePartition,
    ) -> Result<(), NsError> {
        self.guard_leader(None)?;
        self.guard_auto_failover()?;
        let snapshot = {
            let mut core = self.core.lock();
            let table = core.catalog.expect_mut(db, name)?;
            let slot = table
                .partition_mut(partition.pid)
                .ok_or(NsError::PidNotFound {
                    name: name.to_string(),
                    pid: partition.pid,
                })?;
            *slot = partition;
            table.clone()
        };
        self.persist_table(&snapshot)?;
        self.notify_catalog_changed()?;
        Ok(())
    }

    pub fn get_table_partition(
        &self,
        db: &str,
        name: &str,
        pid: Pid,
    ) -> Result<metaplane::TablePartition, NsError> {
        let core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        table
            .partition(pid)
            .cloned()
            .ok_or(NsError::PidNotFound {
                name: name.to_string(),
                pid,
            })
    }

    /// Mark the OP and every remaining task Canceled, then ask every
    /// healthy tablet to cancel in-flight work for it.
    pub async fn cancel_op(self: &Arc<Self>, op_id: OpId) -> Result<(), NsError> {
        if !self.is_running() {
            return Err(NsError::NotLeader);
        }
        let clients = {
            let mut core = self.core.lock();
            let Some(op) = core.engine.find_pending_mut(op_id) else {
                return Err(NsError::OpNotFound { op_id });
            };
            op.cancel();
            core.registry.healthy_clients()
        };
        for (endpoint, client) in clients {
            if let Err(e) = client.cancel_op(op_id).await {
                tracing::debug!(%op_id, %endpoint, error = %e, "tablet cancel failed");
            }
        }
        self.worker_notify.notify_one();
        tracing::info!(%op_id, "op canceled");
        Ok(())
    }

    // ===========================
    // Config
    // ===========================

    pub fn conf_set(&self, key: &str, value: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        if key != "auto_failover" {
            return Err(NsError::InvalidParameter {
                reason: format!("unknown config key '{key}'"),
            });
        }
        let enabled = match value {
            "true" => true,
            "false" => false,
            other => {
                return Err(NsError::InvalidParameter {
                    reason: format!("'{other}' is not a boolean"),
                });
            }
        };
        self.meta
            .set(&self.paths.auto_failover(), value.as_bytes())
            .map_err(NsError::MetaWrite)?;
        self.core.lock().auto_failover = enabled;
        tracing::info!(auto_failover = enabled, "config updated");
        Ok(())
    }

    pub fn conf_get(&self) -> Vec<(String, String)> {
        let core = self.core.lock();
        vec![(
            "auto_failover".to_string(),
            core.auto_failover.to_string(),
        )]
    }

    // ===========================
    // Introspection
    // ===========================

    pub fn show_table(&self, db: &str, name: Option<&str>) -> Vec<TableInfo> {
        let core = self.core.lock();
        core.catalog
            .iter()
            .filter(|t| t.db == db)
            .filter(|t| name.is_none_or(|n| t.name == n))
            .cloned()
            .collect()
    }

    pub fn show_all_tables(&self) -> Vec<TableInfo> {
        self.core.lock().catalog.iter().cloned().collect()
    }

    pub fn show_tablet(&self) -> Vec<TabletView> {
        let core = self.core.lock();
        let mut tablets: Vec<TabletView> = core
            .registry
            .iter()
            .map(|t| TabletView {
                endpoint: t.endpoint.clone(),
                real_endpoint: t.real_endpoint.clone(),
                state: t.state,
                ctime: t.ctime,
            })
            .collect();
        tablets.sort_by(|a, b| a.endpoint.cmp(&b.endpoint));
        tablets
    }

    pub fn show_op_status(
        &self,
        db: Option<&str>,
        name: Option<&str>,
        pid: Option<Pid>,
    ) -> Vec<OpView> {
        let core = self.core.lock();
        let mut views: Vec<OpView> = core
            .engine
            .pending()
            .chain(core.engine.done_list().iter())
            .filter(|op| db.is_none_or(|db| op.data.db == db))
            .filter(|op| name.is_none_or(|n| op.data.name == n))
            .filter(|op| pid.is_none_or(|p| op.data.pid == Some(p)))
            .map(|op| OpView {
                op_id: op.data.op_id,
                op_type: op.data.op_type,
                status: op.data.status,
                name: op.data.name.clone(),
                db: op.data.db.clone(),
                pid: op.data.pid,
                start_time: op.data.start_time,
                end_time: op.data.end_time,
                current_task: op.current_task().map(|t| t.info.task_type),
                vec_idx: op.data.vec_idx,
            })
            .collect();
        views.sort_by_key(|v| v.op_id);
        views
    }

    /// Current catalog version (the notify counter).
    pub fn show_catalog_version(&self) -> u64 {
        self.meta
            .get(&self.paths.notify())
            .ok()
            .and_then(|v| String::from_utf8_lossy(&v).parse().ok())
            .unwrap_or(0)
    }

    pub fn show_replica_cluster(&self) -> Vec<ReplicaClusterView> {
        let core = self.core.lock();
        core.replicas
            .values()
            .map(|c| ReplicaClusterView {
                alias: c.address.alias.clone(),
                metastore_endpoints: c.address.metastore_endpoints.clone(),
                metastore_path: c.address.metastore_path.clone(),
                state: c.state,
                ctime: c.ctime,
            })
            .collect()
    }

    pub fn switch_mode(&self, mode: ClusterMode) -> Result<(), NsError> {
        self.guard_leader(None)?;
        if mode == ClusterMode::Follower {
            return Err(NsError::InvalidParameter {
                reason: "follower mode is entered through AddReplicaCluster on the leader"
                    .to_string(),
            });
        }
        let mut core = self.core.lock();
        if core.mode == ClusterMode::Follower {
            return Err(NsError::ZoneInfoMismatch {
                reason: "cannot switch modes while following another cluster".to_string(),
            });
        }
        core.mode = mode;
        core.zone_info.mode = mode;
        tracing::info!(%mode, "cluster mode switched");
        Ok(())
    }

    // ===========================
    // Procedures
    // ===========================

    /// Procedures deploy to every healthy tablet before the catalog commits.
    pub async fn create_procedure(&self, procedure: ProcedureInfo) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let clients = {
            let core = self.core.lock();
            if !core.catalog.has_db(&procedure.db) {
                return Err(NsError::DatabaseNotFound {
                    db: procedure.db.clone(),
                });
            }
            if core
                .catalog
                .get_procedure(&procedure.db, &procedure.name)
                .is_some()
            {
                return Err(NsError::ProcedureExists {
                    db: procedure.db.clone(),
                    name: procedure.name.clone(),
                });
            }
            for (db, table) in &procedure.tables {
                core.catalog.expect(db, table)?;
            }
            core.registry.healthy_clients()
        };

        for (endpoint, client) in &clients {
            if let Err(e) = client.create_procedure(&procedure).await {
                // Roll back tablets that already accepted it.
                for (done_ep, done_client) in &clients {
                    if done_ep == endpoint {
                        break;
                    }
                    let _ = done_client
                        .drop_procedure(&procedure.db, &procedure.name)
                        .await;
                }
                return Err(NsError::CreateProcedureFailedOnTablet {
                    endpoint: endpoint.clone(),
                    reason: e.to_string(),
                });
            }
        }

        let raw = Self::encode(&procedure)?;
        let compressed = snap::raw::Encoder::new()
            .compress_vec(&raw)
            .map_err(|e| NsError::InvalidParameter {
                reason: format!("procedure compression failed: {e}"),
            })?;
        self.meta
            .set(
                &self.paths.procedure(&procedure.db, &procedure.name),
                &compressed,
            )
            .map_err(NsError::MetaWrite)?;
        self.core.lock().catalog.insert_procedure(procedure);
        Ok(())
    }

    pub async fn drop_procedure(&self, db: &str, name: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let clients = {
            let core = self.core.lock();
            if core.catalog.get_procedure(db, name).is_none() {
                return Err(NsError::ProcedureNotFound {
                    db: db.to_string(),
                    name: name.to_string(),
                });
            }
            core.registry.healthy_clients()
        };
        for (endpoint, client) in clients {
            if let Err(e) = client.drop_procedure(db, name).await {
                tracing::debug!(%endpoint, error = %e, "drop procedure on tablet failed");
            }
        }
        match self.meta.delete(&self.paths.procedure(db, name)) {
            Ok(()) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(NsError::MetaWrite(e)),
        }
        self.core.lock().catalog.remove_procedure(db, name);
        Ok(())
    }

    // ===========================
    // SDK endpoints
    // ===========================

    /// Map an SDK-visible endpoint; an empty `real` removes the mapping.
    pub fn set_sdk_endpoint(&self, endpoint: &str, real: &str) -> Result<(), NsError> {
        self.guard_leader(None)?;
        let mut core = self.core.lock();
        if real.is_empty() {
            if core.catalog.remove_sdk_endpoint(endpoint).is_none() {
                return Err(NsError::EndpointNotFound {
                    endpoint: endpoint.to_string(),
                });
            }
            match self.meta.delete(&self.paths.sdk_endpoint(endpoint)) {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(NsError::MetaWrite(e)),
            }
            return Ok(());
        }
        core.catalog.set_sdk_endpoint(endpoint, real)?;
        self.meta
            .set(&self.paths.sdk_endpoint(endpoint), real.as_bytes())
            .map_err(NsError::MetaWrite)?;
        Ok(())
    }

    pub fn show_sdk_endpoint(&self) -> BTreeMap<String, String> {
        self.core.lock().catalog.sdk_endpoints().clone()
    }

    // ===========================
    // Metastore session control
    // ===========================

    pub fn connect_metastore(&self) -> Result<(), NsError> {
        self.meta.reconnect().map_err(NsError::MetaWrite)
    }

    pub fn disconnect_metastore(&self) -> Result<(), NsError> {
        self.meta.disconnect().map_err(NsError::MetaWrite)
    }

    // ===========================
    // Remote-facing handlers (called by a peer leader cluster)
    // ===========================

    /// Mirror of AddReplicaNS on this (follower) cluster: pick the least
    /// loaded healthy tablet not yet holding the partition and enqueue a
    /// local AddReplica OP enrolled under the leader's op id.
    pub fn handle_add_replica_ns_remote(
        self: &Arc<Self>,
        db: &str,
        name: &str,
        pid: Pid,
        zone: &ZoneInfo,
        remote_task: TaskRef,
    ) -> Result<OpId, NsError> {
        self.guard_leader(Some(zone))?;
        let mut core = self.core.lock();
        let table = core.catalog.expect(db, name)?;
        let tid = table.tid;
        let part = table.partition(pid).ok_or(NsError::PidNotFound {
            name: name.to_string(),
            pid,
        })?;
        let held: Vec<&str> = part
            .partition_meta
            .iter()
            .map(|m| m.endpoint.as_str())
            .collect();
        let endpoint = core
            .registry
            .healthy_endpoints()
            .into_iter()
            .find(|ep| !held.contains(&ep.as_str()))
            .ok_or(NsError::InvalidParameter {
                reason: format!("no spare tablet for partition {pid}"),
            })?;
        self.create_op_locked(
            &mut core,
            OpType::AddReplica,
            OpPayload::AddReplica {
                tid,
                pid,
                endpoint,
            },
            name,
            db,
            Some(pid),
            None,
            Some(remote_task.op_id),
        )
    }
}
