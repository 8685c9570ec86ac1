//! gRPC server adapter.
//!
//! Converts tonic requests into [`NameServer`] calls. Application failures
//! travel in the `code` field of each response (the stable numeric
//! contract); gRPC statuses are reserved for transport problems.

use crate::error::NsError;
use crate::nameserver::NameServer;
use crate::proto;
use crate::proto::name_server_server::{NameServer as NameServerRpc, NameServerServer};
use crate::tablet::{TaskRef, TaskStatusEntry};
use metaplane::StatusCode;
use metaplane::table as domain;
use metaplane::types::{
    ClusterMode, ColumnType, OpId, Pid, TabletState, TaskStatus, TaskType, Tid, TtlType,
};
use std::sync::Arc;
use tonic::{Request, Response, Status};

/// Server adapter exposing a [`NameServer`] over gRPC.
pub struct NameServerService {
    ns: Arc<NameServer>,
}

impl NameServerService {
    pub fn new(ns: Arc<NameServer>) -> Self {
        Self { ns }
    }

    pub fn into_server(self) -> NameServerServer<Self> {
        NameServerServer::new(self)
    }
}

// ===========================
// Response builders
// ===========================

fn general_ok() -> proto::GeneralResponse {
    proto::GeneralResponse {
        code: StatusCode::Ok.as_u32(),
        msg: "ok".to_string(),
    }
}

fn general_err(e: &NsError) -> proto::GeneralResponse {
    proto::GeneralResponse {
        code: e.status_code().as_u32(),
        msg: e.to_string(),
    }
}

fn general_from(result: Result<(), NsError>) -> proto::GeneralResponse {
    match result {
        Ok(()) => general_ok(),
        Err(e) => general_err(&e),
    }
}

fn op_ok(op_ids: Vec<OpId>) -> proto::OpResponse {
    proto::OpResponse {
        code: StatusCode::Ok.as_u32(),
        msg: "ok".to_string(),
        op_ids: op_ids.into_iter().map(u64::from).collect(),
    }
}

fn op_err(e: &NsError) -> proto::OpResponse {
    proto::OpResponse {
        code: e.status_code().as_u32(),
        msg: e.to_string(),
        op_ids: vec![],
    }
}

// ===========================
// Proto <-> domain conversions
// ===========================

fn column_type_str(t: ColumnType) -> &'static str {
    match t {
        ColumnType::Bool => "bool",
        ColumnType::SmallInt => "smallint",
        ColumnType::Int => "int",
        ColumnType::BigInt => "bigint",
        ColumnType::Float => "float",
        ColumnType::Double => "double",
        ColumnType::Timestamp => "timestamp",
        ColumnType::Date => "date",
        ColumnType::String => "string",
    }
}

fn parse_column_type(s: &str) -> Result<ColumnType, NsError> {
    Ok(match s {
        "bool" => ColumnType::Bool,
        "smallint" | "int16" => ColumnType::SmallInt,
        "int" | "int32" => ColumnType::Int,
        "bigint" | "int64" => ColumnType::BigInt,
        "float" => ColumnType::Float,
        "double" => ColumnType::Double,
        "timestamp" => ColumnType::Timestamp,
        "date" => ColumnType::Date,
        "string" | "varchar" => ColumnType::String,
        other => {
            return Err(NsError::InvalidParameter {
                reason: format!("unknown column type '{other}'"),
            });
        }
    })
}

fn ttl_type_str(t: TtlType) -> &'static str {
    match t {
        TtlType::Absolute => "absolute",
        TtlType::Latest => "latest",
        TtlType::AbsAndLat => "absandlat",
        TtlType::AbsOrLat => "absorlat",
    }
}

fn parse_ttl_type(s: &str) -> Result<TtlType, NsError> {
    Ok(match s {
        "" | "absolute" => TtlType::Absolute,
        "latest" => TtlType::Latest,
        "absandlat" => TtlType::AbsAndLat,
        "absorlat" => TtlType::AbsOrLat,
        other => {
            return Err(NsError::InvalidParameter {
                reason: format!("unknown ttl type '{other}'"),
            });
        }
    })
}

fn mode_str(mode: ClusterMode) -> &'static str {
    match mode {
        ClusterMode::Normal => "normal",
        ClusterMode::Leader => "leader",
        ClusterMode::Follower => "follower",
    }
}

fn parse_mode(s: &str) -> Result<ClusterMode, NsError> {
    Ok(match s {
        "normal" => ClusterMode::Normal,
        "leader" => ClusterMode::Leader,
        "follower" => ClusterMode::Follower,
        other => {
            return Err(NsError::InvalidParameter {
                reason: format!("unknown mode '{other}'"),
            });
        }
    })
}

fn state_str(state: TabletState) -> &'static str {
    match state {
        TabletState::Healthy => "healthy",
        TabletState::Offline => "offline",
    }
}

pub(crate) fn parse_task_status(s: &str) -> Result<TaskStatus, NsError> {
    Ok(match s {
        "Inited" => TaskStatus::Inited,
        "Doing" => TaskStatus::Doing,
        "Done" => TaskStatus::Done,
        "Failed" => TaskStatus::Failed,
        "Canceled" => TaskStatus::Canceled,
        other => {
            return Err(NsError::InvalidParameter {
                reason: format!("unknown task status '{other}'"),
            });
        }
    })
}

pub(crate) fn parse_task_type(s: &str) -> Result<TaskType, NsError> {
    Ok(match s {
        "MakeSnapshot" => TaskType::MakeSnapshot,
        "PauseSnapshot" => TaskType::PauseSnapshot,
        "RecoverSnapshot" => TaskType::RecoverSnapshot,
        "SendSnapshot" => TaskType::SendSnapshot,
        "LoadTable" => TaskType::LoadTable,
        "AddReplica" => TaskType::AddReplica,
        "DelReplica" => TaskType::DelReplica,
        "DropTable" => TaskType::DropTable,
        "SelectLeader" => TaskType::SelectLeader,
        "ChangeLeader" => TaskType::ChangeLeader,
        "UpdateLeaderInfo" => TaskType::UpdateLeaderInfo,
        "AddTableInfo" => TaskType::AddTableInfo,
        "DelTableInfo" => TaskType::DelTableInfo,
        "UpdateTableInfo" => TaskType::UpdateTableInfo,
        "UpdatePartitionStatus" => TaskType::UpdatePartitionStatus,
        "RecoverEndpointTable" => TaskType::RecoverEndpointTable,
        "CheckBinlogSyncProgress" => TaskType::CheckBinlogSyncProgress,
        "TableSync" => TaskType::TableSync,
        "DumpIndexData" => TaskType::DumpIndexData,
        "SendIndexData" => TaskType::SendIndexData,
        "AddIndexToTablet" => TaskType::AddIndexToTablet,
        "ExtractIndexData" => TaskType::ExtractIndexData,
        "LoadIndexData" => TaskType::LoadIndexData,
        "CreateTableRemote" => TaskType::CreateTableRemote,
        "DropTableRemote" => TaskType::DropTableRemote,
        "AddReplicaRemote" => TaskType::AddReplicaRemote,
        "AddReplicaSimplyRemote" => TaskType::AddReplicaSimplyRemote,
        "AddReplicaNsRemote" => TaskType::AddReplicaNsRemote,
        "DelReplicaRemote" => TaskType::DelReplicaRemote,
        other => {
            return Err(NsError::InvalidParameter {
                reason: format!("unknown task type '{other}'"),
            });
        }
    })
}

fn column_desc_to_proto(c: &domain::ColumnDesc) -> proto::ColumnDesc {
    proto::ColumnDesc {
        name: c.name.clone(),
        data_type: column_type_str(c.col_type).to_string(),
        is_index: c.is_index,
        is_ts_col: c.is_ts_col,
        not_null: c.not_null,
    }
}

fn column_desc_from_proto(c: &proto::ColumnDesc) -> Result<domain::ColumnDesc, NsError> {
    Ok(domain::ColumnDesc {
        name: c.name.clone(),
        col_type: parse_column_type(&c.data_type)?,
        is_index: c.is_index,
        is_ts_col: c.is_ts_col,
        not_null: c.not_null,
    })
}

fn column_key_to_proto(ck: &domain::ColumnKey) -> proto::ColumnKey {
    proto::ColumnKey {
        index_name: ck.index_name.clone(),
        col_name: ck.col_names.clone(),
        ts_name: ck.ts_name.clone().unwrap_or_default(),
        flag: ck.flag,
    }
}

fn column_key_from_proto(ck: &proto::ColumnKey) -> domain::ColumnKey {
    domain::ColumnKey {
        index_name: ck.index_name.clone(),
        col_names: ck.col_name.clone(),
        ts_name: (!ck.ts_name.is_empty()).then(|| ck.ts_name.clone()),
        flag: ck.flag,
    }
}

fn ttl_to_proto(ttl: &domain::TtlDesc) -> proto::TtlDesc {
    proto::TtlDesc {
        ttl_type: ttl_type_str(ttl.ttl_type).to_string(),
        abs_ttl_min: ttl.abs_ttl_min,
        lat_ttl: ttl.lat_ttl,
    }
}

fn ttl_from_proto(ttl: Option<&proto::TtlDesc>) -> Result<domain::TtlDesc, NsError> {
    let Some(ttl) = ttl else {
        return Ok(domain::TtlDesc::default());
    };
    Ok(domain::TtlDesc {
        ttl_type: parse_ttl_type(&ttl.ttl_type)?,
        abs_ttl_min: ttl.abs_ttl_min,
        lat_ttl: ttl.lat_ttl,
    })
}

fn partition_to_proto(p: &domain::TablePartition) -> proto::TablePartition {
    proto::TablePartition {
        pid: p.pid.0,
        partition_meta: p
            .partition_meta
            .iter()
            .map(|m| proto::PartitionMeta {
                endpoint: m.endpoint.clone(),
                is_leader: m.is_leader,
                is_alive: m.is_alive,
                offset: m.offset,
                record_cnt: m.record_cnt,
                record_byte_size: m.record_byte_size,
                diskused: m.diskused,
                tablet_has_partition: m.tablet_has_partition,
            })
            .collect(),
        remote_partition_meta: p
            .remote_partition_meta
            .iter()
            .map(|m| proto::RemotePartitionMeta {
                alias: m.alias.clone(),
                endpoint: m.endpoint.clone(),
                remote_tid: m.remote_tid.0,
                is_leader: m.is_leader,
                is_alive: m.is_alive,
            })
            .collect(),
        term_offset: p
            .term_offset
            .iter()
            .map(|t| proto::TermPair {
                term: t.term,
                offset: t.offset,
            })
            .collect(),
    }
}

fn partition_from_proto(p: &proto::TablePartition) -> domain::TablePartition {
    domain::TablePartition {
        pid: Pid(p.pid),
        partition_meta: p
            .partition_meta
            .iter()
            .map(|m| domain::PartitionMeta {
                endpoint: m.endpoint.clone(),
                is_leader: m.is_leader,
                is_alive: m.is_alive,
                offset: m.offset,
                record_cnt: m.record_cnt,
                record_byte_size: m.record_byte_size,
                diskused: m.diskused,
                tablet_has_partition: m.tablet_has_partition,
            })
            .collect(),
        remote_partition_meta: p
            .remote_partition_meta
            .iter()
            .map(|m| domain::RemotePartitionMeta {
                alias: m.alias.clone(),
                endpoint: m.endpoint.clone(),
                remote_tid: Tid(m.remote_tid),
                is_leader: m.is_leader,
                is_alive: m.is_alive,
            })
            .collect(),
        term_offset: p
            .term_offset
            .iter()
            .map(|t| domain::TermPair {
                term: t.term,
                offset: t.offset,
            })
            .collect(),
    }
}

pub(crate) fn table_to_proto(t: &domain::TableInfo) -> proto::TableMeta {
    proto::TableMeta {
        tid: t.tid.0,
        name: t.name.clone(),
        db: t.db.clone(),
        column_desc: t.column_desc.iter().map(column_desc_to_proto).collect(),
        column_key: t.column_keys.iter().map(column_key_to_proto).collect(),
        partition_key: t.partition_key.clone(),
        ttl: Some(ttl_to_proto(&t.ttl)),
        partition_num: t.partition_num,
        replica_num: t.replica_num,
        compress_type: match t.compress_type {
            domain::CompressType::NoCompress => "nocompress".to_string(),
            domain::CompressType::Snappy => "snappy".to_string(),
        },
        seg_cnt: t.seg_cnt,
        format_version: t.format_version,
        added_column_desc: t.added_columns.iter().map(column_desc_to_proto).collect(),
        schema_versions: t
            .version_pairs
            .iter()
            .map(|v| proto::VersionPair {
                id: v.id,
                field_count: v.field_count,
            })
            .collect(),
        table_partition: t.table_partition.iter().map(partition_to_proto).collect(),
    }
}

pub(crate) fn table_from_proto(t: &proto::TableMeta) -> Result<domain::TableInfo, NsError> {
    Ok(domain::TableInfo {
        tid: Tid(t.tid),
        name: t.name.clone(),
        db: t.db.clone(),
        column_desc: t
            .column_desc
            .iter()
            .map(column_desc_from_proto)
            .collect::<Result<_, _>>()?,
        column_keys: t.column_key.iter().map(column_key_from_proto).collect(),
        partition_key: t.partition_key.clone(),
        ttl: ttl_from_proto(t.ttl.as_ref())?,
        partition_num: t.partition_num,
        replica_num: t.replica_num,
        compress_type: match t.compress_type.as_str() {
            "" | "nocompress" => domain::CompressType::NoCompress,
            "snappy" => domain::CompressType::Snappy,
            other => {
                return Err(NsError::InvalidParameter {
                    reason: format!("unknown compress type '{other}'"),
                });
            }
        },
        seg_cnt: if t.seg_cnt == 0 { 8 } else { t.seg_cnt },
        format_version: t.format_version,
        added_columns: t
            .added_column_desc
            .iter()
            .map(column_desc_from_proto)
            .collect::<Result<_, _>>()?,
        version_pairs: t
            .schema_versions
            .iter()
            .map(|v| domain::VersionPair {
                id: v.id,
                field_count: v.field_count,
            })
            .collect(),
        table_partition: t.table_partition.iter().map(partition_from_proto).collect(),
    })
}

pub(crate) fn zone_to_proto(zone: &domain::ZoneInfo) -> proto::ZoneInfo {
    proto::ZoneInfo {
        zone_name: zone.zone_name.clone(),
        zone_term: zone.zone_term,
        replica_alias: zone.replica_alias.clone(),
        mode: mode_str(zone.mode).to_string(),
    }
}

fn zone_from_proto(zone: Option<&proto::ZoneInfo>) -> Result<Option<domain::ZoneInfo>, NsError> {
    let Some(zone) = zone else {
        return Ok(None);
    };
    if zone.zone_name.is_empty() {
        return Ok(None);
    }
    Ok(Some(domain::ZoneInfo {
        zone_name: zone.zone_name.clone(),
        zone_term: zone.zone_term,
        replica_alias: zone.replica_alias.clone(),
        mode: parse_mode(&zone.mode)?,
    }))
}

pub(crate) fn task_ref_to_proto(task: TaskRef) -> proto::TaskInfo {
    proto::TaskInfo {
        op_id: task.op_id.0,
        task_type: task.task_type.to_string(),
        status: TaskStatus::Doing.to_string(),
        endpoint: String::new(),
    }
}

fn task_ref_from_proto(task: Option<&proto::TaskInfo>) -> Option<TaskRef> {
    let task = task?;
    Some(TaskRef {
        op_id: OpId(task.op_id),
        task_type: parse_task_type(&task.task_type).unwrap_or(TaskType::UpdateTableInfo),
    })
}

pub(crate) fn task_entry_to_proto(entry: &TaskStatusEntry) -> proto::TaskInfo {
    proto::TaskInfo {
        op_id: entry.op_id.0,
        task_type: entry.task_type.to_string(),
        status: entry.status.to_string(),
        endpoint: entry.endpoint.clone(),
    }
}

fn age_ms(ctime: chrono::DateTime<chrono::Utc>) -> u64 {
    chrono::Utc::now()
        .signed_duration_since(ctime)
        .num_milliseconds()
        .max(0) as u64
}

// ===========================
// Service implementation
// ===========================

#[tonic::async_trait]
impl NameServerRpc for NameServerService {
    async fn create_table(
        &self,
        request: Request<proto::CreateTableRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match (|| -> Result<(domain::TableInfo, Option<domain::ZoneInfo>), NsError> {
            let meta = request.table_info.as_ref().ok_or(NsError::InvalidParameter {
                reason: "table_info is required".to_string(),
            })?;
            Ok((table_from_proto(meta)?, zone_from_proto(request.zone_info.as_ref())?))
        })() {
            Ok((table, zone)) => {
                general_from(self.ns.create_table(table, zone.as_ref()).await.map(|_| ()))
            }
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn drop_table(
        &self,
        request: Request<proto::DropTableRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match zone_from_proto(request.zone_info.as_ref()) {
            Ok(zone) => general_from(
                self.ns
                    .drop_table(&request.db, &request.name, zone.as_ref())
                    .await,
            ),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn add_table_field(
        &self,
        request: Request<proto::AddTableFieldRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match request
            .column_desc
            .as_ref()
            .ok_or(NsError::InvalidParameter {
                reason: "column_desc is required".to_string(),
            })
            .and_then(column_desc_from_proto)
        {
            Ok(column) => general_from(
                self.ns
                    .add_table_field(&request.db, &request.name, column)
                    .await,
            ),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn update_ttl(
        &self,
        request: Request<proto::UpdateTtlRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match ttl_from_proto(request.ttl.as_ref()) {
            Ok(ttl) => general_from(self.ns.update_ttl(&request.db, &request.name, ttl).await),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn add_index(
        &self,
        request: Request<proto::AddIndexRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let response = match (|| -> Result<(domain::ColumnKey, Vec<domain::ColumnDesc>), NsError> {
            let ck = request.column_key.as_ref().ok_or(NsError::InvalidParameter {
                reason: "column_key is required".to_string(),
            })?;
            let cols = request
                .cols
                .iter()
                .map(column_desc_from_proto)
                .collect::<Result<_, _>>()?;
            Ok((column_key_from_proto(ck), cols))
        })() {
            Ok((column_key, cols)) => {
                match self.ns.add_index(&request.db, &request.name, column_key, cols) {
                    Ok(op_id) => op_ok(vec![op_id]),
                    Err(e) => op_err(&e),
                }
            }
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn delete_index(
        &self,
        request: Request<proto::DeleteIndexRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(self.ns.delete_index(
            &request.db,
            &request.name,
            &request.idx_name,
        ))))
    }

    async fn create_database(
        &self,
        request: Request<proto::DatabaseRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns.create_database(&request.db),
        )))
    }

    async fn drop_database(
        &self,
        request: Request<proto::DatabaseRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns.drop_database(&request.db),
        )))
    }

    async fn show_database(
        &self,
        _request: Request<proto::ShowDatabaseRequest>,
    ) -> Result<Response<proto::ShowDatabaseResponse>, Status> {
        Ok(Response::new(proto::ShowDatabaseResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            db: self.ns.show_databases(),
        }))
    }

    async fn show_table(
        &self,
        request: Request<proto::ShowTableRequest>,
    ) -> Result<Response<proto::ShowTableResponse>, Status> {
        let request = request.into_inner();
        let tables = if request.show_all {
            self.ns.show_all_tables()
        } else {
            self.ns.show_table(
                &request.db,
                (!request.name.is_empty()).then_some(request.name.as_str()),
            )
        };
        Ok(Response::new(proto::ShowTableResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            table_info: tables.iter().map(table_to_proto).collect(),
        }))
    }

    async fn show_tablet(
        &self,
        _request: Request<proto::ShowTabletRequest>,
    ) -> Result<Response<proto::ShowTabletResponse>, Status> {
        let tablets = self
            .ns
            .show_tablet()
            .into_iter()
            .map(|t| proto::TabletStatus {
                endpoint: t.endpoint,
                real_endpoint: t.real_endpoint.unwrap_or_default(),
                state: state_str(t.state).to_string(),
                age_ms: age_ms(t.ctime),
            })
            .collect();
        Ok(Response::new(proto::ShowTabletResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            tablets,
        }))
    }

    async fn show_op_status(
        &self,
        request: Request<proto::ShowOpStatusRequest>,
    ) -> Result<Response<proto::ShowOpStatusResponse>, Status> {
        let request = request.into_inner();
        let views = self.ns.show_op_status(
            (!request.db.is_empty()).then_some(request.db.as_str()),
            (!request.name.is_empty()).then_some(request.name.as_str()),
            u32::try_from(request.pid).ok().map(Pid),
        );
        let op_status = views
            .into_iter()
            .map(|v| proto::OpStatus {
                op_id: v.op_id.0,
                op_type: v.op_type.to_string(),
                status: v.status.to_string(),
                name: v.name,
                db: v.db,
                pid: v.pid.map(|p| p.0 as i32).unwrap_or(-1),
                start_time: v.start_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
                end_time: v.end_time.map(|t| t.to_rfc3339()).unwrap_or_default(),
                task_type: v
                    .current_task
                    .map(|t| t.to_string())
                    .unwrap_or_default(),
                vec_idx: v.vec_idx.unwrap_or(0),
            })
            .collect();
        Ok(Response::new(proto::ShowOpStatusResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            op_status,
        }))
    }

    async fn show_catalog(
        &self,
        _request: Request<proto::ShowCatalogRequest>,
    ) -> Result<Response<proto::ShowCatalogResponse>, Status> {
        Ok(Response::new(proto::ShowCatalogResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            version: self.ns.show_catalog_version(),
        }))
    }

    async fn make_snapshot_ns(
        &self,
        request: Request<proto::MakeSnapshotRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let response = match self.ns.make_snapshot_ns(
            &request.db,
            &request.name,
            Pid(request.pid),
            request.offset,
        ) {
            Ok(op_id) => op_ok(vec![op_id]),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn add_replica_ns(
        &self,
        request: Request<proto::ReplicaRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let pids: Vec<Pid> = request.pid.iter().copied().map(Pid).collect();
        let response = match self
            .ns
            .add_replica_ns(&request.db, &request.name, &pids, &request.endpoint)
        {
            Ok(op_ids) => op_ok(op_ids),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn del_replica_ns(
        &self,
        request: Request<proto::ReplicaRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let pids: Vec<Pid> = request.pid.iter().copied().map(Pid).collect();
        let response = match self
            .ns
            .del_replica_ns(&request.db, &request.name, &pids, &request.endpoint)
        {
            Ok(op_ids) => op_ok(op_ids),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn migrate(
        &self,
        request: Request<proto::MigrateRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let pids: Vec<Pid> = request.pid.iter().copied().map(Pid).collect();
        let response = match self.ns.migrate(
            &request.src_endpoint,
            &request.db,
            &request.name,
            &pids,
            &request.des_endpoint,
        ) {
            Ok(op_ids) => op_ok(op_ids),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn change_leader(
        &self,
        request: Request<proto::ChangeLeaderRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let candidate = (!request.candidate_leader.is_empty())
            .then(|| request.candidate_leader.clone());
        let response = match self.ns.change_leader(
            &request.db,
            &request.name,
            Pid(request.pid),
            candidate,
        ) {
            Ok(op_id) => op_ok(vec![op_id]),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn offline_endpoint(
        &self,
        request: Request<proto::OfflineEndpointRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let concurrency = if request.concurrency == 0 {
            1
        } else {
            request.concurrency
        };
        Ok(Response::new(general_from(
            self.ns.offline_endpoint(&request.endpoint, concurrency),
        )))
    }

    async fn recover_endpoint(
        &self,
        request: Request<proto::RecoverEndpointRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let concurrency = if request.concurrency == 0 {
            1
        } else {
            request.concurrency
        };
        Ok(Response::new(general_from(self.ns.recover_endpoint(
            &request.endpoint,
            request.need_restore,
            concurrency,
        ))))
    }

    async fn recover_table(
        &self,
        request: Request<proto::RecoverTableRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let response = match self.ns.recover_table(
            &request.db,
            &request.name,
            Pid(request.pid),
            &request.endpoint,
        ) {
            Ok(op_id) => op_ok(vec![op_id]),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn cancel_op(
        &self,
        request: Request<proto::CancelOpRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns.cancel_op(OpId(request.op_id)).await,
        )))
    }

    async fn set_table_partition(
        &self,
        request: Request<proto::SetTablePartitionRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let Some(partition) = request.table_partition.as_ref() else {
            return Ok(Response::new(general_err(&NsError::InvalidParameter {
                reason: "table_partition is required".to_string(),
            })));
        };
        Ok(Response::new(general_from(self.ns.set_table_partition(
            &request.db,
            &request.name,
            partition_from_proto(partition),
        ))))
    }

    async fn get_table_partition(
        &self,
        request: Request<proto::GetTablePartitionRequest>,
    ) -> Result<Response<proto::GetTablePartitionResponse>, Status> {
        let request = request.into_inner();
        let response = match self
            .ns
            .get_table_partition(&request.db, &request.name, Pid(request.pid))
        {
            Ok(partition) => proto::GetTablePartitionResponse {
                code: StatusCode::Ok.as_u32(),
                msg: "ok".to_string(),
                table_partition: Some(partition_to_proto(&partition)),
            },
            Err(e) => proto::GetTablePartitionResponse {
                code: e.status_code().as_u32(),
                msg: e.to_string(),
                table_partition: None,
            },
        };
        Ok(Response::new(response))
    }

    async fn conf_set(
        &self,
        request: Request<proto::ConfSetRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns.conf_set(&request.key, &request.value),
        )))
    }

    async fn conf_get(
        &self,
        request: Request<proto::ConfGetRequest>,
    ) -> Result<Response<proto::ConfGetResponse>, Status> {
        let request = request.into_inner();
        let conf: std::collections::HashMap<String, String> = self
            .ns
            .conf_get()
            .into_iter()
            .filter(|(key, _)| request.key.is_empty() || request.key == *key)
            .collect();
        Ok(Response::new(proto::ConfGetResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            conf,
        }))
    }

    async fn add_replica_cluster(
        &self,
        request: Request<proto::ClusterAddress>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let address = domain::ClusterAddress {
            alias: request.alias,
            metastore_endpoints: request.zk_endpoints,
            metastore_path: request.zk_path,
        };
        Ok(Response::new(general_from(
            self.ns.add_replica_cluster(&address).await,
        )))
    }

    async fn remove_replica_cluster(
        &self,
        request: Request<proto::RemoveReplicaClusterRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns.remove_replica_cluster(&request.alias).await,
        )))
    }

    async fn show_replica_cluster(
        &self,
        _request: Request<proto::ShowReplicaClusterRequest>,
    ) -> Result<Response<proto::ShowReplicaClusterResponse>, Status> {
        let replicas = self
            .ns
            .show_replica_cluster()
            .into_iter()
            .map(|c| proto::ReplicaClusterStatus {
                address: Some(proto::ClusterAddress {
                    alias: c.alias,
                    zk_endpoints: c.metastore_endpoints,
                    zk_path: c.metastore_path,
                }),
                state: state_str(c.state).to_string(),
                age_ms: age_ms(c.ctime),
            })
            .collect();
        Ok(Response::new(proto::ShowReplicaClusterResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            replicas,
        }))
    }

    async fn switch_mode(
        &self,
        request: Request<proto::SwitchModeRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match parse_mode(&request.mode) {
            Ok(mode) => general_from(self.ns.switch_mode(mode)),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn sync_table(
        &self,
        request: Request<proto::SyncTableRequest>,
    ) -> Result<Response<proto::OpResponse>, Status> {
        let request = request.into_inner();
        let pid = u32::try_from(request.pid).ok().map(Pid);
        let response = match self.ns.sync_table(
            &request.db,
            &request.name,
            &request.cluster_alias,
            pid,
        ) {
            Ok(op_ids) => op_ok(op_ids),
            Err(e) => op_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn create_procedure(
        &self,
        request: Request<proto::CreateProcedureRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let Some(sp) = request.sp_info else {
            return Ok(Response::new(general_err(&NsError::InvalidParameter {
                reason: "sp_info is required".to_string(),
            })));
        };
        let procedure = domain::ProcedureInfo {
            db: sp.db,
            name: sp.name,
            sql: sp.sql,
            tables: sp.tables.into_iter().map(|t| (t.db, t.name)).collect(),
        };
        Ok(Response::new(general_from(
            self.ns.create_procedure(procedure).await,
        )))
    }

    async fn drop_procedure(
        &self,
        request: Request<proto::DropProcedureRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns.drop_procedure(&request.db, &request.name).await,
        )))
    }

    async fn set_sdk_endpoint(
        &self,
        request: Request<proto::SetSdkEndpointRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        Ok(Response::new(general_from(
            self.ns
                .set_sdk_endpoint(&request.endpoint, &request.real_endpoint),
        )))
    }

    async fn show_sdk_endpoint(
        &self,
        _request: Request<proto::ShowSdkEndpointRequest>,
    ) -> Result<Response<proto::ShowSdkEndpointResponse>, Status> {
        Ok(Response::new(proto::ShowSdkEndpointResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            endpoints: self.ns.show_sdk_endpoint().into_iter().collect(),
        }))
    }

    async fn connect_zk(
        &self,
        _request: Request<proto::GeneralRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        Ok(Response::new(general_from(self.ns.connect_metastore())))
    }

    async fn dis_connect_zk(
        &self,
        _request: Request<proto::GeneralRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        Ok(Response::new(general_from(self.ns.disconnect_metastore())))
    }

    async fn add_replica_ns_remote(
        &self,
        request: Request<proto::AddReplicaNsRemoteRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match zone_from_proto(request.zone_info.as_ref()) {
            Ok(Some(zone)) => {
                let Some(task) = task_ref_from_proto(request.task_info.as_ref()) else {
                    return Ok(Response::new(general_err(&NsError::InvalidParameter {
                        reason: "task_info is required".to_string(),
                    })));
                };
                general_from(
                    self.ns
                        .handle_add_replica_ns_remote(
                            &request.db,
                            &request.name,
                            Pid(request.pid),
                            &zone,
                            task,
                        )
                        .map(|_| ()),
                )
            }
            Ok(None) => general_err(&NsError::ZoneInfoMismatch {
                reason: "zone_info is required".to_string(),
            }),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn get_task_status(
        &self,
        _request: Request<proto::GetTaskStatusRequest>,
    ) -> Result<Response<proto::GetTaskStatusResponse>, Status> {
        let tasks = self
            .ns
            .collect_remote_task_status()
            .iter()
            .map(task_entry_to_proto)
            .collect();
        Ok(Response::new(proto::GetTaskStatusResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            tasks,
        }))
    }

    async fn delete_op(
        &self,
        request: Request<proto::DeleteOpRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        // Forget the enrolled op id; nothing to do when it is already gone.
        self.ns.forget_remote_op(OpId(request.op_id));
        Ok(Response::new(general_ok()))
    }

    async fn make_replica_cluster(
        &self,
        request: Request<proto::MakeReplicaClusterRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match zone_from_proto(request.zone_info.as_ref()) {
            Ok(Some(zone)) => general_from(self.ns.make_replica_cluster(&zone)),
            Ok(None) => general_err(&NsError::ZoneInfoMismatch {
                reason: "zone_info is required".to_string(),
            }),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn remove_replica_cluster_by_ns(
        &self,
        request: Request<proto::MakeReplicaClusterRequest>,
    ) -> Result<Response<proto::GeneralResponse>, Status> {
        let request = request.into_inner();
        let response = match zone_from_proto(request.zone_info.as_ref()) {
            Ok(Some(zone)) => general_from(self.ns.remove_replica_cluster_by_ns(&zone)),
            Ok(None) => general_err(&NsError::ZoneInfoMismatch {
                reason: "zone_info is required".to_string(),
            }),
            Err(e) => general_err(&e),
        };
        Ok(Response::new(response))
    }

    async fn show_real_ep_map(
        &self,
        _request: Request<proto::ShowRealEpMapRequest>,
    ) -> Result<Response<proto::ShowRealEpMapResponse>, Status> {
        let map = self.ns.show_real_endpoint_map();
        Ok(Response::new(proto::ShowRealEpMapResponse {
            code: StatusCode::Ok.as_u32(),
            msg: "ok".to_string(),
            map,
        }))
    }
}
