//! Tablet RPC contract.
//!
//! The tablet server implementation is an external collaborator; this module
//! pins down the calls the coordinator issues against it. Task-driven calls
//! carry a [`TaskRef`] so the tablet can report asynchronous completion
//! through its task-status query, which the status poller reconciles.

use crate::error::NsError;
use async_trait::async_trait;
use metaplane::table::{ColumnDesc, ColumnKey, ProcedureInfo, TableInfo, TtlDesc, VersionPair};
use metaplane::types::{OpId, Pid, TaskStatus, TaskType, Tid};
use std::collections::HashMap;
use std::sync::Arc;

/// Identity of the coordinator task behind an RPC.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TaskRef {
    pub op_id: OpId,
    pub task_type: TaskType,
}

/// One entry of a tablet's task-status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskStatusEntry {
    pub op_id: OpId,
    pub task_type: TaskType,
    pub status: TaskStatus,
    pub endpoint: String,
}

/// One entry of a tablet's table-status response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableStatusEntry {
    pub tid: Tid,
    pub pid: Pid,
    pub is_leader: bool,
    pub offset: u64,
    pub record_cnt: u64,
    pub record_byte_size: u64,
    pub diskused: u64,
}

/// Term/offset pair reported by `get_term_pair`, plus whether the tablet
/// still holds the partition at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TermPairInfo {
    pub has_table: bool,
    pub term: u64,
    pub offset: u64,
}

/// Snapshot manifest summary reported by `get_manifest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManifestInfo {
    pub offset: u64,
}

/// Client contract against one tablet server.
#[async_trait]
pub trait TabletRpc: Send + Sync {
    /// Create one partition replica. `endpoints` carries the full replica
    /// set when `is_leader` is true so the leader can start replication.
    async fn create_table(
        &self,
        table: &TableInfo,
        pid: Pid,
        is_leader: bool,
        endpoints: &[String],
    ) -> Result<(), NsError>;

    async fn drop_table(&self, task: TaskRef, tid: Tid, pid: Pid) -> Result<(), NsError>;

    async fn load_table(&self, task: TaskRef, table: &TableInfo, pid: Pid) -> Result<(), NsError>;

    /// Flush the in-memory partition state to a snapshot file. `end_offset`
    /// of 0 lets the tablet pick its current offset.
    async fn make_snapshot(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        end_offset: u64,
    ) -> Result<(), NsError>;

    async fn pause_snapshot(&self, task: TaskRef, tid: Tid, pid: Pid) -> Result<(), NsError>;

    async fn recover_snapshot(&self, task: TaskRef, tid: Tid, pid: Pid) -> Result<(), NsError>;

    async fn send_snapshot(
        &self,
        task: TaskRef,
        tid: Tid,
        remote_tid: Tid,
        pid: Pid,
        dst: &str,
    ) -> Result<(), NsError>;

    /// Ask the leader to add `follower` to its replica set. `remote_tid` is
    /// set when the follower lives in a peer cluster under a different tid.
    async fn add_replica(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        follower: &str,
        remote_tid: Option<Tid>,
    ) -> Result<(), NsError>;

    async fn del_replica(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        follower: &str,
    ) -> Result<(), NsError>;

    /// Synchronous role switch; not task-driven.
    async fn change_role(
        &self,
        tid: Tid,
        pid: Pid,
        to_leader: bool,
        term: u64,
        followers: &[String],
    ) -> Result<(), NsError>;

    /// Detach from any leader under `term` and report the local offset.
    async fn follow_of_no_one(&self, tid: Tid, pid: Pid, term: u64) -> Result<u64, NsError>;

    async fn get_term_pair(&self, tid: Tid, pid: Pid) -> Result<TermPairInfo, NsError>;

    async fn get_manifest(&self, tid: Tid, pid: Pid) -> Result<ManifestInfo, NsError>;

    async fn delete_binlog(&self, tid: Tid, pid: Pid) -> Result<(), NsError>;

    async fn update_ttl(&self, tid: Tid, pid: Pid, ttl: &TtlDesc) -> Result<(), NsError>;

    async fn update_table_meta_for_add_field(
        &self,
        tid: Tid,
        column: &ColumnDesc,
        version: VersionPair,
    ) -> Result<(), NsError>;

    async fn add_index(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        column_key: &ColumnKey,
        cols: &[ColumnDesc],
    ) -> Result<(), NsError>;

    async fn dump_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        partition_num: u32,
        column_key: &ColumnKey,
        idx: u32,
    ) -> Result<(), NsError>;

    async fn send_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        pid_endpoints: &HashMap<u32, String>,
    ) -> Result<(), NsError>;

    async fn extract_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        partition_num: u32,
        column_key: &ColumnKey,
        idx: u32,
    ) -> Result<(), NsError>;

    async fn load_index_data(
        &self,
        task: TaskRef,
        tid: Tid,
        pid: Pid,
        partition_num: u32,
    ) -> Result<(), NsError>;

    /// All coordinator tasks this tablet knows about.
    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>, NsError>;

    /// Best-effort cancel of in-flight tasks belonging to `op_id`.
    async fn cancel_op(&self, op_id: OpId) -> Result<(), NsError>;

    /// Forget terminal task state for `op_id`.
    async fn delete_op(&self, op_id: OpId) -> Result<(), NsError>;

    async fn get_table_status(&self) -> Result<Vec<TableStatusEntry>, NsError>;

    async fn update_real_endpoint_map(
        &self,
        map: &HashMap<String, String>,
    ) -> Result<(), NsError>;

    async fn create_procedure(&self, procedure: &ProcedureInfo) -> Result<(), NsError>;

    async fn drop_procedure(&self, db: &str, name: &str) -> Result<(), NsError>;
}

/// Manufactures tablet client handles per endpoint, so deployments plug in
/// the wire transport and tests plug in mocks.
pub trait TabletProvider: Send + Sync {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn TabletRpc>, NsError>;
}
