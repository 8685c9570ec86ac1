//! Core identifier and enum types for the control plane.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Globally monotonic table identifier, allocated from the metastore counter.
/// Never reused, even after the table is dropped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Tid(pub u32);

/// Partition identifier within a table, in `[0, partition_num)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct Pid(pub u32);

/// Globally monotonic operation identifier, allocated from the metastore counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OpId(pub u64);

impl From<u32> for Tid {
    fn from(id: u32) -> Self {
        Tid(id)
    }
}

impl From<Tid> for u32 {
    fn from(tid: Tid) -> Self {
        tid.0
    }
}

impl From<u32> for Pid {
    fn from(id: u32) -> Self {
        Pid(id)
    }
}

impl From<Pid> for u32 {
    fn from(pid: Pid) -> Self {
        pid.0
    }
}

impl From<u64> for OpId {
    fn from(id: u64) -> Self {
        OpId(id)
    }
}

impl From<OpId> for u64 {
    fn from(op_id: OpId) -> Self {
        op_id.0
    }
}

impl fmt::Display for Tid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tid-{}", self.0)
    }
}

impl fmt::Display for Pid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// Synthetic endpoint token meaning "look up the current leader in the catalog
/// at task dispatch". Must never be persisted as a real endpoint.
pub const OFFLINE_LEADER_ENDPOINT: &str = "OFFLINE_LEADER_ENDPOINT";

/// Lifecycle status shared by OPs and their tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Inited,
    Doing,
    Done,
    Failed,
    Canceled,
}

impl TaskStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            TaskStatus::Done | TaskStatus::Failed | TaskStatus::Canceled
        )
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TaskStatus::Inited => "Inited",
            TaskStatus::Doing => "Doing",
            TaskStatus::Done => "Done",
            TaskStatus::Failed => "Failed",
            TaskStatus::Canceled => "Canceled",
        };
        write!(f, "{s}")
    }
}

/// Liveness state of a tablet as tracked by the registry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TabletState {
    Healthy,
    Offline,
}

/// Role of this cluster relative to its replica clusters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ClusterMode {
    Normal,
    Leader,
    Follower,
}

impl fmt::Display for ClusterMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ClusterMode::Normal => "normal",
            ClusterMode::Leader => "leader",
            ClusterMode::Follower => "follower",
        };
        write!(f, "{s}")
    }
}

/// Logical column types supported by the table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ColumnType {
    Bool,
    SmallInt,
    Int,
    BigInt,
    Float,
    Double,
    Timestamp,
    Date,
    String,
}

impl ColumnType {
    /// Float and double columns cannot be indexed.
    pub fn is_float(self) -> bool {
        matches!(self, ColumnType::Float | ColumnType::Double)
    }
}

/// Time-to-live enforcement mode for a table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TtlType {
    Absolute,
    Latest,
    AbsAndLat,
    AbsOrLat,
}

/// Typed multi-step operation kinds owned by the coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum OpType {
    MakeSnapshot,
    AddReplica,
    ReAddReplica,
    ReAddReplicaNoSend,
    ReAddReplicaWithDrop,
    ReAddReplicaSimplify,
    DelReplica,
    ChangeLeader,
    OfflineReplica,
    RecoverTable,
    Migrate,
    ReLoadTable,
    UpdatePartitionStatus,
    AddIndex,
    CreateTableRemote,
    DropTableRemote,
    AddReplicaRemote,
    AddReplicaSimplyRemote,
    AddReplicaNsRemote,
    DelReplicaRemote,
}

impl OpType {
    /// Remote OPs replicate a catalog change to one peer cluster and are
    /// scheduled on the replica-cluster queue range.
    pub fn is_remote(self) -> bool {
        matches!(
            self,
            OpType::CreateTableRemote
                | OpType::DropTableRemote
                | OpType::AddReplicaRemote
                | OpType::AddReplicaSimplyRemote
                | OpType::AddReplicaNsRemote
                | OpType::DelReplicaRemote
        )
    }
}

impl fmt::Display for OpType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}

/// One step of an OP, typically one RPC to one tablet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TaskType {
    MakeSnapshot,
    PauseSnapshot,
    RecoverSnapshot,
    SendSnapshot,
    LoadTable,
    AddReplica,
    DelReplica,
    DropTable,
    SelectLeader,
    ChangeLeader,
    UpdateLeaderInfo,
    AddTableInfo,
    DelTableInfo,
    UpdateTableInfo,
    UpdatePartitionStatus,
    RecoverEndpointTable,
    CheckBinlogSyncProgress,
    TableSync,
    DumpIndexData,
    SendIndexData,
    AddIndexToTablet,
    ExtractIndexData,
    LoadIndexData,
    CreateTableRemote,
    DropTableRemote,
    AddReplicaRemote,
    AddReplicaSimplyRemote,
    AddReplicaNsRemote,
    DelReplicaRemote,
}

impl TaskType {
    /// Coordinator-local and synchronous tasks are forced back to `Inited`
    /// on coordinator recovery so they re-execute (they are idempotent and
    /// nothing else would ever finish them); tablet-driven tasks resume as
    /// `Doing` and rely on the next tablet status poll.
    pub fn rerun_on_recovery(self) -> bool {
        matches!(
            self,
            TaskType::SelectLeader
                | TaskType::ChangeLeader
                | TaskType::UpdateLeaderInfo
                | TaskType::AddTableInfo
                | TaskType::DelTableInfo
                | TaskType::UpdateTableInfo
                | TaskType::UpdatePartitionStatus
                | TaskType::RecoverEndpointTable
                | TaskType::CheckBinlogSyncProgress
                | TaskType::TableSync
                | TaskType::CreateTableRemote
                | TaskType::DropTableRemote
        )
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{self:?}")
    }
}
