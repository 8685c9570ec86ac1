//! Task primitives.
//!
//! A task is one step of an OP: usually one RPC to one tablet, sometimes a
//! coordinator-local catalog mutation, sometimes a fan-out to several
//! endpoints. The task carries its data as a tagged variant; a single
//! dispatcher on the nameserver executes it. RPC-driven tasks stay `Doing`
//! after a successful send and are finalized by the status poller; local
//! tasks complete synchronously.

use metaplane::table::{ColumnDesc, ColumnKey, TableInfo};
use metaplane::types::{OpId, OpType, Pid, TaskStatus, TaskType, Tid};
use std::collections::HashMap;

/// Bookkeeping shared by every task.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskInfo {
    pub op_id: OpId,
    pub op_type: OpType,
    pub task_type: TaskType,
    /// RPC target; empty for local tasks and fan-outs (see sub list).
    pub endpoint: String,
    pub status: TaskStatus,
    /// Set once the RPC has been handed to the tablet; from then on the
    /// terminal status arrives via the status poller.
    pub is_rpc_send: bool,
}

/// Per-endpoint status of one fan-out target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubTask {
    pub endpoint: String,
    pub status: TaskStatus,
}

/// Task-type-specific data, consumed by the dispatcher.
///
/// Endpoints may hold the synthetic `OFFLINE_LEADER_ENDPOINT` token or refer
/// to a peer cluster by alias; both are dereferenced at dispatch time, never
/// persisted.
#[derive(Debug, Clone, PartialEq)]
pub enum TaskKind {
    MakeSnapshot {
        tid: Tid,
        pid: Pid,
        endpoint: String,
        end_offset: u64,
    },
    PauseSnapshot {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    RecoverSnapshot {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    SendSnapshot {
        tid: Tid,
        pid: Pid,
        src: String,
        dst: String,
        /// Peer alias when the destination lives in a replica cluster; the
        /// remote tid is resolved at dispatch.
        remote: Option<String>,
    },
    LoadTable {
        name: String,
        db: String,
        pid: Pid,
        endpoint: String,
    },
    AddReplica {
        tid: Tid,
        pid: Pid,
        leader: String,
        /// Empty when `remote` is set; the peer leader endpoint is resolved
        /// at dispatch.
        follower: String,
        remote: Option<String>,
    },
    DelReplica {
        tid: Tid,
        pid: Pid,
        leader: String,
        follower: String,
    },
    DropTable {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    SelectLeader {
        name: String,
        db: String,
        tid: Tid,
        pid: Pid,
        candidates: Vec<String>,
        candidate_leader: Option<String>,
    },
    ChangeLeader {
        name: String,
        db: String,
        tid: Tid,
        pid: Pid,
    },
    UpdateLeaderInfo {
        name: String,
        db: String,
        pid: Pid,
    },
    AddTableInfo {
        name: String,
        db: String,
        pid: Pid,
        endpoint: String,
        /// Peer alias when recording a remote replica.
        remote: Option<String>,
    },
    DelTableInfo {
        name: String,
        db: String,
        pid: Pid,
        endpoint: String,
        remote: Option<String>,
    },
    /// Migrate bookkeeping: drop `src` from the replica set, mark `dst`
    /// alive, persist.
    UpdateTableInfo {
        name: String,
        db: String,
        pid: Pid,
        src: String,
        dst: String,
    },
    UpdatePartitionStatus {
        name: String,
        db: String,
        pid: Pid,
        endpoint: String,
        is_leader: bool,
        is_alive: bool,
    },
    /// Decision logic for recovering one partition on one endpoint; may
    /// enqueue a follow-up OP.
    RecoverEndpointTable {
        name: String,
        db: String,
        pid: Pid,
        endpoint: String,
        need_restore: bool,
        concurrency: u32,
    },
    /// Self-rescheduling poll until the follower catches up with the leader
    /// (or its replica meta disappears).
    CheckBinlogSyncProgress {
        name: String,
        db: String,
        pid: Pid,
        follower: String,
        offset_delta: u64,
    },
    /// N-way barrier on the op_sync counter; the last writer commits the
    /// column key into the catalog.
    TableSync {
        tid: Tid,
        name: String,
        db: String,
        column_key: ColumnKey,
    },
    DumpIndexData {
        tid: Tid,
        partition_num: u32,
        column_key: ColumnKey,
        idx: u32,
        targets: Vec<(Pid, String)>,
    },
    SendIndexData {
        tid: Tid,
        targets: Vec<(Pid, String)>,
        pid_leaders: HashMap<u32, String>,
    },
    AddIndexToTablet {
        tid: Tid,
        column_key: ColumnKey,
        cols: Vec<ColumnDesc>,
        targets: Vec<(Pid, String)>,
    },
    ExtractIndexData {
        tid: Tid,
        partition_num: u32,
        column_key: ColumnKey,
        idx: u32,
        targets: Vec<(Pid, String)>,
    },
    LoadIndexData {
        tid: Tid,
        partition_num: u32,
        targets: Vec<(Pid, String)>,
    },
    CreateTableRemote {
        alias: String,
        table_info: TableInfo,
    },
    DropTableRemote {
        alias: String,
        name: String,
        db: String,
    },
    /// Ask the peer to run its own AddReplicaNS; completion arrives through
    /// the peer task-status poll.
    AddReplicaNsRemote {
        alias: String,
        name: String,
        db: String,
        pid: Pid,
    },
}

/// One step of an OP.
#[derive(Debug, Clone, PartialEq)]
pub struct Task {
    pub info: TaskInfo,
    pub kind: TaskKind,
    /// Fan-out targets; parent completes when all are Done, fails when any
    /// Failed.
    pub sub: Vec<SubTask>,
}

impl Task {
    pub fn new(
        op_id: OpId,
        op_type: OpType,
        task_type: TaskType,
        endpoint: &str,
        kind: TaskKind,
    ) -> Self {
        Self {
            info: TaskInfo {
                op_id,
                op_type,
                task_type,
                endpoint: endpoint.to_string(),
                status: TaskStatus::Inited,
                is_rpc_send: false,
            },
            kind,
            sub: Vec::new(),
        }
    }

    /// Attach fan-out sub-task bookkeeping for the distinct endpoints in
    /// `targets`.
    pub fn with_fanout(mut self, targets: &[(Pid, String)]) -> Self {
        let mut endpoints: Vec<&String> = targets.iter().map(|(_, ep)| ep).collect();
        endpoints.sort();
        endpoints.dedup();
        self.sub = endpoints
            .into_iter()
            .map(|ep| SubTask {
                endpoint: ep.clone(),
                status: TaskStatus::Inited,
            })
            .collect();
        self
    }

    pub fn is_fanout(&self) -> bool {
        !self.sub.is_empty()
    }

    /// Effective status: fan-out parents aggregate their children.
    pub fn effective_status(&self) -> TaskStatus {
        if !self.is_fanout() {
            return self.info.status;
        }
        if matches!(self.info.status, TaskStatus::Canceled | TaskStatus::Failed) {
            return self.info.status;
        }
        if self.sub.iter().any(|s| s.status == TaskStatus::Failed) {
            TaskStatus::Failed
        } else if self.sub.iter().all(|s| s.status == TaskStatus::Done) {
            TaskStatus::Done
        } else {
            self.info.status
        }
    }

    pub fn cancel(&mut self) {
        self.info.status = TaskStatus::Canceled;
        for sub in &mut self.sub {
            if !sub.status.is_terminal() {
                sub.status = TaskStatus::Canceled;
            }
        }
    }
}
