//! Persistent operation (OP) records.
//!
//! An OP is a multi-step reconfiguration owned by the coordinator. Only the
//! payload is persisted; task lists are rebuilt from the payload by the
//! per-type factories on the nameserver side, so the wire shape stays stable
//! across task-chain refactors.

use crate::table::{ColumnDesc, ColumnKey, TableInfo};
use crate::types::{OpId, OpType, Pid, TaskStatus, Tid};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Op-type-specific payload. Field sets carry exactly what the task factory
/// needs to (re)build the task chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OpPayload {
    MakeSnapshot {
        tid: Tid,
        pid: Pid,
        endpoint: String,
        /// 0 lets the tablet pick its current offset.
        end_offset: u64,
    },
    AddReplica {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    /// Re-attach an existing follower; the variant chosen by the decision
    /// matrix is recorded in `op_type`.
    ReAddReplica {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    DelReplica {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    ChangeLeader {
        tid: Tid,
        pid: Pid,
        /// Follower endpoints eligible for election.
        candidates: Vec<String>,
        /// Explicit admin-chosen candidate, wins offset ties.
        candidate_leader: Option<String>,
        /// Filled in by the SelectLeader task and persisted so recovery can
        /// resume at the ChangeLeader task.
        chosen: Option<String>,
        term: u64,
        offset: u64,
    },
    OfflineReplica {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    RecoverTable {
        tid: Tid,
        pid: Pid,
        endpoint: String,
        /// Restore mode binds the leader late via OFFLINE_LEADER_ENDPOINT.
        need_restore: bool,
        concurrency: u32,
    },
    Migrate {
        tid: Tid,
        pid: Pid,
        src: String,
        dst: String,
    },
    ReLoadTable {
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
    UpdatePartitionStatus {
        tid: Tid,
        pid: Pid,
        endpoint: String,
        is_leader: bool,
        is_alive: bool,
    },
    AddIndex {
        tid: Tid,
        column_key: ColumnKey,
        cols: Vec<ColumnDesc>,
        skip_data: bool,
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
    /// Replicate one partition into a peer cluster with snapshot shipping.
    /// The peer-side tid and leader endpoint are resolved at dispatch.
    AddReplicaRemote {
        alias: String,
        tid: Tid,
        pid: Pid,
    },
    /// Replicate one partition into a peer cluster, binlog only.
    AddReplicaSimplyRemote {
        alias: String,
        tid: Tid,
        pid: Pid,
    },
    /// Mirror an AddReplicaNS onto the peer: the peer grows its own replica
    /// set for the partition and reports completion back under our op id.
    AddReplicaNsRemote {
        alias: String,
        pid: Pid,
    },
    DelReplicaRemote {
        alias: String,
        tid: Tid,
        pid: Pid,
        endpoint: String,
    },
}

/// Persistent OP record, stored under `/op/op_data/<op_id>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OpData {
    pub op_id: OpId,
    pub op_type: OpType,
    pub status: TaskStatus,
    pub name: String,
    pub db: String,
    pub pid: Option<Pid>,
    /// Queue index, persisted so recovery re-inserts into the same queue.
    pub vec_idx: Option<u32>,
    /// OP this one must run after (inserted immediately behind it).
    pub parent_id: Option<OpId>,
    /// Set on OPs mirrored from a leader cluster; completion is reported
    /// back into the leader's task map under this id.
    pub remote_op_id: Option<OpId>,
    pub for_replica_cluster: bool,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    pub payload: OpPayload,
    /// Index of the first unfinished task; advanced after each task
    /// completes and persisted before the task is popped.
    pub task_index: u32,
}

impl OpData {
    pub fn new(op_id: OpId, op_type: OpType, payload: OpPayload, name: &str, db: &str) -> Self {
        Self {
            op_id,
            op_type,
            status: TaskStatus::Inited,
            name: name.to_string(),
            db: db.to_string(),
            pid: None,
            vec_idx: None,
            parent_id: None,
            remote_op_id: None,
            for_replica_cluster: op_type.is_remote(),
            start_time: None,
            end_time: None,
            payload,
            task_index: 0,
        }
    }

    pub fn with_pid(mut self, pid: Pid) -> Self {
        self.pid = Some(pid);
        self
    }

    pub fn with_parent(mut self, parent_id: OpId) -> Self {
        self.parent_id = Some(parent_id);
        self
    }

    pub fn is_finished(&self) -> bool {
        self.status.is_terminal()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_op_data_round_trip() {
        let op = OpData::new(
            OpId(12),
            OpType::AddReplica,
            OpPayload::AddReplica {
                tid: Tid(3),
                pid: Pid(1),
                endpoint: "b:9527".to_string(),
            },
            "t1",
            "db1",
        )
        .with_pid(Pid(1));

        let json = serde_json::to_string(&op).unwrap();
        let back: OpData = serde_json::from_str(&json).unwrap();
        assert_eq!(op, back);
        assert_eq!(back.op_id, OpId(12));
        assert_eq!(back.pid, Some(Pid(1)));
        assert!(!back.is_finished());
        assert!(!back.for_replica_cluster);
    }

    #[test]
    fn test_remote_op_marks_replica_cluster() {
        let op = OpData::new(
            OpId(1),
            OpType::DropTableRemote,
            OpPayload::DropTableRemote {
                alias: "r".to_string(),
                name: "t1".to_string(),
                db: String::new(),
            },
            "t1",
            "",
        );
        assert!(op.for_replica_cluster);
    }

    #[test]
    fn test_parent_chain() {
        let op = OpData::new(
            OpId(9),
            OpType::RecoverTable,
            OpPayload::RecoverTable {
                tid: Tid(1),
                pid: Pid(0),
                endpoint: "a:9527".to_string(),
                need_restore: false,
                concurrency: 2,
            },
            "t1",
            "",
        )
        .with_parent(OpId(8));
        assert_eq!(op.parent_id, Some(OpId(8)));
    }
}
