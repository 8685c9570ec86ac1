//! metaplane core data model.
//!
//! This crate holds the records shared between the name server, the metastore
//! layer, and clients: table and partition metadata, operation (OP) payloads,
//! and the stable status-code contract returned on every admin RPC.

pub mod codes;
pub mod op;
pub mod table;
pub mod telemetry;
pub mod types;

pub use codes::StatusCode;
pub use op::{OpData, OpPayload};
pub use table::{
    ClusterAddress, ColumnDesc, ColumnKey, CompressType, PartitionMeta, ProcedureInfo,
    RemotePartitionMeta, TableInfo, TablePartition, TermPair, TtlDesc, VersionPair, ZoneInfo,
};
pub use types::{
    ClusterMode, ColumnType, OFFLINE_LEADER_ENDPOINT, OpId, OpType, Pid, TabletState, TaskStatus,
    TaskType, Tid, TtlType,
};

// Re-export logging macros for consistent usage across the workspace
pub use log::{debug, error, info, trace, warn};
