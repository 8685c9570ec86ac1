//! Table, partition, and procedure metadata records.
//!
//! These are the canonical catalog shapes persisted in the metastore and
//! exchanged with tablets and peer clusters.

use crate::types::{ColumnType, Pid, Tid, TtlType};
use serde::{Deserialize, Serialize};

/// A column definition in the table schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDesc {
    pub name: String,
    pub col_type: ColumnType,
    /// Marks the column as an index key when no explicit column keys are given.
    pub is_index: bool,
    /// Marks the column usable as a time-series timestamp for indexes.
    pub is_ts_col: bool,
    pub not_null: bool,
}

impl ColumnDesc {
    pub fn new(name: &str, col_type: ColumnType) -> Self {
        Self {
            name: name.to_string(),
            col_type,
            is_index: false,
            is_ts_col: false,
            not_null: false,
        }
    }

    pub fn index(mut self) -> Self {
        self.is_index = true;
        self
    }
}

/// A secondary index: a set of key columns plus an optional ts column.
/// `flag == 0` means active; `flag == 1` means soft-deleted (retained for
/// history so older readers can still resolve the name).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnKey {
    pub index_name: String,
    pub col_names: Vec<String>,
    pub ts_name: Option<String>,
    pub flag: u32,
}

impl ColumnKey {
    pub fn is_deleted(&self) -> bool {
        self.flag != 0
    }
}

/// Time-to-live descriptor. `abs_ttl_min` is minutes for the absolute bound,
/// `lat_ttl` is a record count for the latest-N bound.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TtlDesc {
    pub ttl_type: TtlType,
    pub abs_ttl_min: u64,
    pub lat_ttl: u64,
}

impl Default for TtlDesc {
    fn default() -> Self {
        Self {
            ttl_type: TtlType::Absolute,
            abs_ttl_min: 0,
            lat_ttl: 0,
        }
    }
}

/// One schema version: version id and the total field count at that version.
/// Ids increase strictly by one per successful AddField, capped at 255.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct VersionPair {
    pub id: u32,
    pub field_count: u32,
}

/// Local replica state for one partition on one tablet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PartitionMeta {
    pub endpoint: String,
    pub is_leader: bool,
    pub is_alive: bool,
    pub offset: u64,
    pub record_cnt: u64,
    pub record_byte_size: u64,
    pub diskused: u64,
    pub tablet_has_partition: bool,
}

impl PartitionMeta {
    pub fn new(endpoint: &str, is_leader: bool) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            is_leader,
            is_alive: true,
            offset: 0,
            record_cnt: 0,
            record_byte_size: 0,
            diskused: 0,
            tablet_has_partition: true,
        }
    }
}

/// Replica state mirrored in a peer cluster.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePartitionMeta {
    pub alias: String,
    pub endpoint: String,
    pub remote_tid: Tid,
    pub is_leader: bool,
    pub is_alive: bool,
}

/// Leader-term to first-offset-of-term mapping, appended at each leader
/// change. Used for follower catch-up correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermPair {
    pub term: u64,
    pub offset: u64,
}

/// One shard of a table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TablePartition {
    pub pid: Pid,
    pub partition_meta: Vec<PartitionMeta>,
    pub remote_partition_meta: Vec<RemotePartitionMeta>,
    pub term_offset: Vec<TermPair>,
}

impl TablePartition {
    pub fn new(pid: Pid) -> Self {
        Self {
            pid,
            partition_meta: Vec::new(),
            remote_partition_meta: Vec::new(),
            term_offset: Vec::new(),
        }
    }

    /// The alive leader replica, if one exists. At most one meta may be
    /// leader and alive at a time; without one the partition cannot serve
    /// writes.
    pub fn alive_leader(&self) -> Option<&PartitionMeta> {
        self.partition_meta
            .iter()
            .find(|m| m.is_leader && m.is_alive)
    }

    pub fn replica(&self, endpoint: &str) -> Option<&PartitionMeta> {
        self.partition_meta.iter().find(|m| m.endpoint == endpoint)
    }

    pub fn replica_mut(&mut self, endpoint: &str) -> Option<&mut PartitionMeta> {
        self.partition_meta
            .iter_mut()
            .find(|m| m.endpoint == endpoint)
    }

    pub fn alive_replica_count(&self) -> usize {
        self.partition_meta.iter().filter(|m| m.is_alive).count()
    }

    /// Last recorded term, 0 before the first election.
    pub fn current_term(&self) -> u64 {
        self.term_offset.last().map(|t| t.term).unwrap_or(0)
    }
}

/// Compression applied to table data on tablets (metadata only here).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompressType {
    NoCompress,
    Snappy,
}

/// Canonical table metadata. `db` is empty for the default database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TableInfo {
    pub tid: Tid,
    pub name: String,
    pub db: String,
    pub column_desc: Vec<ColumnDesc>,
    pub column_keys: Vec<ColumnKey>,
    pub partition_key: Vec<String>,
    pub ttl: TtlDesc,
    pub partition_num: u32,
    pub replica_num: u32,
    pub compress_type: CompressType,
    pub seg_cnt: u32,
    pub format_version: u32,
    /// Appended by AddField, never removed.
    pub added_columns: Vec<ColumnDesc>,
    /// Schema evolution history; ids strictly increasing.
    pub version_pairs: Vec<VersionPair>,
    pub table_partition: Vec<TablePartition>,
}

impl TableInfo {
    pub fn partition(&self, pid: Pid) -> Option<&TablePartition> {
        self.table_partition.iter().find(|p| p.pid == pid)
    }

    pub fn partition_mut(&mut self, pid: Pid) -> Option<&mut TablePartition> {
        self.table_partition.iter_mut().find(|p| p.pid == pid)
    }

    /// Column lookup across the original schema and added columns.
    pub fn column(&self, name: &str) -> Option<&ColumnDesc> {
        self.column_desc
            .iter()
            .chain(self.added_columns.iter())
            .find(|c| c.name == name)
    }

    pub fn active_column_key(&self, index_name: &str) -> Option<&ColumnKey> {
        self.column_keys
            .iter()
            .find(|ck| ck.index_name == index_name && !ck.is_deleted())
    }

    /// Highest term recorded across all partitions of this table.
    pub fn max_term(&self) -> u64 {
        self.table_partition
            .iter()
            .map(|p| p.current_term())
            .max()
            .unwrap_or(0)
    }

    pub fn field_count(&self) -> u32 {
        (self.column_desc.len() + self.added_columns.len()) as u32
    }

    pub fn next_schema_version(&self) -> u32 {
        self.version_pairs.last().map(|v| v.id + 1).unwrap_or(1)
    }
}

/// Stored procedure metadata; the payload is snappy-compressed in the
/// metastore.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProcedureInfo {
    pub db: String,
    pub name: String,
    pub sql: String,
    /// Tables referenced by the procedure body, as (db, table) pairs.
    pub tables: Vec<(String, String)>,
}

/// Identity and authorization stamp carried on cross-cluster mutations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ZoneInfo {
    pub zone_name: String,
    pub zone_term: u64,
    pub replica_alias: String,
    pub mode: crate::types::ClusterMode,
}

/// Address of a replica cluster's metastore, persisted under
/// `/cluster/replica/<alias>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClusterAddress {
    pub alias: String,
    pub metastore_endpoints: Vec<String>,
    pub metastore_path: String,
}
