//! Error type for nameserver operations.

use metaplane::StatusCode;
use metaplane::types::{OpId, Pid};
use metaplane_metastore::MetaError;
use std::fmt;

/// Main error type for coordinator operations. Every variant maps to a
/// stable [`StatusCode`] on the admin RPC surface.
#[derive(Debug, Clone, PartialEq)]
pub enum NsError {
    /// This coordinator is not the active leader (or not running yet).
    NotLeader,
    /// Partition-layout mutations are rejected while auto-failover is on.
    AutoFailoverEnabled,
    TableNotFound {
        db: String,
        name: String,
    },
    TableExists {
        db: String,
        name: String,
    },
    DatabaseNotFound {
        db: String,
    },
    DatabaseExists {
        db: String,
    },
    DatabaseNotEmpty {
        db: String,
    },
    PidNotFound {
        name: String,
        pid: Pid,
    },
    EndpointNotFound {
        endpoint: String,
    },
    TabletNotHealthy {
        endpoint: String,
    },
    NoAliveFollower {
        name: String,
        pid: Pid,
    },
    WrongColumnKey {
        reason: String,
    },
    InvalidParameter {
        reason: String,
    },
    InvalidTtl {
        reason: String,
    },
    TtlTypeMismatch {
        expected: String,
        got: String,
    },
    TooManyAddedColumns {
        max: usize,
    },
    SchemaVersionExhausted,
    IdxNameNotFound {
        index_name: String,
    },
    IdxNameExists {
        index_name: String,
    },
    ZoneInfoMismatch {
        reason: String,
    },
    ReplicaClusterExists {
        alias: String,
    },
    ReplicaClusterNotFound {
        alias: String,
    },
    ReplicaClusterNotHealthy {
        alias: String,
    },
    SnapshotOffsetMismatch {
        reason: String,
    },
    ProcedureExists {
        db: String,
        name: String,
    },
    ProcedureNotFound {
        db: String,
        name: String,
    },
    TableReferencedByProcedure {
        db: String,
        name: String,
        procedure: String,
    },
    CreateProcedureFailedOnTablet {
        endpoint: String,
        reason: String,
    },
    SdkEndpointDuplicate {
        endpoint: String,
    },
    OpNotFound {
        op_id: OpId,
    },
    CreateOpFailed {
        reason: String,
    },
    /// Metastore read failure.
    MetaRead(MetaError),
    /// Metastore write failure; in-memory state was not mutated.
    MetaWrite(MetaError),
    /// Tablet or peer RPC failure.
    Rpc {
        endpoint: String,
        context: String,
        reason: String,
    },
}

impl fmt::Display for NsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NsError::NotLeader => write!(f, "Nameserver is not leader"),
            NsError::AutoFailoverEnabled => {
                write!(f, "Operation rejected while auto-failover is enabled")
            }
            NsError::TableNotFound { db, name } => {
                write!(f, "Table '{name}' not found in db '{db}'")
            }
            NsError::TableExists { db, name } => {
                write!(f, "Table '{name}' already exists in db '{db}'")
            }
            NsError::DatabaseNotFound { db } => write!(f, "Database '{db}' not found"),
            NsError::DatabaseExists { db } => write!(f, "Database '{db}' already exists"),
            NsError::DatabaseNotEmpty { db } => write!(f, "Database '{db}' is not empty"),
            NsError::PidNotFound { name, pid } => {
                write!(f, "Partition {pid} not found for table '{name}'")
            }
            NsError::EndpointNotFound { endpoint } => {
                write!(f, "Endpoint '{endpoint}' not found")
            }
            NsError::TabletNotHealthy { endpoint } => {
                write!(f, "Tablet '{endpoint}' is not healthy")
            }
            NsError::NoAliveFollower { name, pid } => {
                write!(f, "No alive follower for table '{name}' partition {pid}")
            }
            NsError::WrongColumnKey { reason } => write!(f, "Wrong column key: {reason}"),
            NsError::InvalidParameter { reason } => write!(f, "Invalid parameter: {reason}"),
            NsError::InvalidTtl { reason } => write!(f, "Invalid ttl: {reason}"),
            NsError::TtlTypeMismatch { expected, got } => {
                write!(f, "Ttl type mismatch: table uses {expected}, got {got}")
            }
            NsError::TooManyAddedColumns { max } => {
                write!(f, "Added column limit ({max}) reached")
            }
            NsError::SchemaVersionExhausted => {
                write!(f, "Schema version id space exhausted (max 255)")
            }
            NsError::IdxNameNotFound { index_name } => {
                write!(f, "Index '{index_name}' not found")
            }
            NsError::IdxNameExists { index_name } => {
                write!(f, "Index '{index_name}' already exists")
            }
            NsError::ZoneInfoMismatch { reason } => write!(f, "Zone info mismatch: {reason}"),
            NsError::ReplicaClusterExists { alias } => {
                write!(f, "Replica cluster '{alias}' already exists")
            }
            NsError::ReplicaClusterNotFound { alias } => {
                write!(f, "Replica cluster '{alias}' not found")
            }
            NsError::ReplicaClusterNotHealthy { alias } => {
                write!(f, "Replica cluster '{alias}' is not healthy")
            }
            NsError::SnapshotOffsetMismatch { reason } => {
                write!(f, "Snapshot offset mismatch: {reason}")
            }
            NsError::ProcedureExists { db, name } => {
                write!(f, "Procedure '{db}.{name}' already exists")
            }
            NsError::ProcedureNotFound { db, name } => {
                write!(f, "Procedure '{db}.{name}' not found")
            }
            NsError::TableReferencedByProcedure {
                db,
                name,
                procedure,
            } => {
                write!(
                    f,
                    "Table '{db}.{name}' is referenced by procedure '{procedure}'"
                )
            }
            NsError::CreateProcedureFailedOnTablet { endpoint, reason } => {
                write!(f, "Create procedure failed on tablet '{endpoint}': {reason}")
            }
            NsError::SdkEndpointDuplicate { endpoint } => {
                write!(f, "Sdk endpoint '{endpoint}' already exists")
            }
            NsError::OpNotFound { op_id } => write!(f, "Operation {op_id} not found"),
            NsError::CreateOpFailed { reason } => write!(f, "Create op failed: {reason}"),
            NsError::MetaRead(err) => write!(f, "Metastore read failed: {err}"),
            NsError::MetaWrite(err) => write!(f, "Metastore write failed: {err}"),
            NsError::Rpc {
                endpoint,
                context,
                reason,
            } => write!(f, "Rpc to '{endpoint}' failed in {context}: {reason}"),
        }
    }
}

impl std::error::Error for NsError {}

impl NsError {
    pub fn rpc(endpoint: &str, context: &str, reason: impl fmt::Display) -> Self {
        NsError::Rpc {
            endpoint: endpoint.to_string(),
            context: context.to_string(),
            reason: reason.to_string(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            NsError::TableNotFound { .. }
                | NsError::DatabaseNotFound { .. }
                | NsError::PidNotFound { .. }
                | NsError::EndpointNotFound { .. }
                | NsError::IdxNameNotFound { .. }
                | NsError::ProcedureNotFound { .. }
                | NsError::ReplicaClusterNotFound { .. }
                | NsError::OpNotFound { .. }
        )
    }

    /// Stable numeric code surfaced to admin clients.
    pub fn status_code(&self) -> StatusCode {
        match self {
            NsError::NotLeader => StatusCode::NameserverIsNotLeader,
            NsError::AutoFailoverEnabled => StatusCode::AutoFailoverIsEnabled,
            NsError::TableNotFound { .. } => StatusCode::TableIsNotExist,
            NsError::TableExists { .. } => StatusCode::TableAlreadyExists,
            NsError::DatabaseNotFound { .. } => StatusCode::DatabaseIsNotExist,
            NsError::DatabaseExists { .. } => StatusCode::DatabaseAlreadyExists,
            NsError::DatabaseNotEmpty { .. } => StatusCode::DatabaseNotEmpty,
            NsError::PidNotFound { .. } => StatusCode::PidIsNotExist,
            NsError::EndpointNotFound { .. } => StatusCode::EndpointIsNotExist,
            NsError::TabletNotHealthy { .. } => StatusCode::TabletIsNotHealthy,
            NsError::NoAliveFollower { .. } => StatusCode::NoAliveFollower,
            NsError::WrongColumnKey { .. } => StatusCode::WrongColumnKey,
            NsError::InvalidParameter { .. } => StatusCode::InvalidParameter,
            NsError::InvalidTtl { .. } => StatusCode::InvalidTtl,
            NsError::TtlTypeMismatch { .. } => StatusCode::TtlTypeMismatch,
            NsError::TooManyAddedColumns { .. } => StatusCode::TooManyAddedColumns,
            NsError::SchemaVersionExhausted => StatusCode::SchemaVersionExhausted,
            NsError::IdxNameNotFound { .. } => StatusCode::IdxNameNotFound,
            NsError::IdxNameExists { .. } => StatusCode::IdxNameExists,
            NsError::ZoneInfoMismatch { .. } => StatusCode::ZoneInfoMismatch,
            NsError::ReplicaClusterExists { .. } => StatusCode::ReplicaClusterAlreadyExists,
            NsError::ReplicaClusterNotFound { .. } => StatusCode::ReplicaClusterNotFound,
            NsError::ReplicaClusterNotHealthy { .. } => StatusCode::ReplicaClusterNotHealthy,
            NsError::SnapshotOffsetMismatch { .. } => StatusCode::SnapshotOffsetMismatch,
            NsError::ProcedureExists { .. } => StatusCode::ProcedureAlreadyExists,
            NsError::ProcedureNotFound { .. } => StatusCode::ProcedureNotFound,
            NsError::TableReferencedByProcedure { .. } => StatusCode::TableReferencedByProcedure,
            NsError::CreateProcedureFailedOnTablet { .. } => {
                StatusCode::CreateProcedureFailedOnTablet
            }
            NsError::SdkEndpointDuplicate { .. } => StatusCode::SdkEndpointDuplicate,
            NsError::OpNotFound { .. } => StatusCode::OpStatusIsNotExist,
            NsError::CreateOpFailed { .. } => StatusCode::CreateOpFailed,
            NsError::MetaRead(_) => StatusCode::GetZkFailed,
            NsError::MetaWrite(_) => StatusCode::SetZkFailed,
            NsError::Rpc { .. } => StatusCode::Error,
        }
    }
}
