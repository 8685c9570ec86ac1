//! Stable numeric status codes returned on every admin RPC.
//!
//! Client libraries depend on these numeric values; variants may be added at
//! the end but existing values must never change.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[repr(u32)]
pub enum StatusCode {
    Ok = 0,
    Error = 1,
    NameserverIsNotLeader = 2,
    TableIsNotExist = 3,
    TableAlreadyExists = 4,
    TabletIsNotHealthy = 5,
    PidIsNotExist = 6,
    AutoFailoverIsEnabled = 7,
    CreateOpFailed = 8,
    SetZkFailed = 9,
    GetZkFailed = 10,
    InvalidParameter = 11,
    ZoneInfoMismatch = 12,
    WrongColumnKey = 13,
    DatabaseIsNotExist = 14,
    DatabaseAlreadyExists = 15,
    DatabaseNotEmpty = 16,
    OpStatusIsNotExist = 17,
    IdxNameNotFound = 18,
    IdxNameExists = 19,
    TtlTypeMismatch = 20,
    InvalidTtl = 21,
    ReplicaClusterAlreadyExists = 22,
    ReplicaClusterNotFound = 23,
    ReplicaClusterNotHealthy = 24,
    SnapshotOffsetMismatch = 25,
    CreateProcedureFailedOnTablet = 26,
    ProcedureAlreadyExists = 27,
    ProcedureNotFound = 28,
    TableReferencedByProcedure = 29,
    SdkEndpointDuplicate = 30,
    TooManyAddedColumns = 31,
    SchemaVersionExhausted = 32,
    EndpointIsNotExist = 33,
    LeaderIsAlive = 34,
    NoAliveFollower = 35,
    OperationCanceled = 36,
}

impl StatusCode {
    pub fn as_u32(self) -> u32 {
        self as u32
    }

    pub fn is_ok(self) -> bool {
        self == StatusCode::Ok
    }
}

impl From<StatusCode> for u32 {
    fn from(code: StatusCode) -> Self {
        code as u32
    }
}

impl fmt::Display for StatusCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}({})", self, *self as u32)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_contract_is_stable() {
        // Spot checks for the values clients hard-code.
        assert_eq!(StatusCode::Ok.as_u32(), 0);
        assert_eq!(StatusCode::NameserverIsNotLeader.as_u32(), 2);
        assert_eq!(StatusCode::TableIsNotExist.as_u32(), 3);
        assert_eq!(StatusCode::AutoFailoverIsEnabled.as_u32(), 7);
        assert_eq!(StatusCode::SetZkFailed.as_u32(), 9);
        assert_eq!(StatusCode::ZoneInfoMismatch.as_u32(), 12);
        assert_eq!(StatusCode::SdkEndpointDuplicate.as_u32(), 30);
    }

    #[test]
    fn test_display() {
        assert_eq!(StatusCode::Ok.to_string(), "Ok(0)");
        assert_eq!(StatusCode::WrongColumnKey.to_string(), "WrongColumnKey(13)");
    }
}
