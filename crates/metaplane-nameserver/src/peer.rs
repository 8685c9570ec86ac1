//! Peer nameserver RPC contract.
//!
//! A replica cluster is driven through its own active coordinator. The
//! handle is re-resolved whenever the peer's election node changes, so the
//! manager always talks to the peer's current leader.

use crate::error::NsError;
use crate::tablet::{TaskRef, TaskStatusEntry};
use async_trait::async_trait;
use metaplane::table::{TableInfo, ZoneInfo};
use metaplane::types::{OpId, Pid};
use std::collections::HashMap;
use std::sync::Arc;

/// Client contract against a peer cluster's active coordinator. Mutating
/// calls carry this cluster's [`ZoneInfo`] for authorization and a
/// [`TaskRef`] the peer enrolls so completion can be polled.
#[async_trait]
pub trait PeerNameserver: Send + Sync {
    async fn show_all_table(&self) -> Result<Vec<TableInfo>, NsError>;

    /// Create `table` on the peer; the peer allocates its own tid.
    async fn create_table_remote(
        &self,
        table: &TableInfo,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError>;

    async fn drop_table_remote(
        &self,
        db: &str,
        name: &str,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError>;

    /// Mirror an AddReplicaNS: the peer grows its own replica set for the
    /// partition on a tablet of its choosing, enrolling the resulting OP
    /// under `task.op_id` so completion can be polled.
    async fn add_replica_ns_remote(
        &self,
        db: &str,
        name: &str,
        pid: Pid,
        zone: &ZoneInfo,
        task: TaskRef,
    ) -> Result<(), NsError>;

    /// Statuses of the peer's OPs that were enrolled on behalf of this
    /// cluster (matched by the remote op id).
    async fn get_task_status(&self) -> Result<Vec<TaskStatusEntry>, NsError>;

    async fn delete_op(&self, op_id: OpId) -> Result<(), NsError>;

    /// Switch the peer into follower mode under our zone (or back out).
    async fn make_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError>;

    async fn remove_replica_cluster(&self, zone: &ZoneInfo) -> Result<(), NsError>;

    async fn show_real_endpoint_map(&self) -> Result<HashMap<String, String>, NsError>;
}

/// Manufactures peer coordinator handles and peer metastore sessions.
pub trait PeerProvider: Send + Sync {
    /// Open a session against the peer cluster's metastore, used to watch
    /// the peer's election node.
    fn connect_metastore(
        &self,
        address: &metaplane::table::ClusterAddress,
    ) -> Result<std::sync::Arc<dyn metaplane_metastore::MetaStore>, NsError>;

    fn connect(&self, endpoint: &str) -> Result<Arc<dyn PeerNameserver>, NsError>;
}
