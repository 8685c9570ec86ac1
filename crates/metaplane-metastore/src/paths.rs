//! Fixed node layout under the cluster root.
//!
//! Every persistent structure the nameserver owns lives at a well-known path
//! relative to the configured root; this module is the single place those
//! paths are spelled.

use metaplane::types::{OpId, Tid};

/// Path builder rooted at the cluster's metastore prefix.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    root: String,
}

impl Paths {
    pub fn new(root: &str) -> Self {
        Self {
            root: root.trim_end_matches('/').to_string(),
        }
    }

    pub fn root(&self) -> &str {
        &self.root
    }

    /// Coordinator election lock node; value is the active leader endpoint.
    pub fn leader(&self) -> String {
        format!("{}/leader", self.root)
    }

    /// Parent of the per-tablet ephemeral liveness nodes.
    pub fn nodes(&self) -> String {
        format!("{}/nodes", self.root)
    }

    pub fn node(&self, endpoint: &str) -> String {
        format!("{}/nodes/{}", self.root, endpoint)
    }

    /// Name-indirection map: logical endpoint -> real endpoint.
    pub fn name_map(&self, endpoint: &str) -> String {
        format!("{}/map/names/{}", self.root, endpoint)
    }

    pub fn sdk_endpoint_root(&self) -> String {
        format!("{}/map/sdkendpoints", self.root)
    }

    pub fn sdk_endpoint(&self, endpoint: &str) -> String {
        format!("{}/map/sdkendpoints/{}", self.root, endpoint)
    }

    /// Monotonic counter for tid allocation.
    pub fn table_index(&self) -> String {
        format!("{}/table/table_index", self.root)
    }

    /// Monotonic counter for leader terms.
    pub fn term(&self) -> String {
        format!("{}/table/term", self.root)
    }

    /// Default-database table metadata, keyed by table name.
    pub fn table_data(&self, name: &str) -> String {
        format!("{}/table/table_data/{}", self.root, name)
    }

    pub fn table_data_root(&self) -> String {
        format!("{}/table/table_data", self.root)
    }

    /// Named-database table metadata, keyed by tid.
    pub fn db_table_data(&self, tid: Tid) -> String {
        format!("{}/table/db_table_data/{}", self.root, tid.0)
    }

    pub fn db_table_data_root(&self) -> String {
        format!("{}/table/db_table_data", self.root)
    }

    /// Incremented on every catalog change; watchers re-fetch.
    pub fn notify(&self) -> String {
        format!("{}/table/notify", self.root)
    }

    pub fn db(&self, name: &str) -> String {
        format!("{}/db/{}", self.root, name)
    }

    pub fn db_root(&self) -> String {
        format!("{}/db", self.root)
    }

    pub fn procedure(&self, db: &str, name: &str) -> String {
        format!("{}/store_procedure/db_sp_data/{}.{}", self.root, db, name)
    }

    pub fn procedure_root(&self) -> String {
        format!("{}/store_procedure/db_sp_data", self.root)
    }

    /// Monotonic counter for op_id allocation.
    pub fn op_index(&self) -> String {
        format!("{}/op/op_index", self.root)
    }

    pub fn op_data(&self, op_id: OpId) -> String {
        format!("{}/op/op_data/{}", self.root, op_id.0)
    }

    pub fn op_data_root(&self) -> String {
        format!("{}/op/op_data", self.root)
    }

    /// Barrier counter for table sync tasks.
    pub fn op_sync(&self, tid: Tid) -> String {
        format!("{}/op/op_sync/{}", self.root, tid.0)
    }

    pub fn auto_failover(&self) -> String {
        format!("{}/config/auto_failover", self.root)
    }

    pub fn replica_cluster(&self, alias: &str) -> String {
        format!("{}/cluster/replica/{}", self.root, alias)
    }

    pub fn replica_cluster_root(&self) -> String {
        format!("{}/cluster/replica", self.root)
    }

    /// Zone info stored while this cluster runs in follower mode.
    pub fn follower(&self) -> String {
        format!("{}/cluster/follower", self.root)
    }
}
