//! Coordinator configuration.

use std::time::Duration;

/// Tunables for one nameserver instance. Defaults match a small production
/// deployment; tests shrink the intervals.
#[derive(Debug, Clone)]
pub struct NameServerConfig {
    /// Endpoint this coordinator publishes in the election node.
    pub endpoint: String,
    /// Metastore root path for this cluster; doubles as the zone name.
    pub root_path: String,
    /// Delay before a disappeared tablet is treated as offline.
    pub heartbeat_timeout: Duration,
    /// Period of the task-status poller (and queue-worker fallback tick).
    pub task_poll_interval: Duration,
    /// Period of the table-status aggregator.
    pub table_status_interval: Duration,
    /// Period of the replica-cluster drift check.
    pub cluster_check_interval: Duration,
    /// Hour of day (UTC) for the snapshot cron.
    pub make_snapshot_hour: u32,
    /// Period at which the snapshot cron checks whether its hour has come.
    pub snapshot_check_interval: Duration,
    /// Number of local per-partition FIFO queues.
    pub max_concurrency: usize,
    /// Extra queues reserved for replica-cluster OPs.
    pub replica_cluster_concurrency: usize,
    /// Bound on the in-memory done list.
    pub max_op_num: usize,
    /// Advisory execution timeout for one OP.
    pub op_execute_timeout: Duration,
    /// Max acceptable leader/follower offset gap for binlog sync checks.
    pub check_binlog_sync_offset_delta: u64,
    /// Period of the binlog-sync self-poll.
    pub check_binlog_sync_interval: Duration,
    /// Resolve real endpoints through `/map/names` and push the map around.
    pub use_name_indirection: bool,
    /// Initial auto-failover setting when the config node is absent.
    pub auto_failover: bool,
}

impl Default for NameServerConfig {
    fn default() -> Self {
        Self {
            endpoint: "127.0.0.1:7181".to_string(),
            root_path: "/metaplane".to_string(),
            heartbeat_timeout: Duration::from_secs(20),
            task_poll_interval: Duration::from_secs(1),
            table_status_interval: Duration::from_secs(2),
            cluster_check_interval: Duration::from_secs(10),
            make_snapshot_hour: 23,
            snapshot_check_interval: Duration::from_secs(60 * 10),
            max_concurrency: 8,
            replica_cluster_concurrency: 2,
            max_op_num: 1000,
            op_execute_timeout: Duration::from_secs(60 * 30),
            check_binlog_sync_offset_delta: 0,
            check_binlog_sync_interval: Duration::from_millis(500),
            use_name_indirection: false,
            auto_failover: false,
        }
    }
}

impl NameServerConfig {
    /// Total queue count: local range plus the replica-cluster range.
    pub fn queue_count(&self) -> usize {
        self.max_concurrency + self.replica_cluster_concurrency
    }
}
