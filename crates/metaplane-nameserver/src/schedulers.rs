//! Background schedulers.
//!
//! Periodic loops owned by the active coordinator: tablet task-status
//! polling (which drives OP progress), table-status aggregation into the
//! catalog, replica-cluster drift checking, the daily snapshot cron, the
//! real-endpoint map push, and the metastore session heartbeat.

use crate::nameserver::NameServer;
use crate::tablet::TaskStatusEntry;
use chrono::{NaiveDate, Timelike, Utc};
use metaplane::op::OpPayload;
use metaplane::types::{OpType, Pid, TaskStatus, Tid};
use std::sync::Arc;
use std::sync::atomic::Ordering;

impl NameServer {
    /// Fetch task statuses from every healthy tablet and fold them into the
    /// engine; force-fail tasks stranded on long-offline tablets. A rolling
    /// version guards against racing pollers applying stale batches.
    pub(crate) async fn run_task_status_poller(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.task_poll_interval).await;
            if self.is_stopped() {
                break;
            }
            if !self.is_running() {
                continue;
            }
            let version = self.task_rpc_version.fetch_add(1, Ordering::SeqCst) + 1;

            let clients = {
                let core = self.core.lock();
                core.registry.healthy_clients()
            };
            let mut entries: Vec<TaskStatusEntry> = Vec::new();
            for (endpoint, client) in clients {
                match client.get_task_status().await {
                    Ok(batch) => {
                        for mut entry in batch {
                            if entry.endpoint.is_empty() {
                                entry.endpoint = endpoint.clone();
                            }
                            entries.push(entry);
                        }
                    }
                    Err(e) => {
                        tracing::debug!(%endpoint, error = %e, "task status poll failed");
                    }
                }
            }
            if self.task_rpc_version.load(Ordering::SeqCst) != version {
                // A newer poll is already in flight; drop this stale batch.
                continue;
            }
            let changed = self.apply_task_statuses(&entries);
            self.poll_peer_task_status().await;
            self.force_fail_offline_tasks();
            if changed > 0 {
                self.worker_notify.notify_one();
            }
        }
    }

    /// Tasks stuck Doing on a tablet that has been offline past the
    /// heartbeat window will never report back; fail them.
    fn force_fail_offline_tasks(&self) {
        let now = Utc::now();
        let mut core = self.core.lock();
        let offline: Vec<String> = core
            .registry
            .iter()
            .filter(|t| !t.is_healthy())
            .map(|t| t.endpoint.clone())
            .filter(|ep| {
                core.registry
                    .offline_longer_than(ep, self.config.heartbeat_timeout, now)
            })
            .collect();
        if offline.is_empty() {
            return;
        }
        let mut failed = 0;
        for idx in 0..core.engine.queue_count() {
            if let Some(op) = core.engine.head_mut(idx) {
                if let Some(task) = op.current_task_mut() {
                    if task.info.status == TaskStatus::Doing && task.info.is_rpc_send {
                        if task.is_fanout() {
                            for sub in &mut task.sub {
                                if sub.status == TaskStatus::Doing
                                    && offline.contains(&sub.endpoint)
                                {
                                    sub.status = TaskStatus::Failed;
                                    failed += 1;
                                }
                            }
                        } else if offline.contains(&task.info.endpoint) {
                            task.info.status = TaskStatus::Failed;
                            failed += 1;
                        }
                    }
                }
            }
        }
        if failed > 0 {
            tracing::warn!(failed, ?offline, "force-failed tasks on offline tablets");
            self.worker_notify.notify_one();
        }
    }

    /// Pull per-partition statistics from every healthy tablet into the
    /// catalog's partition metas (offsets drive binlog sync checks and the
    /// snapshot cron).
    pub(crate) async fn run_table_status_aggregator(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.table_status_interval).await;
            if self.is_stopped() {
                break;
            }
            if !self.is_running() {
                continue;
            }
            let clients = {
                let core = self.core.lock();
                core.registry.healthy_clients()
            };
            for (endpoint, client) in clients {
                let statuses = match client.get_table_status().await {
                    Ok(statuses) => statuses,
                    Err(e) => {
                        tracing::debug!(%endpoint, error = %e, "table status poll failed");
                        continue;
                    }
                };
                let mut core = self.core.lock();
                for status in statuses {
                    let Some(table) = core.catalog.by_tid_mut(status.tid) else {
                        continue;
                    };
                    let Some(part) = table.partition_mut(status.pid) else {
                        continue;
                    };
                    if let Some(meta) = part.replica_mut(&endpoint) {
                        meta.offset = status.offset;
                        meta.record_cnt = status.record_cnt;
                        meta.record_byte_size = status.record_byte_size;
                        meta.diskused = status.diskused;
                        meta.tablet_has_partition = true;
                    }
                }
            }
        }
    }

    /// Replica-cluster drift check.
    pub(crate) async fn run_cluster_checker(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.cluster_check_interval).await;
            if self.is_stopped() {
                break;
            }
            if !self.is_running() {
                continue;
            }
            let has_peers = {
                let core = self.core.lock();
                !core.replicas.is_empty()
            };
            if has_peers {
                self.check_cluster_info().await;
            }
        }
    }

    /// Once a day at the configured hour, snapshot every leader partition
    /// with an end offset no cluster has yet to replicate: the minimum of
    /// the local leader offset and every peer replica's reported offset.
    /// Snapshotting past a lagging peer would destroy its binlog catch-up.
    pub(crate) async fn run_snapshot_cron(self: Arc<Self>) {
        let mut last_run: Option<NaiveDate> = None;
        loop {
            tokio::time::sleep(self.config.snapshot_check_interval).await;
            if self.is_stopped() {
                break;
            }
            if !self.is_running() {
                continue;
            }
            let now = Utc::now();
            if now.hour() != self.config.make_snapshot_hour
                || last_run == Some(now.date_naive())
            {
                continue;
            }
            last_run = Some(now.date_naive());
            self.make_snapshot_everywhere();
        }
    }

    /// Enqueue MakeSnapshot for every leader partition, applying the
    /// cross-cluster offset floor.
    pub fn make_snapshot_everywhere(self: &Arc<Self>) {
        let mut core = self.core.lock();
        let mut plans: Vec<(String, String, Tid, Pid, String, u64)> = Vec::new();
        for table in core.catalog.iter() {
            for part in &table.table_partition {
                let Some(leader) = part.alive_leader() else {
                    continue;
                };
                let remote_offsets: Vec<u64> = core
                    .replicas
                    .values()
                    .filter_map(|cluster| {
                        cluster
                            .last_status
                            .get(&(table.db.clone(), table.name.clone()))
                    })
                    .filter_map(|parts| parts.iter().find(|p| p.pid == part.pid))
                    .filter_map(|peer_part| peer_part.alive_leader().map(|m| m.offset))
                    .collect();
                let floor = crate::op_builders::snapshot_offset_floor(
                    leader.offset,
                    remote_offsets,
                );
                plans.push((
                    table.name.clone(),
                    table.db.clone(),
                    table.tid,
                    part.pid,
                    leader.endpoint.clone(),
                    floor,
                ));
            }
        }
        for (name, db, tid, pid, endpoint, end_offset) in plans {
            if let Err(e) = self.create_op_locked(
                &mut core,
                OpType::MakeSnapshot,
                OpPayload::MakeSnapshot {
                    tid,
                    pid,
                    endpoint,
                    end_offset,
                },
                &name,
                &db,
                Some(pid),
                None,
                None,
            ) {
                tracing::warn!(%name, %pid, error = %e, "failed to enqueue snapshot op");
            }
        }
    }

    /// Push the aggregated real-endpoint map (local tablets plus every
    /// peer's map) to every healthy tablet, so they can dial each other by
    /// logical name.
    pub(crate) async fn run_real_ep_pusher(self: Arc<Self>) {
        loop {
            tokio::time::sleep(self.config.table_status_interval).await;
            if self.is_stopped() {
                break;
            }
            if !self.is_running() || !self.config.use_name_indirection {
                continue;
            }
            let (mut map, clients, peers) = {
                let core = self.core.lock();
                let peers: Vec<_> = core
                    .replicas
                    .values()
                    .filter(|c| c.is_healthy())
                    .map(|c| c.client())
                    .collect();
                (
                    core.registry.real_endpoint_map(),
                    core.registry.healthy_clients(),
                    peers,
                )
            };
            for peer in peers {
                match peer.show_real_endpoint_map().await {
                    Ok(peer_map) => map.extend(peer_map),
                    Err(e) => tracing::debug!(error = %e, "peer real-ep map fetch failed"),
                }
            }
            for (endpoint, client) in clients {
                if let Err(e) = client.update_real_endpoint_map(&map).await {
                    tracing::debug!(%endpoint, error = %e, "real-ep map push failed");
                }
            }
        }
    }

    /// Watch the metastore session term; a silent reconnect means every
    /// watch was dropped server-side and must be re-armed.
    pub(crate) async fn run_heartbeat_checker(self: Arc<Self>) {
        let mut last_term = self.meta.session_term();
        loop {
            tokio::time::sleep(self.config.task_poll_interval).await;
            if self.is_stopped() {
                break;
            }
            let term = self.meta.session_term();
            if term != last_term {
                tracing::warn!(last_term, term, "metastore session term changed");
                last_term = term;
                let _ = self
                    .meta
                    .watch_children(&self.paths.nodes(), self.events_tx.clone());
            }
        }
    }
}
