//! Failover controller.
//!
//! Reacts to tablet membership transitions: an endpoint that stays offline
//! past the heartbeat window gets its replicas marked dead and corrective
//! OPs enqueued (leader re-election, replica removal); a returning endpoint
//! gets RecoverTable OPs. Everything here is also reachable through the
//! OfflineEndpoint / RecoverEndpoint admin commands.

use crate::error::NsError;
use crate::nameserver::NameServer;
use metaplane::op::OpPayload;
use metaplane::types::{OpType, Pid, Tid};
use std::sync::Arc;

/// What has to happen for one partition touched by an offline endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
enum OfflineAction {
    /// Sole replica: nothing to fail over to, mark the partition dead
    /// (keeping the recorded role for later recovery).
    MarkDead { was_leader: bool },
    /// The endpoint led the partition (or no alive leader remains).
    ElectLeader { candidates: Vec<String> },
    /// Plain follower removal.
    DropFollower,
}

impl NameServer {
    pub(crate) async fn on_tablet_offline(self: &Arc<Self>, endpoint: &str) {
        let auto = self.core.lock().auto_failover;
        if !self.is_running() {
            return;
        }
        if !auto {
            tracing::warn!(%endpoint,
                "tablet offline but auto-failover is disabled, waiting for admin");
            return;
        }
        if let Err(e) = self.handle_endpoint_offline(endpoint, 1) {
            tracing::error!(%endpoint, error = %e, "offline handling failed");
        }
    }

    pub(crate) async fn on_tablet_online(self: &Arc<Self>, endpoint: &str) {
        let auto = self.core.lock().auto_failover;
        if !self.is_running() || !auto {
            return;
        }
        if let Err(e) = self.handle_endpoint_online(endpoint, false, 1) {
            tracing::error!(%endpoint, error = %e, "online handling failed");
        }
    }

    /// Flip `is_alive` on every replica of `endpoint`, then enqueue one
    /// corrective OP per touched partition.
    pub(crate) fn handle_endpoint_offline(
        self: &Arc<Self>,
        endpoint: &str,
        concurrency: u32,
    ) -> Result<(), NsError> {
        self.update_endpoint_table_alive(endpoint, false)?;

        let mut core = self.core.lock();
        let mut plans: Vec<(String, String, Tid, Pid, OfflineAction)> = Vec::new();
        for table in core.catalog.iter() {
            for part in &table.table_partition {
                let Some(meta) = part.replica(endpoint) else {
                    continue;
                };
                let action = if part.partition_meta.len() == 1 {
                    OfflineAction::MarkDead {
                        was_leader: meta.is_leader,
                    }
                } else if meta.is_leader || part.alive_leader().is_none() {
                    OfflineAction::ElectLeader {
                        candidates: part
                            .partition_meta
                            .iter()
                            .filter(|m| m.is_alive && m.endpoint != endpoint)
                            .map(|m| m.endpoint.clone())
                            .collect(),
                    }
                } else {
                    OfflineAction::DropFollower
                };
                plans.push((
                    table.name.clone(),
                    table.db.clone(),
                    table.tid,
                    part.pid,
                    action,
                ));
            }
        }

        // The admin-supplied concurrency narrows the queue range so the
        // corrective burst runs over at most that many queues.
        let over = Some(concurrency);
        for (name, db, tid, pid, action) in plans {
            let result = match action {
                OfflineAction::MarkDead { was_leader } => self.create_op_with_concurrency(
                    &mut core,
                    OpType::UpdatePartitionStatus,
                    OpPayload::UpdatePartitionStatus {
                        tid,
                        pid,
                        endpoint: endpoint.to_string(),
                        is_leader: was_leader,
                        is_alive: false,
                    },
                    &name,
                    &db,
                    Some(pid),
                    None,
                    None,
                    over,
                ),
                OfflineAction::ElectLeader { candidates } => {
                    if candidates.is_empty() {
                        tracing::warn!(%name, %pid, "no candidate left to elect");
                        continue;
                    }
                    self.create_op_with_concurrency(
                        &mut core,
                        OpType::ChangeLeader,
                        OpPayload::ChangeLeader {
                            tid,
                            pid,
                            candidates,
                            candidate_leader: None,
                            chosen: None,
                            term: 0,
                            offset: 0,
                        },
                        &name,
                        &db,
                        Some(pid),
                        None,
                        None,
                        over,
                    )
                }
                OfflineAction::DropFollower => self.create_op_with_concurrency(
                    &mut core,
                    OpType::OfflineReplica,
                    OpPayload::OfflineReplica {
                        tid,
                        pid,
                        endpoint: endpoint.to_string(),
                    },
                    &name,
                    &db,
                    Some(pid),
                    None,
                    None,
                    over,
                ),
            };
            if let Err(e) = result {
                tracing::warn!(%name, %pid, error = %e, "failed to enqueue offline op");
            }
        }
        Ok(())
    }

    /// Enqueue RecoverTable for every partition the endpoint should hold
    /// again. Restore mode additionally forces a leader change away from the
    /// endpoint before recovering it, binding the leader late.
    pub(crate) fn handle_endpoint_online(
        self: &Arc<Self>,
        endpoint: &str,
        need_restore: bool,
        concurrency: u32,
    ) -> Result<(), NsError> {
        let mut core = self.core.lock();
        if core.registry.get_healthy(endpoint).is_none() {
            return Err(NsError::TabletNotHealthy {
                endpoint: endpoint.to_string(),
            });
        }
        let mut plans: Vec<(String, String, Tid, Pid, bool, Vec<String>)> = Vec::new();
        for table in core.catalog.iter() {
            for part in &table.table_partition {
                let Some(meta) = part.replica(endpoint) else {
                    continue;
                };
                if meta.is_alive && !need_restore {
                    continue;
                }
                let was_leader = meta.is_leader;
                let candidates = part
                    .partition_meta
                    .iter()
                    .filter(|m| m.is_alive && m.endpoint != endpoint)
                    .map(|m| m.endpoint.clone())
                    .collect();
                plans.push((
                    table.name.clone(),
                    table.db.clone(),
                    table.tid,
                    part.pid,
                    was_leader,
                    candidates,
                ));
            }
        }

        let over = Some(concurrency);
        for (name, db, tid, pid, was_leader, candidates) in plans {
            let mut parent = None;
            if need_restore && was_leader && !candidates.is_empty() {
                match self.create_op_with_concurrency(
                    &mut core,
                    OpType::ChangeLeader,
                    OpPayload::ChangeLeader {
                        tid,
                        pid,
                        candidates,
                        candidate_leader: None,
                        chosen: None,
                        term: 0,
                        offset: 0,
                    },
                    &name,
                    &db,
                    Some(pid),
                    None,
                    None,
                    over,
                ) {
                    Ok(op_id) => parent = Some(op_id),
                    Err(e) => {
                        tracing::warn!(%name, %pid, error = %e,
                            "failed to enqueue restore leader change");
                        continue;
                    }
                }
            }
            if let Err(e) = self.create_op_with_concurrency(
                &mut core,
                OpType::RecoverTable,
                OpPayload::RecoverTable {
                    tid,
                    pid,
                    endpoint: endpoint.to_string(),
                    need_restore,
                    concurrency,
                },
                &name,
                &db,
                Some(pid),
                parent,
                None,
                over,
            ) {
                tracing::warn!(%name, %pid, error = %e, "failed to enqueue RecoverTable");
            }
        }
        Ok(())
    }

    /// Flip the alive flag of every replica hosted on `endpoint`. Refuses to
    /// mark the sole remaining alive replica of a partition dead (the
    /// partition would become permanently unreadable); the refusal is logged
    /// per partition.
    pub(crate) fn update_endpoint_table_alive(
        &self,
        endpoint: &str,
        is_alive: bool,
    ) -> Result<(), NsError> {
        let touched: Vec<metaplane::TableInfo> = {
            let mut core = self.core.lock();
            let mut touched = Vec::new();
            for table in core.catalog.iter_mut() {
                let mut changed = false;
                let name = table.name.clone();
                for part in &mut table.table_partition {
                    let sole_alive = part.alive_replica_count() == 1
                        && part.replica(endpoint).is_some_and(|m| m.is_alive);
                    if !is_alive && sole_alive {
                        tracing::warn!(%name, pid = %part.pid, %endpoint,
                            "refusing to mark the sole alive replica dead");
                        continue;
                    }
                    if let Some(meta) = part.replica_mut(endpoint) {
                        if meta.is_alive != is_alive {
                            meta.is_alive = is_alive;
                            changed = true;
                        }
                    }
                }
                if changed {
                    touched.push(table.clone());
                }
            }
            touched
        };
        for table in &touched {
            self.persist_table(table)?;
        }
        if !touched.is_empty() {
            self.notify_catalog_changed()?;
        }
        Ok(())
    }
}
