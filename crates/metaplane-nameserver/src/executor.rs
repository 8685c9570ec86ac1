//! Task execution.
//!
//! One dispatcher turns a [`TaskKind`] into tablet/peer RPCs or catalog
//! mutations. It runs on the task pool without the main mutex; status is
//! reconciled under the mutex afterwards. Tablet-bound tasks stay `Doing`
//! after a successful send and are finalized by the status poller; local
//! tasks and peer RPCs complete synchronously.

use crate::error::NsError;
use crate::nameserver::NameServer;
use crate::tablet::{TabletRpc, TaskRef};
use crate::tasks::TaskKind;
use metaplane::op::OpPayload;
use metaplane::table::{RemotePartitionMeta, TableInfo, TermPair};
use metaplane::types::{
    OFFLINE_LEADER_ENDPOINT, OpId, OpType, Pid, TaskStatus, TaskType, Tid,
};
use rand::seq::SliceRandom;
use std::sync::Arc;

/// How a dispatched task terminates.
enum Completion {
    /// RPC handed to a tablet; the status poller finishes the task.
    AwaitPoll,
    /// Completed synchronously.
    Done,
    /// Fan-out sends issued; per-endpoint statuses already recorded.
    Fanout,
    /// The task stopped being current (canceled or op gone); leave as-is.
    Abandoned,
}

impl NameServer {
    pub(crate) async fn execute_task(
        self: Arc<Self>,
        op_id: OpId,
        task_type: TaskType,
        kind: TaskKind,
    ) {
        let task = TaskRef { op_id, task_type };
        match self.dispatch(task, kind).await {
            Ok(Completion::AwaitPoll) | Ok(Completion::Fanout) | Ok(Completion::Abandoned) => {}
            Ok(Completion::Done) => self.finish_task(op_id, task_type, TaskStatus::Done),
            Err(e) => {
                tracing::warn!(%op_id, %task_type, error = %e, "task execution failed");
                self.finish_task(op_id, task_type, TaskStatus::Failed);
            }
        }
        self.worker_notify.notify_one();
    }

    fn finish_task(&self, op_id: OpId, task_type: TaskType, status: TaskStatus) {
        let mut core = self.core.lock();
        if let Some(op) = core.engine.find_pending_mut(op_id) {
            if let Some(task) = op.current_task_mut() {
                if task.info.task_type == task_type && !task.info.status.is_terminal() {
                    task.info.status = status;
                }
            }
        }
    }

    fn fail_sub_task(&self, op_id: OpId, task_type: TaskType, endpoint: &str) {
        let mut core = self.core.lock();
        if let Some(op) = core.engine.find_pending_mut(op_id) {
            if let Some(task) = op.current_task_mut() {
                if task.info.task_type == task_type {
                    if let Some(sub) = task.sub.iter_mut().find(|s| s.endpoint == endpoint) {
                        if !sub.status.is_terminal() {
                            sub.status = TaskStatus::Failed;
                        }
                    }
                }
            }
        }
    }

    fn healthy_client(&self, endpoint: &str) -> Result<Arc<dyn TabletRpc>, NsError> {
        let core = self.core.lock();
        core.registry.client(endpoint)
    }

    fn table_by_tid(&self, tid: Tid) -> Result<TableInfo, NsError> {
        let core = self.core.lock();
        core.catalog
            .by_tid(tid)
            .cloned()
            .ok_or(NsError::InvalidParameter {
                reason: format!("no table with {tid}"),
            })
    }

    fn table_clone(&self, db: &str, name: &str) -> Result<TableInfo, NsError> {
        let core = self.core.lock();
        core.catalog.expect(db, name).cloned()
    }

    /// Dereference the synthetic leader token against the current catalog.
    fn resolve_leader(&self, tid: Tid, pid: Pid, endpoint: &str) -> Result<String, NsError> {
        if endpoint != OFFLINE_LEADER_ENDPOINT {
            return Ok(endpoint.to_string());
        }
        let table = self.table_by_tid(tid)?;
        table
            .partition(pid)
            .and_then(|p| p.alive_leader())
            .map(|m| m.endpoint.clone())
            .ok_or(NsError::NoAliveFollower {
                name: table.name.clone(),
                pid,
            })
    }

    async fn dispatch(&self, task: TaskRef, kind: TaskKind) -> Result<Completion, NsError> {
        let ns = self;
        match kind {
            // ===========================
            // Tablet RPC primitives
            // ===========================
            TaskKind::MakeSnapshot {
                tid,
                pid,
                endpoint,
                end_offset,
            } => {
                ns.healthy_client(&endpoint)?
                    .make_snapshot(task, tid, pid, end_offset)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::PauseSnapshot { tid, pid, endpoint } => {
                ns.healthy_client(&endpoint)?
                    .pause_snapshot(task, tid, pid)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::RecoverSnapshot { tid, pid, endpoint } => {
                ns.healthy_client(&endpoint)?
                    .recover_snapshot(task, tid, pid)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::SendSnapshot {
                tid,
                pid,
                src,
                dst,
                remote,
            } => {
                let (remote_tid, dst) = match remote {
                    Some(alias) => {
                        let table = ns.table_by_tid(tid)?;
                        ns.resolve_remote(&alias, &table.db, &table.name, pid).await?
                    }
                    None => (tid, dst),
                };
                ns.healthy_client(&src)?
                    .send_snapshot(task, tid, remote_tid, pid, &dst)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::LoadTable {
                name,
                db,
                pid,
                endpoint,
            } => {
                let table = ns.table_clone(&db, &name)?;
                ns.healthy_client(&endpoint)?
                    .load_table(task, &table, pid)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::AddReplica {
                tid,
                pid,
                leader,
                follower,
                remote,
            } => {
                let leader = ns.resolve_leader(tid, pid, &leader)?;
                let (follower, remote_tid) = match remote {
                    Some(alias) => {
                        let table = ns.table_by_tid(tid)?;
                        let (remote_tid, ep) =
                            ns.resolve_remote(&alias, &table.db, &table.name, pid).await?;
                        (ep, Some(remote_tid))
                    }
                    None => (follower, None),
                };
                ns.healthy_client(&leader)?
                    .add_replica(task, tid, pid, &follower, remote_tid)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::DelReplica {
                tid,
                pid,
                leader,
                follower,
            } => {
                let leader = ns.resolve_leader(tid, pid, &leader)?;
                ns.healthy_client(&leader)?
                    .del_replica(task, tid, pid, &follower)
                    .await?;
                Ok(Completion::AwaitPoll)
            }
            TaskKind::DropTable { tid, pid, endpoint } => {
                ns.healthy_client(&endpoint)?
                    .drop_table(task, tid, pid)
                    .await?;
                Ok(Completion::AwaitPoll)
            }

            // ===========================
            // Leader election
            // ===========================
            TaskKind::SelectLeader {
                name,
                db: _,
                tid,
                pid,
                candidates,
                candidate_leader,
            } => {
                // One term for the election round, one for the new leader.
                ns.meta
                    .increment(&ns.paths.term())
                    .map_err(NsError::MetaWrite)?;
                let term = ns
                    .meta
                    .increment(&ns.paths.term())
                    .map_err(NsError::MetaWrite)?;

                let mut offsets: Vec<(String, u64)> = Vec::new();
                for candidate in &candidates {
                    let client = ns.healthy_client(candidate)?;
                    let offset = client.follow_of_no_one(tid, pid, term).await?;
                    offsets.push((candidate.clone(), offset));
                }
                if offsets.is_empty() {
                    return Err(NsError::NoAliveFollower { name, pid });
                }
                let max_offset = offsets.iter().map(|(_, o)| *o).max().unwrap_or(0);
                let leaders: Vec<&String> = offsets
                    .iter()
                    .filter(|(_, o)| *o == max_offset)
                    .map(|(ep, _)| ep)
                    .collect();
                let chosen = candidate_leader
                    .as_ref()
                    .filter(|c| leaders.iter().any(|ep| *ep == *c))
                    .cloned()
                    .or_else(|| {
                        leaders
                            .choose(&mut rand::thread_rng())
                            .map(|ep| (*ep).clone())
                    })
                    .ok_or(NsError::NoAliveFollower {
                        name: name.clone(),
                        pid,
                    })?;
                tracing::info!(%tid, %pid, %chosen, term, offset = max_offset,
                    "selected new leader");

                let snapshot = {
                    let mut core = ns.core.lock();
                    let Some(op) = core.engine.find_pending_mut(task.op_id) else {
                        return Ok(Completion::Abandoned);
                    };
                    if let OpPayload::ChangeLeader {
                        chosen: slot_chosen,
                        term: slot_term,
                        offset: slot_offset,
                        ..
                    } = &mut op.data.payload
                    {
                        *slot_chosen = Some(chosen);
                        *slot_term = term;
                        *slot_offset = max_offset;
                    }
                    op.data.clone()
                };
                ns.persist_op(&snapshot)?;
                Ok(Completion::Done)
            }
            TaskKind::ChangeLeader { name, db, tid, pid } => {
                let (chosen, term) = {
                    let core = ns.core.lock();
                    let Some(op) = core.engine.find(task.op_id) else {
                        return Ok(Completion::Abandoned);
                    };
                    match &op.data.payload {
                        OpPayload::ChangeLeader {
                            chosen: Some(chosen),
                            term,
                            ..
                        } => (chosen.clone(), *term),
                        _ => {
                            return Err(NsError::CreateOpFailed {
                                reason: "ChangeLeader has no selected candidate".to_string(),
                            });
                        }
                    }
                };
                let followers: Vec<String> = {
                    let core = ns.core.lock();
                    core.catalog
                        .expect(&db, &name)?
                        .partition(pid)
                        .map(|p| {
                            p.partition_meta
                                .iter()
                                .filter(|m| m.is_alive && m.endpoint != chosen)
                                .map(|m| m.endpoint.clone())
                                .collect()
                        })
                        .unwrap_or_default()
                };
                ns.healthy_client(&chosen)?
                    .change_role(tid, pid, true, term + 1, &followers)
                    .await?;
                Ok(Completion::Done)
            }
            TaskKind::UpdateLeaderInfo { name, db, pid } => {
                let (chosen, term, offset) = {
                    let core = ns.core.lock();
                    let Some(op) = core.engine.find(task.op_id) else {
                        return Ok(Completion::Abandoned);
                    };
                    match &op.data.payload {
                        OpPayload::ChangeLeader {
                            chosen: Some(chosen),
                            term,
                            offset,
                            ..
                        } => (chosen.clone(), *term, *offset),
                        _ => {
                            return Err(NsError::CreateOpFailed {
                                reason: "UpdateLeaderInfo has no selected candidate".to_string(),
                            });
                        }
                    }
                };
                let snapshot = {
                    let mut core = ns.core.lock();
                    let table = core.catalog.expect_mut(&db, &name)?;
                    let part = table.partition_mut(pid).ok_or(NsError::PidNotFound {
                        name: name.clone(),
                        pid,
                    })?;
                    for meta in &mut part.partition_meta {
                        if meta.is_leader && meta.endpoint != chosen {
                            meta.is_leader = false;
                            meta.is_alive = false;
                        }
                    }
                    match part.replica_mut(&chosen) {
                        Some(meta) => {
                            meta.is_leader = true;
                            meta.is_alive = true;
                        }
                        None => {
                            return Err(NsError::EndpointNotFound { endpoint: chosen });
                        }
                    }
                    part.term_offset.push(TermPair {
                        term: term + 1,
                        offset: offset + 1,
                    });
                    table.clone()
                };
                ns.persist_table(&snapshot)?;
                ns.notify_catalog_changed()?;
                Ok(Completion::Done)
            }

            // ===========================
            // Catalog bookkeeping
            // ===========================
            TaskKind::AddTableInfo {
                name,
                db,
                pid,
                endpoint,
                remote,
            } => {
                let remote_meta = match &remote {
                    Some(alias) => {
                        let (remote_tid, ep) =
                            ns.resolve_remote(alias, &db, &name, pid).await?;
                        Some(RemotePartitionMeta {
                            alias: alias.clone(),
                            endpoint: ep,
                            remote_tid,
                            is_leader: true,
                            is_alive: true,
                        })
                    }
                    None => None,
                };
                let snapshot = {
                    let mut core = ns.core.lock();
                    let table = core.catalog.expect_mut(&db, &name)?;
                    let part = table.partition_mut(pid).ok_or(NsError::PidNotFound {
                        name: name.clone(),
                        pid,
                    })?;
                    match remote_meta {
                        Some(meta) => {
                            part.remote_partition_meta
                                .retain(|m| !(m.alias == meta.alias && m.endpoint == meta.endpoint));
                            part.remote_partition_meta.push(meta);
                        }
                        None => {
                            if part.replica(&endpoint).is_none() {
                                let mut meta = metaplane::PartitionMeta::new(&endpoint, false);
                                meta.is_alive = false;
                                part.partition_meta.push(meta);
                            }
                        }
                    }
                    table.clone()
                };
                ns.persist_table(&snapshot)?;
                ns.notify_catalog_changed()?;
                Ok(Completion::Done)
            }
            TaskKind::DelTableInfo {
                name,
                db,
                pid,
                endpoint,
                remote,
            } => {
                let snapshot = {
                    let mut core = ns.core.lock();
                    let table = core.catalog.expect_mut(&db, &name)?;
                    let part = table.partition_mut(pid).ok_or(NsError::PidNotFound {
                        name: name.clone(),
                        pid,
                    })?;
                    match &remote {
                        Some(alias) => part
                            .remote_partition_meta
                            .retain(|m| !(m.alias == *alias && m.endpoint == endpoint)),
                        None => part.partition_meta.retain(|m| m.endpoint != endpoint),
                    }
                    table.clone()
                };
                ns.persist_table(&snapshot)?;
                ns.notify_catalog_changed()?;
                Ok(Completion::Done)
            }
            TaskKind::UpdateTableInfo {
                name,
                db,
                pid,
                src,
                dst,
            } => {
                let snapshot = {
                    let mut core = ns.core.lock();
                    let table = core.catalog.expect_mut(&db, &name)?;
                    let part = table.partition_mut(pid).ok_or(NsError::PidNotFound {
                        name: name.clone(),
                        pid,
                    })?;
                    part.partition_meta.retain(|m| m.endpoint != src);
                    if let Some(meta) = part.replica_mut(&dst) {
                        meta.is_alive = true;
                    }
                    table.clone()
                };
                ns.persist_table(&snapshot)?;
                ns.notify_catalog_changed()?;
                Ok(Completion::Done)
            }
            TaskKind::UpdatePartitionStatus {
                name,
                db,
                pid,
                endpoint,
                is_leader,
                is_alive,
            } => {
                let snapshot = {
                    let mut core = ns.core.lock();
                    let table = core.catalog.expect_mut(&db, &name)?;
                    let part = table.partition_mut(pid).ok_or(NsError::PidNotFound {
                        name: name.clone(),
                        pid,
                    })?;
                    let meta = part.replica_mut(&endpoint).ok_or(NsError::EndpointNotFound {
                        endpoint: endpoint.clone(),
                    })?;
                    meta.is_leader = is_leader;
                    meta.is_alive = is_alive;
                    table.clone()
                };
                ns.persist_table(&snapshot)?;
                ns.notify_catalog_changed()?;
                Ok(Completion::Done)
            }

            // ===========================
            // Recovery decision logic
            // ===========================
            TaskKind::RecoverEndpointTable {
                name,
                db,
                pid,
                endpoint,
                need_restore,
                concurrency,
            } => {
                ns.recover_endpoint_table(
                    task.op_id,
                    &name,
                    &db,
                    pid,
                    &endpoint,
                    need_restore,
                    concurrency,
                )
                .await?;
                Ok(Completion::Done)
            }

            // ===========================
            // Binlog sync polling
            // ===========================
            TaskKind::CheckBinlogSyncProgress {
                name,
                db,
                pid,
                follower,
                offset_delta,
            } => loop {
                {
                    let core = ns.core.lock();
                    let still_current = core
                        .engine
                        .find(task.op_id)
                        .and_then(|op| op.current_task())
                        .is_some_and(|t| {
                            t.info.task_type == task.task_type
                                && t.info.status == TaskStatus::Doing
                        });
                    if !still_current {
                        return Ok(Completion::Abandoned);
                    }
                    let table = core.catalog.expect(&db, &name)?;
                    let part = table.partition(pid).ok_or(NsError::PidNotFound {
                        name: name.clone(),
                        pid,
                    })?;
                    let caught_up = match part.replica(&follower) {
                        // Replica meta disappeared: nothing left to wait on.
                        None => true,
                        Some(meta) => {
                            let leader_offset =
                                part.alive_leader().map(|m| m.offset).unwrap_or(0);
                            leader_offset.saturating_sub(meta.offset) <= offset_delta
                        }
                    };
                    if caught_up {
                        return Ok(Completion::Done);
                    }
                }
                tokio::time::sleep(ns.config.check_binlog_sync_interval).await;
            },

            // ===========================
            // Index pipeline
            // ===========================
            TaskKind::TableSync {
                tid,
                name,
                db,
                column_key,
            } => {
                let path = ns.paths.op_sync(tid);
                let remaining = match ns.meta.get(&path) {
                    Ok(value) => String::from_utf8_lossy(&value)
                        .parse::<u64>()
                        .unwrap_or(1),
                    Err(_) => 1,
                };
                if remaining > 1 {
                    ns.meta
                        .set(&path, (remaining - 1).to_string().as_bytes())
                        .map_err(NsError::MetaWrite)?;
                    return Ok(Completion::Done);
                }
                // Last writer commits the column key and clears the barrier.
                let snapshot = {
                    let mut core = ns.core.lock();
                    let table = core.catalog.expect_mut(&db, &name)?;
                    if !table
                        .column_keys
                        .iter()
                        .any(|ck| ck.index_name == column_key.index_name && !ck.is_deleted())
                    {
                        table.column_keys.push(column_key);
                    }
                    table.clone()
                };
                ns.persist_table(&snapshot)?;
                ns.notify_catalog_changed()?;
                let _ = ns.meta.delete(&path);
                Ok(Completion::Done)
            }
            TaskKind::DumpIndexData {
                tid,
                partition_num,
                column_key,
                idx,
                targets,
            } => {
                for (pid, endpoint) in &targets {
                    let result = match ns.healthy_client(endpoint) {
                        Ok(client) => {
                            client
                                .dump_index_data(task, tid, *pid, partition_num, &column_key, idx)
                                .await
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!(%tid, pid = %pid, %endpoint, error = %e,
                            "dump index data failed");
                        ns.fail_sub_task(task.op_id, task.task_type, endpoint);
                    }
                }
                Ok(Completion::Fanout)
            }
            TaskKind::SendIndexData {
                tid,
                targets,
                pid_leaders,
            } => {
                for (pid, endpoint) in &targets {
                    let result = match ns.healthy_client(endpoint) {
                        Ok(client) => {
                            client.send_index_data(task, tid, *pid, &pid_leaders).await
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!(%tid, pid = %pid, %endpoint, error = %e,
                            "send index data failed");
                        ns.fail_sub_task(task.op_id, task.task_type, endpoint);
                    }
                }
                Ok(Completion::Fanout)
            }
            TaskKind::AddIndexToTablet {
                tid,
                column_key,
                cols,
                targets,
            } => {
                for (pid, endpoint) in &targets {
                    let result = match ns.healthy_client(endpoint) {
                        Ok(client) => {
                            client.add_index(task, tid, *pid, &column_key, &cols).await
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!(%tid, pid = %pid, %endpoint, error = %e,
                            "add index to tablet failed");
                        ns.fail_sub_task(task.op_id, task.task_type, endpoint);
                    }
                }
                Ok(Completion::Fanout)
            }
            TaskKind::ExtractIndexData {
                tid,
                partition_num,
                column_key,
                idx,
                targets,
            } => {
                for (pid, endpoint) in &targets {
                    let result = match ns.healthy_client(endpoint) {
                        Ok(client) => {
                            client
                                .extract_index_data(
                                    task,
                                    tid,
                                    *pid,
                                    partition_num,
                                    &column_key,
                                    idx,
                                )
                                .await
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!(%tid, pid = %pid, %endpoint, error = %e,
                            "extract index data failed");
                        ns.fail_sub_task(task.op_id, task.task_type, endpoint);
                    }
                }
                Ok(Completion::Fanout)
            }
            TaskKind::LoadIndexData {
                tid,
                partition_num,
                targets,
            } => {
                for (pid, endpoint) in &targets {
                    let result = match ns.healthy_client(endpoint) {
                        Ok(client) => {
                            client
                                .load_index_data(task, tid, *pid, partition_num)
                                .await
                        }
                        Err(e) => Err(e),
                    };
                    if let Err(e) = result {
                        tracing::warn!(%tid, pid = %pid, %endpoint, error = %e,
                            "load index data failed");
                        ns.fail_sub_task(task.op_id, task.task_type, endpoint);
                    }
                }
                Ok(Completion::Fanout)
            }

            // ===========================
            // Cross-cluster RPCs
            // ===========================
            TaskKind::CreateTableRemote { alias, table_info } => {
                let client = {
                    let core = ns.core.lock();
                    core.replicas
                        .get(&alias)
                        .ok_or(NsError::ReplicaClusterNotFound {
                            alias: alias.clone(),
                        })?
                        .client()
                };
                let zone = ns.outbound_zone(&alias);
                client.create_table_remote(&table_info, &zone, task).await?;
                Ok(Completion::Done)
            }
            TaskKind::DropTableRemote { alias, name, db } => {
                let client = {
                    let core = ns.core.lock();
                    core.replicas
                        .get(&alias)
                        .ok_or(NsError::ReplicaClusterNotFound {
                            alias: alias.clone(),
                        })?
                        .client()
                };
                let zone = ns.outbound_zone(&alias);
                client.drop_table_remote(&db, &name, &zone, task).await?;
                Ok(Completion::Done)
            }
            TaskKind::AddReplicaNsRemote {
                alias,
                name,
                db,
                pid,
            } => {
                let client = {
                    let core = ns.core.lock();
                    core.replicas
                        .get(&alias)
                        .ok_or(NsError::ReplicaClusterNotFound {
                            alias: alias.clone(),
                        })?
                        .client()
                };
                let zone = ns.outbound_zone(&alias);
                client
                    .add_replica_ns_remote(&db, &name, pid, &zone, task)
                    .await?;
                // The peer enrolled an OP under our op id; its terminal
                // status arrives through the peer task-status poll.
                Ok(Completion::AwaitPoll)
            }
        }
    }

    /// Decide how to recover one partition replica on a re-appeared
    /// endpoint and enqueue the follow-up OP behind the current one.
    async fn recover_endpoint_table(
        &self,
        parent_op: OpId,
        name: &str,
        db: &str,
        pid: Pid,
        endpoint: &str,
        need_restore: bool,
        concurrency: u32,
    ) -> Result<(), NsError> {
        let endpoint = if endpoint == OFFLINE_LEADER_ENDPOINT {
            let core = self.core.lock();
            let table = core.catalog.expect(db, name)?;
            table
                .partition(pid)
                .and_then(|p| p.alive_leader())
                .map(|m| m.endpoint.clone())
                .ok_or(NsError::NoAliveFollower {
                    name: name.to_string(),
                    pid,
                })?
        } else {
            endpoint.to_string()
        };

        let (tid, is_leader, replica_count, catalog_term) = {
            let core = self.core.lock();
            let table = core.catalog.expect(db, name)?;
            let part = table.partition(pid).ok_or(NsError::PidNotFound {
                name: name.to_string(),
                pid,
            })?;
            (
                table.tid,
                part.replica(&endpoint).is_some_and(|m| m.is_leader),
                part.partition_meta.len(),
                part.current_term(),
            )
        };

        // The sole-replica leader just reopens its local data.
        if is_leader && replica_count == 1 {
            let mut core = self.core.lock();
            self.create_op_with_concurrency(
                &mut core,
                OpType::ReLoadTable,
                OpPayload::ReLoadTable {
                    tid,
                    pid,
                    endpoint: endpoint.clone(),
                },
                name,
                db,
                Some(pid),
                Some(parent_op),
                None,
                Some(concurrency),
            )?;
            return Ok(());
        }

        let client = self.healthy_client(&endpoint)?;
        let term_pair = client.get_term_pair(tid, pid).await?;

        let op_type = if !term_pair.has_table {
            OpType::ReAddReplica
        } else {
            let manifest = client.get_manifest(tid, pid).await?;
            if term_pair.term == catalog_term {
                if term_pair.offset == manifest.offset {
                    OpType::ReAddReplicaSimplify
                } else {
                    OpType::ReAddReplicaNoSend
                }
            } else {
                OpType::ReAddReplicaWithDrop
            }
        };
        tracing::info!(%tid, %pid, %endpoint, ?op_type, need_restore, concurrency,
            "recover decision");

        let mut core = self.core.lock();
        self.create_op_with_concurrency(
            &mut core,
            op_type,
            OpPayload::ReAddReplica {
                tid,
                pid,
                endpoint,
            },
            name,
            db,
            Some(pid),
            Some(parent_op),
            None,
            Some(concurrency),
        )?;
        Ok(())
    }
}
