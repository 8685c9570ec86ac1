//! Per-OP-type task factories.
//!
//! Persistence carries the OP payload only; the task chain is rebuilt from
//! the payload (and current catalog) both at creation and during coordinator
//! recovery, where the first `task_index` tasks are skipped.

use crate::catalog::TableCatalog;
use crate::config::NameServerConfig;
use crate::error::NsError;
use crate::tasks::{Task, TaskKind};
use metaplane::op::{OpData, OpPayload};
use metaplane::types::{OpType, Pid, TaskStatus, TaskType};
use std::collections::HashMap;

/// Resolve the alive leader endpoint for (db, name, pid) at build time.
fn leader_endpoint(
    catalog: &TableCatalog,
    db: &str,
    name: &str,
    pid: Pid,
) -> Result<String, NsError> {
    let table = catalog.expect(db, name)?;
    let part = table.partition(pid).ok_or(NsError::PidNotFound {
        name: name.to_string(),
        pid,
    })?;
    part.alive_leader()
        .map(|m| m.endpoint.clone())
        .ok_or_else(|| NsError::CreateOpFailed {
            reason: format!("no alive leader for '{name}' partition {pid}"),
        })
}

fn is_leader_in_catalog(catalog: &TableCatalog, db: &str, name: &str, pid: Pid, ep: &str) -> bool {
    catalog
        .get(db, name)
        .and_then(|t| t.partition(pid))
        .and_then(|p| p.replica(ep))
        .is_some_and(|m| m.is_leader)
}

/// Build the task chain for a freshly created OP.
pub fn build_tasks(
    data: &OpData,
    catalog: &TableCatalog,
    config: &NameServerConfig,
) -> Result<Vec<Task>, NsError> {
    let op_id = data.op_id;
    let op_type = data.op_type;
    let name = data.name.as_str();
    let db = data.db.as_str();
    let task = |task_type: TaskType, endpoint: &str, kind: TaskKind| {
        Task::new(op_id, op_type, task_type, endpoint, kind)
    };
    let delta = config.check_binlog_sync_offset_delta;

    let check_binlog = |pid: Pid, follower: &str| {
        task(
            TaskType::CheckBinlogSyncProgress,
            follower,
            TaskKind::CheckBinlogSyncProgress {
                name: name.to_string(),
                db: db.to_string(),
                pid,
                follower: follower.to_string(),
                offset_delta: delta,
            },
        )
    };
    let update_status = |pid: Pid, ep: &str, is_leader: bool, is_alive: bool| {
        task(
            TaskType::UpdatePartitionStatus,
            ep,
            TaskKind::UpdatePartitionStatus {
                name: name.to_string(),
                db: db.to_string(),
                pid,
                endpoint: ep.to_string(),
                is_leader,
                is_alive,
            },
        )
    };

    let tasks = match &data.payload {
        OpPayload::MakeSnapshot {
            tid,
            pid,
            endpoint,
            end_offset,
        } => vec![task(
            TaskType::MakeSnapshot,
            endpoint,
            TaskKind::MakeSnapshot {
                tid: *tid,
                pid: *pid,
                endpoint: endpoint.clone(),
                end_offset: *end_offset,
            },
        )],

        OpPayload::AddReplica { tid, pid, endpoint } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            vec![
                task(
                    TaskType::PauseSnapshot,
                    &leader,
                    TaskKind::PauseSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ),
                task(
                    TaskType::SendSnapshot,
                    &leader,
                    TaskKind::SendSnapshot {
                        tid: *tid,
                        pid: *pid,
                        src: leader.clone(),
                        dst: endpoint.clone(),
                        remote: None,
                    },
                ),
                task(
                    TaskType::LoadTable,
                    endpoint,
                    TaskKind::LoadTable {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: endpoint.clone(),
                    },
                ),
                task(
                    TaskType::AddReplica,
                    &leader,
                    TaskKind::AddReplica {
                        tid: *tid,
                        pid: *pid,
                        leader: leader.clone(),
                        follower: endpoint.clone(),
                        remote: None,
                    },
                ),
                task(
                    TaskType::RecoverSnapshot,
                    &leader,
                    TaskKind::RecoverSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ),
                task(
                    TaskType::AddTableInfo,
                    endpoint,
                    TaskKind::AddTableInfo {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: endpoint.clone(),
                        remote: None,
                    },
                ),
                check_binlog(*pid, endpoint),
                update_status(*pid, endpoint, false, true),
            ]
        }

        OpPayload::ReAddReplica { tid, pid, endpoint } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            let mut tasks = Vec::new();
            if op_type == OpType::ReAddReplicaWithDrop {
                tasks.push(task(
                    TaskType::DropTable,
                    endpoint,
                    TaskKind::DropTable {
                        tid: *tid,
                        pid: *pid,
                        endpoint: endpoint.clone(),
                    },
                ));
            }
            if op_type != OpType::ReAddReplicaSimplify {
                tasks.push(task(
                    TaskType::PauseSnapshot,
                    &leader,
                    TaskKind::PauseSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ));
                if op_type != OpType::ReAddReplicaNoSend {
                    tasks.push(task(
                        TaskType::SendSnapshot,
                        &leader,
                        TaskKind::SendSnapshot {
                            tid: *tid,
                            pid: *pid,
                            src: leader.clone(),
                            dst: endpoint.clone(),
                            remote: None,
                        },
                    ));
                }
                tasks.push(task(
                    TaskType::LoadTable,
                    endpoint,
                    TaskKind::LoadTable {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: endpoint.clone(),
                    },
                ));
            }
            tasks.push(task(
                TaskType::AddReplica,
                &leader,
                TaskKind::AddReplica {
                    tid: *tid,
                    pid: *pid,
                    leader: leader.clone(),
                    follower: endpoint.clone(),
                    remote: None,
                },
            ));
            if op_type != OpType::ReAddReplicaSimplify {
                tasks.push(task(
                    TaskType::RecoverSnapshot,
                    &leader,
                    TaskKind::RecoverSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ));
            }
            tasks.push(check_binlog(*pid, endpoint));
            tasks.push(update_status(*pid, endpoint, false, true));
            tasks
        }

        OpPayload::DelReplica { tid, pid, endpoint } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            vec![
                task(
                    TaskType::DelReplica,
                    &leader,
                    TaskKind::DelReplica {
                        tid: *tid,
                        pid: *pid,
                        leader: leader.clone(),
                        follower: endpoint.clone(),
                    },
                ),
                task(
                    TaskType::DelTableInfo,
                    endpoint,
                    TaskKind::DelTableInfo {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: endpoint.clone(),
                        remote: None,
                    },
                ),
                task(
                    TaskType::DropTable,
                    endpoint,
                    TaskKind::DropTable {
                        tid: *tid,
                        pid: *pid,
                        endpoint: endpoint.clone(),
                    },
                ),
            ]
        }

        OpPayload::ChangeLeader {
            tid,
            pid,
            candidates,
            candidate_leader,
            ..
        } => vec![
            task(
                TaskType::SelectLeader,
                "",
                TaskKind::SelectLeader {
                    name: name.to_string(),
                    db: db.to_string(),
                    tid: *tid,
                    pid: *pid,
                    candidates: candidates.clone(),
                    candidate_leader: candidate_leader.clone(),
                },
            ),
            task(
                TaskType::ChangeLeader,
                "",
                TaskKind::ChangeLeader {
                    name: name.to_string(),
                    db: db.to_string(),
                    tid: *tid,
                    pid: *pid,
                },
            ),
            task(
                TaskType::UpdateLeaderInfo,
                "",
                TaskKind::UpdateLeaderInfo {
                    name: name.to_string(),
                    db: db.to_string(),
                    pid: *pid,
                },
            ),
        ],

        OpPayload::OfflineReplica { tid, pid, endpoint } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            vec![
                task(
                    TaskType::DelReplica,
                    &leader,
                    TaskKind::DelReplica {
                        tid: *tid,
                        pid: *pid,
                        leader: leader.clone(),
                        follower: endpoint.clone(),
                    },
                ),
                update_status(*pid, endpoint, false, false),
            ]
        }

        OpPayload::RecoverTable {
            pid,
            endpoint,
            need_restore,
            concurrency,
            ..
        } => {
            let mut tasks = Vec::new();
            let is_follower = !is_leader_in_catalog(catalog, db, name, *pid, endpoint);
            if is_follower {
                // Restore mode binds the leader at task dispatch: a leader
                // change may still be queued ahead of this OP.
                let leader = if *need_restore {
                    Some(metaplane::OFFLINE_LEADER_ENDPOINT.to_string())
                } else {
                    leader_endpoint(catalog, db, name, *pid)
                        .ok()
                        .filter(|leader| leader != endpoint)
                };
                if let Some(leader) = leader {
                    let tid = catalog.expect(db, name)?.tid;
                    tasks.push(task(
                        TaskType::DelReplica,
                        &leader,
                        TaskKind::DelReplica {
                            tid,
                            pid: *pid,
                            leader: leader.clone(),
                            follower: endpoint.clone(),
                        },
                    ));
                }
            }
            tasks.push(task(
                TaskType::RecoverEndpointTable,
                endpoint,
                TaskKind::RecoverEndpointTable {
                    name: name.to_string(),
                    db: db.to_string(),
                    pid: *pid,
                    endpoint: endpoint.clone(),
                    need_restore: *need_restore,
                    concurrency: *concurrency,
                },
            ));
            tasks
        }

        OpPayload::Migrate { tid, pid, src, dst } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            vec![
                task(
                    TaskType::PauseSnapshot,
                    &leader,
                    TaskKind::PauseSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ),
                task(
                    TaskType::SendSnapshot,
                    &leader,
                    TaskKind::SendSnapshot {
                        tid: *tid,
                        pid: *pid,
                        src: leader.clone(),
                        dst: dst.clone(),
                        remote: None,
                    },
                ),
                task(
                    TaskType::RecoverSnapshot,
                    &leader,
                    TaskKind::RecoverSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ),
                task(
                    TaskType::LoadTable,
                    dst,
                    TaskKind::LoadTable {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: dst.clone(),
                    },
                ),
                task(
                    TaskType::AddReplica,
                    &leader,
                    TaskKind::AddReplica {
                        tid: *tid,
                        pid: *pid,
                        leader: leader.clone(),
                        follower: dst.clone(),
                        remote: None,
                    },
                ),
                task(
                    TaskType::AddTableInfo,
                    dst,
                    TaskKind::AddTableInfo {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: dst.clone(),
                        remote: None,
                    },
                ),
                check_binlog(*pid, dst),
                task(
                    TaskType::DelReplica,
                    &leader,
                    TaskKind::DelReplica {
                        tid: *tid,
                        pid: *pid,
                        leader: leader.clone(),
                        follower: src.clone(),
                    },
                ),
                task(
                    TaskType::UpdateTableInfo,
                    "",
                    TaskKind::UpdateTableInfo {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        src: src.clone(),
                        dst: dst.clone(),
                    },
                ),
                task(
                    TaskType::DropTable,
                    src,
                    TaskKind::DropTable {
                        tid: *tid,
                        pid: *pid,
                        endpoint: src.clone(),
                    },
                ),
            ]
        }

        OpPayload::ReLoadTable { pid, endpoint, .. } => {
            let is_leader = is_leader_in_catalog(catalog, db, name, *pid, endpoint);
            vec![
                task(
                    TaskType::LoadTable,
                    endpoint,
                    TaskKind::LoadTable {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: endpoint.clone(),
                    },
                ),
                update_status(*pid, endpoint, is_leader, true),
            ]
        }

        OpPayload::UpdatePartitionStatus {
            pid,
            endpoint,
            is_leader,
            is_alive,
            ..
        } => vec![update_status(*pid, endpoint, *is_leader, *is_alive)],

        OpPayload::AddIndex {
            tid,
            column_key,
            cols,
            skip_data,
        } => {
            let table = catalog.expect(db, name)?;
            let partition_num = table.partition_num;
            let idx = table.column_keys.len() as u32;
            let mut all_replicas: Vec<(Pid, String)> = Vec::new();
            let mut leaders: Vec<(Pid, String)> = Vec::new();
            let mut pid_leaders: HashMap<u32, String> = HashMap::new();
            let mut followers: Vec<(Pid, String)> = Vec::new();
            for part in &table.table_partition {
                for meta in &part.partition_meta {
                    if !meta.is_alive {
                        continue;
                    }
                    all_replicas.push((part.pid, meta.endpoint.clone()));
                    if meta.is_leader {
                        leaders.push((part.pid, meta.endpoint.clone()));
                        pid_leaders.insert(part.pid.0, meta.endpoint.clone());
                    } else if !followers.iter().any(|(p, _)| *p == part.pid) {
                        followers.push((part.pid, meta.endpoint.clone()));
                    }
                }
            }
            let table_sync = task(
                TaskType::TableSync,
                "",
                TaskKind::TableSync {
                    tid: *tid,
                    name: name.to_string(),
                    db: db.to_string(),
                    column_key: column_key.clone(),
                },
            );
            let add_to_tablets = task(
                TaskType::AddIndexToTablet,
                "",
                TaskKind::AddIndexToTablet {
                    tid: *tid,
                    column_key: column_key.clone(),
                    cols: cols.clone(),
                    targets: all_replicas.clone(),
                },
            )
            .with_fanout(&all_replicas);

            if *skip_data {
                vec![add_to_tablets, table_sync]
            } else {
                let mut tasks = vec![
                    task(
                        TaskType::DumpIndexData,
                        "",
                        TaskKind::DumpIndexData {
                            tid: *tid,
                            partition_num,
                            column_key: column_key.clone(),
                            idx,
                            targets: leaders.clone(),
                        },
                    )
                    .with_fanout(&leaders),
                    task(
                        TaskType::SendIndexData,
                        "",
                        TaskKind::SendIndexData {
                            tid: *tid,
                            targets: leaders.clone(),
                            pid_leaders,
                        },
                    )
                    .with_fanout(&leaders),
                    add_to_tablets,
                    task(
                        TaskType::ExtractIndexData,
                        "",
                        TaskKind::ExtractIndexData {
                            tid: *tid,
                            partition_num,
                            column_key: column_key.clone(),
                            idx,
                            targets: all_replicas.clone(),
                        },
                    )
                    .with_fanout(&all_replicas),
                    task(
                        TaskType::LoadIndexData,
                        "",
                        TaskKind::LoadIndexData {
                            tid: *tid,
                            partition_num,
                            targets: leaders.clone(),
                        },
                    )
                    .with_fanout(&leaders),
                ];
                for (pid, follower) in &followers {
                    tasks.push(check_binlog(*pid, follower));
                }
                tasks.push(table_sync);
                tasks
            }
        }

        OpPayload::CreateTableRemote { alias, table_info } => vec![task(
            TaskType::CreateTableRemote,
            alias,
            TaskKind::CreateTableRemote {
                alias: alias.clone(),
                table_info: table_info.clone(),
            },
        )],

        OpPayload::DropTableRemote { alias, name, db } => vec![task(
            TaskType::DropTableRemote,
            alias,
            TaskKind::DropTableRemote {
                alias: alias.clone(),
                name: name.clone(),
                db: db.clone(),
            },
        )],

        OpPayload::AddReplicaRemote { alias, tid, pid }
        | OpPayload::AddReplicaSimplyRemote { alias, tid, pid } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            let simply = matches!(data.payload, OpPayload::AddReplicaSimplyRemote { .. });
            let mut tasks = Vec::new();
            if !simply {
                tasks.push(task(
                    TaskType::PauseSnapshot,
                    &leader,
                    TaskKind::PauseSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ));
                tasks.push(task(
                    TaskType::SendSnapshot,
                    &leader,
                    TaskKind::SendSnapshot {
                        tid: *tid,
                        pid: *pid,
                        src: leader.clone(),
                        dst: String::new(),
                        remote: Some(alias.clone()),
                    },
                ));
                tasks.push(task(
                    TaskType::RecoverSnapshot,
                    &leader,
                    TaskKind::RecoverSnapshot {
                        tid: *tid,
                        pid: *pid,
                        endpoint: leader.clone(),
                    },
                ));
            }
            tasks.push(task(
                TaskType::AddReplicaRemote,
                &leader,
                TaskKind::AddReplica {
                    tid: *tid,
                    pid: *pid,
                    leader: leader.clone(),
                    follower: String::new(),
                    remote: Some(alias.clone()),
                },
            ));
            tasks.push(task(
                TaskType::AddTableInfo,
                alias,
                TaskKind::AddTableInfo {
                    name: name.to_string(),
                    db: db.to_string(),
                    pid: *pid,
                    endpoint: String::new(),
                    remote: Some(alias.clone()),
                },
            ));
            tasks
        }

        OpPayload::AddReplicaNsRemote { alias, pid } => vec![task(
            TaskType::AddReplicaNsRemote,
            alias,
            TaskKind::AddReplicaNsRemote {
                alias: alias.clone(),
                name: name.to_string(),
                db: db.to_string(),
                pid: *pid,
            },
        )],

        OpPayload::DelReplicaRemote {
            alias,
            tid,
            pid,
            endpoint,
        } => {
            let leader = leader_endpoint(catalog, db, name, *pid)?;
            vec![
                task(
                    TaskType::DelReplicaRemote,
                    &leader,
                    TaskKind::DelReplica {
                        tid: *tid,
                        pid: *pid,
                        leader: leader.clone(),
                        follower: endpoint.clone(),
                    },
                ),
                task(
                    TaskType::DelTableInfo,
                    alias,
                    TaskKind::DelTableInfo {
                        name: name.to_string(),
                        db: db.to_string(),
                        pid: *pid,
                        endpoint: endpoint.clone(),
                        remote: Some(alias.clone()),
                    },
                ),
            ]
        }
    };
    Ok(tasks)
}

/// Rebuild the task chain during coordinator recovery: skip the first
/// `task_index` tasks and fix up the resume status of the new head.
/// Pure-local idempotent task types re-execute from `Inited`; RPC-driven
/// tasks resume as `Doing` and rely on the next status poll.
pub fn recover_tasks(
    data: &OpData,
    catalog: &TableCatalog,
    config: &NameServerConfig,
) -> Result<Vec<Task>, NsError> {
    let mut tasks = build_tasks(data, catalog, config)?;
    let skip = (data.task_index as usize).min(tasks.len());
    tasks.drain(..skip);

    if let Some(first) = tasks.first_mut() {
        if first.info.task_type.rerun_on_recovery() {
            first.info.status = TaskStatus::Inited;
            first.info.is_rpc_send = false;
        } else {
            first.info.status = TaskStatus::Doing;
            first.info.is_rpc_send = true;
            for sub in &mut first.sub {
                sub.status = TaskStatus::Doing;
            }
        }
    }
    Ok(tasks)
}

/// Recompute the snapshot end offset floor for one partition: the minimum
/// across the local leader offset and every remote replica's last reported
/// offset, so no cluster loses binlog catch-up ability.
pub fn snapshot_offset_floor(
    local_leader_offset: u64,
    remote_offsets: impl IntoIterator<Item = u64>,
) -> u64 {
    remote_offsets
        .into_iter()
        .fold(local_leader_offset, |floor, offset| floor.min(offset))
}

#[cfg(test)]
mod tests {
    use super::*;
    use metaplane::op::OpPayload;
    use metaplane::table::{ColumnDesc, ColumnKey, CompressType, PartitionMeta, TableInfo,
        TablePartition, TtlDesc};
    use metaplane::types::{ColumnType, OpId, Tid};

    fn catalog_with_table(replicas: &[(&str, bool)]) -> TableCatalog {
        let mut catalog = TableCatalog::new();
        let mut part = TablePartition::new(Pid(0));
        for (ep, leader) in replicas {
            part.partition_meta.push(PartitionMeta::new(ep, *leader));
        }
        catalog.insert(TableInfo {
            tid: Tid(1),
            name: "t1".to_string(),
            db: String::new(),
            column_desc: vec![
                ColumnDesc::new("k", ColumnType::String).index(),
                ColumnDesc::new("v", ColumnType::BigInt),
            ],
            column_keys: vec![ColumnKey {
                index_name: "k".to_string(),
                col_names: vec!["k".to_string()],
                ts_name: None,
                flag: 0,
            }],
            partition_key: vec![],
            ttl: TtlDesc::default(),
            partition_num: 1,
            replica_num: replicas.len() as u32,
            compress_type: CompressType::NoCompress,
            seg_cnt: 8,
            format_version: 1,
            added_columns: vec![],
            version_pairs: vec![],
            table_partition: vec![part],
        });
        catalog
    }

    fn types_of(tasks: &[Task]) -> Vec<TaskType> {
        tasks.iter().map(|t| t.info.task_type).collect()
    }

    #[test]
    fn test_add_replica_chain() {
        let catalog = catalog_with_table(&[("a:9527", true)]);
        let data = OpData::new(
            OpId(1),
            OpType::AddReplica,
            OpPayload::AddReplica {
                tid: Tid(1),
                pid: Pid(0),
                endpoint: "b:9527".to_string(),
            },
            "t1",
            "",
        )
        .with_pid(Pid(0));
        let tasks = build_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        assert_eq!(
            types_of(&tasks),
            vec![
                TaskType::PauseSnapshot,
                TaskType::SendSnapshot,
                TaskType::LoadTable,
                TaskType::AddReplica,
                TaskType::RecoverSnapshot,
                TaskType::AddTableInfo,
                TaskType::CheckBinlogSyncProgress,
                TaskType::UpdatePartitionStatus,
            ]
        );
        assert_eq!(tasks[0].info.endpoint, "a:9527");
        assert_eq!(tasks[2].info.endpoint, "b:9527");
    }

    #[test]
    fn test_re_add_variants() {
        let catalog = catalog_with_table(&[("a:9527", true), ("b:9527", false)]);
        let payload = OpPayload::ReAddReplica {
            tid: Tid(1),
            pid: Pid(0),
            endpoint: "b:9527".to_string(),
        };
        let config = NameServerConfig::default();

        let mk = |op_type| {
            let mut data = OpData::new(OpId(1), op_type, payload.clone(), "t1", "");
            data.pid = Some(Pid(0));
            data
        };

        let full = build_tasks(&mk(OpType::ReAddReplica), &catalog, &config).unwrap();
        assert!(types_of(&full).contains(&TaskType::SendSnapshot));
        assert!(!types_of(&full).contains(&TaskType::DropTable));

        let with_drop =
            build_tasks(&mk(OpType::ReAddReplicaWithDrop), &catalog, &config).unwrap();
        assert_eq!(with_drop[0].info.task_type, TaskType::DropTable);

        let no_send = build_tasks(&mk(OpType::ReAddReplicaNoSend), &catalog, &config).unwrap();
        assert!(!types_of(&no_send).contains(&TaskType::SendSnapshot));
        assert!(types_of(&no_send).contains(&TaskType::LoadTable));

        let simplify =
            build_tasks(&mk(OpType::ReAddReplicaSimplify), &catalog, &config).unwrap();
        assert_eq!(
            types_of(&simplify),
            vec![
                TaskType::AddReplica,
                TaskType::CheckBinlogSyncProgress,
                TaskType::UpdatePartitionStatus,
            ]
        );
    }

    #[test]
    fn test_change_leader_chain() {
        let catalog = catalog_with_table(&[("a:9527", true), ("b:9527", false)]);
        let data = OpData::new(
            OpId(2),
            OpType::ChangeLeader,
            OpPayload::ChangeLeader {
                tid: Tid(1),
                pid: Pid(0),
                candidates: vec!["b:9527".to_string()],
                candidate_leader: None,
                chosen: None,
                term: 0,
                offset: 0,
            },
            "t1",
            "",
        )
        .with_pid(Pid(0));
        let tasks = build_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        assert_eq!(
            types_of(&tasks),
            vec![
                TaskType::SelectLeader,
                TaskType::ChangeLeader,
                TaskType::UpdateLeaderInfo,
            ]
        );
    }

    #[test]
    fn test_add_replica_without_leader_fails() {
        let mut catalog = catalog_with_table(&[("a:9527", true)]);
        catalog
            .get_mut("", "t1")
            .unwrap()
            .partition_mut(Pid(0))
            .unwrap()
            .replica_mut("a:9527")
            .unwrap()
            .is_alive = false;
        let data = OpData::new(
            OpId(1),
            OpType::AddReplica,
            OpPayload::AddReplica {
                tid: Tid(1),
                pid: Pid(0),
                endpoint: "b:9527".to_string(),
            },
            "t1",
            "",
        );
        assert!(matches!(
            build_tasks(&data, &catalog, &NameServerConfig::default()),
            Err(NsError::CreateOpFailed { .. })
        ));
    }

    #[test]
    fn test_add_index_skip_data() {
        let catalog = catalog_with_table(&[("a:9527", true), ("b:9527", false)]);
        let data = OpData::new(
            OpId(3),
            OpType::AddIndex,
            OpPayload::AddIndex {
                tid: Tid(1),
                column_key: ColumnKey {
                    index_name: "ix_v".to_string(),
                    col_names: vec!["v".to_string()],
                    ts_name: None,
                    flag: 0,
                },
                cols: vec![],
                skip_data: true,
            },
            "t1",
            "",
        );
        let tasks = build_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        assert_eq!(
            types_of(&tasks),
            vec![TaskType::AddIndexToTablet, TaskType::TableSync]
        );
        assert_eq!(tasks[0].sub.len(), 2);
    }

    #[test]
    fn test_add_index_full_pipeline() {
        let catalog = catalog_with_table(&[("a:9527", true), ("b:9527", false)]);
        let data = OpData::new(
            OpId(3),
            OpType::AddIndex,
            OpPayload::AddIndex {
                tid: Tid(1),
                column_key: ColumnKey {
                    index_name: "ix_v".to_string(),
                    col_names: vec!["v".to_string()],
                    ts_name: None,
                    flag: 0,
                },
                cols: vec![],
                skip_data: false,
            },
            "t1",
            "",
        );
        let tasks = build_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        let types = types_of(&tasks);
        assert_eq!(
            types,
            vec![
                TaskType::DumpIndexData,
                TaskType::SendIndexData,
                TaskType::AddIndexToTablet,
                TaskType::ExtractIndexData,
                TaskType::LoadIndexData,
                TaskType::CheckBinlogSyncProgress,
                TaskType::TableSync,
            ]
        );
    }

    #[test]
    fn test_recover_skips_done_tasks() {
        let catalog = catalog_with_table(&[("a:9527", true)]);
        let mut data = OpData::new(
            OpId(1),
            OpType::AddReplica,
            OpPayload::AddReplica {
                tid: Tid(1),
                pid: Pid(0),
                endpoint: "b:9527".to_string(),
            },
            "t1",
            "",
        )
        .with_pid(Pid(0));
        data.task_index = 3;
        let tasks = recover_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        // 8-task chain minus 3 completed.
        assert_eq!(tasks.len(), 5);
        // AddReplica is RPC-driven: resumes as Doing awaiting the poller.
        assert_eq!(tasks[0].info.task_type, TaskType::AddReplica);
        assert_eq!(tasks[0].info.status, TaskStatus::Doing);
        assert!(tasks[0].info.is_rpc_send);
    }

    #[test]
    fn test_recover_reruns_local_tasks() {
        let catalog = catalog_with_table(&[("a:9527", true)]);
        let mut data = OpData::new(
            OpId(1),
            OpType::AddReplica,
            OpPayload::AddReplica {
                tid: Tid(1),
                pid: Pid(0),
                endpoint: "b:9527".to_string(),
            },
            "t1",
            "",
        )
        .with_pid(Pid(0));
        data.task_index = 5;
        let tasks = recover_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        assert_eq!(tasks[0].info.task_type, TaskType::AddTableInfo);
        assert_eq!(tasks[0].info.status, TaskStatus::Inited);
    }

    #[test]
    fn test_recover_past_end_is_noop() {
        let catalog = catalog_with_table(&[("a:9527", true)]);
        let mut data = OpData::new(
            OpId(1),
            OpType::MakeSnapshot,
            OpPayload::MakeSnapshot {
                tid: Tid(1),
                pid: Pid(0),
                endpoint: "a:9527".to_string(),
                end_offset: 0,
            },
            "t1",
            "",
        );
        data.task_index = 1;
        let tasks = recover_tasks(&data, &catalog, &NameServerConfig::default()).unwrap();
        assert!(tasks.is_empty());
    }

    #[test]
    fn test_snapshot_offset_floor() {
        assert_eq!(snapshot_offset_floor(900, vec![500]), 500);
        assert_eq!(snapshot_offset_floor(400, vec![500, 600]), 400);
        assert_eq!(snapshot_offset_floor(900, vec![]), 900);
    }
}
