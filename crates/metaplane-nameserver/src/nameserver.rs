//! The coordinator.
//!
//! One `NameServer` instance contends for the cluster's distributed lock;
//! the winner loads all persisted state from the metastore, starts the
//! background schedulers, and serves the admin surface. In-memory state for
//! the registry, catalog, and OP engine lives behind one main mutex; every
//! outbound RPC happens lockless and reconciles status under the mutex
//! afterwards.

use crate::catalog::TableCatalog;
use crate::config::NameServerConfig;
use crate::error::NsError;
use crate::op_builders::{build_tasks, recover_tasks};
use crate::op_engine::{Op, OpEngine};
use crate::peer::PeerProvider;
use crate::registry::TabletRegistry;
use crate::remote::ClusterInfo;
use crate::tablet::{TabletProvider, TaskStatusEntry};
use chrono::Utc;
use metaplane::op::{OpData, OpPayload};
use metaplane::table::{ProcedureInfo, TableInfo, ZoneInfo};
use metaplane::types::{ClusterMode, OpId, OpType, Pid, TaskStatus, TaskType};
use metaplane_metastore::{MetaError, MetaEvent, MetaStore, Paths};
use parking_lot::Mutex;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use tokio::sync::Notify;
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};

/// In-memory coordinator state, guarded by the main mutex.
pub(crate) struct Core {
    pub registry: TabletRegistry,
    pub catalog: TableCatalog,
    pub engine: OpEngine,
    pub replicas: BTreeMap<String, ClusterInfo>,
    pub mode: ClusterMode,
    /// This cluster's zone identity; in follower mode it carries the owning
    /// leader cluster's zone.
    pub zone_info: ZoneInfo,
    pub auto_failover: bool,
}

pub struct NameServer {
    pub(crate) config: NameServerConfig,
    pub(crate) paths: Paths,
    pub(crate) meta: Arc<dyn MetaStore>,
    pub(crate) tablet_provider: Arc<dyn TabletProvider>,
    pub(crate) peer_provider: Arc<dyn PeerProvider>,
    pub(crate) core: Mutex<Core>,
    running: AtomicBool,
    stopped: AtomicBool,
    /// Guards against racing concurrent status pollers.
    pub(crate) task_rpc_version: AtomicU64,
    pub(crate) worker_notify: Notify,
    pub(crate) events_tx: UnboundedSender<MetaEvent>,
    events_rx: Mutex<Option<UnboundedReceiver<MetaEvent>>>,
}

impl NameServer {
    pub fn new(
        config: NameServerConfig,
        meta: Arc<dyn MetaStore>,
        tablet_provider: Arc<dyn TabletProvider>,
        peer_provider: Arc<dyn PeerProvider>,
    ) -> Arc<Self> {
        let paths = Paths::new(&config.root_path);
        let (events_tx, events_rx) = unbounded_channel();
        let zone_info = ZoneInfo {
            zone_name: config.root_path.clone(),
            zone_term: 1,
            replica_alias: String::new(),
            mode: ClusterMode::Normal,
        };
        let core = Core {
            registry: TabletRegistry::new(),
            catalog: TableCatalog::new(),
            engine: OpEngine::new(
                config.queue_count(),
                config.max_concurrency,
                config.max_op_num,
            ),
            replicas: BTreeMap::new(),
            mode: ClusterMode::Normal,
            zone_info,
            auto_failover: config.auto_failover,
        };
        Arc::new(Self {
            config,
            paths,
            meta,
            tablet_provider,
            peer_provider,
            core: Mutex::new(core),
            running: AtomicBool::new(false),
            stopped: AtomicBool::new(false),
            task_rpc_version: AtomicU64::new(0),
            worker_notify: Notify::new(),
            events_tx,
            events_rx: Mutex::new(Some(events_rx)),
        })
    }

    /// Contend for leadership and start the background machinery. Returns
    /// immediately; the instance becomes active once it wins the lock.
    pub fn start(self: &Arc<Self>) -> Result<(), NsError> {
        let rx = self
            .events_rx
            .lock()
            .take()
            .ok_or(NsError::InvalidParameter {
                reason: "nameserver already started".to_string(),
            })?;

        tokio::spawn(Arc::clone(self).run_event_loop(rx));
        tokio::spawn(Arc::clone(self).run_worker());
        tokio::spawn(Arc::clone(self).run_task_status_poller());
        tokio::spawn(Arc::clone(self).run_table_status_aggregator());
        tokio::spawn(Arc::clone(self).run_cluster_checker());
        tokio::spawn(Arc::clone(self).run_snapshot_cron());
        tokio::spawn(Arc::clone(self).run_real_ep_pusher());
        tokio::spawn(Arc::clone(self).run_heartbeat_checker());

        let acquired = self
            .meta
            .acquire_lock(
                &self.paths.leader(),
                self.config.endpoint.as_bytes(),
                self.events_tx.clone(),
            )
            .map_err(NsError::MetaWrite)?;
        if acquired {
            // Fast path: deliver the event ourselves, the lock was free.
            let _ = self.events_tx.send(MetaEvent::LockAcquired {
                path: self.paths.leader(),
            });
        }
        Ok(())
    }

    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
        self.running.store(false, Ordering::SeqCst);
        self.worker_notify.notify_one();
        let _ = self.meta.release_lock(&self.paths.leader());
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn is_stopped(&self) -> bool {
        self.stopped.load(Ordering::SeqCst)
    }

    pub fn endpoint(&self) -> &str {
        &self.config.endpoint
    }

    pub fn cluster_mode(&self) -> ClusterMode {
        self.core.lock().mode
    }

    // ===========================
    // Event reducer
    // ===========================

    async fn run_event_loop(self: Arc<Self>, mut rx: UnboundedReceiver<MetaEvent>) {
        while let Some(event) = rx.recv().await {
            if self.is_stopped() {
                break;
            }
            match event {
                MetaEvent::LockAcquired { .. } => {
                    tracing::info!(endpoint = %self.config.endpoint, "acquired coordinator lock");
                    if let Err(e) = self.become_leader().await {
                        tracing::error!(error = %e, "recovery failed; relinquishing leadership");
                        let _ = self.meta.release_lock(&self.paths.leader());
                    }
                }
                MetaEvent::LockLost { .. } => {
                    tracing::warn!(endpoint = %self.config.endpoint, "lost coordinator lock, going standby");
                    self.running.store(false, Ordering::SeqCst);
                }
                MetaEvent::ChildrenChanged { path, children } => {
                    if path == self.paths.nodes() {
                        self.on_nodes_changed(children);
                    }
                }
                MetaEvent::ValueChanged { .. } => {}
                MetaEvent::SessionReset { term } => {
                    tracing::warn!(term, "metastore session reset, re-arming watches");
                    let _ = self
                        .meta
                        .watch_children(&self.paths.nodes(), self.events_tx.clone());
                }
            }
        }
    }

    // ===========================
    // Leadership & recovery
    // ===========================

    async fn become_leader(self: &Arc<Self>) -> Result<(), NsError> {
        self.meta
            .watch_children(&self.paths.nodes(), self.events_tx.clone())
            .map_err(NsError::MetaWrite)?;

        self.recover().await?;
        self.running.store(true, Ordering::SeqCst);
        self.worker_notify.notify_one();
        tracing::info!(endpoint = %self.config.endpoint, "coordinator is now active");
        Ok(())
    }

    /// Load every piece of persisted state, in dependency order: zone mode,
    /// config, membership, catalog, peers, procedures, sdk endpoints, and
    /// finally the OP list with rebuilt task chains.
    async fn recover(self: &Arc<Self>) -> Result<(), NsError> {
        // Zone info (follower mode survives coordinator failover).
        let zone: Option<ZoneInfo> = self.read_node(&self.paths.follower())?;

        // auto_failover flag.
        let auto_failover = match self.meta.get(&self.paths.auto_failover()) {
            Ok(value) => value == b"true",
            Err(MetaError::NodeNotFound { .. }) => self.config.auto_failover,
            Err(e) => return Err(NsError::MetaRead(e)),
        };

        // Tablet membership snapshot.
        let nodes = match self.meta.children(&self.paths.nodes()) {
            Ok(children) => children,
            Err(e) if e.is_not_found() => Vec::new(),
            Err(e) => return Err(NsError::MetaRead(e)),
        };

        // Catalog: default-db tables by name, named-db tables by tid.
        let mut tables: Vec<TableInfo> = Vec::new();
        for name in self.children_or_empty(&self.paths.table_data_root())? {
            if let Some(table) = self.read_node(&self.paths.table_data(&name))? {
                tables.push(table);
            }
        }
        for tid in self.children_or_empty(&self.paths.db_table_data_root())? {
            let path = format!("{}/{}", self.paths.db_table_data_root(), tid);
            if let Some(table) = self.read_node_at::<TableInfo>(&path)? {
                tables.push(table);
            }
        }

        let databases = self.children_or_empty(&self.paths.db_root())?;

        // Procedures are snappy-compressed.
        let mut procedures: Vec<ProcedureInfo> = Vec::new();
        for key in self.children_or_empty(&self.paths.procedure_root())? {
            let path = format!("{}/{}", self.paths.procedure_root(), key);
            let compressed = self.meta.get(&path).map_err(NsError::MetaRead)?;
            let raw = snap::raw::Decoder::new()
                .decompress_vec(&compressed)
                .map_err(|e| NsError::InvalidParameter {
                    reason: format!("corrupt procedure node '{path}': {e}"),
                })?;
            let sp: ProcedureInfo =
                serde_json::from_slice(&raw).map_err(|e| NsError::InvalidParameter {
                    reason: format!("corrupt procedure node '{path}': {e}"),
                })?;
            procedures.push(sp);
        }

        // SDK endpoint map.
        let mut sdk_endpoints: Vec<(String, String)> = Vec::new();
        for ep in self.children_or_empty(&self.paths.sdk_endpoint_root())? {
            let value = self
                .meta
                .get(&self.paths.sdk_endpoint(&ep))
                .map_err(NsError::MetaRead)?;
            sdk_endpoints.push((ep, String::from_utf8_lossy(&value).into_owned()));
        }

        // Replica clusters reconnect outside the lock.
        let peer_addresses: Vec<metaplane::table::ClusterAddress> = {
            let mut addrs = Vec::new();
            for alias in self.children_or_empty(&self.paths.replica_cluster_root())? {
                if let Some(addr) = self.read_node_at(&self.paths.replica_cluster(&alias))? {
                    addrs.push(addr);
                }
            }
            addrs
        };
        let mut peers = Vec::new();
        for addr in peer_addresses {
            match ClusterInfo::connect(self, &addr).await {
                Ok(info) => peers.push(info),
                Err(e) => {
                    tracing::warn!(alias = %addr.alias, error = %e, "replica cluster reconnect failed");
                }
            }
        }

        // Persisted OPs.
        let mut op_datas: Vec<OpData> = Vec::new();
        for id in self.children_or_empty(&self.paths.op_data_root())? {
            let path = format!("{}/{}", self.paths.op_data_root(), id);
            if let Some(data) = self.read_node_at::<OpData>(&path)? {
                op_datas.push(data);
            }
        }
        op_datas.sort_by_key(|d| d.op_id);

        let mut core = self.core.lock();
        core.auto_failover = auto_failover;
        if let Some(zone) = zone {
            core.mode = zone.mode;
            core.zone_info = zone;
        }

        core.catalog = TableCatalog::new();
        for db in databases {
            let _ = core.catalog.create_db(&db);
        }
        for table in tables {
            core.catalog.insert(table);
        }
        for sp in procedures {
            core.catalog.insert_procedure(sp);
        }
        for (ep, real) in sdk_endpoints {
            core.catalog.load_sdk_endpoint(&ep, &real);
        }

        core.replicas.clear();
        for peer in peers {
            core.replicas.insert(peer.address.alias.clone(), peer);
        }

        core.registry = TabletRegistry::new();
        let provider = Arc::clone(&self.tablet_provider);
        let meta = Arc::clone(&self.meta);
        let paths = self.paths.clone();
        let use_names = self.config.use_name_indirection;
        core.registry
            .apply_membership(&nodes, provider.as_ref(), |ep| {
                use_names
                    .then(|| meta.get(&paths.name_map(ep)).ok())
                    .flatten()
                    .map(|v| String::from_utf8_lossy(&v).into_owned())
            });

        core.engine = OpEngine::new(
            self.config.queue_count(),
            self.config.max_concurrency,
            self.config.max_op_num,
        );
        for mut data in op_datas {
            if data.status.is_terminal() {
                core.engine.push_done(Op::new(data, Vec::new()));
                continue;
            }
            match recover_tasks(&data, &core.catalog, &self.config) {
                Ok(tasks) => {
                    if data.vec_idx.is_none() {
                        data.vec_idx = Some(core.engine.vec_idx_for(&data, None));
                    }
                    tracing::info!(op_id = %data.op_id, op_type = %data.op_type,
                        task_index = data.task_index, "recovered op");
                    core.engine.add(Op::new(data, tasks));
                }
                Err(e) => {
                    tracing::warn!(op_id = %data.op_id, error = %e,
                        "failed to rebuild task list, marking op failed");
                    data.status = TaskStatus::Failed;
                    core.engine.push_done(Op::new(data, Vec::new()));
                }
            }
        }
        core.engine.sort_queues();
        Ok(())
    }

    // ===========================
    // Membership reduction
    // ===========================

    fn on_nodes_changed(self: &Arc<Self>, children: Vec<String>) {
        if !self.is_running() {
            return;
        }
        let diff = {
            let mut core = self.core.lock();
            let provider = Arc::clone(&self.tablet_provider);
            let meta = Arc::clone(&self.meta);
            let paths = self.paths.clone();
            let use_names = self.config.use_name_indirection;
            core.registry
                .apply_membership(&children, provider.as_ref(), |ep| {
                    use_names
                        .then(|| meta.get(&paths.name_map(ep)).ok())
                        .flatten()
                        .map(|v| String::from_utf8_lossy(&v).into_owned())
                })
        };
        if diff.is_empty() {
            return;
        }
        tracing::info!(?diff, "tablet membership changed");
        let _ = self.notify_catalog_changed();

        for endpoint in diff.joined.iter().chain(diff.reappeared.iter()) {
            let ns = Arc::clone(self);
            let endpoint = endpoint.clone();
            tokio::spawn(async move {
                ns.on_tablet_online(&endpoint).await;
            });
        }
        for endpoint in diff.disappeared {
            let ns = Arc::clone(self);
            tokio::spawn(async move {
                // Debounce: give the tablet a heartbeat window to come back.
                tokio::time::sleep(ns.config.heartbeat_timeout).await;
                let still_offline = {
                    let core = ns.core.lock();
                    core.registry
                        .get(&endpoint)
                        .is_some_and(|t| !t.is_healthy())
                };
                if still_offline {
                    ns.on_tablet_offline(&endpoint).await;
                }
            });
        }
    }

    // ===========================
    // Persistence helpers
    // ===========================

    pub(crate) fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, NsError> {
        serde_json::to_vec(value).map_err(|e| NsError::InvalidParameter {
            reason: format!("serialization failed: {e}"),
        })
    }

    fn read_node<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, NsError> {
        self.read_node_at(path)
    }

    fn read_node_at<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, NsError> {
        match self.meta.get(path) {
            Ok(bytes) => serde_json::from_slice(&bytes)
                .map(Some)
                .map_err(|e| NsError::InvalidParameter {
                    reason: format!("corrupt node '{path}': {e}"),
                }),
            Err(MetaError::NodeNotFound { .. }) => Ok(None),
            Err(e) => Err(NsError::MetaRead(e)),
        }
    }

    fn children_or_empty(&self, path: &str) -> Result<Vec<String>, NsError> {
        match self.meta.children(path) {
            Ok(children) => Ok(children),
            Err(e) if e.is_not_found() => Ok(Vec::new()),
            Err(e) => Err(NsError::MetaRead(e)),
        }
    }

    /// Serialize and write the table's metastore node. Callers commit the
    /// in-memory change only after this succeeds.
    pub(crate) fn persist_table(&self, table: &TableInfo) -> Result<(), NsError> {
        let bytes = Self::encode(table)?;
        let path = if table.db.is_empty() {
            self.paths.table_data(&table.name)
        } else {
            self.paths.db_table_data(table.tid)
        };
        self.meta.set(&path, &bytes).map_err(NsError::MetaWrite)
    }

    pub(crate) fn delete_table_node(&self, table: &TableInfo) -> Result<(), NsError> {
        let path = if table.db.is_empty() {
            self.paths.table_data(&table.name)
        } else {
            self.paths.db_table_data(table.tid)
        };
        match self.meta.delete(&path) {
            Ok(()) | Err(MetaError::NodeNotFound { .. }) => Ok(()),
            Err(e) => Err(NsError::MetaWrite(e)),
        }
    }

    /// Bump the notify node so tablets and SDKs re-fetch the catalog.
    pub(crate) fn notify_catalog_changed(&self) -> Result<(), NsError> {
        self.meta
            .increment(&self.paths.notify())
            .map(|_| ())
            .map_err(NsError::MetaWrite)
    }

    pub(crate) fn persist_op(&self, data: &OpData) -> Result<(), NsError> {
        let bytes = Self::encode(data)?;
        self.meta
            .set(&self.paths.op_data(data.op_id), &bytes)
            .map_err(NsError::MetaWrite)
    }

    pub(crate) fn delete_op_node(&self, op_id: OpId) {
        match self.meta.delete(&self.paths.op_data(op_id)) {
            Ok(()) | Err(MetaError::NodeNotFound { .. }) => {}
            Err(e) => tracing::warn!(%op_id, error = %e, "failed to delete op node"),
        }
    }

    // ===========================
    // OP creation
    // ===========================

    /// Allocate an op id, persist the Inited record, build its task chain,
    /// and enqueue it. This is the single entry point used by admin
    /// handlers, the failover controller, and the remote manager; the
    /// caller holds the main mutex.
    pub(crate) fn create_op_locked(
        &self,
        core: &mut Core,
        op_type: OpType,
        payload: OpPayload,
        name: &str,
        db: &str,
        pid: Option<Pid>,
        parent_id: Option<OpId>,
        remote_op_id: Option<OpId>,
    ) -> Result<OpId, NsError> {
        self.create_op_with_concurrency(
            core,
            op_type,
            payload,
            name,
            db,
            pid,
            parent_id,
            remote_op_id,
            None,
        )
    }

    /// Like [`Self::create_op_locked`], but with an admin-supplied
    /// concurrency override: the OP's queue is picked as
    /// `pid % override_concurrency` instead of `pid % max_concurrency`, so
    /// a recovery burst can be squeezed onto fewer queues. Children still
    /// inherit their parent's queue over any override.
    pub(crate) fn create_op_with_concurrency(
        &self,
        core: &mut Core,
        op_type: OpType,
        payload: OpPayload,
        name: &str,
        db: &str,
        pid: Option<Pid>,
        parent_id: Option<OpId>,
        remote_op_id: Option<OpId>,
        override_concurrency: Option<u32>,
    ) -> Result<OpId, NsError> {
        let op_id = self
            .meta
            .increment(&self.paths.op_index())
            .map(OpId)
            .map_err(NsError::MetaWrite)?;

        let mut data = OpData::new(op_id, op_type, payload, name, db);
        data.pid = pid;
        data.parent_id = parent_id;
        data.remote_op_id = remote_op_id;

        let tasks = build_tasks(&data, &core.catalog, &self.config)?;
        if tasks.is_empty() {
            return Err(NsError::CreateOpFailed {
                reason: format!("op {op_type} built an empty task list"),
            });
        }
        data.vec_idx = match parent_id
            .and_then(|parent| core.engine.find(parent).and_then(|op| op.data.vec_idx))
        {
            Some(idx) => Some(idx),
            None => Some(core.engine.vec_idx_for(&data, override_concurrency)),
        };
        self.persist_op(&data)?;
        tracing::info!(%op_id, op_type = %op_type, name, db, ?pid, "created op");
        core.engine.add(Op::new(data, tasks));
        self.worker_notify.notify_one();
        Ok(op_id)
    }

    // ===========================
    // Queue worker
    // ===========================

    async fn run_worker(self: Arc<Self>) {
        loop {
            if self.is_stopped() {
                break;
            }
            tokio::select! {
                _ = self.worker_notify.notified() => {}
                _ = tokio::time::sleep(self.config.task_poll_interval) => {}
            }
            if !self.is_running() {
                continue;
            }
            self.process_queues();
        }
    }

    /// One wake cycle: scan every queue head, advancing finished tasks,
    /// finishing terminal OPs, and collecting dispatchable tasks. Dispatch
    /// happens after the lock is released.
    pub(crate) fn process_queues(self: &Arc<Self>) {
        enum HeadAction {
            Dispatch(TaskType, crate::tasks::TaskKind),
            Wait,
            AdvanceTask,
            Finish(TaskStatus),
        }

        let now = Utc::now();
        let mut spawns: Vec<(OpId, TaskType, crate::tasks::TaskKind)> = Vec::new();
        let mut finished: Vec<(OpId, TaskStatus)> = Vec::new();

        {
            let mut core = self.core.lock();
            for idx in 0..core.engine.queue_count() {
                loop {
                    // Phase 1: inspect the head and decide, under a short borrow.
                    let (op_id, action) = {
                        let Some(op) = core.engine.head_mut(idx) else {
                            break;
                        };
                        let op_id = op.data.op_id;
                        if op.data.status == TaskStatus::Inited {
                            op.data.status = TaskStatus::Doing;
                            op.data.start_time = Some(now);
                            let snapshot = op.data.clone();
                            if let Err(e) = self.persist_op(&snapshot) {
                                tracing::warn!(%op_id, error = %e, "failed to persist op start");
                            }
                        }
                        let start_time = op.data.start_time;
                        let op_type = op.data.op_type;
                        let action = match op.current_task_mut() {
                            None => HeadAction::Finish(TaskStatus::Done),
                            Some(task) => match task.effective_status() {
                                TaskStatus::Inited => {
                                    task.info.status = TaskStatus::Doing;
                                    task.info.is_rpc_send = true;
                                    for sub in &mut task.sub {
                                        sub.status = TaskStatus::Doing;
                                    }
                                    HeadAction::Dispatch(task.info.task_type, task.kind.clone())
                                }
                                TaskStatus::Doing => {
                                    if let Some(start) = start_time {
                                        let elapsed = now
                                            .signed_duration_since(start)
                                            .to_std()
                                            .unwrap_or_default();
                                        if elapsed > self.config.op_execute_timeout {
                                            tracing::warn!(%op_id, %op_type,
                                                elapsed_secs = elapsed.as_secs(),
                                                "op exceeded execute timeout, still waiting");
                                        }
                                    }
                                    HeadAction::Wait
                                }
                                TaskStatus::Done => HeadAction::AdvanceTask,
                                TaskStatus::Failed => {
                                    tracing::warn!(%op_id, %op_type,
                                        task_type = %task.info.task_type,
                                        "task failed, failing op");
                                    HeadAction::Finish(TaskStatus::Failed)
                                }
                                TaskStatus::Canceled => HeadAction::Finish(TaskStatus::Canceled),
                            },
                        };
                        (op_id, action)
                    };

                    // Phase 2: act, re-borrowing as needed.
                    match action {
                        HeadAction::Dispatch(task_type, kind) => {
                            spawns.push((op_id, task_type, kind));
                            break;
                        }
                        HeadAction::Wait => break,
                        HeadAction::AdvanceTask => {
                            let Some(op) = core.engine.head_mut(idx) else {
                                break;
                            };
                            op.data.task_index += 1;
                            let snapshot = op.data.clone();
                            if let Err(e) = self.persist_op(&snapshot) {
                                tracing::warn!(%op_id, error = %e, "failed to persist task advance");
                                // Replay the same task after the metastore recovers.
                                op.data.task_index -= 1;
                                break;
                            }
                            op.tasks.pop_front();
                            continue;
                        }
                        HeadAction::Finish(status) => {
                            let Some(mut done) = core.engine.pop_head(idx) else {
                                break;
                            };
                            done.data.status = status;
                            done.data.end_time = Some(now);
                            match status {
                                // Failed ops keep their metastore node for forensics.
                                TaskStatus::Failed => {
                                    let _ = self.persist_op(&done.data);
                                }
                                _ => self.delete_op_node(op_id),
                            }
                            finished.push((op_id, status));
                            if let Some(evicted) = core.engine.push_done(done) {
                                if evicted.data.status != TaskStatus::Failed {
                                    self.delete_op_node(evicted.data.op_id);
                                }
                            }
                            continue;
                        }
                    }
                }
            }
        }

        for (op_id, status) in finished {
            tracing::info!(%op_id, %status, "op finished");
            let ns = Arc::clone(self);
            tokio::spawn(async move {
                ns.forget_op_on_tablets(op_id).await;
            });
        }
        for (op_id, task_type, kind) in spawns {
            let ns = Arc::clone(self);
            tokio::spawn(async move {
                ns.execute_task(op_id, task_type, kind).await;
            });
        }
    }

    /// Ask every healthy tablet (and every healthy peer) to drop its local
    /// knowledge of a finished op.
    pub(crate) async fn forget_op_on_tablets(self: &Arc<Self>, op_id: OpId) {
        let (clients, peers) = {
            let core = self.core.lock();
            let peers: Vec<_> = core
                .replicas
                .values()
                .filter(|p| p.is_healthy())
                .map(|p| p.client())
                .collect();
            (core.registry.healthy_clients(), peers)
        };
        for (endpoint, client) in clients {
            if let Err(e) = client.delete_op(op_id).await {
                tracing::debug!(%op_id, %endpoint, error = %e, "delete_op on tablet failed");
            }
        }
        for peer in peers {
            if let Err(e) = peer.delete_op(op_id).await {
                tracing::debug!(%op_id, error = %e, "delete_op on peer failed");
            }
        }
    }

    // ===========================
    // Task status reconciliation
    // ===========================

    /// Fold one batch of tablet task statuses into the engine; returns the
    /// number of tasks changed.
    pub(crate) fn apply_task_statuses(&self, entries: &[TaskStatusEntry]) -> usize {
        let mut changed = 0;
        let mut core = self.core.lock();
        for entry in entries {
            if core.engine.apply_task_status(
                entry.op_id,
                entry.task_type,
                &entry.endpoint,
                entry.status,
            ) {
                changed += 1;
            }
        }
        changed
    }

    /// The local real-endpoint map as pushed to tablets.
    pub fn show_real_endpoint_map(&self) -> std::collections::HashMap<String, String> {
        self.core.lock().registry.real_endpoint_map()
    }

    /// A leader cluster no longer cares about an op it enrolled here; drop
    /// the done-list record so it stops being reported.
    pub fn forget_remote_op(&self, remote_op_id: OpId) {
        let mut core = self.core.lock();
        core.engine.forget_remote(remote_op_id);
    }

    /// Statuses of OPs that were enrolled on behalf of a leader cluster
    /// (reported under the leader's op id).
    pub fn collect_remote_task_status(&self) -> Vec<TaskStatusEntry> {
        let core = self.core.lock();
        let mut entries = Vec::new();
        for op in core.engine.pending() {
            if let Some(remote_op_id) = op.data.remote_op_id {
                let task_type = op
                    .current_task()
                    .map(|t| t.info.task_type)
                    .unwrap_or(TaskType::UpdateTableInfo);
                entries.push(TaskStatusEntry {
                    op_id: remote_op_id,
                    task_type,
                    status: op.data.status,
                    endpoint: self.config.endpoint.clone(),
                });
            }
        }
        for op in core.engine.done_list() {
            if let Some(remote_op_id) = op.data.remote_op_id {
                entries.push(TaskStatusEntry {
                    op_id: remote_op_id,
                    task_type: TaskType::UpdateTableInfo,
                    status: op.data.status,
                    endpoint: self.config.endpoint.clone(),
                });
            }
        }
        entries
    }
}
