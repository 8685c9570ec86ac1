//! OP engine state: per-partition FIFO queues and the done list.
//!
//! K FIFO queues hold pending OPs; the first `max_concurrency` queues serve
//! local OPs (`vec_idx = pid % max_concurrency` so all OPs of one partition
//! stay ordered), the rest serve replica-cluster OPs. Queues are pure state
//! under the main mutex; the nameserver worker drives them.

use crate::tasks::Task;
use metaplane::op::OpData;
use metaplane::types::{OpId, TaskStatus, TaskType};
use rand::Rng;
use std::collections::VecDeque;
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// An OP with its rebuilt task chain. `tasks` holds only the remaining
/// tasks; completed ones are popped after `task_index` is persisted.
#[derive(Debug, Clone)]
pub struct Op {
    pub data: OpData,
    pub tasks: VecDeque<Task>,
}

impl Op {
    pub fn new(data: OpData, tasks: Vec<Task>) -> Self {
        Self {
            data,
            tasks: tasks.into(),
        }
    }

    pub fn current_task(&self) -> Option<&Task> {
        self.tasks.front()
    }

    pub fn current_task_mut(&mut self) -> Option<&mut Task> {
        self.tasks.front_mut()
    }

    pub fn cancel(&mut self) {
        self.data.status = TaskStatus::Canceled;
        for task in &mut self.tasks {
            if !task.info.status.is_terminal() {
                task.cancel();
            }
        }
    }
}

fn name_hash(name: &str) -> u64 {
    let mut hasher = DefaultHasher::new();
    name.hash(&mut hasher);
    hasher.finish()
}

/// Queue array plus the bounded done list.
pub struct OpEngine {
    queues: Vec<VecDeque<Op>>,
    done: VecDeque<Op>,
    max_concurrency: usize,
    max_op_num: usize,
}

impl OpEngine {
    pub fn new(queue_count: usize, max_concurrency: usize, max_op_num: usize) -> Self {
        assert!(queue_count >= max_concurrency && max_concurrency > 0);
        Self {
            queues: (0..queue_count).map(|_| VecDeque::new()).collect(),
            done: VecDeque::new(),
            max_concurrency,
            max_op_num,
        }
    }

    pub fn queue_count(&self) -> usize {
        self.queues.len()
    }

    /// Pick the queue for an OP. Local OPs hash by pid (or name when
    /// pid-less) into the local range; an admin-supplied override narrows
    /// that range so a recovery burst spreads over fewer queues. Replica-
    /// cluster OPs land in the remote range, by name hash when pid-less,
    /// uniformly at random otherwise.
    pub fn vec_idx_for(&self, data: &OpData, override_concurrency: Option<u32>) -> u32 {
        if data.for_replica_cluster {
            let remote_range = self.queues.len() - self.max_concurrency;
            let slot = match data.pid {
                None => (name_hash(&data.name) as usize) % remote_range,
                Some(_) => rand::thread_rng().gen_range(0..remote_range),
            };
            (self.max_concurrency + slot) as u32
        } else {
            let concurrency = override_concurrency
                .map(|c| c as usize)
                .filter(|c| (1..=self.max_concurrency).contains(c))
                .unwrap_or(self.max_concurrency);
            let slot = match data.pid {
                Some(pid) => (pid.0 as usize) % concurrency,
                None => (name_hash(&data.name) as usize) % concurrency,
            };
            slot as u32
        }
    }

    /// Insert an OP into the queue recorded in `data.vec_idx`, immediately
    /// after its parent (and any earlier siblings) when a parent is queued.
    pub fn add(&mut self, op: Op) {
        let idx = op.data.vec_idx.unwrap_or(0) as usize;
        let idx = idx.min(self.queues.len() - 1);
        let queue = &mut self.queues[idx];

        if let Some(parent_id) = op.data.parent_id {
            if let Some(parent_pos) = queue.iter().position(|o| o.data.op_id == parent_id) {
                let mut insert_at = parent_pos + 1;
                while insert_at < queue.len()
                    && queue[insert_at].data.parent_id == Some(parent_id)
                    && queue[insert_at].data.op_id < op.data.op_id
                {
                    insert_at += 1;
                }
                queue.insert(insert_at, op);
                return;
            }
        }
        queue.push_back(op);
    }

    pub fn queue(&self, idx: usize) -> &VecDeque<Op> {
        &self.queues[idx]
    }

    pub fn head_mut(&mut self, idx: usize) -> Option<&mut Op> {
        self.queues[idx].front_mut()
    }

    pub fn pop_head(&mut self, idx: usize) -> Option<Op> {
        self.queues[idx].pop_front()
    }

    pub fn find(&self, op_id: OpId) -> Option<&Op> {
        self.queues
            .iter()
            .flat_map(|q| q.iter())
            .find(|op| op.data.op_id == op_id)
            .or_else(|| self.done.iter().find(|op| op.data.op_id == op_id))
    }

    pub fn find_pending_mut(&mut self, op_id: OpId) -> Option<&mut Op> {
        self.queues
            .iter_mut()
            .flat_map(|q| q.iter_mut())
            .find(|op| op.data.op_id == op_id)
    }

    pub fn pending(&self) -> impl Iterator<Item = &Op> {
        self.queues.iter().flat_map(|q| q.iter())
    }

    pub fn done_list(&self) -> &VecDeque<Op> {
        &self.done
    }

    /// Move a terminal OP to the done list. Returns the evicted OP when the
    /// bound is exceeded (the caller deletes its metastore node unless the
    /// evictee Failed; Failed OPs stay on disk for forensics).
    pub fn push_done(&mut self, op: Op) -> Option<Op> {
        self.done.push_back(op);
        if self.done.len() > self.max_op_num {
            self.done.pop_front()
        } else {
            None
        }
    }

    /// Fold one tablet-reported status into the matching in-flight task.
    /// Matching is on (op_id, task_type[, endpoint]); only dispatched tasks
    /// accept terminal statuses. Returns true when something changed.
    pub fn apply_task_status(
        &mut self,
        op_id: OpId,
        task_type: TaskType,
        endpoint: &str,
        status: TaskStatus,
    ) -> bool {
        if !status.is_terminal() {
            return false;
        }
        let Some(op) = self.find_pending_mut(op_id) else {
            return false;
        };
        let Some(task) = op.current_task_mut() else {
            return false;
        };
        if task.info.task_type != task_type {
            return false;
        }
        if task.is_fanout() {
            if let Some(sub) = task
                .sub
                .iter_mut()
                .find(|s| s.endpoint == endpoint && !s.status.is_terminal())
            {
                sub.status = status;
                return true;
            }
            return false;
        }
        if task.info.status == TaskStatus::Doing
            && task.info.is_rpc_send
            && (task.info.endpoint.is_empty() || task.info.endpoint == endpoint)
        {
            task.info.status = status;
            return true;
        }
        false
    }

    /// Fold a peer-reported status into a task awaiting a mirrored remote
    /// OP. The peer reports under our op id but cannot know our task type,
    /// so matching is by the remote-mirror task kind.
    pub fn apply_remote_status(&mut self, op_id: OpId, status: TaskStatus) -> bool {
        if !status.is_terminal() {
            return false;
        }
        let Some(op) = self.find_pending_mut(op_id) else {
            return false;
        };
        let Some(task) = op.current_task_mut() else {
            return false;
        };
        if task.info.task_type == TaskType::AddReplicaNsRemote
            && task.info.status == TaskStatus::Doing
        {
            task.info.status = status;
            return true;
        }
        false
    }

    /// Recovery: re-establish FIFO order per queue by (parent, op_id), so
    /// children follow their parents again.
    pub fn sort_queues(&mut self) {
        for queue in &mut self.queues {
            let mut ops: Vec<Op> = queue.drain(..).collect();
            ops.sort_by_key(|op| (op.data.parent_id.unwrap_or(op.data.op_id), op.data.op_id));
            queue.extend(ops);
        }
    }

    /// Drop done-list records enrolled under a leader cluster's op id.
    pub fn forget_remote(&mut self, remote_op_id: OpId) {
        self.done
            .retain(|op| op.data.remote_op_id != Some(remote_op_id));
    }

    /// Drop everything (standby transition).
    pub fn clear(&mut self) {
        for queue in &mut self.queues {
            queue.clear();
        }
        self.done.clear();
    }
}
