//! In-memory metastore implementation.
//!
//! `MemoryMetaServer` plays the coordination service; every
//! [`MemoryMetaStore`] handed out by [`MemoryMetaServer::connect`] is an
//! independent session with its own ephemerals, watches, and lock claims.
//! Suitable for development, testing, and single-process deployments where
//! durability across restarts is not required.

use crate::{MetaError, MetaEvent, store::MetaStore};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::collections::BTreeMap;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;

#[derive(Debug, Clone)]
struct Node {
    value: Vec<u8>,
    ephemeral_owner: Option<u64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatchKind {
    Children,
    Value,
}

struct Watch {
    path: String,
    kind: WatchKind,
    session: u64,
    tx: UnboundedSender<MetaEvent>,
}

struct LockClaim {
    session: u64,
    value: Vec<u8>,
    tx: UnboundedSender<MetaEvent>,
}

#[derive(Default)]
struct LockState {
    holder: Option<LockClaim>,
    waiters: VecDeque<LockClaim>,
}

#[derive(Default)]
struct ServerState {
    nodes: BTreeMap<String, Node>,
    watches: Vec<Watch>,
    locks: HashMap<String, LockState>,
    next_session: u64,
}

/// Shared in-memory coordination service.
pub struct MemoryMetaServer {
    state: Mutex<ServerState>,
}

impl MemoryMetaServer {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: Mutex::new(ServerState::default()),
        })
    }

    /// Open a new session against this server.
    pub fn connect(self: &Arc<Self>) -> Arc<MemoryMetaStore> {
        let id = {
            let mut state = self.state.lock();
            state.next_session += 1;
            state.next_session
        };
        Arc::new(MemoryMetaStore {
            server: Arc::clone(self),
            session: Mutex::new(SessionHandle {
                id,
                term: 1,
                connected: true,
            }),
        })
    }

    /// Expire a session server-side: ephemerals vanish, queued and held
    /// locks are dropped, watches are discarded.
    fn drop_session(&self, session: u64) {
        let mut state = self.state.lock();

        // Remove ephemerals and fire watches for their parents.
        let doomed: Vec<String> = state
            .nodes
            .iter()
            .filter(|(_, n)| n.ephemeral_owner == Some(session))
            .map(|(p, _)| p.clone())
            .collect();
        for path in doomed {
            state.nodes.remove(&path);
            state.notify_value(&path);
            state.notify_parent_children(&path);
        }

        // Hand over any locks this session held or waited on.
        let lock_paths: Vec<String> = state.locks.keys().cloned().collect();
        for path in lock_paths {
            state.drop_lock_claims(&path, session, true);
        }

        state.watches.retain(|w| w.session != session);
    }
}

impl ServerState {
    fn children_of(&self, path: &str) -> Vec<String> {
        let prefix = format!("{}/", path.trim_end_matches('/'));
        let mut names: Vec<String> = Vec::new();
        for key in self.nodes.range(prefix.clone()..) {
            let (k, _) = key;
            if !k.starts_with(&prefix) {
                break;
            }
            let rest = &k[prefix.len()..];
            let name = rest.split('/').next().unwrap_or(rest);
            if names.last().map(String::as_str) != Some(name) {
                names.push(name.to_string());
            }
        }
        names.dedup();
        names
    }

    fn notify_value(&self, path: &str) {
        for w in &self.watches {
            if w.kind == WatchKind::Value && w.path == path {
                let _ = w.tx.send(MetaEvent::ValueChanged {
                    path: path.to_string(),
                });
            }
        }
    }

    fn notify_parent_children(&self, path: &str) {
        let Some(idx) = path.rfind('/') else { return };
        let parent = &path[..idx];
        let children = self.children_of(parent);
        for w in &self.watches {
            if w.kind == WatchKind::Children && w.path == parent {
                let _ = w.tx.send(MetaEvent::ChildrenChanged {
                    path: parent.to_string(),
                    children: children.clone(),
                });
            }
        }
    }

    fn write_lock_node(&mut self, path: &str, value: Vec<u8>, owner: u64) {
        self.nodes.insert(
            path.to_string(),
            Node {
                value,
                ephemeral_owner: Some(owner),
            },
        );
        self.notify_value(path);
    }

    /// Remove `session`'s claims on the lock at `path`. When it was the
    /// holder, promote the next waiter (notifying both sides) unless
    /// `notify_lost` is false (explicit release).
    fn drop_lock_claims(&mut self, path: &str, session: u64, notify_lost: bool) {
        let (old, next) = {
            let Some(lock) = self.locks.get_mut(path) else {
                return;
            };
            lock.waiters.retain(|c| c.session != session);
            let held = lock.holder.as_ref().is_some_and(|c| c.session == session);
            if !held {
                return;
            }
            (lock.holder.take(), lock.waiters.pop_front())
        };

        if let (Some(old), true) = (old, notify_lost) {
            let _ = old.tx.send(MetaEvent::LockLost {
                path: path.to_string(),
            });
        }
        match next {
            Some(claim) => {
                let _ = claim.tx.send(MetaEvent::LockAcquired {
                    path: path.to_string(),
                });
                let (value, owner) = (claim.value.clone(), claim.session);
                if let Some(lock) = self.locks.get_mut(path) {
                    lock.holder = Some(claim);
                }
                self.write_lock_node(path, value, owner);
            }
            None => {
                self.nodes.remove(path);
                self.notify_value(path);
            }
        }
    }
}

struct SessionHandle {
    id: u64,
    term: u64,
    connected: bool,
}

/// One session against a [`MemoryMetaServer`].
pub struct MemoryMetaStore {
    server: Arc<MemoryMetaServer>,
    session: Mutex<SessionHandle>,
}

impl MemoryMetaStore {
    fn session_id(&self) -> Result<u64, MetaError> {
        let session = self.session.lock();
        if !session.connected {
            return Err(MetaError::NotConnected);
        }
        Ok(session.id)
    }

    /// Simulate a server-side session expiry: ephemerals and locks are gone,
    /// the handle is left disconnected until [`MetaStore::reconnect`].
    pub fn expire_session(&self) {
        let id = {
            let mut session = self.session.lock();
            session.connected = false;
            session.id
        };
        self.server.drop_session(id);
    }

    fn node_op<T>(
        &self,
        f: impl FnOnce(&mut ServerState, u64) -> Result<T, MetaError>,
    ) -> Result<T, MetaError> {
        let session = self.session_id()?;
        let mut state = self.server.state.lock();
        f(&mut state, session)
    }
}

impl MetaStore for MemoryMetaStore {
    fn create(&self, path: &str, value: &[u8]) -> Result<(), MetaError> {
        self.node_op(|state, _| {
            if state.nodes.contains_key(path) {
                return Err(MetaError::NodeExists {
                    path: path.to_string(),
                });
            }
            state.nodes.insert(
                path.to_string(),
                Node {
                    value: value.to_vec(),
                    ephemeral_owner: None,
                },
            );
            state.notify_value(path);
            state.notify_parent_children(path);
            Ok(())
        })
    }

    fn create_ephemeral(&self, path: &str, value: &[u8]) -> Result<(), MetaError> {
        self.node_op(|state, session| {
            if state.nodes.contains_key(path) {
                return Err(MetaError::NodeExists {
                    path: path.to_string(),
                });
            }
            state.nodes.insert(
                path.to_string(),
                Node {
                    value: value.to_vec(),
                    ephemeral_owner: Some(session),
                },
            );
            state.notify_value(path);
            state.notify_parent_children(path);
            Ok(())
        })
    }

    fn set(&self, path: &str, value: &[u8]) -> Result<(), MetaError> {
        self.node_op(|state, _| {
            let existed = state.nodes.contains_key(path);
            match state.nodes.get_mut(path) {
                Some(node) => node.value = value.to_vec(),
                None => {
                    state.nodes.insert(
                        path.to_string(),
                        Node {
                            value: value.to_vec(),
                            ephemeral_owner: None,
                        },
                    );
                }
            }
            state.notify_value(path);
            if !existed {
                state.notify_parent_children(path);
            }
            Ok(())
        })
    }

    fn get(&self, path: &str) -> Result<Vec<u8>, MetaError> {
        self.node_op(|state, _| {
            state
                .nodes
                .get(path)
                .map(|n| n.value.clone())
                .ok_or(MetaError::NodeNotFound {
                    path: path.to_string(),
                })
        })
    }

    fn delete(&self, path: &str) -> Result<(), MetaError> {
        self.node_op(|state, _| {
            if state.nodes.remove(path).is_none() {
                return Err(MetaError::NodeNotFound {
                    path: path.to_string(),
                });
            }
            state.notify_value(path);
            state.notify_parent_children(path);
            Ok(())
        })
    }

    fn exists(&self, path: &str) -> Result<bool, MetaError> {
        self.node_op(|state, _| Ok(state.nodes.contains_key(path)))
    }

    fn children(&self, path: &str) -> Result<Vec<String>, MetaError> {
        self.node_op(|state, _| Ok(state.children_of(path)))
    }

    fn increment(&self, path: &str) -> Result<u64, MetaError> {
        self.node_op(|state, _| {
            let next = match state.nodes.get(path) {
                Some(node) => {
                    let text = std::str::from_utf8(&node.value).map_err(|e| {
                        MetaError::InvalidValue {
                            path: path.to_string(),
                            reason: e.to_string(),
                        }
                    })?;
                    let current: u64 =
                        text.parse().map_err(|_| MetaError::InvalidValue {
                            path: path.to_string(),
                            reason: format!("'{text}' is not a counter"),
                        })?;
                    current + 1
                }
                None => 1,
            };
            state.nodes.insert(
                path.to_string(),
                Node {
                    value: next.to_string().into_bytes(),
                    ephemeral_owner: None,
                },
            );
            state.notify_value(path);
            Ok(next)
        })
    }

    fn watch_children(
        &self,
        path: &str,
        tx: UnboundedSender<MetaEvent>,
    ) -> Result<(), MetaError> {
        self.node_op(|state, session| {
            state
                .watches
                .retain(|w| !(w.session == session && w.path == path && w.kind == WatchKind::Children));
            state.watches.push(Watch {
                path: path.to_string(),
                kind: WatchKind::Children,
                session,
                tx,
            });
            Ok(())
        })
    }

    fn watch_value(&self, path: &str, tx: UnboundedSender<MetaEvent>) -> Result<(), MetaError> {
        self.node_op(|state, session| {
            state
                .watches
                .retain(|w| !(w.session == session && w.path == path && w.kind == WatchKind::Value));
            state.watches.push(Watch {
                path: path.to_string(),
                kind: WatchKind::Value,
                session,
                tx,
            });
            Ok(())
        })
    }

    fn acquire_lock(
        &self,
        path: &str,
        value: &[u8],
        tx: UnboundedSender<MetaEvent>,
    ) -> Result<bool, MetaError> {
        self.node_op(|state, session| {
            let acquired = {
                let lock = state.locks.entry(path.to_string()).or_default();
                match &lock.holder {
                    None => {
                        lock.holder = Some(LockClaim {
                            session,
                            value: value.to_vec(),
                            tx,
                        });
                        true
                    }
                    Some(holder) if holder.session == session => return Ok(true),
                    Some(_) => {
                        lock.waiters.retain(|c| c.session != session);
                        lock.waiters.push_back(LockClaim {
                            session,
                            value: value.to_vec(),
                            tx,
                        });
                        false
                    }
                }
            };
            if acquired {
                state.write_lock_node(path, value.to_vec(), session);
            }
            Ok(acquired)
        })
    }

    fn release_lock(&self, path: &str) -> Result<(), MetaError> {
        self.node_op(|state, session| {
            state.drop_lock_claims(path, session, false);
            Ok(())
        })
    }

    fn session_term(&self) -> u64 {
        self.session.lock().term
    }

    fn disconnect(&self) -> Result<(), MetaError> {
        let id = {
            let mut session = self.session.lock();
            if !session.connected {
                return Ok(());
            }
            session.connected = false;
            session.id
        };
        self.server.drop_session(id);
        Ok(())
    }

    fn reconnect(&self) -> Result<(), MetaError> {
        let (old_id, was_connected) = {
            let session = self.session.lock();
            (session.id, session.connected)
        };
        if was_connected {
            self.server.drop_session(old_id);
        }
        let new_id = {
            let mut state = self.server.state.lock();
            state.next_session += 1;
            state.next_session
        };
        let term = {
            let mut session = self.session.lock();
            session.id = new_id;
            session.term += 1;
            session.connected = true;
            session.term
        };
        tracing::debug!(term, "metastore session reconnected");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc::unbounded_channel;

    #[test]
    fn test_create_get_set_delete() {
        let server = MemoryMetaServer::new();
        let store = server.connect();

        store.create("/a/b", b"1").unwrap();
        assert_eq!(store.get("/a/b").unwrap(), b"1");
        assert!(matches!(
            store.create("/a/b", b"2"),
            Err(MetaError::NodeExists { .. })
        ));

        store.set("/a/b", b"2").unwrap();
        assert_eq!(store.get("/a/b").unwrap(), b"2");

        store.delete("/a/b").unwrap();
        assert!(matches!(
            store.get("/a/b"),
            Err(MetaError::NodeNotFound { .. })
        ));
    }

    #[test]
    fn test_children_listing() {
        let server = MemoryMetaServer::new();
        let store = server.connect();

        store.create("/nodes/a:1", b"").unwrap();
        store.create("/nodes/b:2", b"").unwrap();
        store.create("/nodes/b:2/sub", b"").unwrap();
        store.create("/other", b"").unwrap();

        assert_eq!(store.children("/nodes").unwrap(), vec!["a:1", "b:2"]);
        assert!(store.children("/empty").unwrap().is_empty());
    }

    #[test]
    fn test_increment_counter() {
        let server = MemoryMetaServer::new();
        let store = server.connect();

        assert_eq!(store.increment("/op/op_index").unwrap(), 1);
        assert_eq!(store.increment("/op/op_index").unwrap(), 2);
        assert_eq!(store.increment("/op/op_index").unwrap(), 3);
        assert_eq!(store.get("/op/op_index").unwrap(), b"3");
    }

    #[test]
    fn test_counters_survive_other_sessions() {
        let server = MemoryMetaServer::new();
        let store1 = server.connect();
        let store2 = server.connect();

        assert_eq!(store1.increment("/table/table_index").unwrap(), 1);
        store1.expire_session();
        assert_eq!(store2.increment("/table/table_index").unwrap(), 2);
    }

    #[test]
    fn test_ephemeral_removed_on_expiry() {
        let server = MemoryMetaServer::new();
        let tablet = server.connect();
        let observer = server.connect();

        let (tx, mut rx) = unbounded_channel();
        observer.watch_children("/nodes", tx).unwrap();

        tablet.create_ephemeral("/nodes/a:9527", b"").unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            MetaEvent::ChildrenChanged {
                path: "/nodes".to_string(),
                children: vec!["a:9527".to_string()]
            }
        );

        tablet.expire_session();
        assert_eq!(
            rx.try_recv().unwrap(),
            MetaEvent::ChildrenChanged {
                path: "/nodes".to_string(),
                children: vec![]
            }
        );
        assert!(!observer.exists("/nodes/a:9527").unwrap());
    }

    #[test]
    fn test_value_watch() {
        let server = MemoryMetaServer::new();
        let store = server.connect();

        let (tx, mut rx) = unbounded_channel();
        store.watch_value("/table/notify", tx).unwrap();

        store.increment("/table/notify").unwrap();
        assert_eq!(
            rx.try_recv().unwrap(),
            MetaEvent::ValueChanged {
                path: "/table/notify".to_string()
            }
        );
    }

    #[test]
    fn test_lock_handoff_on_expiry() {
        let server = MemoryMetaServer::new();
        let ns1 = server.connect();
        let ns2 = server.connect();

        let (tx1, mut rx1) = unbounded_channel();
        let (tx2, mut rx2) = unbounded_channel();

        assert!(ns1.acquire_lock("/leader", b"ns1:7181", tx1).unwrap());
        assert!(!ns2.acquire_lock("/leader", b"ns2:7181", tx2).unwrap());
        assert_eq!(ns1.get("/leader").unwrap(), b"ns1:7181");

        ns1.expire_session();
        assert_eq!(
            rx2.try_recv().unwrap(),
            MetaEvent::LockAcquired {
                path: "/leader".to_string()
            }
        );
        assert_eq!(ns2.get("/leader").unwrap(), b"ns2:7181");
        assert!(rx1.try_recv().is_err());
    }

    #[test]
    fn test_lock_release_is_idempotent() {
        let server = MemoryMetaServer::new();
        let ns = server.connect();
        let (tx, _rx) = unbounded_channel();

        assert!(ns.acquire_lock("/leader", b"ns:7181", tx).unwrap());
        ns.release_lock("/leader").unwrap();
        ns.release_lock("/leader").unwrap();
        assert!(!ns.exists("/leader").unwrap());
    }

    #[test]
    fn test_session_term_bumps_on_reconnect() {
        let server = MemoryMetaServer::new();
        let store = server.connect();
        assert_eq!(store.session_term(), 1);

        store.disconnect().unwrap();
        assert!(matches!(store.get("/x"), Err(MetaError::NotConnected)));

        store.reconnect().unwrap();
        assert_eq!(store.session_term(), 2);
        store.create("/x", b"1").unwrap();
        assert_eq!(store.get("/x").unwrap(), b"1");
    }

    #[test]
    fn test_reconnect_drops_ephemerals_and_watches() {
        let server = MemoryMetaServer::new();
        let store = server.connect();
        let other = server.connect();

        store.create_ephemeral("/nodes/a:1", b"").unwrap();
        store.reconnect().unwrap();
        assert!(!other.exists("/nodes/a:1").unwrap());
    }
}
