//! MetaStore trait definition.

use crate::{MetaError, MetaEvent};
use tokio::sync::mpsc::UnboundedSender;

/// Sessioned client contract against the coordination service.
///
/// All operations may fail with a transient error (connection or session
/// trouble, retriable after reconnect) or a permanent one; callers
/// distinguish the two via [`MetaError::is_transient`]. Watch delivery is
/// at-most-once per change into the supplied channel; implementations that
/// drop watches on session reset emit [`MetaEvent::SessionReset`] so the
/// caller can re-arm.
pub trait MetaStore: Send + Sync {
    /// Create a persistent node; fails if it already exists.
    fn create(&self, path: &str, value: &[u8]) -> Result<(), MetaError>;

    /// Create a node bound to this session's lifetime; removed on expiry.
    fn create_ephemeral(&self, path: &str, value: &[u8]) -> Result<(), MetaError>;

    /// Write a node's value, creating it if absent.
    fn set(&self, path: &str, value: &[u8]) -> Result<(), MetaError>;

    fn get(&self, path: &str) -> Result<Vec<u8>, MetaError>;

    fn delete(&self, path: &str) -> Result<(), MetaError>;

    fn exists(&self, path: &str) -> Result<bool, MetaError>;

    /// Direct child names under `path`, sorted.
    fn children(&self, path: &str) -> Result<Vec<String>, MetaError>;

    /// Atomically bump the counter node at `path` and return the new value.
    /// The counter starts at 1 when the node did not exist.
    fn increment(&self, path: &str) -> Result<u64, MetaError>;

    /// Watch the child set under `path`. Replaces any previous watch this
    /// session had on the same path.
    fn watch_children(
        &self,
        path: &str,
        tx: UnboundedSender<MetaEvent>,
    ) -> Result<(), MetaError>;

    /// Watch the value at `path`. Replaces any previous watch this session
    /// had on the same path.
    fn watch_value(&self, path: &str, tx: UnboundedSender<MetaEvent>) -> Result<(), MetaError>;

    /// Contend for the exactly-one-holder lock at `path`, publishing `value`
    /// (the caller's endpoint) as the lock node value while held. Returns
    /// true when acquired immediately; otherwise the caller is queued and
    /// will receive [`MetaEvent::LockAcquired`] later. Loss of the session
    /// delivers [`MetaEvent::LockLost`].
    fn acquire_lock(
        &self,
        path: &str,
        value: &[u8],
        tx: UnboundedSender<MetaEvent>,
    ) -> Result<bool, MetaError>;

    /// Idempotently give up the lock (held or queued).
    fn release_lock(&self, path: &str) -> Result<(), MetaError>;

    /// Strictly increasing counter across reconnects of this session.
    fn session_term(&self) -> u64;

    /// Drop the connection; subsequent calls fail transiently until
    /// [`MetaStore::reconnect`].
    fn disconnect(&self) -> Result<(), MetaError>;

    /// Re-establish the connection under a new session term.
    fn reconnect(&self) -> Result<(), MetaError>;
}
