//! Typed metastore events.
//!
//! Watch callbacks are delivered as a typed event stream instead of raw
//! closures so the nameserver can funnel every change through one reducer.

/// An event delivered to a watcher channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MetaEvent {
    /// The child set under `path` changed; carries the new child names.
    ChildrenChanged { path: String, children: Vec<String> },
    /// The value at `path` changed (or the node appeared/disappeared).
    ValueChanged { path: String },
    /// The session reconnected with a new term; watches must be re-armed.
    SessionReset { term: u64 },
    /// This session now holds the lock at `path`.
    LockAcquired { path: String },
    /// This session lost the lock at `path`; the holder must stop serving.
    LockLost { path: String },
}
