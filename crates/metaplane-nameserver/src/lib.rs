//! metaplane nameserver.
//!
//! The highly-available coordinator of a sharded, replicated table store:
//! it owns the canonical table catalog, assigns partitions to tablets,
//! drives every multi-step reconfiguration as a persistent, resumable OP,
//! and keeps one or more remote replica clusters in sync. Consensus is
//! delegated to the metastore; this crate is the state machine on top.

pub mod catalog;
pub mod client;
pub mod config;
pub mod error;
mod executor;
mod failover;
pub mod nameserver;
pub mod op_builders;
pub mod op_engine;
pub mod peer;
pub mod registry;
pub mod remote;
mod schedulers;
pub mod server;
pub mod service;
pub mod tablet;
pub mod tasks;

// Generated protobuf/gRPC modules
pub mod proto {
    tonic::include_proto!("metaplane.nameserver");
}

pub use client::{AdminClient, GrpcPeer};
pub use config::NameServerConfig;
pub use error::NsError;
pub use nameserver::NameServer;
pub use server::NameServerService;
pub use service::{OpView, ReplicaClusterView, TabletView};

// Re-export logging macros for consistent usage across the crate
pub use log::{debug, error, info, trace, warn};
