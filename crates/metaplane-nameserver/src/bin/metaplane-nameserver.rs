//! Standalone nameserver binary.
//!
//! Serves the admin gRPC surface against an in-memory metastore: suitable
//! for development and single-process clusters. Production deployments
//! embed the nameserver with their own metastore session and tablet
//! transport.

use clap::Parser;
use metaplane_metastore::MemoryMetaServer;
use metaplane_nameserver::config::NameServerConfig;
use metaplane_nameserver::error::NsError;
use metaplane_nameserver::peer::{PeerNameserver, PeerProvider};
use metaplane_nameserver::tablet::{TabletProvider, TabletRpc};
use metaplane_nameserver::{NameServer, NameServerService};
use std::net::SocketAddr;
use std::sync::Arc;
use tonic::transport::Server;

#[derive(Parser, Debug)]
#[command(name = "metaplane-nameserver", about = "metaplane cluster coordinator")]
struct Args {
    /// Address to serve the admin gRPC surface on.
    #[arg(long, default_value = "127.0.0.1:7181")]
    listen: SocketAddr,

    /// Metastore root path for this cluster.
    #[arg(long, default_value = "/metaplane")]
    root_path: String,

    /// Enable automatic failover on tablet outages.
    #[arg(long)]
    auto_failover: bool,
}

/// The standalone binary carries no tablet transport; embedders supply one
/// through [`TabletProvider`].
struct UnconfiguredTablets;

impl TabletProvider for UnconfiguredTablets {
    fn connect(&self, endpoint: &str) -> Result<Arc<dyn TabletRpc>, NsError> {
        Err(NsError::TabletNotHealthy {
            endpoint: format!("{endpoint} (no tablet transport configured)"),
        })
    }
}

/// Peer coordinators dial over gRPC; peer metastore sessions need a real
/// deployment and are unavailable standalone.
struct GrpcPeers;

impl PeerProvider for GrpcPeers {
    fn connect_metastore(
        &self,
        address: &metaplane::table::ClusterAddress,
    ) -> Result<Arc<dyn metaplane_metastore::MetaStore>, NsError> {
        Err(NsError::ReplicaClusterNotHealthy {
            alias: format!(
                "{} (replica clusters need a shared metastore deployment)",
                address.alias
            ),
        })
    }

    fn connect(&self, endpoint: &str) -> Result<Arc<dyn PeerNameserver>, NsError> {
        let client = metaplane_nameserver::AdminClient::connect_lazy(endpoint)?;
        Ok(Arc::new(metaplane_nameserver::GrpcPeer::new(client)))
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    metaplane::telemetry::init();
    let args = Args::parse();

    let config = NameServerConfig {
        endpoint: args.listen.to_string(),
        root_path: args.root_path,
        auto_failover: args.auto_failover,
        ..Default::default()
    };

    let meta = MemoryMetaServer::new().connect();
    let ns = NameServer::new(
        config,
        meta,
        Arc::new(UnconfiguredTablets),
        Arc::new(GrpcPeers),
    );
    ns.start()?;
    tracing::info!(listen = %args.listen, "nameserver serving admin surface");

    Server::builder()
        .add_service(NameServerService::new(Arc::clone(&ns)).into_server())
        .serve(args.listen)
        .await?;
    Ok(())
}
