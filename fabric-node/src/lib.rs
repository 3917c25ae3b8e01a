pub mod config;
pub mod demo;

use std::sync::Arc;

use config::{Config, Protocol};
use fabric_core::cluster::Cluster;
use fabric_http::HttpProtocol;
use fabric_wire::WireProtocol;

/// Bring up a cluster node: build the configured protocol, wire it to a
/// fresh [`Cluster`], register the demo handlers, join any configured
/// peers, and serve until the process is asked to stop.
///
/// Exists as a function distinct from `main` so integration tests (and any
/// embedder) can start a node without going through the CLI.
pub async fn server_main(config: Arc<Config>) -> anyhow::Result<()> {
    let local_node = config.node.to_node();
    log::info!("starting fabric node {local_node} ({:?} protocol)", config.protocol);

    match config.protocol {
        Protocol::Wire => {
            let protocol = WireProtocol::new(local_node.clone());
            let cluster = Cluster::new(local_node, protocol.clone());
            protocol.attach_cluster(cluster.clone());

            demo::register(&cluster)?;
            demo::join_peers(&cluster, &config.peers);

            let stream = tokio::spawn(protocol.clone().serve_stream());
            let datagram = tokio::spawn(protocol.clone().serve_datagram());

            tokio::select! {
                result = stream => result??,
                result = datagram => result??,
                _ = tokio::signal::ctrl_c() => log::info!("shutting down on ctrl-c"),
            }
        }
        Protocol::Http => {
            let protocol = HttpProtocol::with_default_service(local_node.clone(), config.default_service.clone());
            let cluster = Cluster::new(local_node, protocol.clone());
            protocol.attach_cluster(cluster.clone());

            demo::register(&cluster)?;
            demo::join_peers(&cluster, &config.peers);

            let serve = tokio::spawn(protocol.clone().serve());

            tokio::select! {
                result = serve => result??,
                _ = tokio::signal::ctrl_c() => log::info!("shutting down on ctrl-c"),
            }
        }
    }

    Ok(())
}
