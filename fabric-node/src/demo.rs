use std::sync::Arc;

use fabric_core::{cluster::Cluster, node::Node, resolver::Resolver, token::Token};

/// Name of the service every node in this process binds its demo handlers
/// under and joins its peers' ring for.
pub const SERVICE: &str = "demo";

/// Register the handlers every node runs so a freshly started cluster has
/// something to call without writing a custom binary first.
pub fn register(cluster: &Arc<Cluster>) -> Result<(), fabric_core::error::Error> {
    cluster.join_self(SERVICE);

    cluster.bind(SERVICE, "/echo", Resolver::Path { count: 1 }, None, {
        Arc::new(|received| {
            log::info!("demo: echoing {} bytes of data back to the caller", received.message.data.len());
            let data = received.message.data.clone();
            received.reply(data);
        })
    })?;

    cluster.bind(SERVICE, "/ping", Resolver::Path { count: 1 }, None, {
        Arc::new(|received| {
            let mut data = fabric_core::data::data();
            data.insert("pong".into(), fabric_core::data::Value::Bool(true));
            received.reply(data);
        })
    })?;

    Ok(())
}

/// Join every `address:stream_port:datagram_port` peer string onto the demo
/// service's ring, at the same token every node derives its own identity
/// from.
pub fn join_peers(cluster: &Arc<Cluster>, peers: &[String]) {
    for peer in peers {
        match parse_peer(peer) {
            Some(node) => {
                let token = Token::hash(node.to_string());
                cluster.join(SERVICE, token, node);
            }
            None => log::warn!("ignoring malformed peer entry {peer:?}; expected address:stream_port:datagram_port"),
        }
    }
}

fn parse_peer(spec: &str) -> Option<Node> {
    let mut parts = spec.rsplitn(3, ':');
    let datagram_port: u16 = parts.next()?.parse().ok()?;
    let stream_port: u16 = parts.next()?.parse().ok()?;
    let address = parts.next()?.to_string();
    Some(Node::new(address, stream_port, datagram_port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_a_well_formed_peer_spec() {
        let node = parse_peer("10.0.0.5:4000:4001").unwrap();
        assert_eq!(node.address, "10.0.0.5");
        assert_eq!(node.stream_port, 4000);
        assert_eq!(node.datagram_port, 4001);
    }

    #[test]
    fn rejects_a_malformed_peer_spec() {
        assert!(parse_peer("not-a-peer").is_none());
    }
}
