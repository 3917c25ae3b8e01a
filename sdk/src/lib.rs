//! # Fabric client SDK
//!
//! A thin client for calling into a specific node of a running cluster
//! without joining it: the SDK dials the binary wire protocol directly
//! rather than speaking to any service's ring. It stands up its own small
//! [`Cluster`] purely to host the listener a reply comes back to and the
//! per-path rendezvous bookkeeping a reply needs to correlate with its
//! request: the same machinery a normal node uses, minus ring membership.
//!
//! ## Example
//!
//! ```no_run
//! use fabric_core::{data::data, node::Node};
//! use fabric_sdk::FabricClient;
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Ports must be real, reachable ports the SDK's own listener binds to:
//! // a reply is addressed back to exactly this node, so `0` (let the OS
//! // pick) would leave the advertised address stale.
//! let client = FabricClient::connect(Node::new("127.0.0.1", 4100, 4101)).await?;
//! let target = Node::new("10.0.0.4", 4000, 4001);
//! let reply = client.call(target, "demo", "/ping", data()).await;
//! println!("got reply: {:?}", reply.data);
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use ahash::AHashMap;
use fabric_core::{
    binding::Binding,
    cluster::Cluster,
    data::Data,
    member::{Member, MemberSet},
    message::Message,
    node::Node,
    request::Request,
    resolver::Resolver,
    token::Token,
};
use fabric_wire::WireProtocol;
use parking_lot::Mutex;

/// A handle onto one local, non-participating vantage point for calling
/// into a cluster. Safe to share (clone the `Arc` it's usually held behind)
/// across tasks making concurrent calls to different nodes.
pub struct FabricClient {
    cluster: Arc<Cluster>,
    protocol: Arc<WireProtocol>,
    bindings: Mutex<AHashMap<(String, String), Arc<Binding>>>,
}

impl FabricClient {
    /// Bind the SDK's own listener on `local_node` and start serving it, so
    /// replies to outbound calls have somewhere to land. `local_node`'s
    /// ports must be real ports this process can bind and the peer can
    /// reach: they're advertised verbatim as the reply-to address, so an
    /// OS-assigned `0` would be advertised as `0` too.
    pub async fn connect(local_node: Node) -> anyhow::Result<Arc<Self>> {
        let protocol = WireProtocol::new(local_node.clone());
        let cluster = Cluster::new(local_node, protocol.clone());
        protocol.attach_cluster(cluster.clone());

        tokio::spawn(protocol.clone().serve_stream());
        tokio::spawn(protocol.clone().serve_datagram());

        Ok(Arc::new(Self {
            cluster,
            protocol,
            bindings: Mutex::new(AHashMap::default()),
        }))
    }

    pub fn local_node(&self) -> &Node {
        self.cluster.local_node()
    }

    /// Call `service:path` on `target` directly, bypassing ring resolution
    /// (the destination is explicit, so the binding's resolver is a no-op),
    /// and wait for the first reply.
    pub async fn call(&self, target: Node, service: &str, path: &str, data: Data) -> Message {
        let binding = self.binding_for(service, path);

        let mut message = Message::new(service, path);
        message.data = data;
        message.destination = MemberSet::from_members([Member::new(Token(0), target)]);
        message.source = MemberSet::from_members([Member::new(Token(0), self.cluster.local_node().clone())]);

        let (request, mut rx) = Request::new(message).reply_channel();
        binding.call(request).await;

        rx.recv().await.unwrap_or_else(|| {
            Message::default().with_error(fabric_core::message::MessageError::timeout())
        })
    }

    /// Fire-and-forget variant of [`FabricClient::call`].
    pub async fn notify(&self, target: Node, service: &str, path: &str, data: Data) {
        let binding = self.binding_for(service, path);

        let mut message = Message::new(service, path);
        message.data = data;
        message.destination = MemberSet::from_members([Member::new(Token(0), target)]);
        message.source = MemberSet::from_members([Member::new(Token(0), self.cluster.local_node().clone())]);

        binding.call(Request::new(message)).await;
    }

    fn binding_for(&self, service: &str, path: &str) -> Arc<Binding> {
        let key = (service.to_string(), path.to_string());
        let mut bindings = self.bindings.lock();
        bindings
            .entry(key)
            .or_insert_with(|| {
                self.cluster
                    .bind(service, path, Resolver::default(), None, Arc::new(|_received| {}))
                    .expect("a literal path used as an SDK call target is always a valid pattern")
            })
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn binding_for_reuses_the_same_binding_across_calls() {
        let client = FabricClient::connect(Node::new("127.0.0.1", 0, 0)).await.unwrap();
        let first = client.binding_for("echo", "/ping");
        let second = client.binding_for("echo", "/ping");
        assert!(Arc::ptr_eq(&first, &second));
    }
}
