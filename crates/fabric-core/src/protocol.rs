use std::sync::Arc;

use crate::{message::Message, node::Node, request::Request};

/// A wire protocol capable of carrying fabric messages between nodes (§4.7,
/// §4.8). `fabric-wire` implements the binary stream+datagram protocol and
/// `fabric-http` implements the HTTP ingress adapter; both plug into the
/// same binding chain through this trait.
#[async_trait::async_trait]
pub trait Protocol: Send + Sync {
    /// Encode and deliver `request.message` to `node`. Implementations that
    /// detect the destination is the local node may short-circuit the wire
    /// entirely and hand the message straight back to the owning cluster.
    async fn send(&self, node: Node, request: Arc<Request>);

    /// A human-readable protocol name for logging, e.g. `"nrv"` or `"http"`.
    fn name(&self) -> &'static str;
}
