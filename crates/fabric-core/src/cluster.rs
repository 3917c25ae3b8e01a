use std::{sync::Arc, time::Duration};

use ahash::AHashMap;
use parking_lot::RwLock;

use crate::{
    binding::{Binding, Handler},
    data::Data,
    error::Error,
    message::Message,
    node::Node,
    protocol::Protocol,
    resolver::Resolver,
    service::Service,
    stats::{Counters, Snapshot},
    token::Token,
};

/// The top-level handle a process holds onto its membership in the fabric
/// (§4.6). Owns the local node's identity, the wire protocol used to reach
/// every other member, and the registry of services this process knows
/// about, whether because it hosts bindings for them or merely calls into
/// them.
pub struct Cluster {
    local_node: Node,
    protocol: Arc<dyn Protocol>,
    services: RwLock<AHashMap<String, Arc<Service>>>,
    stats: Arc<Counters>,
}

impl Cluster {
    pub fn new(local_node: Node, protocol: Arc<dyn Protocol>) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            protocol,
            services: RwLock::new(AHashMap::default()),
            stats: Arc::new(Counters::default()),
        })
    }

    pub fn local_node(&self) -> &Node {
        &self.local_node
    }

    pub fn protocol_name(&self) -> &'static str {
        self.protocol.name()
    }

    /// Snapshot the cluster-wide sent/received/failed/dropped counters
    /// (§2 Observability), for a `/stats`-style diagnostic endpoint.
    pub fn stats(&self) -> Snapshot {
        self.stats.snapshot()
    }

    /// Get-or-create the named service (§4.6 GetService). Services are
    /// never explicitly declared ahead of time: the first `join`, `bind` or
    /// inbound message for a name brings it into existence.
    pub fn service(&self, name: &str) -> Arc<Service> {
        if let Some(service) = self.services.read().get(name) {
            return service.clone();
        }

        let mut services = self.services.write();
        services
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(Service::new(name, self.protocol.clone(), self.stats.clone(), self.local_node.clone())))
            .clone()
    }

    pub fn join(&self, service_name: &str, token: Token, node: Node) {
        self.service(service_name).join(token, node);
    }

    /// Join the local node to a service's ring, token derived from its own
    /// address the way every other member's token is derived.
    pub fn join_self(&self, service_name: &str) {
        let token = Token::hash(self.local_node.to_string());
        self.join(service_name, token, self.local_node.clone());
    }

    pub fn bind(
        &self,
        service_name: &str,
        path_pattern: impl Into<String>,
        resolver: Resolver,
        timeout: Option<Duration>,
        handler: Handler,
    ) -> Result<Arc<Binding>, Error> {
        self.service(service_name).bind(path_pattern, resolver, timeout, handler)
    }

    /// Entry point for a protocol implementation handing up a decoded
    /// inbound message (§4.7/§4.8). Routes by service name, auto-creating
    /// the service the way an outbound `bind`/`join` would.
    pub async fn receive(&self, message: Message) {
        self.service(&message.service).receive(message).await;
    }

    pub async fn call(&self, service_name: &str, path: &str, data: Data) -> Message {
        self.service(service_name).call(path, data).await
    }

    /// As [`Cluster::call`], but the request carries `logger` (§4.9).
    pub async fn call_traced(
        &self,
        service_name: &str,
        path: &str,
        data: Data,
        logger: Option<crate::logger::Logger>,
    ) -> Message {
        self.service(service_name).call_traced(path, data, logger).await
    }

    pub async fn notify(&self, service_name: &str, path: &str, data: Data) {
        self.service(service_name).notify(path, data).await;
    }

    /// A stable address for a service:path pair on the local node, used by
    /// diagnostics and the client SDK rather than by message routing itself
    /// (routing always goes through the resolver/ring, never a fixed URL).
    pub fn binding_url(&self, service_name: &str, path: &str) -> String {
        format!("{}://{}/{}{}", self.protocol.name(), self.local_node, service_name, path)
    }

    /// `GetBindingURL(scheme://host/path)` (§4.6): the inverse of
    /// [`Cluster::binding_url`]. The host names an already-registered
    /// service (unlike [`Cluster::service`], an unknown host is an error
    /// rather than silently creating an empty one), and the path must match
    /// one of its bindings.
    pub fn get_binding_url(&self, url: &str) -> Result<(Arc<Binding>, Data), Error> {
        let after_scheme = url.split_once("://").map(|(_, rest)| rest).unwrap_or(url);
        let (host, path) = after_scheme.split_once('/').unwrap_or((after_scheme, ""));
        let path = format!("/{path}");

        let service = self
            .services
            .read()
            .get(host)
            .cloned()
            .ok_or_else(|| Error::ServiceNotFound(host.to_string()))?;

        service.find_binding(&path).ok_or(Error::BindingNotFound(path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Request;

    struct NullProtocol;

    #[async_trait::async_trait]
    impl Protocol for NullProtocol {
        async fn send(&self, _node: Node, _request: Arc<Request>) {}

        fn name(&self) -> &'static str {
            "null"
        }
    }

    #[test]
    fn service_is_created_on_first_access_and_reused() {
        let cluster = Cluster::new(Node::new("a", 1, 2), Arc::new(NullProtocol));
        let first = cluster.service("svc");
        let second = cluster.service("svc");
        assert!(Arc::ptr_eq(&first, &second));
    }

    #[test]
    fn binding_url_embeds_protocol_node_and_path() {
        let cluster = Cluster::new(Node::new("10.0.0.1", 4000, 4001), Arc::new(NullProtocol));
        let url = cluster.binding_url("svc", "/ping");
        assert_eq!(url, "null://10.0.0.1:4000:4001/svc/ping");
    }

    #[tokio::test]
    async fn get_binding_url_parses_host_and_path_back_to_a_binding() {
        let cluster = Cluster::new(Node::new("a", 1, 2), Arc::new(NullProtocol));
        cluster
            .bind("svc", r"/user/(\w+)", Resolver::default(), None, Arc::new(|_| {}))
            .unwrap();

        let (binding, params) = cluster.get_binding_url("null://svc/user/alice").unwrap();
        assert_eq!(binding.path_pattern(), r"/user/(\w+)");
        assert_eq!(params.get("1").and_then(crate::data::Value::as_str), Some("alice"));
    }

    #[test]
    fn get_binding_url_rejects_an_unregistered_service() {
        let cluster = Cluster::new(Node::new("a", 1, 2), Arc::new(NullProtocol));
        assert!(matches!(cluster.get_binding_url("null://nope/ping"), Err(Error::ServiceNotFound(_))));
    }

    #[tokio::test]
    async fn call_on_unbound_service_returns_not_found() {
        let cluster = Cluster::new(Node::new("a", 1, 2), Arc::new(NullProtocol));
        let reply = cluster.call("svc", "/nowhere", Data::default()).await;
        assert!(reply.is_error());
    }

    #[tokio::test]
    async fn failed_calls_are_reflected_in_the_stats_snapshot() {
        let cluster = Cluster::new(Node::new("a", 1, 2), Arc::new(NullProtocol));
        cluster.call("svc", "/nowhere", Data::default()).await;
        assert_eq!(cluster.stats().failed, 1);
    }
}
