use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;

use crate::{
    binding::{Binding, Handler},
    data::Data,
    error::Error,
    member::{Member, MemberSet},
    message::Message,
    node::Node,
    protocol::Protocol,
    resolver::Resolver,
    stats::Counters,
    token::Token,
};

/// A named collection of path bindings sharing one member ring (§4.5). Every
/// binding on a service resolves against the same ring, so joining a node to
/// the service once makes it a destination candidate for all of its paths.
pub struct Service {
    name: String,
    members: Arc<RwLock<MemberSet>>,
    bindings: RwLock<Vec<Arc<Binding>>>,
    protocol: Arc<dyn Protocol>,
    stats: Arc<Counters>,
    local_node: Node,
}

impl Service {
    pub fn new(name: impl Into<String>, protocol: Arc<dyn Protocol>, stats: Arc<Counters>, local_node: Node) -> Self {
        Self {
            name: name.into(),
            members: Arc::new(RwLock::new(MemberSet::new())),
            bindings: RwLock::new(Vec::new()),
            protocol,
            stats,
            local_node,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Join `node` to this service's ring at `token`.
    pub fn join(&self, token: Token, node: crate::node::Node) {
        self.members.write().add(Member::new(token, node));
    }

    pub fn members(&self) -> MemberSet {
        self.members.read().clone()
    }

    /// Bind a path pattern to a resolver and handler (§4.4). Bindings are
    /// tried in registration order by [`Service::find_binding`].
    pub fn bind(
        &self,
        path_pattern: impl Into<String>,
        resolver: Resolver,
        timeout: Option<Duration>,
        handler: Handler,
    ) -> Result<Arc<Binding>, Error> {
        let binding = Arc::new(Binding::new(
            path_pattern,
            resolver,
            timeout,
            handler,
            self.members.clone(),
            self.protocol.clone(),
            self.stats.clone(),
            self.local_node.clone(),
        )?);

        self.bindings.write().push(binding.clone());
        Ok(binding)
    }

    /// The first binding whose pattern matches `path`, paired with its
    /// captured parameter map, in registration order (§4.5 FindBinding).
    pub fn find_binding(&self, path: &str) -> Option<(Arc<Binding>, Data)> {
        self.bindings.read().iter().find_map(|binding| binding.matches(path).map(|params| (binding.clone(), params)))
    }

    /// Route an inbound message to whichever binding's pattern matches its
    /// path, merging captured parameters into `data` without overwriting a
    /// caller-supplied key of the same name (§4.7), logging and dropping
    /// the message (§7 Routing) if no binding matches.
    pub async fn receive(&self, message: Message) {
        let mut message = message;
        match self.find_binding(&message.path) {
            Some((binding, params)) => {
                merge_params(&mut message.data, params);
                binding.receive(message).await
            }
            None => {
                self.stats.record_dropped();
                log::warn!(
                    "service {} has no binding for path {}; dropping message",
                    self.name,
                    message.path
                );
            }
        }
    }

    /// Send-and-wait on whichever binding matches `path` (§4.5 Call).
    pub async fn call(&self, path: &str, data: Data) -> Message {
        self.call_traced(path, data, None).await
    }

    /// As [`Service::call`], but the request carries `logger` (§4.9) so the
    /// caller's own trace span brackets the round trip.
    pub async fn call_traced(&self, path: &str, data: Data, logger: Option<crate::logger::Logger>) -> Message {
        let mut data = data;
        match self.find_binding(path) {
            Some((binding, params)) => {
                merge_params(&mut data, params);
                binding.call_and_wait_with_logger(&self.name, path, data, logger).await
            }
            None => {
                self.stats.record_failed();
                Message::default().with_error(crate::message::MessageError::not_found())
            }
        }
    }

    /// Fire-and-forget on whichever binding matches `path`.
    pub async fn notify(&self, path: &str, data: Data) {
        let mut data = data;
        if let Some((binding, params)) = self.find_binding(path) {
            merge_params(&mut data, params);
            binding.notify(&self.name, path, data).await;
        } else {
            self.stats.record_dropped();
            log::warn!("service {} has no binding for path {}; notify dropped", self.name, path);
        }
    }
}

/// Merge captured path parameters into `data`, never overwriting a key the
/// caller already supplied (§4.7).
fn merge_params(data: &mut Data, params: Data) {
    for (key, value) in params {
        data.entry(key).or_insert(value);
    }
}
