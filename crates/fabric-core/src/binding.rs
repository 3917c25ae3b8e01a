use std::{sync::Arc, time::Duration};

use parking_lot::RwLock;
use regex::Regex;

use crate::{
    data::{Data, Value},
    error::Error,
    logger::{Level, Logger},
    member::{Member, MemberSet},
    message::Message,
    node::Node,
    protocol::Protocol,
    request::{ReceivedRequest, ReplyCallback, Request},
    resolver::Resolver,
    stats::Counters,
    token::Token,
};

/// The user-supplied reaction to a freshly-received call (§4.4). Given the
/// primary, typed handler contract: a reflective controller/method path is
/// an optional adapter layered on top, not a second core abstraction.
pub type Handler = Arc<dyn Fn(Arc<ReceivedRequest>) + Send + Sync>;

/// A compiled path pattern bound to a resolver, a rendezvous registry and a
/// handler (§4.4). One `Binding` instance is shared (behind an `Arc`)
/// between the outbound call path and the inbound receive path of a single
/// service.
pub struct Binding {
    path_pattern: String,
    regex: Regex,
    resolver: Resolver,
    pattern: crate::pattern::RendezvousPattern,
    handler: Handler,
    members: Arc<RwLock<MemberSet>>,
    protocol: Arc<dyn Protocol>,
    default_level: Level,
    stats: Arc<Counters>,
    local_node: Node,
}

impl Binding {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        path_pattern: impl Into<String>,
        resolver: Resolver,
        timeout: Option<Duration>,
        handler: Handler,
        members: Arc<RwLock<MemberSet>>,
        protocol: Arc<dyn Protocol>,
        stats: Arc<Counters>,
        local_node: Node,
    ) -> Result<Self, Error> {
        let path_pattern = path_pattern.into();
        let regex = Regex::new(&anchor(&path_pattern))?;

        Ok(Self {
            path_pattern,
            regex,
            resolver,
            pattern: crate::pattern::RendezvousPattern::new(timeout),
            handler,
            members,
            protocol,
            default_level: Level::Info,
            stats,
            local_node,
        })
    }

    pub fn path_pattern(&self) -> &str {
        &self.path_pattern
    }

    /// `Matches(path)` (§4.4): `None` on a non-match, otherwise the
    /// captured groups keyed by decimal index (or by name, for a pattern
    /// using a named capture group).
    pub fn matches(&self, path: &str) -> Option<Data> {
        let captures = self.regex.captures(path)?;
        let mut params = Data::default();

        for (index, name) in self.regex.capture_names().enumerate().skip(1) {
            if let Some(value) = captures.get(index) {
                let key = name.map(str::to_string).unwrap_or_else(|| index.to_string());
                params.insert(key, Value::String(value.as_str().to_string()));
            }
        }

        Some(params)
    }

    /// `GetPath(params)` (§4.4): the inverse of [`Binding::matches`].
    /// Substitutes each top-level parenthesised group in the path pattern
    /// with the positionally-keyed parameter, reconstructing a concrete
    /// path.
    pub fn get_path(&self, params: &Data) -> String {
        let mut result = String::new();
        let mut depth = 0usize;
        let mut group_index = 0usize;

        for c in self.path_pattern.chars() {
            match c {
                '(' if depth == 0 => {
                    depth += 1;
                    group_index += 1;
                    if let Some(value) = params.get(&group_index.to_string()).and_then(Value::as_str) {
                        result.push_str(value);
                    }
                }
                '(' => depth += 1,
                ')' if depth > 0 => depth -= 1,
                _ if depth == 0 => result.push(c),
                _ => {}
            }
        }

        result
    }

    /// The first capture group against `path`, used by [`Resolver::Param`].
    pub fn first_capture<'a>(&self, path: &'a str) -> Option<&'a str> {
        self.regex.captures(path)?.get(1).map(|m| m.as_str())
    }

    /// Send `request` out through this binding: logger span, resolver,
    /// rendezvous registration, then one protocol send per destination
    /// member (§4.1 forward chain).
    pub async fn call(&self, mut request: Request) -> Arc<Request> {
        if request.logger.is_none() {
            // A reply carries the tree it was forwarded (§4.9); continuing
            // the same `Logger` here nests this send's span inside it
            // instead of starting an unrelated tree.
            request.logger = request.message.logger.clone().or_else(|| Some(Logger::new(self.default_level)));
        }
        if let Some(logger) = &request.logger {
            logger.open_span(format!("req_send {}:{}", request.message.service, request.message.path));
            // Carried on the wire under a reserved `data` key (§4.9); see
            // `fabric_wire::codec`.
            request.message.logger = Some(logger.clone());
        }

        // The reply closure routes back to `message.source` (§4.3); without
        // stamping it here a reply to a remote member re-resolves the path
        // instead of returning to the caller.
        if request.message.source.is_empty() {
            request.message.source.add(Member::new(Token::hash(self.local_node.to_string()), self.local_node.clone()));
        }

        let capture = self.first_capture(&request.message.path).map(str::to_owned);
        {
            let members = self.members.read();
            self.resolver.resolve(&mut request.message, &members, capture.as_deref());
        }
        request.set_replies_needed(request.message.destination.len());

        let wants_reply = request.needs_reply();
        let request = if wants_reply {
            self.pattern.register(request).await
        } else {
            Arc::new(request)
        };

        let destinations = request.message.destination.to_vec();
        for member in destinations {
            self.stats.record_sent();
            self.protocol.send(member.node, request.clone()).await;
        }

        // A fire-and-forget send has no reply to close the span on; a call
        // expecting one is closed by `RendezvousPattern` once it's answered
        // or times out.
        if !wants_reply {
            if let Some(logger) = &request.logger {
                logger.close_span();
            }
        }

        request
    }

    /// Convenience over [`Binding::call`] for fire-and-forget sends with no
    /// reply expected.
    pub async fn notify(&self, service: &str, path: &str, data: Data) {
        let mut message = Message::new(service, path);
        message.data = data;
        self.call(Request::new(message)).await;
    }

    /// Convenience over [`Binding::call`] that waits for the first reply.
    pub async fn call_and_wait(&self, service: &str, path: &str, data: Data) -> Message {
        self.call_and_wait_with_logger(service, path, data, None).await
    }

    /// As [`Binding::call_and_wait`], but the request carries `logger` (§4.9)
    /// instead of a fresh one, so the caller's own span brackets the whole
    /// round trip rather than just the local send.
    pub async fn call_and_wait_with_logger(
        &self,
        service: &str,
        path: &str,
        data: Data,
        logger: Option<Logger>,
    ) -> Message {
        let mut message = Message::new(service, path);
        message.data = data;
        let mut request = Request::new(message);
        request.logger = logger;
        let (request, mut rx) = request.reply_channel();
        self.call(request).await;
        rx.recv().await.unwrap_or_else(|| {
            let mut timeout = Message::default();
            timeout.error = crate::message::MessageError::timeout();
            timeout
        })
    }

    /// Route an inbound message (decoded off the wire by a protocol
    /// implementation) into this binding: first try rendezvous correlation,
    /// then fall back to treating it as a fresh call for the handler
    /// (§4.3).
    pub async fn receive(self: &Arc<Self>, message: Message) {
        self.stats.record_received();
        match self.pattern.deliver(message.clone()).await {
            crate::pattern::DeliverOutcome::Correlated { .. } => return,
            crate::pattern::DeliverOutcome::Unknown => {}
        }

        let binding = self.clone();
        let received = Arc::new(ReceivedRequest::new(message));
        let reply_target = received.clone();

        let closure: ReplyCallback = Arc::new(move |mut reply_data| {
            let binding = binding.clone();
            let original = reply_target.message.clone();
            reply_data.destination = original.source.clone();
            reply_data.destination_rdv = original.source_rdv;
            reply_data.service = original.service.clone();
            reply_data.path = original.path.clone();
            // Carries the inbound trace back to the caller so it can be
            // grafted as a child of the span it opened on send (§4.9).
            reply_data.logger = original.logger.clone();

            tokio::spawn(async move {
                binding.call(Request::new(reply_data)).await;
            });
        });
        received.install_reply_closure(closure);

        (self.handler)(received);
    }
}

fn anchor(pattern: &str) -> String {
    if pattern.starts_with('^') {
        pattern.to_string()
    } else {
        format!("^{pattern}$")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{member::Member, node::Node, token::Token};

    struct NullProtocol;

    #[async_trait::async_trait]
    impl Protocol for NullProtocol {
        async fn send(&self, _node: Node, _request: Arc<Request>) {}

        fn name(&self) -> &'static str {
            "null"
        }
    }

    fn members() -> Arc<RwLock<MemberSet>> {
        let mut set = MemberSet::new();
        set.add(Member::new(Token(0), Node::new("a", 1, 2)));
        Arc::new(RwLock::new(set))
    }

    #[tokio::test]
    async fn path_pattern_is_anchored() {
        let binding = Binding::new(
            "/user/.*",
            Resolver::default(),
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        assert!(binding.matches("/user/42").is_some());
        assert!(binding.matches("/other/user/42").is_none());
    }

    #[tokio::test]
    async fn matches_captures_the_group_by_decimal_index() {
        let binding = Binding::new(
            r"/user/(\w+)",
            Resolver::default(),
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        let params = binding.matches("/user/alice").unwrap();
        assert_eq!(params.get("1").and_then(Value::as_str), Some("alice"));
    }

    #[tokio::test]
    async fn get_path_reverses_matches() {
        let binding = Binding::new(
            r"/user/(\w+)",
            Resolver::default(),
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        let params = binding.matches("/user/alice").unwrap();
        assert_eq!(binding.get_path(&params), "/user/alice");
    }

    #[tokio::test]
    async fn capture_group_is_extracted() {
        let binding = Binding::new(
            r"/user/(\w+)",
            Resolver::Param { count: 1 },
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        assert_eq!(binding.first_capture("/user/alice"), Some("alice"));
    }

    #[tokio::test]
    async fn call_resolves_and_sends_to_every_destination() {
        let binding = Binding::new(
            "/ping",
            Resolver::Path { count: 1 },
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        let request = binding.call(Request::new(Message::new("svc", "/ping"))).await;
        assert_eq!(request.message.destination.len(), 1);
    }

    #[tokio::test]
    async fn call_stamps_the_local_node_as_source() {
        let binding = Binding::new(
            "/ping",
            Resolver::Path { count: 1 },
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        let request = binding.call(Request::new(Message::new("svc", "/ping"))).await;
        assert_eq!(request.message.source.to_vec()[0].node, Node::new("a", 1, 2));
    }

    #[tokio::test]
    async fn a_reply_routes_back_to_the_stamped_source_instead_of_rehashing() {
        use parking_lot::Mutex;

        struct RecordingProtocol(Mutex<Vec<Node>>);

        #[async_trait::async_trait]
        impl Protocol for RecordingProtocol {
            async fn send(&self, node: Node, _request: Arc<Request>) {
                self.0.lock().push(node);
            }

            fn name(&self) -> &'static str {
                "recording"
            }
        }

        // Two-member ring: whichever member the fresh call resolves to, the
        // reply must come back to the stamped caller, not whoever the path
        // re-hashes to on the way back.
        let mut set = MemberSet::new();
        set.add(Member::new(Token(0), Node::new("a", 1, 2)));
        set.add(Member::new(Token(u32::MAX / 2), Node::new("b", 3, 4)));
        let members = Arc::new(RwLock::new(set));
        let protocol = Arc::new(RecordingProtocol(Mutex::new(Vec::new())));

        let binding = Arc::new(
            Binding::new(
                "/ping",
                Resolver::Path { count: 1 },
                None,
                Arc::new(|received| {
                    received.reply(crate::data::data());
                }),
                members,
                protocol.clone(),
                Arc::new(Counters::default()),
                Node::new("b", 3, 4),
            )
            .unwrap(),
        );

        let mut message = Message::new("svc", "/ping");
        let caller = Node::new("a", 1, 2);
        message.source.add(Member::new(Token::hash(caller.to_string()), caller.clone()));
        message.source_rdv = 42;

        binding.receive(message).await;
        // The reply send happens on a spawned task; give it a turn.
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;

        assert_eq!(protocol.0.lock().as_slice(), &[caller]);
    }

    #[tokio::test]
    async fn fire_and_forget_does_not_leak_a_rendezvous_entry() {
        let binding = Binding::new(
            "/ping",
            Resolver::Path { count: 1 },
            None,
            Arc::new(|_| {}),
            members(),
            Arc::new(NullProtocol),
            Arc::new(Counters::default()),
            Node::new("a", 1, 2),
        )
        .unwrap();

        let request = binding.call(Request::new(Message::new("svc", "/ping"))).await;
        assert_eq!(request.message.source_rdv, 0, "a fire-and-forget send must never register with the rendezvous pattern");
    }

    #[tokio::test]
    async fn receive_invokes_handler_on_unknown_rdv() {
        use std::sync::atomic::{AtomicBool, Ordering};

        let called = Arc::new(AtomicBool::new(false));
        let called_in_handler = called.clone();

        let binding = Arc::new(
            Binding::new(
                "/ping",
                Resolver::Path { count: 1 },
                None,
                Arc::new(move |_received| {
                    called_in_handler.store(true, Ordering::SeqCst);
                }),
                members(),
                Arc::new(NullProtocol),
                Arc::new(Counters::default()),
                Node::new("a", 1, 2),
            )
            .unwrap(),
        );

        binding.receive(Message::new("svc", "/ping")).await;
        assert!(called.load(Ordering::SeqCst));
    }
}
