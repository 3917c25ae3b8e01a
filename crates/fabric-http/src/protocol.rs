use std::{sync::Arc, time::Duration};

use axum::{
    body::Bytes,
    extract::{OriginalUri, RawQuery, State},
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{any, get, post},
    Json, Router,
};
use fabric_core::{
    cluster::Cluster,
    data::{data, Data, Value},
    logger::Logger,
    message::{Message, ERROR_NOT_FOUND},
    node::Node,
    request::Request,
};
use tokio::sync::OnceCell;

use crate::log_layer::LogLayer;

const DELIVER_PATH: &str = "/_fabric/deliver";
const STATS_PATH: &str = "/_fabric/stats";
const INGRESS_TIMEOUT: Duration = Duration::from_secs(5);

/// HTTP ingress adapter (§4.8): accepts arbitrary external HTTP requests,
/// routes them by `Host` header (or a configured default service) into a
/// fabric call, and waits for the first reply. Also implements
/// [`fabric_core::protocol::Protocol`] so an HTTP-addressed member can be
/// reached the same way a binary-protocol one is: by POSTing the same
/// framed bytes `fabric-wire` would put on a TCP socket to a reserved path
/// on the peer.
pub struct HttpProtocol {
    local_node: Node,
    default_service: Option<String>,
    cluster: OnceCell<Arc<Cluster>>,
}

impl HttpProtocol {
    pub fn new(local_node: Node) -> Arc<Self> {
        Self::with_default_service(local_node, None)
    }

    /// `default_service`, when set, is used whenever the `Host` header is
    /// absent or names no registered service, bypassing the Host lookup
    /// entirely (§4.8).
    pub fn with_default_service(local_node: Node, default_service: Option<String>) -> Arc<Self> {
        Arc::new(Self {
            local_node,
            default_service,
            cluster: OnceCell::new(),
        })
    }

    pub fn attach_cluster(&self, cluster: Arc<Cluster>) {
        self.cluster.set(cluster).ok();
    }

    fn cluster(&self) -> &Arc<Cluster> {
        self.cluster
            .get()
            .expect("HttpProtocol::attach_cluster must run before the protocol serves traffic")
    }

    /// Build the ingress `Router` without binding a listener, so tests can
    /// drive it directly with `tower::ServiceExt::oneshot`.
    pub fn router(self: &Arc<Self>) -> Router {
        Router::new()
            .route(DELIVER_PATH, post(deliver))
            .route(STATS_PATH, get(stats))
            .route("/{*path}", any(ingress))
            .route("/", any(ingress))
            .layer(LogLayer)
            .with_state(self.clone())
    }

    pub async fn serve(self: Arc<Self>) -> std::io::Result<()> {
        let app = self.router();
        let listener = tokio::net::TcpListener::bind(self.local_node.stream_addr()).await?;
        log::info!("fabric-http ingress listening on {}", self.local_node.stream_addr());
        axum::serve(listener, app).await
    }

    /// Host header (stripped of a `:port` suffix) names the service, unless
    /// a default service is configured.
    fn service_for(&self, headers: &HeaderMap) -> Option<String> {
        if let Some(default) = &self.default_service {
            return Some(default.clone());
        }
        headers
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .map(|host| host.split(':').next().unwrap_or(host).to_string())
    }
}

async fn not_found() -> Response {
    (StatusCode::NOT_FOUND, "404 page not found").into_response()
}

/// The reserved inter-member path: the body is a complete `fabric-wire`
/// frame, handed straight to the cluster like a decoded stream frame would
/// be.
async fn deliver(State(protocol): State<Arc<HttpProtocol>>, body: Bytes) -> Response {
    match fabric_wire::codec::decode(&body) {
        Ok(message) => {
            protocol.cluster().receive(message).await;
            StatusCode::NO_CONTENT.into_response()
        }
        Err(error) => {
            log::warn!("dropping malformed delivered frame: {error}");
            (StatusCode::BAD_REQUEST, error.to_string()).into_response()
        }
    }
}

/// Per-stage sent/received/failed/dropped counters (§2 Observability) for
/// whichever cluster this protocol is attached to.
async fn stats(State(protocol): State<Arc<HttpProtocol>>) -> Response {
    Json(protocol.cluster().stats()).into_response()
}

async fn ingress(
    State(protocol): State<Arc<HttpProtocol>>,
    method: axum::http::Method,
    headers: HeaderMap,
    OriginalUri(uri): OriginalUri,
    RawQuery(query): RawQuery,
    body: Bytes,
) -> Response {
    let Some(service) = protocol.service_for(&headers) else {
        return not_found().await;
    };

    let path = uri.path().to_string();
    let mut payload = data();
    payload.insert("method".into(), Value::String(method.to_string()));

    if let Some(query) = &query {
        merge_encoded_pairs(&mut payload, query);
    }

    let form_encoded = headers
        .get(header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .is_some_and(|ct| ct.starts_with("application/x-www-form-urlencoded"));

    if form_encoded {
        if let Ok(form) = std::str::from_utf8(&body) {
            merge_encoded_pairs(&mut payload, form);
        }
    } else if !body.is_empty() {
        payload.insert(
            "body".into(),
            Value::Boxed { name: "http_body".into(), bytes: body.to_vec() },
        );
    }

    let trace_requested = payload.contains_key("nrv_trace");

    let logger = if trace_requested {
        let mut logger = Logger::default();
        logger.raise_to_max();
        Some(logger)
    } else {
        None
    };

    let reply = match tokio::time::timeout(
        INGRESS_TIMEOUT,
        protocol.cluster().call_traced(&service, &path, payload, logger.clone()),
    )
    .await
    {
        Ok(reply) => reply,
        Err(_) => return (StatusCode::BAD_GATEWAY, "Response timeout").into_response(),
    };

    render(reply, logger.as_ref())
}

fn render(message: Message, request_logger: Option<&Logger>) -> Response {
    if message.is_error() {
        if message.error.code == ERROR_NOT_FOUND {
            return (StatusCode::NOT_FOUND, "404 page not found").into_response();
        }

        let status = StatusCode::from_u16(message.error.code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        return (status, message.error.message).into_response();
    }

    if let Some(Value::String(target)) = message.data.get("redirect_url") {
        return (StatusCode::MOVED_PERMANENTLY, [(header::LOCATION, target.clone())]).into_response();
    }

    let content_type = match message.data.get("content-type") {
        Some(Value::String(ct)) => ct.clone(),
        _ => "text/html".to_string(),
    };

    let mut body = body_bytes(&message.data);
    if let Some(logger) = request_logger {
        body.extend_from_slice(logger.render().as_bytes());
    }

    ([(header::CONTENT_TYPE, content_type)], body).into_response()
}

/// Decode `application/x-www-form-urlencoded` pairs (a query string or a
/// form body) and merge each into `payload`, without overwriting a key
/// already present (§4.8: "query + form parameters are merged into data").
fn merge_encoded_pairs(payload: &mut Data, raw: &str) {
    let Ok(pairs) = serde_urlencoded::from_str::<Vec<(String, String)>>(raw) else {
        return;
    };
    for (key, value) in pairs {
        payload.entry(key).or_insert(Value::String(value));
    }
}

fn body_bytes(data: &Data) -> Vec<u8> {
    match data.get("body") {
        Some(Value::Boxed { bytes, .. }) => bytes.clone(),
        Some(Value::String(s)) => s.clone().into_bytes(),
        _ => Vec::new(),
    }
}

#[async_trait::async_trait]
impl fabric_core::protocol::Protocol for HttpProtocol {
    /// HTTP ingress is inbound-only (§4.8): it never originates outbound
    /// fabric requests. A local-node delivery (a binding replying to
    /// itself) still needs to land, but anything addressed to another
    /// member is misuse of this protocol and is only logged.
    async fn send(&self, node: Node, request: Arc<Request>) {
        if node == self.local_node {
            self.cluster().receive(request.message.clone()).await;
            return;
        }

        log::error!(
            "HTTP ingress cannot originate outbound requests: dropped {}:{} addressed to {node}",
            request.message.service, request.message.path
        );
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
