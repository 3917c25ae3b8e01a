use std::sync::Arc;

use axum::body::{to_bytes, Body};
use fabric_core::{cluster::Cluster, node::Node, Resolver};
use fabric_http::HttpProtocol;
use http::{Request, StatusCode};
use tower::ServiceExt;

/// Unmatched paths return the literal 404 body (§8 scenario 4), without
/// ever touching a real socket: the router is exercised directly.
#[tokio::test]
async fn unmatched_path_returns_404_page_not_found() {
    let node = Node::new("127.0.0.1", 0, 0);
    let protocol = HttpProtocol::new(node.clone());
    let cluster = Cluster::new(node, protocol.clone());
    protocol.attach_cluster(cluster);

    let response = protocol
        .router()
        .oneshot(Request::builder().uri("/does/not/exist").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"404 page not found");
}

/// A request routed via a configured default service reaches its binding's
/// handler and renders the handler's reply body back out.
#[tokio::test]
async fn default_service_routes_to_its_binding_and_renders_the_reply() {
    let node = Node::new("127.0.0.1", 0, 0);
    let protocol = HttpProtocol::with_default_service(node.clone(), Some("demo".into()));
    let cluster = Cluster::new(node, protocol.clone());
    protocol.attach_cluster(cluster.clone());

    cluster
        .bind("demo", "/ping", Resolver::default(), None, Arc::new(|received| {
            let data = received.message.data.clone();
            received.reply(data);
        }))
        .unwrap();

    let response = protocol
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/ping")
                .body(Body::from("hello"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"hello");
}

/// A binding closure that never replies trips the ingress deadline rather
/// than hanging the connection forever (§8 scenario 5). Runs on a paused
/// clock so the real 5s production deadline is exercised without the test
/// spending 5 real seconds asleep.
#[tokio::test(start_paused = true)]
async fn a_handler_that_never_replies_times_out_as_a_502() {
    let node = Node::new("127.0.0.1", 0, 0);
    let protocol = HttpProtocol::with_default_service(node.clone(), Some("demo".into()));
    let cluster = Cluster::new(node, protocol.clone());
    protocol.attach_cluster(cluster.clone());

    cluster
        .bind("demo", "/blackhole", Resolver::default(), None, Arc::new(|_received| {}))
        .unwrap();

    let response = protocol
        .router()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/blackhole")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    assert_eq!(&body[..], b"Response timeout");
}

/// The reserved stats route reports the counters a prior call bumped.
#[tokio::test]
async fn stats_route_reflects_a_prior_call() {
    let node = Node::new("127.0.0.1", 0, 0);
    let protocol = HttpProtocol::with_default_service(node.clone(), Some("demo".into()));
    let cluster = Cluster::new(node, protocol.clone());
    protocol.attach_cluster(cluster.clone());

    cluster
        .bind("demo", "/ping", Resolver::default(), None, Arc::new(|received| {
            let data = received.message.data.clone();
            received.reply(data);
        }))
        .unwrap();

    protocol
        .router()
        .oneshot(Request::builder().method("POST").uri("/ping").body(Body::from("hi")).unwrap())
        .await
        .unwrap();

    let response = protocol
        .router()
        .oneshot(Request::builder().uri("/_fabric/stats").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let snapshot: fabric_core::stats::Snapshot = serde_json::from_slice(&body).unwrap();
    assert_eq!(snapshot.sent, 1);
    assert_eq!(snapshot.received, 1);
}
