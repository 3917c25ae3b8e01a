use std::task::{Context, Poll};

use http::Request;
use tower::{Layer, Service};

/// Layer that logs every request a [`tower::Service`] handles, at the level
/// the ambient `log` crate is configured for.
#[derive(Default, Clone)]
pub struct LogLayer;

impl<S> Layer<S> for LogLayer {
    type Service = LogService<S>;

    fn layer(&self, service: S) -> Self::Service {
        LogService { service }
    }
}

#[derive(Clone)]
pub struct LogService<S> {
    service: S,
}

impl<S, Body> Service<Request<Body>> for LogService<S>
where
    S: Service<Request<Body>>,
{
    type Error = S::Error;
    type Future = S::Future;
    type Response = S::Response;

    fn poll_ready(&mut self, cx: &mut Context<'_>) -> Poll<Result<(), Self::Error>> {
        self.service.poll_ready(cx)
    }

    fn call(&mut self, req: Request<Body>) -> Self::Future {
        log::info!("http ingress: {} {}", req.method(), req.uri());
        self.service.call(req)
    }
}
