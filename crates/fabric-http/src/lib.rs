//! HTTP ingress adapter for the fabric (§4.8): a `Protocol` implementation
//! that also doubles as an external-facing REST-ish entry point, so a
//! plain HTTP client can call into the fabric without speaking the binary
//! wire protocol.

mod log_layer;
pub mod protocol;

pub use protocol::HttpProtocol;
