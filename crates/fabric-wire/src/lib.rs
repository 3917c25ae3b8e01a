//! Binary stream+datagram wire protocol: a self-describing frame codec, a
//! pluggable marshaller registry for user payload types, and the
//! [`fabric_core::protocol::Protocol`] implementation that serves both
//! transports.

pub mod codec;
pub mod marshal;
pub mod protocol;

pub use marshal::{MarshalRegistry, Marshaller};
pub use protocol::WireProtocol;
