use crate::{
    data::{data, Data},
    logger::Logger,
    member::MemberSet,
};

/// Code sentinel for a synthetic "path not found" reply (§7 Routing).
pub const ERROR_NOT_FOUND: u16 = 404;

/// Code sentinel for a synthetic "response timeout" reply (§7 Timeout).
pub const ERROR_TIMEOUT: u16 = 504;

/// The `data` key a message's logger is flattened into before encoding and
/// lifted back out of on decode (§4.9). Reserved: a caller-supplied `data`
/// entry under this key is clobbered by the wire codec.
pub const LOGGER_DATA_KEY: &str = "__fabric_logger";

/// An error carried on a [`Message`]. The empty sentinel (`message == ""` and
/// `code == 0`) means "no error".
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MessageError {
    pub message: String,
    pub code: u16,
}

impl MessageError {
    pub fn new(message: impl Into<String>, code: u16) -> Self {
        Self {
            message: message.into(),
            code,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.message.is_empty() && self.code == 0
    }

    pub fn not_found() -> Self {
        Self::new("Path not found", ERROR_NOT_FOUND)
    }

    pub fn timeout() -> Self {
        Self::new("Response timeout", ERROR_TIMEOUT)
    }
}

/// The wire-level record that travels between cluster members. See the wire
/// format section for field ordering when this is framed by
/// `fabric-wire`.
#[derive(Debug, Clone)]
pub struct Message {
    pub service: String,
    pub path: String,

    pub destination: MemberSet,
    pub destination_rdv: u32,

    pub source: MemberSet,
    pub source_rdv: u32,

    pub data: Data,
    pub error: MessageError,

    /// Per-request trace logger. Never transmitted as a struct field; when
    /// tracing is active it is flattened into `data` under a reserved key
    /// before encoding and lifted back out on decode (see
    /// [`crate::logger`]).
    pub logger: Option<Logger>,
}

impl Default for Message {
    fn default() -> Self {
        Self {
            service: String::new(),
            path: String::new(),
            destination: MemberSet::new(),
            destination_rdv: 0,
            source: MemberSet::new(),
            source_rdv: 0,
            data: data(),
            error: MessageError::default(),
            logger: None,
        }
    }
}

impl Message {
    pub fn new(service: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_error(mut self, error: MessageError) -> Self {
        self.error = error;
        self
    }

    pub fn is_destination_empty(&self) -> bool {
        self.destination.is_empty()
    }

    pub fn is_error(&self) -> bool {
        !self.error.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_error_is_the_empty_sentinel() {
        assert!(MessageError::default().is_empty());
        assert!(!MessageError::not_found().is_empty());
    }

    #[test]
    fn fresh_message_has_no_destination() {
        let message = Message::new("s", "/ping");
        assert!(message.is_destination_empty());
        assert!(!message.is_error());
    }
}
