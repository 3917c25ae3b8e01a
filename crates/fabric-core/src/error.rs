/// Errors raised by the core model itself (binding compilation, lookup
/// failures the caller must see as a `Result`, not as a synthetic reply).
///
/// Errors that the fabric's *propagation policy* says must never reach a
/// user handler (routing, correlation, timeout) are not represented here:
/// they surface as an error [`crate::message::Message`] instead, per the
/// error handling design.
#[derive(Debug)]
pub enum Error {
    InvalidPattern(regex::Error),
    ServiceNotFound(String),
    BindingNotFound(String),
}

impl std::error::Error for Error {}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Error::InvalidPattern(e) => write!(f, "invalid binding path pattern: {e}"),
            Error::ServiceNotFound(name) => write!(f, "no service registered under {name:?}"),
            Error::BindingNotFound(path) => write!(f, "no binding matches path {path:?}"),
        }
    }
}

impl From<regex::Error> for Error {
    fn from(value: regex::Error) -> Self {
        Self::InvalidPattern(value)
    }
}
