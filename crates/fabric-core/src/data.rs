use ahash::AHashMap;

/// A dynamically typed value carried in a [`crate::message::Message`]'s data
/// map. Built-in kinds round-trip exactly through the wire protocol; a value
/// of any other shape is handed to a registered marshaller and carried as
/// [`Value::Boxed`].
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    String(String),
    Int(i64),
    Bool(bool),
    Map(Data),
    List(Vec<Value>),
    /// An opaque user type, encoded by a marshaller registered under `name`.
    Boxed { name: String, bytes: Vec<u8> },
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&Data> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(l) => Some(l.as_slice()),
            _ => None,
        }
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::String(value)
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::String(value.to_string())
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        Value::Int(value)
    }
}

impl From<bool> for Value {
    fn from(value: bool) -> Self {
        Value::Bool(value)
    }
}

/// The `data` map carried by every [`crate::message::Message`].
///
/// Backed by `ahash`: this map is on the hot path of every dispatched
/// request.
pub type Data = AHashMap<String, Value>;

pub fn data() -> Data {
    Data::default()
}
