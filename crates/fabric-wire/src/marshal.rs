use std::any::{Any, TypeId};

use ahash::AHashMap;
use fabric_core::data::Value;

/// A pluggable encoder/decoder pair for a user type, registered under a
/// wire name so [`Value::Boxed`] payloads stay self-describing across
/// processes that may not even share the same Rust type (a Go or C peer,
/// say) as long as they agree on the wire name and byte layout.
pub trait Marshaller: Send + Sync {
    fn wire_name(&self) -> &'static str;
    fn encode(&self, value: &dyn Any) -> Option<Vec<u8>>;
    fn decode(&self, bytes: &[u8]) -> Option<Box<dyn Any + Send + Sync>>;
}

/// Where a binding looks up a [`Marshaller`] for a concrete Rust type when
/// building or reading a [`Value::Boxed`] entry.
#[derive(Default)]
pub struct MarshalRegistry {
    by_type: AHashMap<TypeId, &'static str>,
    by_name: AHashMap<&'static str, Box<dyn Marshaller>>,
}

impl MarshalRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Any>(&mut self, marshaller: impl Marshaller + 'static) {
        let name = marshaller.wire_name();
        self.by_type.insert(TypeId::of::<T>(), name);
        self.by_name.insert(name, Box::new(marshaller));
    }

    pub fn to_value<T: Any>(&self, value: &T) -> Option<Value> {
        let name = *self.by_type.get(&TypeId::of::<T>())?;
        let marshaller = self.by_name.get(name)?;
        let bytes = marshaller.encode(value)?;
        Some(Value::Boxed { name: name.to_string(), bytes })
    }

    pub fn from_value(&self, value: &Value) -> Option<Box<dyn Any + Send + Sync>> {
        let Value::Boxed { name, bytes } = value else { return None };
        self.by_name.get(name.as_str())?.decode(bytes)
    }
}
