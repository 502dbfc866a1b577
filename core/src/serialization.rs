//! The serializable capability used for request bodies.

use serde::Serialize;
use serde_json::{Map, Value};
use tracing::debug;

/// A value that knows its own dictionary representation.
///
/// Request bodies built from a `Serializable` use [`Serializable::to_data`],
/// which by default is the JSON encoding of [`Serializable::to_dictionary`].
pub trait Serializable: Send + Sync {
    fn to_dictionary(&self) -> Map<String, Value>;

    fn to_data(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(&self.to_dictionary())
            .inspect_err(|e| debug!(error = %e, "could not encode serializable object"))
            .ok()
    }

    fn to_text(&self) -> Option<String> {
        self.to_data().and_then(|data| String::from_utf8(data).ok())
    }
}

/// Adapter giving any `serde::Serialize` type the serializable capability.
///
/// Types that do not serialize to a JSON object have an empty dictionary but
/// still encode their full JSON form as data.
#[derive(Debug, Clone)]
pub struct Serialized<T>(pub T);

impl<T> Serializable for Serialized<T>
where
    T: Serialize + Send + Sync,
{
    fn to_dictionary(&self) -> Map<String, Value> {
        match serde_json::to_value(&self.0) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    fn to_data(&self) -> Option<Vec<u8>> {
        serde_json::to_vec(&self.0)
            .inspect_err(|e| debug!(error = %e, "could not encode serialized value"))
            .ok()
    }
}
