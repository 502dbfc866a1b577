//! Body decoder chain.
//!
//! # Design
//! Every result type names the body shape it wants through
//! [`ResponseBody::KIND`], and every decoder declares the shapes it can
//! produce. Selection is a lookup of the requested kind in each decoder's
//! declared set, in registration order. The first decoder that declares the
//! kind and produces a value wins. A body that no decoder can turn into the
//! requested type is left undecoded; that never fails the exchange.

use std::fmt;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, trace};

/// Body shapes a decoder can produce.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    JsonObject,
    JsonValue,
    Text,
    Bytes,
    /// No decoded body wanted.
    Empty,
}

/// A decoded body, tagged by shape.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    JsonObject(Map<String, Value>),
    JsonValue(Value),
    Text(String),
    Bytes(Vec<u8>),
}

/// A type a response body can be decoded into.
pub trait ResponseBody: Sized + Send + 'static {
    const KIND: BodyKind;

    fn from_decoded(decoded: Decoded) -> Option<Self>;
}

impl ResponseBody for Map<String, Value> {
    const KIND: BodyKind = BodyKind::JsonObject;

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::JsonObject(map) | Decoded::JsonValue(Value::Object(map)) => Some(map),
            _ => None,
        }
    }
}

impl ResponseBody for Value {
    const KIND: BodyKind = BodyKind::JsonValue;

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::JsonValue(value) => Some(value),
            Decoded::JsonObject(map) => Some(Value::Object(map)),
            _ => None,
        }
    }
}

impl ResponseBody for String {
    const KIND: BodyKind = BodyKind::Text;

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Text(text) => Some(text),
            _ => None,
        }
    }
}

impl ResponseBody for Vec<u8> {
    const KIND: BodyKind = BodyKind::Bytes;

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        match decoded {
            Decoded::Bytes(bytes) => Some(bytes),
            _ => None,
        }
    }
}

impl ResponseBody for () {
    const KIND: BodyKind = BodyKind::Empty;

    fn from_decoded(_decoded: Decoded) -> Option<Self> {
        None
    }
}

/// Any deserializable type, decoded through the JSON value capability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Json<T>(pub T);

impl<T> ResponseBody for Json<T>
where
    T: DeserializeOwned + Send + 'static,
{
    const KIND: BodyKind = BodyKind::JsonValue;

    fn from_decoded(decoded: Decoded) -> Option<Self> {
        let value = match decoded {
            Decoded::JsonValue(value) => value,
            Decoded::JsonObject(map) => Value::Object(map),
            _ => return None,
        };
        serde_json::from_value(value)
            .inspect_err(|e| debug!(error = %e, "JSON body does not match the requested type"))
            .ok()
            .map(Json)
    }
}

/// A pluggable body decoder.
pub trait ResponseDecoder: Send + Sync {
    /// The body kinds this decoder can produce.
    fn kinds(&self) -> &'static [BodyKind];

    fn decode(&self, kind: BodyKind, data: &[u8]) -> Option<Decoded>;

    fn can_handle(&self, kind: BodyKind) -> bool {
        self.kinds().contains(&kind)
    }
}

/// Decodes JSON documents whose top level is an object.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonObjectDecoder;

impl ResponseDecoder for JsonObjectDecoder {
    fn kinds(&self) -> &'static [BodyKind] {
        &[BodyKind::JsonObject]
    }

    fn decode(&self, _kind: BodyKind, data: &[u8]) -> Option<Decoded> {
        match serde_json::from_slice(data) {
            Ok(Value::Object(map)) => Some(Decoded::JsonObject(map)),
            Ok(_) => None,
            Err(e) => {
                trace!(error = %e, "body is not a JSON object");
                None
            }
        }
    }
}

/// Decodes any JSON document.
#[derive(Debug, Clone, Copy, Default)]
pub struct JsonDecoder;

impl ResponseDecoder for JsonDecoder {
    fn kinds(&self) -> &'static [BodyKind] {
        &[BodyKind::JsonValue]
    }

    fn decode(&self, _kind: BodyKind, data: &[u8]) -> Option<Decoded> {
        serde_json::from_slice(data)
            .inspect_err(|e| trace!(error = %e, "body is not JSON"))
            .ok()
            .map(Decoded::JsonValue)
    }
}

/// Decodes UTF-8 text.
#[derive(Debug, Clone, Copy, Default)]
pub struct TextDecoder;

impl ResponseDecoder for TextDecoder {
    fn kinds(&self) -> &'static [BodyKind] {
        &[BodyKind::Text]
    }

    fn decode(&self, _kind: BodyKind, data: &[u8]) -> Option<Decoded> {
        std::str::from_utf8(data)
            .ok()
            .map(|text| Decoded::Text(text.to_string()))
    }
}

/// Passes raw bytes through.
#[derive(Debug, Clone, Copy, Default)]
pub struct BytesDecoder;

impl ResponseDecoder for BytesDecoder {
    fn kinds(&self) -> &'static [BodyKind] {
        &[BodyKind::Bytes]
    }

    fn decode(&self, _kind: BodyKind, data: &[u8]) -> Option<Decoded> {
        Some(Decoded::Bytes(data.to_vec()))
    }
}

/// Ordered list of decoders tried for each response.
#[derive(Clone, Default)]
pub struct DecoderChain {
    decoders: Vec<Arc<dyn ResponseDecoder>>,
}

impl DecoderChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON object, JSON value, text and bytes decoders, in that order.
    pub fn standard() -> Self {
        Self::new()
            .with(JsonObjectDecoder)
            .with(JsonDecoder)
            .with(TextDecoder)
            .with(BytesDecoder)
    }

    pub fn with<D>(mut self, decoder: D) -> Self
    where
        D: ResponseDecoder + 'static,
    {
        self.decoders.push(Arc::new(decoder));
        self
    }

    pub fn len(&self) -> usize {
        self.decoders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.decoders.is_empty()
    }

    pub fn decode<T: ResponseBody>(&self, data: &[u8]) -> Option<T> {
        self.decoders
            .iter()
            .filter(|decoder| decoder.can_handle(T::KIND))
            .find_map(|decoder| decoder.decode(T::KIND, data).and_then(T::from_decoded))
    }
}

impl fmt::Debug for DecoderChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DecoderChain").field("decoders", &self.decoders.len()).finish()
    }
}
