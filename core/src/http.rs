//! Request model: the immutable `Request` and the `MutableRequest` builder
//! that the generator pipeline threads through its steps.
//!
//! # Design
//! A `MutableRequest` lives only while a request is being constructed. Every
//! generator step takes it by value and hands it back, so the order in which
//! headers, parameters and credentials accumulate is fixed by the caller.
//! The terminal step merges endpoint parameters, encodes the query string and
//! derives the body, after which the value is frozen into a `Request`.
//!
//! Two requests are equal when their URL, method, headers and body are equal.
//! Parameters and TLS credentials do not take part in equality; the request
//! pool relies on this to match a TLS challenge back to its originating
//! request by content rather than identity.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::debug;

use crate::encoding::{append_query_string, join_path, url_encoded_query};
use crate::endpoint::ServiceEndpoint;
use crate::pipeline::{RequestGenerator, StandardRequestGenerator};
use crate::serialization::Serializable;
use crate::tls::SslCredentials;

/// Header fields keyed by name. A later write for the same name wins.
pub type HeaderFields = BTreeMap<String, String>;

/// Well-known header names and values.
pub mod headers {
    pub const ACCEPT: &str = "Accept";
    pub const AUTHORIZATION: &str = "Authorization";
    pub const CONTENT_LENGTH: &str = "Content-Length";
    pub const CONTENT_TYPE: &str = "Content-Type";
    pub const COOKIE: &str = "Cookie";
    pub const SET_COOKIE: &str = "Set-Cookie";
    pub const XSRF_TOKEN: &str = "X-XSRF-TOKEN";

    pub const APPLICATION_JSON: &str = "application/json";
    pub const FORM_URL_ENCODED: &str = "application/x-www-form-urlencoded";
    pub const BASIC: &str = "Basic";
}

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum HttpMethod {
    #[default]
    Get,
    Post,
    Put,
    Head,
    Delete,
    Patch,
    Trace,
    Options,
    Connect,
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Get => "GET",
            HttpMethod::Post => "POST",
            HttpMethod::Put => "PUT",
            HttpMethod::Head => "HEAD",
            HttpMethod::Delete => "DELETE",
            HttpMethod::Patch => "PATCH",
            HttpMethod::Trace => "TRACE",
            HttpMethod::Options => "OPTIONS",
            HttpMethod::Connect => "CONNECT",
        }
    }
}

impl fmt::Display for HttpMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Payload attached to a request, either as body source or as query source.
///
/// Only `Map` takes part in merging and query encoding. Which shapes produce
/// a body is decided by [`Parameters::to_body`].
#[derive(Clone)]
pub enum Parameters {
    Map(Map<String, Value>),
    Array(Vec<Value>),
    Object(Arc<dyn Serializable>),
    Text(String),
    Bytes(Vec<u8>),
    /// A value with no body representation (numbers, booleans, null).
    Other(Value),
}

impl Parameters {
    pub fn is_empty(&self) -> bool {
        match self {
            Parameters::Map(map) => map.is_empty(),
            Parameters::Array(values) => values.is_empty(),
            Parameters::Object(_) => false,
            Parameters::Text(text) => text.is_empty(),
            Parameters::Bytes(bytes) => bytes.is_empty(),
            Parameters::Other(value) => value.is_null(),
        }
    }

    pub fn as_map(&self) -> Option<&Map<String, Value>> {
        match self {
            Parameters::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Encode the payload as body bytes.
    ///
    /// Mappings and arrays become JSON, serializable objects use their own
    /// data representation, text is UTF-8 and bytes pass through. Anything
    /// else yields `None`, and so does a shape that fails to encode: a
    /// request without a body is preferred over a failed construction.
    pub fn to_body(&self) -> Option<Vec<u8>> {
        match self {
            Parameters::Map(map) => serde_json::to_vec(map)
                .inspect_err(|e| debug!(error = %e, "could not encode parameter map"))
                .ok(),
            Parameters::Array(values) => serde_json::to_vec(values)
                .inspect_err(|e| debug!(error = %e, "could not encode parameter array"))
                .ok(),
            Parameters::Object(object) => object.to_data(),
            Parameters::Text(text) => Some(text.as_bytes().to_vec()),
            Parameters::Bytes(bytes) => Some(bytes.clone()),
            Parameters::Other(_) => None,
        }
    }
}

impl fmt::Debug for Parameters {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Parameters::Map(map) => f.debug_tuple("Map").field(map).finish(),
            Parameters::Array(values) => f.debug_tuple("Array").field(values).finish(),
            Parameters::Object(object) => f.debug_tuple("Object").field(&object.to_dictionary()).finish(),
            Parameters::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Parameters::Bytes(bytes) => f.debug_tuple("Bytes").field(&bytes.len()).finish(),
            Parameters::Other(value) => f.debug_tuple("Other").field(value).finish(),
        }
    }
}

impl From<Map<String, Value>> for Parameters {
    fn from(map: Map<String, Value>) -> Self {
        Parameters::Map(map)
    }
}

impl From<Vec<Value>> for Parameters {
    fn from(values: Vec<Value>) -> Self {
        Parameters::Array(values)
    }
}

impl From<String> for Parameters {
    fn from(text: String) -> Self {
        Parameters::Text(text)
    }
}

impl From<&str> for Parameters {
    fn from(text: &str) -> Self {
        Parameters::Text(text.to_string())
    }
}

impl From<Vec<u8>> for Parameters {
    fn from(bytes: Vec<u8>) -> Self {
        Parameters::Bytes(bytes)
    }
}

impl From<Value> for Parameters {
    fn from(value: Value) -> Self {
        match value {
            Value::Object(map) => Parameters::Map(map),
            Value::Array(values) => Parameters::Array(values),
            Value::String(text) => Parameters::Text(text),
            other => Parameters::Other(other),
        }
    }
}

/// Merge `incoming` into `target`: new keys overwrite, and a null value
/// removes the key.
pub fn merge_parameter_maps(target: &mut Map<String, Value>, incoming: &Map<String, Value>) {
    for (key, value) in incoming {
        if value.is_null() {
            target.remove(key);
        } else {
            target.insert(key.clone(), value.clone());
        }
    }
}

/// Builder state used only during request construction.
#[derive(Debug, Clone)]
pub struct MutableRequest {
    method: HttpMethod,
    parameters: Option<Parameters>,
    header_fields: HeaderFields,
    query_string: Option<String>,
    ssl_credentials: Option<SslCredentials>,
    body: Option<Vec<u8>>,
}

impl MutableRequest {
    pub fn new(method: HttpMethod) -> Self {
        Self {
            method,
            parameters: None,
            header_fields: HeaderFields::new(),
            query_string: None,
            ssl_credentials: None,
            body: None,
        }
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    pub fn header_fields(&self) -> &HeaderFields {
        &self.header_fields
    }

    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    pub fn ssl_credentials(&self) -> Option<&SslCredentials> {
        self.ssl_credentials.as_ref()
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Merge parameters into the accumulated set.
    ///
    /// Two mappings merge key by key with null values acting as deletions;
    /// any other combination replaces the accumulated payload.
    pub fn update_parameters(&mut self, parameters: Parameters) {
        match (&mut self.parameters, parameters) {
            (Some(Parameters::Map(current)), Parameters::Map(incoming)) => {
                merge_parameter_maps(current, &incoming);
            }
            (slot, Parameters::Map(incoming)) => {
                let mut merged = Map::new();
                merge_parameter_maps(&mut merged, &incoming);
                *slot = Some(Parameters::Map(merged));
            }
            (slot, other) => *slot = Some(other),
        }
    }

    /// Encode mapping parameters as the pending query string. Other shapes
    /// have no query representation and are ignored.
    pub fn update_query_parameters(&mut self, parameters: &Parameters) {
        if let Some(map) = parameters.as_map() {
            self.query_string = Some(url_encoded_query(map));
        }
    }

    pub fn update_header_fields<I, K, V>(&mut self, header_fields: I)
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (key, value) in header_fields {
            self.header_fields.insert(key.into(), value.into());
        }
    }

    pub fn update_ssl_credentials(&mut self, ssl_credentials: SslCredentials) {
        self.ssl_credentials = Some(ssl_credentials);
    }

    /// Derive the body from the accumulated parameters and record its
    /// length. Leaves the body unset when the parameters are empty or have
    /// no encodable representation.
    pub fn create_body_from_parameters(&mut self) {
        let Some(parameters) = self.parameters.as_ref().filter(|p| !p.is_empty()) else {
            return;
        };
        let form_encoded = self
            .header_fields
            .get(headers::CONTENT_TYPE)
            .is_some_and(|value| value == headers::FORM_URL_ENCODED);
        let body = match parameters.as_map() {
            Some(map) if form_encoded => Some(url_encoded_query(map).into_bytes()),
            _ => parameters.to_body(),
        };
        match body {
            Some(body) => {
                self.update_header_fields([(headers::CONTENT_LENGTH, body.len().to_string())]);
                self.body = Some(body);
            }
            None => debug!(method = %self.method, "parameters have no body representation; sending without body"),
        }
    }
}

/// The request as it goes over the wire: everything the transport sees.
///
/// Challenge callbacks receive this view and correlate it with the pooled
/// `Request` that carries the TLS credentials.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WireRequest {
    pub url: String,
    pub method: HttpMethod,
    pub header_fields: HeaderFields,
    pub body: Option<Vec<u8>>,
}

/// An immutable HTTP request.
#[derive(Debug, Clone)]
pub struct Request {
    url: String,
    method: HttpMethod,
    parameters: Option<Parameters>,
    header_fields: HeaderFields,
    body: Option<Vec<u8>>,
    ssl_credentials: Option<SslCredentials>,
}

impl PartialEq for Request {
    fn eq(&self, other: &Self) -> bool {
        self.url == other.url
            && self.method == other.method
            && self.header_fields == other.header_fields
            && self.body == other.body
    }
}

impl Eq for Request {}

impl Request {
    /// Build a request described by a service endpoint.
    pub fn from_endpoint(endpoint: &dyn ServiceEndpoint) -> Self {
        let method = endpoint.method();
        let generator = endpoint.request_generator();
        let url = join_path(&endpoint.base_url(), &endpoint.path());
        Self::assemble(
            url,
            generator.generate_request(method),
            endpoint.parameters(),
            endpoint.query_parameters(),
        )
    }

    /// Build a request for an explicit URL using the given generator.
    pub fn with_generator(
        url: &str,
        method: HttpMethod,
        parameters: Option<Parameters>,
        query_parameters: Option<Parameters>,
        generator: &dyn RequestGenerator,
    ) -> Self {
        Self::assemble(
            url.to_string(),
            generator.generate_request(method),
            parameters,
            query_parameters,
        )
    }

    /// Build a request with the standard generator.
    pub fn new(url: &str, method: HttpMethod, parameters: Option<Parameters>) -> Self {
        Self::with_generator(url, method, parameters, None, &StandardRequestGenerator)
    }

    pub fn get(url: &str) -> Self {
        Self::new(url, HttpMethod::Get, None)
    }

    /// Terminal construction step: merge parameters, place the query string
    /// on the URL and, for non-GET methods, derive the body.
    fn assemble(
        url: String,
        mut builder: MutableRequest,
        parameters: Option<Parameters>,
        query_parameters: Option<Parameters>,
    ) -> Self {
        if let Some(parameters) = parameters {
            builder.update_parameters(parameters);
        }
        if let Some(query_parameters) = query_parameters.as_ref() {
            builder.update_query_parameters(query_parameters);
        }
        let url = match builder.query_string() {
            Some(query) => append_query_string(&url, query),
            None => url,
        };
        if builder.method() != HttpMethod::Get {
            builder.create_body_from_parameters();
        }

        let MutableRequest {
            method,
            parameters,
            header_fields,
            ssl_credentials,
            body,
            ..
        } = builder;
        Self {
            url,
            method,
            parameters,
            header_fields,
            body,
            ssl_credentials,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn method(&self) -> HttpMethod {
        self.method
    }

    pub fn parameters(&self) -> Option<&Parameters> {
        self.parameters.as_ref()
    }

    pub fn header_fields(&self) -> &HeaderFields {
        &self.header_fields
    }

    pub fn body(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    pub fn ssl_credentials(&self) -> Option<&SslCredentials> {
        self.ssl_credentials.as_ref()
    }

    pub fn to_wire(&self) -> WireRequest {
        WireRequest {
            url: self.url.clone(),
            method: self.method,
            header_fields: self.header_fields.clone(),
            body: self.body.clone(),
        }
    }

    /// Whether `wire` carries the same URL, method, headers and body.
    pub fn matches(&self, wire: &WireRequest) -> bool {
        self.url == wire.url
            && self.method == wire.method
            && self.header_fields == wire.header_fields
            && self.body == wire.body
    }
}
