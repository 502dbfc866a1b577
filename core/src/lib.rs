//! Asynchronous HTTP client core with per-request TLS credentials.
//!
//! # Overview
//! Requests are assembled by a pipeline of steps over a `MutableRequest`
//! and frozen into an immutable `Request`. `HttpClient` executes them on a
//! tokio runtime in three shapes (future, callback, blocking) that share one
//! network primitive. While an exchange is in flight its request sits in a
//! `RequestPool`, so TLS challenges raised by the transport can be traced
//! back to the credentials the request was built with.
//!
//! # Design
//! - Configuration is an explicit `Arc<dyn Configuration>` handed to the
//!   steps that need it. Nothing is global.
//! - Responses are classified by exact status code into `ResponseError`
//!   variants; 2xx is success.
//! - Bodies are decoded by an ordered `DecoderChain`, selected by the body
//!   kind the result type asks for. An undecodable body is not an error.
//! - `Network` is the seam between exchange bookkeeping and the wire;
//!   `ReqwestNetwork` is the production implementation.

pub mod client;
pub mod config;
pub mod cookie;
pub mod decoder;
pub mod delivery;
pub mod encoding;
pub mod endpoint;
pub mod error;
pub mod http;
pub mod logging;
pub mod network;
pub mod pipeline;
pub mod pool;
pub mod response;
pub mod serialization;
pub mod tls;

pub use client::{CancelHandle, Exchange, HttpClient, HttpClientBuilder};
pub use config::{ConfigError, Configuration, StaticConfiguration};
pub use cookie::{Cookie, CookieJar, CookieStore};
pub use decoder::{BodyKind, DecoderChain, Json, ResponseBody, ResponseDecoder};
pub use delivery::{DeliveryContext, DeliveryPump, DeliveryQueue, Inline};
pub use endpoint::ServiceEndpoint;
pub use error::{HttpError, HttpResult, ResponseError, TransportError};
pub use http::{HeaderFields, HttpMethod, MutableRequest, Parameters, Request, WireRequest};
pub use network::{Network, RawResponse, ReqwestNetwork};
pub use pipeline::{RequestGenerator, RequestPipeline, RequestStep};
pub use pool::{ChallengeHandler, CredentialResolver, RequestPool};
pub use response::Response;
pub use serialization::{Serializable, Serialized};
pub use tls::{
    AuthScheme, Certificate, Challenge, ChallengeDisposition, ClientKeyStore, Credential, CredentialSource,
    FileCredentialSource, SslCredentials,
};
