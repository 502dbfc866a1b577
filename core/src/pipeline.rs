//! Request generator pipeline.
//!
//! # Design
//! A generator turns an `HttpMethod` into a prepared `MutableRequest`. The
//! standard steps each take the builder by value and return it, and a
//! `RequestPipeline` applies its steps left to right, so the caller controls
//! the order in which headers and credentials accumulate. Steps that depend
//! on configuration hold the configuration object they were built with and
//! read it on every application.

use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;

use crate::config::{keys, Configuration};
use crate::cookie::{CookieStore, JSESSIONID, XSRF_TOKEN};
use crate::http::{headers, HttpMethod, MutableRequest};
use crate::tls::{CredentialSource, SslCredentials};

/// One transformation of the request builder.
pub trait RequestStep: Send + Sync {
    fn apply(&self, request: MutableRequest) -> MutableRequest;
}

impl<F> RequestStep for F
where
    F: Fn(MutableRequest) -> MutableRequest + Send + Sync,
{
    fn apply(&self, request: MutableRequest) -> MutableRequest {
        self(request)
    }
}

/// Produces the builder a request starts from.
pub trait RequestGenerator: Send + Sync {
    fn generate_request(&self, method: HttpMethod) -> MutableRequest;
}

/// Adds `Accept: application/json` and nothing else.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardRequestGenerator;

impl RequestGenerator for StandardRequestGenerator {
    fn generate_request(&self, method: HttpMethod) -> MutableRequest {
        JsonSupport.apply(MutableRequest::new(method))
    }
}

/// An ordered list of steps applied to a fresh builder.
#[derive(Clone, Default)]
pub struct RequestPipeline {
    steps: Vec<Arc<dyn RequestStep>>,
}

impl RequestPipeline {
    pub fn new() -> Self {
        Self::default()
    }

    /// The JSON support step alone.
    pub fn standard() -> Self {
        Self::new().then(JsonSupport)
    }

    /// Basic auth, JSON support and TLS credentials, in that order.
    pub fn configured(config: Arc<dyn Configuration>, source: Arc<dyn CredentialSource>) -> Self {
        Self::new()
            .then(BasicAuth::new(Arc::clone(&config)))
            .then(JsonSupport)
            .then(AttachSslCredentials::new(config, source))
    }

    pub fn then<S>(mut self, step: S) -> Self
    where
        S: RequestStep + 'static,
    {
        self.steps.push(Arc::new(step));
        self
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn run(&self, request: MutableRequest) -> MutableRequest {
        self.steps.iter().fold(request, |request, step| step.apply(request))
    }
}

impl fmt::Debug for RequestPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestPipeline").field("steps", &self.steps.len()).finish()
    }
}

impl RequestGenerator for RequestPipeline {
    fn generate_request(&self, method: HttpMethod) -> MutableRequest {
        self.run(MutableRequest::new(method))
    }
}

/// `Authorization: Basic <base64(user:pass)>` when both `auth.username` and
/// `auth.password` are configured.
pub struct BasicAuth {
    config: Arc<dyn Configuration>,
}

impl BasicAuth {
    pub fn new(config: Arc<dyn Configuration>) -> Self {
        Self { config }
    }
}

impl RequestStep for BasicAuth {
    fn apply(&self, mut request: MutableRequest) -> MutableRequest {
        if let (Some(username), Some(password)) = (
            self.config.get(keys::AUTH_USERNAME),
            self.config.get(keys::AUTH_PASSWORD),
        ) {
            let token = STANDARD.encode(format!("{username}:{password}"));
            request.update_header_fields([(headers::AUTHORIZATION, format!("{} {token}", headers::BASIC))]);
        }
        request
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct JsonSupport;

impl RequestStep for JsonSupport {
    fn apply(&self, mut request: MutableRequest) -> MutableRequest {
        request.update_header_fields([(headers::ACCEPT, headers::APPLICATION_JSON)]);
        request
    }
}

/// Attaches the TLS bundle named by configuration, if one resolves.
pub struct AttachSslCredentials {
    config: Arc<dyn Configuration>,
    source: Arc<dyn CredentialSource>,
}

impl AttachSslCredentials {
    pub fn new(config: Arc<dyn Configuration>, source: Arc<dyn CredentialSource>) -> Self {
        Self { config, source }
    }
}

impl RequestStep for AttachSslCredentials {
    fn apply(&self, mut request: MutableRequest) -> MutableRequest {
        if let Some(credentials) = SslCredentials::from_configuration(self.config.as_ref(), self.source.as_ref()) {
            request.update_ssl_credentials(credentials);
        }
        request
    }
}

/// Session headers from stored cookies: `X-XSRF-TOKEN` from the XSRF cookie
/// and a `Cookie` header carrying the XSRF and session-id cookies.
pub struct SessionCookie {
    store: Arc<dyn CookieStore>,
}

impl SessionCookie {
    pub fn new(store: Arc<dyn CookieStore>) -> Self {
        Self { store }
    }
}

impl RequestStep for SessionCookie {
    fn apply(&self, mut request: MutableRequest) -> MutableRequest {
        let mut xsrf = None;
        let mut session = None;
        for cookie in self.store.cookies() {
            if cookie.name == XSRF_TOKEN {
                request.update_header_fields([(headers::XSRF_TOKEN, cookie.value.clone())]);
                xsrf = Some(cookie.to_string());
            } else if cookie.name == JSESSIONID {
                session = Some(cookie.to_string());
            }
        }
        let header = [xsrf, session].into_iter().flatten().collect::<Vec<_>>().join("; ");
        if !header.is_empty() {
            request.update_header_fields([(headers::COOKIE, header)]);
        }
        request
    }
}
