//! The non-blocking network primitive every execution shape is built on.
//!
//! # Design
//! `Network::send` takes the wire form of a request plus the challenge
//! handler for the exchange and resolves to the raw status, headers and body.
//! Swapping the implementation is how tests drive the client without a
//! socket.
//!
//! `ReqwestNetwork` runs on reqwest with rustls. rustls fixes the trust store
//! and client identity per connector rather than per handshake, so the TLS
//! decisions for an `https` exchange are made up front: a server-trust
//! challenge and a client-certificate challenge are raised before the
//! request is sent, and the answers select (or build and cache) the reqwest
//! client used for the exchange. Timeouts are whatever the underlying client
//! is configured with.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use futures::future::BoxFuture;
use reqwest::{Client, Method, Url};
use tracing::{debug, trace};

use crate::error::TransportError;
use crate::http::{HeaderFields, WireRequest};
use crate::pool::ChallengeHandler;
use crate::tls::{AuthScheme, Certificate, Challenge, ChallengeDisposition, ClientKeyStore, Credential};

/// What came back over the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawResponse {
    pub status_code: u16,
    pub headers: HeaderFields,
    pub body: Vec<u8>,
    pub url: Option<String>,
}

pub trait Network: Send + Sync + 'static {
    fn send(
        &self,
        request: WireRequest,
        challenges: Arc<dyn ChallengeHandler>,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>>;
}

/// TLS settings chosen by challenge answers. The default profile is the
/// platform trust store with no client identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
struct TlsProfile {
    anchors: Vec<Certificate>,
    identity: Option<ClientKeyStore>,
}

impl TlsProfile {
    fn is_default(&self) -> bool {
        self.anchors.is_empty() && self.identity.is_none()
    }
}

struct Transport {
    default_client: Client,
    timeout: Option<Duration>,
    clients: Mutex<HashMap<TlsProfile, Client>>,
}

impl Transport {
    fn client_for(&self, profile: &TlsProfile) -> Result<Client, TransportError> {
        if profile.is_default() {
            return Ok(self.default_client.clone());
        }
        let mut clients = self.clients.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(client) = clients.get(profile) {
            return Ok(client.clone());
        }
        let client = build_client(self.timeout, profile)?;
        clients.insert(profile.clone(), client.clone());
        Ok(client)
    }
}

fn build_client(timeout: Option<Duration>, profile: &TlsProfile) -> Result<Client, TransportError> {
    let mut builder = Client::builder();
    if let Some(timeout) = timeout {
        builder = builder.timeout(timeout);
    }
    if !profile.anchors.is_empty() {
        builder = builder.tls_built_in_root_certs(false);
        for anchor in &profile.anchors {
            let certificates = anchor.decode().map_err(TransportError::Tls)?;
            for certificate in certificates {
                builder = builder.add_root_certificate(certificate);
            }
        }
    }
    if let Some(identity) = &profile.identity {
        let identity = identity.decode().map_err(TransportError::Tls)?;
        builder = builder.identity(identity);
    }
    builder.build().map_err(|e| TransportError::Tls(e.to_string()))
}

/// reqwest-backed network.
#[derive(Clone)]
pub struct ReqwestNetwork {
    transport: Arc<Transport>,
}

impl ReqwestNetwork {
    pub fn new() -> Result<Self, TransportError> {
        Self::build(None)
    }

    /// Network whose clients abort exchanges after `timeout`.
    pub fn with_timeout(timeout: Duration) -> Result<Self, TransportError> {
        Self::build(Some(timeout))
    }

    fn build(timeout: Option<Duration>) -> Result<Self, TransportError> {
        let default_client = build_client(timeout, &TlsProfile::default())?;
        Ok(Self {
            transport: Arc::new(Transport {
                default_client,
                timeout,
                clients: Mutex::new(HashMap::new()),
            }),
        })
    }
}

impl Network for ReqwestNetwork {
    fn send(
        &self,
        request: WireRequest,
        challenges: Arc<dyn ChallengeHandler>,
    ) -> BoxFuture<'static, Result<RawResponse, TransportError>> {
        let transport = Arc::clone(&self.transport);
        Box::pin(async move { perform(transport, request, challenges).await })
    }
}

async fn perform(
    transport: Arc<Transport>,
    request: WireRequest,
    challenges: Arc<dyn ChallengeHandler>,
) -> Result<RawResponse, TransportError> {
    let url = Url::parse(&request.url).map_err(|e| TransportError::InvalidRequest(format!("{}: {e}", request.url)))?;
    let profile = if url.scheme() == "https" {
        negotiate(&request, url.host_str().unwrap_or_default(), challenges.as_ref()).await?
    } else {
        TlsProfile::default()
    };
    let client = transport.client_for(&profile)?;

    let method = Method::from_bytes(request.method.as_str().as_bytes())
        .map_err(|e| TransportError::InvalidRequest(e.to_string()))?;
    let mut builder = client.request(method, url);
    for (name, value) in &request.header_fields {
        builder = builder.header(name.as_str(), value.as_str());
    }
    if let Some(body) = request.body {
        builder = builder.body(body);
    }

    let response = builder.send().await.map_err(TransportError::from_reqwest)?;
    let status_code = response.status().as_u16();
    let url = Some(response.url().to_string());
    let headers = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|value| (name.as_str().to_string(), value.to_string()))
        })
        .collect();
    let body = response.bytes().await.map_err(TransportError::from_reqwest)?.to_vec();
    trace!(status_code, bytes = body.len(), "response received");

    Ok(RawResponse {
        status_code,
        headers,
        body,
        url,
    })
}

/// Raise the server-trust and client-certificate challenges for an `https`
/// exchange and fold the answers into a TLS profile.
async fn negotiate(
    request: &WireRequest,
    host: &str,
    challenges: &dyn ChallengeHandler,
) -> Result<TlsProfile, TransportError> {
    let mut profile = TlsProfile::default();
    for scheme in [AuthScheme::ServerTrust, AuthScheme::ClientCertificate] {
        let challenge = Challenge::new(scheme, host);
        match challenges.handle(request, &challenge).await {
            ChallengeDisposition::UseCredential(Credential::TrustAnchors(anchors)) => profile.anchors = anchors,
            ChallengeDisposition::UseCredential(Credential::Identity(identity)) => profile.identity = Some(identity),
            ChallengeDisposition::PerformDefaultHandling => {}
            ChallengeDisposition::CancelChallenge => {
                debug!(host, scheme = %challenge.scheme, "challenge canceled by handler");
                return Err(TransportError::ChallengeRejected {
                    scheme: challenge.scheme,
                });
            }
        }
    }
    Ok(profile)
}
