//! Error types and status classification.
//!
//! # Design
//! Failures fall into three groups. `TransportError` covers exchanges that
//! never produced an HTTP response. `ResponseError` covers responses outside
//! 2xx, one variant per well-known status with the full response attached,
//! an `Unknown` fallback, and `Canceled` for exchanges aborted on purpose.
//! Undecodable bodies are not errors at all. `HttpError` is the union the
//! client hands back.

use thiserror::Error;

use crate::response::Response;
use crate::tls::AuthScheme;

/// Failures with no HTTP-level response.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request timed out")]
    Timeout,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request failed: {0}")]
    Request(#[source] reqwest::Error),

    #[error("TLS configuration rejected: {0}")]
    Tls(String),

    #[error("{scheme} challenge was rejected")]
    ChallengeRejected { scheme: AuthScheme },

    /// The exchange was canceled. Reported to callers as
    /// [`ResponseError::Canceled`].
    #[error("exchange canceled")]
    Canceled,

    #[error("blocking on this thread would deadlock its runtime")]
    BlockingWouldDeadlock,

    #[error("failed to start runtime: {0}")]
    Runtime(#[source] std::io::Error),

    #[error("runtime shut down before the exchange completed")]
    RuntimeShutdown,

    #[error("exchange task aborted: {0}")]
    Aborted(String),
}

impl TransportError {
    pub fn from_reqwest(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            TransportError::Timeout
        } else if error.is_connect() {
            TransportError::Connect(error.to_string())
        } else if error.is_builder() {
            TransportError::InvalidRequest(error.to_string())
        } else {
            TransportError::Request(error)
        }
    }
}

/// Non-2xx responses and canceled exchanges.
#[derive(Debug, Error)]
pub enum ResponseError<T> {
    #[error("301 Moved Permanently")]
    MovedPermanently(Response<T>),
    #[error("302 Found")]
    Found(Response<T>),
    #[error("303 See Other")]
    SeeOther(Response<T>),
    #[error("304 Not Modified")]
    NotModified(Response<T>),
    #[error("307 Temporary Redirect")]
    TemporaryRedirect(Response<T>),
    #[error("308 Permanent Redirect")]
    PermanentRedirect(Response<T>),
    #[error("400 Bad Request")]
    BadRequest(Response<T>),
    #[error("401 Unauthorized")]
    Unauthorized(Response<T>),
    #[error("403 Forbidden")]
    Forbidden(Response<T>),
    #[error("404 Not Found")]
    NotFound(Response<T>),
    #[error("405 Method Not Allowed")]
    MethodNotAllowed(Response<T>),
    #[error("500 Internal Server Error")]
    InternalServerError(Response<T>),
    #[error("501 Not Implemented")]
    NotImplemented(Response<T>),
    #[error("502 Bad Gateway")]
    BadGateway(Response<T>),
    #[error("503 Service Unavailable")]
    ServiceNotAvailable(Response<T>),
    #[error("504 Gateway Timeout")]
    GatewayTimeout(Response<T>),
    #[error("511 Network Authentication Required")]
    NetworkAuthenticationRequired(Response<T>),
    #[error("unexpected status {}", .0.status_code())]
    Unknown(Response<T>),
    #[error("request to {url} was canceled")]
    Canceled { url: String },
}

impl<T> ResponseError<T> {
    /// Map a response to the variant for its exact status code.
    pub fn from_response(response: Response<T>) -> Self {
        match response.status_code() {
            301 => ResponseError::MovedPermanently(response),
            302 => ResponseError::Found(response),
            303 => ResponseError::SeeOther(response),
            304 => ResponseError::NotModified(response),
            307 => ResponseError::TemporaryRedirect(response),
            308 => ResponseError::PermanentRedirect(response),
            400 => ResponseError::BadRequest(response),
            401 => ResponseError::Unauthorized(response),
            403 => ResponseError::Forbidden(response),
            404 => ResponseError::NotFound(response),
            405 => ResponseError::MethodNotAllowed(response),
            500 => ResponseError::InternalServerError(response),
            501 => ResponseError::NotImplemented(response),
            502 => ResponseError::BadGateway(response),
            503 => ResponseError::ServiceNotAvailable(response),
            504 => ResponseError::GatewayTimeout(response),
            511 => ResponseError::NetworkAuthenticationRequired(response),
            _ => ResponseError::Unknown(response),
        }
    }

    pub fn response(&self) -> Option<&Response<T>> {
        match self {
            ResponseError::MovedPermanently(r)
            | ResponseError::Found(r)
            | ResponseError::SeeOther(r)
            | ResponseError::NotModified(r)
            | ResponseError::TemporaryRedirect(r)
            | ResponseError::PermanentRedirect(r)
            | ResponseError::BadRequest(r)
            | ResponseError::Unauthorized(r)
            | ResponseError::Forbidden(r)
            | ResponseError::NotFound(r)
            | ResponseError::MethodNotAllowed(r)
            | ResponseError::InternalServerError(r)
            | ResponseError::NotImplemented(r)
            | ResponseError::BadGateway(r)
            | ResponseError::ServiceNotAvailable(r)
            | ResponseError::GatewayTimeout(r)
            | ResponseError::NetworkAuthenticationRequired(r)
            | ResponseError::Unknown(r) => Some(r),
            ResponseError::Canceled { .. } => None,
        }
    }

    pub fn status_code(&self) -> Option<u16> {
        self.response().map(Response::status_code)
    }

    pub fn is_canceled(&self) -> bool {
        matches!(self, ResponseError::Canceled { .. })
    }
}

/// `Ok` for 2xx, otherwise the matching `ResponseError`.
pub fn classify<T>(response: Response<T>) -> Result<Response<T>, ResponseError<T>> {
    if response.is_success() {
        Ok(response)
    } else {
        Err(ResponseError::from_response(response))
    }
}

/// Failure of an exchange.
#[derive(Debug, Error)]
pub enum HttpError<T> {
    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error("{0}")]
    Response(ResponseError<T>),
}

impl<T> From<ResponseError<T>> for HttpError<T> {
    fn from(error: ResponseError<T>) -> Self {
        HttpError::Response(error)
    }
}

impl<T> HttpError<T> {
    pub fn is_canceled(&self) -> bool {
        matches!(self, HttpError::Response(error) if error.is_canceled())
    }

    pub fn response(&self) -> Option<&Response<T>> {
        match self {
            HttpError::Response(error) => error.response(),
            HttpError::Transport(_) => None,
        }
    }
}

pub type HttpResult<T> = Result<Response<T>, HttpError<T>>;
