use std::collections::BTreeMap;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::{Path, Query, RawQuery},
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use uuid::Uuid;

/// What `/echo` saw of the request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Echo {
    pub method: String,
    pub headers: BTreeMap<String, String>,
    pub query: Option<String>,
    pub body: String,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Service {
    pub name: String,
    pub version: u32,
}

#[derive(Deserialize)]
pub struct Delay {
    #[serde(default = "default_delay_ms")]
    pub ms: u64,
}

fn default_delay_ms() -> u64 {
    5_000
}

pub fn app() -> Router {
    Router::new()
        .route("/status/{code}", any(status))
        .route("/echo", any(echo))
        .route("/json", get(service))
        .route("/text", get(text))
        .route("/slow", get(slow))
        .route("/session", get(session))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

async fn status(Path(code): Path<u16>) -> Result<StatusCode, StatusCode> {
    StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)
}

async fn echo(method: Method, headers: HeaderMap, RawQuery(query): RawQuery, body: Bytes) -> Json<Echo> {
    let headers = headers
        .iter()
        .filter_map(|(name, value)| Some((name.as_str().to_string(), value.to_str().ok()?.to_string())))
        .collect();
    Json(Echo {
        method: method.to_string(),
        headers,
        query,
        body: String::from_utf8_lossy(&body).into_owned(),
    })
}

async fn service() -> Json<Service> {
    Json(Service {
        name: "mock-server".to_string(),
        version: 1,
    })
}

async fn text() -> &'static str {
    "hello from mock-server"
}

async fn slow(Query(delay): Query<Delay>) -> StatusCode {
    tokio::time::sleep(Duration::from_millis(delay.ms)).await;
    StatusCode::OK
}

/// Starts a session: an `XSRF-TOKEN` cookie with a fresh token.
async fn session() -> impl IntoResponse {
    let cookie = format!("XSRF-TOKEN={}; Path=/", Uuid::new_v4());
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)])
}
