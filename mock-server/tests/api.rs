use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, Echo, Service};
use tower::ServiceExt;

async fn body_json<T: serde::de::DeserializeOwned>(response: axum::response::Response) -> T {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<String> {
    Request::builder().uri(uri).body(String::new()).unwrap()
}

// --- status ---

#[tokio::test]
async fn status_route_returns_requested_code() {
    for code in [200, 404, 418, 503] {
        let resp = app().oneshot(get(&format!("/status/{code}"))).await.unwrap();
        assert_eq!(resp.status().as_u16(), code);
    }
}

#[tokio::test]
async fn status_route_accepts_any_method() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("DELETE")
                .uri("/status/204")
                .body(String::new())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn status_route_rejects_out_of_range_code() {
    let resp = app().oneshot(get("/status/1000")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

// --- echo ---

#[tokio::test]
async fn echo_reports_method_headers_query_and_body() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo?first=foo&second=bar")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(r#"{"a":1}"#.to_string())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "POST");
    assert_eq!(echo.query.as_deref(), Some("first=foo&second=bar"));
    assert_eq!(echo.body, r#"{"a":1}"#);
    assert_eq!(echo.headers["content-type"], "application/json");
}

#[tokio::test]
async fn echo_without_query() {
    let resp = app().oneshot(get("/echo")).await.unwrap();
    let echo: Echo = body_json(resp).await;
    assert_eq!(echo.method, "GET");
    assert!(echo.query.is_none());
    assert!(echo.body.is_empty());
}

// --- content ---

#[tokio::test]
async fn json_route_describes_the_service() {
    let resp = app().oneshot(get("/json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let service: Service = body_json(resp).await;
    assert_eq!(service.name, "mock-server");
    assert_eq!(service.version, 1);
}

#[tokio::test]
async fn text_route_returns_plain_text() {
    let resp = app().oneshot(get("/text")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(body_bytes(resp).await, "hello from mock-server");
}

#[tokio::test]
async fn slow_route_honors_delay() {
    let started = std::time::Instant::now();
    let resp = app().oneshot(get("/slow?ms=20")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(started.elapsed() >= std::time::Duration::from_millis(20));
}

// --- session ---

#[tokio::test]
async fn session_sets_xsrf_cookie() {
    let resp = app().oneshot(get("/session")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NO_CONTENT);
    let cookie = resp.headers()[http::header::SET_COOKIE].to_str().unwrap();
    assert!(cookie.starts_with("XSRF-TOKEN="));
}

#[tokio::test]
async fn unknown_route_returns_404() {
    let resp = app().oneshot(get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}
