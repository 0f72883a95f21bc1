use axum::http::{self, Request, StatusCode};
use http_body_util::BodyExt;
use mock_server::{app, ECHO_METHOD_HEADER};
use tower::ServiceExt;

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

async fn body_bytes(response: axum::response::Response) -> bytes::Bytes {
    response.into_body().collect().await.unwrap().to_bytes()
}

fn get(uri: &str) -> Request<axum::body::Body> {
    Request::builder()
        .uri(uri)
        .body(axum::body::Body::empty())
        .unwrap()
}

fn header<'a>(response: &'a axum::response::Response, name: &str) -> &'a str {
    response.headers().get(name).unwrap().to_str().unwrap()
}

// --- echo ---

#[tokio::test]
async fn echo_returns_body_and_content_type() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/echo")
                .header(http::header::CONTENT_TYPE, "application/json")
                .body(axum::body::Body::from(r#"{"a":1}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(header(&resp, "content-type"), "application/json");
    assert_eq!(header(&resp, ECHO_METHOD_HEADER), "POST");
    assert_eq!(&body_bytes(resp).await[..], br#"{"a":1}"#);
}

#[tokio::test]
async fn echo_preserves_binary_bytes() {
    let raw: Vec<u8> = vec![0, 0xff, 0xfe, b'\r', b'\n', 0x80];
    let resp = app()
        .oneshot(
            Request::builder()
                .method("PUT")
                .uri("/echo")
                .body(axum::body::Body::from(raw.clone()))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(header(&resp, "content-type"), "application/octet-stream");
    assert_eq!(header(&resp, ECHO_METHOD_HEADER), "PUT");
    assert_eq!(body_bytes(resp).await.to_vec(), raw);
}

#[tokio::test]
async fn echo_accepts_patch() {
    let resp = app()
        .oneshot(
            Request::builder()
                .method("PATCH")
                .uri("/echo")
                .body(axum::body::Body::from("x"))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(header(&resp, ECHO_METHOD_HEADER), "PATCH");
}

// --- content types ---

#[tokio::test]
async fn json_route_is_json() {
    let resp = app().oneshot(get("/json")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert!(header(&resp, "content-type").starts_with("application/json"));
    let value = body_json(resp).await;
    assert_eq!(value["hello"], "world");
}

#[tokio::test]
async fn malformed_json_claims_json_but_does_not_parse() {
    let resp = app().oneshot(get("/malformed-json")).await.unwrap();
    assert_eq!(header(&resp, "content-type"), "application/json");
    let bytes = body_bytes(resp).await;
    assert!(serde_json::from_slice::<serde_json::Value>(&bytes).is_err());
}

#[tokio::test]
async fn bytes_route_returns_every_octet() {
    let resp = app().oneshot(get("/bytes")).await.unwrap();
    assert_eq!(header(&resp, "content-type"), "application/octet-stream");
    let bytes = body_bytes(resp).await;
    assert_eq!(bytes.len(), 256);
    assert_eq!(bytes[255], 255);
}

// --- status ---

#[tokio::test]
async fn status_route_returns_requested_code() {
    let resp = app().oneshot(get("/status/418")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::IM_A_TEAPOT);
    assert_eq!(&body_bytes(resp).await[..], b"status 418");
}

#[tokio::test]
async fn status_route_rejects_invalid_code() {
    let resp = app().oneshot(get("/status/42")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_route_is_404() {
    let resp = app().oneshot(get("/nope")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

// --- slow ---

#[tokio::test]
async fn slow_route_eventually_answers() {
    let resp = app().oneshot(get("/slow/5")).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(&body_bytes(resp).await[..], b"done");
}
