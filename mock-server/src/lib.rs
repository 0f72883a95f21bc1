//! HTTP fixture for exercising the request state machine over real sockets.
//!
//! Every route is stateless. `/echo` returns exactly the bytes it received,
//! which is what the body round-trip tests rely on.

use std::time::Duration;

use axum::{
    body::Bytes,
    extract::Path,
    http::{header, HeaderMap, Method, StatusCode},
    response::IntoResponse,
    routing::{any, get},
    Json, Router,
};
use serde::Serialize;
use tokio::net::TcpListener;

pub const ECHO_METHOD_HEADER: &str = "x-echo-method";

#[derive(Debug, Clone, Serialize)]
pub struct Greeting {
    pub hello: String,
    pub n: u32,
}

pub fn app() -> Router {
    Router::new()
        .route("/echo", any(echo))
        .route("/json", get(json))
        .route("/malformed-json", get(malformed_json))
        .route("/bytes", get(octets))
        .route("/status/{code}", get(status))
        .route("/slow/{ms}", get(slow))
}

pub async fn run(listener: TcpListener) -> Result<(), std::io::Error> {
    axum::serve(listener, app()).await
}

/// Echo the body back with the request's content type and method.
async fn echo(method: Method, headers: HeaderMap, body: Bytes) -> impl IntoResponse {
    let content_type = headers
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("application/octet-stream")
        .to_string();
    (
        [
            (header::CONTENT_TYPE, content_type),
            (
                header::HeaderName::from_static(ECHO_METHOD_HEADER),
                method.to_string(),
            ),
        ],
        body,
    )
}

async fn json() -> Json<Greeting> {
    Json(Greeting {
        hello: "world".to_string(),
        n: 1,
    })
}

async fn malformed_json() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/json")], "{\"unterminated\": ")
}

async fn octets() -> impl IntoResponse {
    let body: Vec<u8> = (0..=255u8).collect();
    ([(header::CONTENT_TYPE, "application/octet-stream")], body)
}

async fn status(Path(code): Path<u16>) -> Result<(StatusCode, String), StatusCode> {
    let status = StatusCode::from_u16(code).map_err(|_| StatusCode::BAD_REQUEST)?;
    Ok((status, format!("status {code}")))
}

async fn slow(Path(ms): Path<u64>) -> &'static str {
    tokio::time::sleep(Duration::from_millis(ms)).await;
    "done"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn greeting_serializes_to_json() {
        let greeting = Greeting {
            hello: "world".to_string(),
            n: 1,
        };
        let json = serde_json::to_value(&greeting).unwrap();
        assert_eq!(json["hello"], "world");
        assert_eq!(json["n"], 1);
    }

    #[test]
    fn echo_header_name_is_valid() {
        let name = header::HeaderName::from_static(ECHO_METHOD_HEADER);
        assert_eq!(name.as_str(), "x-echo-method");
    }
}
