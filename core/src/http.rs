//! HTTP request primitives: verbs, URLs and bodies.
//!
//! # Design
//! These are the plain-data inputs of a request. They are validated once, at
//! `open` / `send`, so the state machine and the transport never see a bad
//! method or an unparsable URL. All fields are owned so values can be moved
//! across the FFI boundary without lifetime concerns.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use url::Url;

use crate::error::XhrError;

/// HTTP method for a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Delete,
    Get,
    Head,
    Options,
    Patch,
    Post,
    Put,
}

impl Method {
    /// Parse a method token case-insensitively.
    ///
    /// CONNECT, TRACE and TRACK are rejected with `ForbiddenMethod`; any
    /// other unknown token is an `InvalidMethod`.
    pub fn parse(token: &str) -> Result<Method, XhrError> {
        match token.to_ascii_uppercase().as_str() {
            "DELETE" => Ok(Method::Delete),
            "GET" => Ok(Method::Get),
            "HEAD" => Ok(Method::Head),
            "OPTIONS" => Ok(Method::Options),
            "PATCH" => Ok(Method::Patch),
            "POST" => Ok(Method::Post),
            "PUT" => Ok(Method::Put),
            "CONNECT" | "TRACE" | "TRACK" => Err(XhrError::ForbiddenMethod(token.to_string())),
            _ => Err(XhrError::InvalidMethod(token.to_string())),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Method::Delete => "DELETE",
            Method::Get => "GET",
            Method::Head => "HEAD",
            Method::Options => "OPTIONS",
            Method::Patch => "PATCH",
            Method::Post => "POST",
            Method::Put => "PUT",
        }
    }

    /// GET and HEAD never carry a request body.
    pub fn allows_body(&self) -> bool {
        !matches!(self, Method::Get | Method::Head)
    }
}

impl FromStr for Method {
    type Err = XhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Method::parse(s)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A request URL split into the parts the transport layer cares about.
///
/// `raw` is the string passed to `open`, and is what gets handed to the
/// transport and reported as `responseURL`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUrl {
    pub raw: String,
    pub scheme: String,
    pub host: String,
    pub port: u16,
    pub path: String,
}

impl RequestUrl {
    pub fn parse(raw: &str) -> Result<RequestUrl, XhrError> {
        let parsed = Url::parse(raw).map_err(|e| XhrError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        let host = parsed
            .host_str()
            .filter(|h| !h.is_empty())
            .ok_or_else(|| XhrError::InvalidUrl {
                url: raw.to_string(),
                reason: "missing host".to_string(),
            })?
            .to_string();
        let scheme = parsed.scheme().to_string();
        let port = parsed
            .port()
            .unwrap_or(if scheme == "https" { 443 } else { 80 });

        Ok(RequestUrl {
            raw: raw.to_string(),
            scheme,
            host,
            port,
            path: parsed.path().to_string(),
        })
    }
}

impl fmt::Display for RequestUrl {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

/// Body passed to `send`.
///
/// Text and byte bodies reach the transport unchanged. JSON values are
/// serialized compactly.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    Text(String),
    Bytes(Bytes),
    Json(serde_json::Value),
}

impl RequestBody {
    pub fn into_bytes(self) -> Bytes {
        match self {
            RequestBody::Text(text) => Bytes::from(text),
            RequestBody::Bytes(bytes) => bytes,
            // Serializing a `Value` only fails for non-string map keys, which
            // `Value` cannot hold.
            RequestBody::Json(value) => Bytes::from(serde_json::to_vec(&value).unwrap_or_default()),
        }
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        RequestBody::Text(text.to_string())
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        RequestBody::Text(text)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        RequestBody::Bytes(Bytes::from(bytes))
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        RequestBody::Json(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn method_parse_is_case_insensitive() {
        assert_eq!(Method::parse("get").unwrap(), Method::Get);
        assert_eq!(Method::parse("Patch").unwrap(), Method::Patch);
        assert_eq!("POST".parse::<Method>().unwrap(), Method::Post);
    }

    #[test]
    fn method_parse_rejects_forbidden_verbs() {
        for token in ["CONNECT", "trace", "Track"] {
            let err = Method::parse(token).unwrap_err();
            assert!(matches!(err, XhrError::ForbiddenMethod(_)), "{token}");
        }
    }

    #[test]
    fn method_parse_rejects_unknown_verbs() {
        let err = Method::parse("FETCH").unwrap_err();
        assert_eq!(err, XhrError::InvalidMethod("FETCH".to_string()));
    }

    #[test]
    fn get_and_head_do_not_allow_body() {
        assert!(!Method::Get.allows_body());
        assert!(!Method::Head.allows_body());
        assert!(Method::Post.allows_body());
        assert!(Method::Delete.allows_body());
    }

    #[test]
    fn url_defaults_port_from_scheme() {
        let https = RequestUrl::parse("https://example.com/a/b").unwrap();
        assert_eq!(https.port, 443);
        assert_eq!(https.scheme, "https");
        assert_eq!(https.host, "example.com");
        assert_eq!(https.path, "/a/b");

        let http = RequestUrl::parse("http://example.com").unwrap();
        assert_eq!(http.port, 80);
        assert_eq!(http.path, "/");
    }

    #[test]
    fn url_keeps_explicit_port_and_raw_string() {
        let url = RequestUrl::parse("http://127.0.0.1:3000/echo?x=1").unwrap();
        assert_eq!(url.port, 3000);
        assert_eq!(url.raw, "http://127.0.0.1:3000/echo?x=1");
        assert_eq!(url.to_string(), url.raw);
    }

    #[test]
    fn url_rejects_garbage_and_hostless() {
        assert!(matches!(
            RequestUrl::parse("not a url").unwrap_err(),
            XhrError::InvalidUrl { .. }
        ));
        assert!(matches!(
            RequestUrl::parse("mailto:someone@example.com").unwrap_err(),
            XhrError::InvalidUrl { .. }
        ));
    }

    #[test]
    fn json_body_serializes_compactly() {
        let body = RequestBody::from(serde_json::json!({"a": [1, 2]}));
        assert_eq!(&body.into_bytes()[..], br#"{"a":[1,2]}"#);
    }

    #[test]
    fn text_body_is_passed_through() {
        let body = RequestBody::from("a=1&b=%20");
        assert_eq!(&body.into_bytes()[..], b"a=1&b=%20");
    }
}
