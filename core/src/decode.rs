//! Response type sniffing and body decoding.
//!
//! # Design
//! Decoding runs once, when the request completes. If the caller never set a
//! response type, the media type is taken from the MIME override, then the
//! `Content-Type` response header, then `text/plain`, and the inferred type
//! is written back to the request. A JSON body that fails to parse is not an
//! error: the type is downgraded to text and the raw text becomes the
//! response.

use std::fmt;
use std::str::FromStr;

use bytes::Bytes;
use mime::Mime;

use crate::error::XhrError;

/// The `responseType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseType {
    Empty,
    ArrayBuffer,
    Blob,
    Document,
    Json,
    Text,
}

impl ResponseType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ResponseType::Empty => "",
            ResponseType::ArrayBuffer => "arraybuffer",
            ResponseType::Blob => "blob",
            ResponseType::Document => "document",
            ResponseType::Json => "json",
            ResponseType::Text => "text",
        }
    }
}

impl FromStr for ResponseType {
    type Err = XhrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "" => Ok(ResponseType::Empty),
            "arraybuffer" => Ok(ResponseType::ArrayBuffer),
            "blob" => Ok(ResponseType::Blob),
            "document" => Ok(ResponseType::Document),
            "json" => Ok(ResponseType::Json),
            "text" => Ok(ResponseType::Text),
            other => Err(XhrError::InvalidResponseType(other.to_string())),
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A decoded response body.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Response {
    #[default]
    Null,
    Text(String),
    Json(serde_json::Value),
    ArrayBuffer(Bytes),
}

impl Response {
    pub fn is_null(&self) -> bool {
        matches!(self, Response::Null)
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Response::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Response::Json(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&Bytes> {
        match self {
            Response::ArrayBuffer(bytes) => Some(bytes),
            _ => None,
        }
    }
}

/// Infer a response type from the override and the `Content-Type` header.
pub fn sniff(override_mime: Option<&str>, content_type: Option<&str>) -> ResponseType {
    let declared = override_mime.or(content_type).unwrap_or("text/plain");
    let mime: Mime = declared.parse().unwrap_or(mime::TEXT_PLAIN);

    if mime.type_() == mime::APPLICATION && mime.subtype() == mime::JSON {
        ResponseType::Json
    } else if mime.type_() == "arraybuffer"
        || (mime.type_() == mime::APPLICATION && mime.subtype() == mime::OCTET_STREAM)
    {
        ResponseType::ArrayBuffer
    } else {
        ResponseType::Text
    }
}

/// The response type after decoding, which may differ from the requested
/// one, and the decoded body.
#[derive(Debug, Clone, PartialEq)]
pub struct Decoded {
    pub response_type: ResponseType,
    pub response: Response,
}

pub fn decode(response_type: ResponseType, text: Option<&str>, bytes: Option<&Bytes>) -> Decoded {
    let response = match response_type {
        ResponseType::Empty | ResponseType::Document | ResponseType::Text => {
            text.map_or(Response::Null, |t| Response::Text(t.to_string()))
        }
        ResponseType::Json => match text {
            Some(text) if !text.is_empty() => match serde_json::from_str(text) {
                Ok(value) => Response::Json(value),
                Err(e) => {
                    log::debug!("json body did not parse ({e}), falling back to text");
                    return Decoded {
                        response_type: ResponseType::Text,
                        response: Response::Text(text.to_string()),
                    };
                }
            },
            _ => Response::Null,
        },
        ResponseType::ArrayBuffer => bytes.map_or(Response::Null, |b| Response::ArrayBuffer(b.clone())),
        ResponseType::Blob => Response::Null,
    };
    Decoded {
        response_type,
        response,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn response_type_string_forms() {
        for s in ["", "arraybuffer", "blob", "document", "json", "text"] {
            let rt: ResponseType = s.parse().unwrap();
            assert_eq!(rt.to_string(), s);
        }
        assert!(matches!(
            "xml".parse::<ResponseType>(),
            Err(XhrError::InvalidResponseType(_))
        ));
    }

    #[test]
    fn sniff_prefers_override_over_header() {
        assert_eq!(sniff(Some("application/json"), Some("text/html")), ResponseType::Json);
        assert_eq!(sniff(Some("text/plain"), Some("application/json")), ResponseType::Text);
    }

    #[test]
    fn sniff_reads_header_with_parameters() {
        assert_eq!(
            sniff(None, Some("application/json; charset=utf-8")),
            ResponseType::Json
        );
        assert_eq!(
            sniff(None, Some("application/octet-stream")),
            ResponseType::ArrayBuffer
        );
    }

    #[test]
    fn sniff_defaults_to_text() {
        assert_eq!(sniff(None, None), ResponseType::Text);
        assert_eq!(sniff(None, Some("not a mime")), ResponseType::Text);
        assert_eq!(sniff(None, Some("application/problem+json")), ResponseType::Text);
    }

    #[test]
    fn decode_json_parses_value() {
        let decoded = decode(ResponseType::Json, Some(r#"{"a":1}"#), None);
        assert_eq!(decoded.response_type, ResponseType::Json);
        assert_eq!(decoded.response, Response::Json(json!({"a": 1})));
    }

    #[test]
    fn decode_malformed_json_downgrades_to_text() {
        let decoded = decode(ResponseType::Json, Some("{oops"), None);
        assert_eq!(decoded.response_type, ResponseType::Text);
        assert_eq!(decoded.response, Response::Text("{oops".to_string()));
    }

    #[test]
    fn decode_empty_json_is_null() {
        let decoded = decode(ResponseType::Json, Some(""), None);
        assert_eq!(decoded.response_type, ResponseType::Json);
        assert!(decoded.response.is_null());
    }

    #[test]
    fn decode_arraybuffer_uses_raw_bytes() {
        let bytes = Bytes::from_static(&[0, 159, 146, 150]);
        let decoded = decode(ResponseType::ArrayBuffer, Some("ignored"), Some(&bytes));
        assert_eq!(decoded.response, Response::ArrayBuffer(bytes));

        let missing = decode(ResponseType::ArrayBuffer, None, None);
        assert!(missing.response.is_null());
    }

    #[test]
    fn decode_text_like_types_return_raw_text() {
        for rt in [ResponseType::Empty, ResponseType::Document, ResponseType::Text] {
            let decoded = decode(rt, Some("<p>hi</p>"), None);
            assert_eq!(decoded.response.as_text(), Some("<p>hi</p>"), "{rt:?}");
            assert_eq!(decoded.response_type, rt);
        }
    }

    #[test]
    fn decode_blob_is_null() {
        let bytes = Bytes::from_static(b"x");
        assert!(decode(ResponseType::Blob, Some("x"), Some(&bytes)).response.is_null());
    }
}
