//! Verb to transport-constructor mapping.
//!
//! GET and DELETE use the host's dedicated constructors. PUT and POST both go
//! through the raw-body constructor so the host never re-encodes the body;
//! POST then has its method forced back. Everything else uses the generic
//! constructor.

use bytes::Bytes;

use crate::http::Method;
use crate::transport::{TransportFactory, TransportHandle};

/// Construct the transport for `method` and apply the request headers.
pub fn build_transport(
    factory: &dyn TransportFactory,
    method: Method,
    url: &str,
    body: Option<Bytes>,
    headers: &[(String, String)],
) -> TransportHandle {
    let body = if method.allows_body() { body } else { None };

    let mut transport = match method {
        Method::Get => factory.get(url),
        Method::Delete => factory.delete(url),
        Method::Put => factory.raw_body(url, body.unwrap_or_default()),
        Method::Post => {
            let mut transport = factory.raw_body(url, body.unwrap_or_default());
            transport.set_method(Method::Post);
            transport
        }
        other => factory.custom(url, other, body),
    };
    log::debug!("built {method} transport for {url}");

    for (name, value) in headers {
        transport.set_header(name, value);
    }
    TransportHandle::new(transport)
}
