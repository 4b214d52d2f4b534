//! Rewrite an inbound forward-auth request into a probe for one authority.

use super::{config::AuthorityEndpoint, host};
use axum::http::{
    header::{
        CONNECTION, CONTENT_LENGTH, HOST, PROXY_AUTHORIZATION, TE, TRAILER, TRANSFER_ENCODING,
        UPGRADE,
    },
    HeaderMap, HeaderName, HeaderValue, Method,
};
use url::Url;

/// What the gateway keeps of the request the proxy sent it.
#[derive(Clone, Debug)]
pub struct InboundRequest {
    method: Method,
    headers: HeaderMap,
}

impl InboundRequest {
    #[must_use]
    pub fn new(method: Method, headers: HeaderMap) -> Self {
        Self { method, headers }
    }

    #[must_use]
    pub fn method(&self) -> &Method {
        &self.method
    }

    #[must_use]
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Host the caller actually used, see [`host::resolve_host`].
    #[must_use]
    pub fn resolved_host(&self) -> String {
        host::resolve_host(&self.headers, host::transport_host(&self.headers))
    }

    #[must_use]
    pub fn resolved_scheme(&self) -> String {
        host::resolve_scheme(&self.headers)
    }
}

/// A copy of the inbound request aimed at one authority.
#[derive(Clone, Debug)]
pub struct ProbeRequest {
    pub method: Method,
    pub url: Url,
    pub headers: HeaderMap,
}

/// Build the probe for `endpoint`.
///
/// Cookies and forwarded identity headers are carried over so the authority
/// can recognize the caller. The target is always rebuilt from the endpoint,
/// never from the inbound request line.
#[must_use]
pub fn build(
    inbound: &InboundRequest,
    endpoint: &AuthorityEndpoint,
    resolved_host: &str,
) -> ProbeRequest {
    let mut headers = inbound.headers().clone();

    // The outbound client derives Host from the endpoint URL.
    headers.remove(HOST);
    for name in hop_by_hop() {
        headers.remove(name);
    }

    if !resolved_host.is_empty() {
        if let Ok(value) = HeaderValue::from_str(resolved_host) {
            headers.insert(HeaderName::from_static(host::X_FORWARDED_HOST), value);
        }
    }

    ProbeRequest {
        method: inbound.method().clone(),
        url: endpoint.url().clone(),
        headers,
    }
}

fn hop_by_hop() -> [HeaderName; 9] {
    [
        CONNECTION,
        HeaderName::from_static("keep-alive"),
        HeaderName::from_static("proxy-connection"),
        PROXY_AUTHORIZATION,
        TE,
        TRAILER,
        TRANSFER_ENCODING,
        UPGRADE,
        CONTENT_LENGTH,
    ]
}
