//! Effective host and scheme as seen by the caller, behind the proxy.

use axum::http::{header::HOST, HeaderMap};

pub const X_FORWARDED_HOST: &str = "x-forwarded-host";

/// Externally visible host: `X-Forwarded-Host` when present and non-empty,
/// otherwise the transport host. May be empty when neither is known.
#[must_use]
pub fn resolve_host(headers: &HeaderMap, transport_host: Option<&str>) -> String {
    first_value(headers, X_FORWARDED_HOST)
        .or_else(|| transport_host.map(str::trim).filter(|host| !host.is_empty()))
        .unwrap_or_default()
        .to_string()
}

/// Transport host of the inbound request, taken from the `Host` header.
#[must_use]
pub fn transport_host(headers: &HeaderMap) -> Option<&str> {
    headers
        .get(HOST)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|host| !host.is_empty())
}

/// Externally visible scheme, following the usual proxy headers in order of
/// precedence and falling back to `http`. Only `http` and `https` are
/// accepted; any other value is ignored.
#[must_use]
pub fn resolve_scheme(headers: &HeaderMap) -> String {
    if let Some(proto) = first_value(headers, "x-forwarded-proto")
        .or_else(|| first_value(headers, "x-forwarded-protocol"))
        .and_then(known_scheme)
    {
        return proto.to_string();
    }

    if first_value(headers, "x-forwarded-ssl").is_some_and(|ssl| ssl.eq_ignore_ascii_case("on")) {
        return "https".to_string();
    }

    first_value(headers, "x-url-scheme")
        .and_then(known_scheme)
        .unwrap_or("http")
        .to_string()
}

fn known_scheme(value: &str) -> Option<&'static str> {
    if value.eq_ignore_ascii_case("https") {
        Some("https")
    } else if value.eq_ignore_ascii_case("http") {
        Some("http")
    } else {
        None
    }
}

// Proxies chaining through each other append comma separated values.
fn first_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers
        .get(name)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.split(',').next())
        .map(str::trim)
        .filter(|value| !value.is_empty())
}
