//! Immutable gateway configuration, built once at startup.

use std::time::Duration;
use thiserror::Error;
use url::Url;

const DEFAULT_UPSTREAM_TIMEOUT_SECONDS: u64 = 5;
const DEFAULT_SESSION_TTL_SECONDS: u64 = 12 * 60 * 60;

pub const DEFAULT_AUTHENTICATION_PATH: &str = "/oauth2/auth";
pub const DEFAULT_AUTHORIZATION_PATH: &str = "/webauthn/auth";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{0} host is not set")]
    MissingHost(&'static str),
    #[error("unsupported scheme for {kind}: {scheme}")]
    UnsupportedScheme { kind: &'static str, scheme: String },
    #[error("invalid {kind} endpoint {url}: {reason}")]
    InvalidEndpoint {
        kind: &'static str,
        url: String,
        reason: String,
    },
}

/// The two authorities this gateway consults. Each has its own notion of
/// success and the two must never be conflated.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuthorityKind {
    Authentication,
    Authorization,
}

impl AuthorityKind {
    #[must_use]
    pub fn label(self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::Authorization => "authorization",
        }
    }

    /// Authentication answers 200-202 on success, authorization exactly 200.
    #[must_use]
    pub fn is_success(self, status: u16) -> bool {
        match self {
            Self::Authentication => (200..=202).contains(&status),
            Self::Authorization => status == 200,
        }
    }
}

/// Network location of one authority.
#[derive(Clone, Debug)]
pub struct AuthorityEndpoint {
    kind: AuthorityKind,
    host: String,
    path: String,
    scheme: String,
    url: Url,
}

impl AuthorityEndpoint {
    /// Validate and build an endpoint from its parts.
    ///
    /// # Errors
    /// Returns a `ConfigError` if the host is empty, the scheme is not
    /// `http`/`https`, or the parts do not form a valid URL.
    pub fn new(
        kind: AuthorityKind,
        host: &str,
        path: &str,
        scheme: &str,
    ) -> Result<Self, ConfigError> {
        let host = host.trim();
        if host.is_empty() {
            return Err(ConfigError::MissingHost(kind.label()));
        }

        let scheme = scheme.trim().to_ascii_lowercase();
        if scheme != "http" && scheme != "https" {
            return Err(ConfigError::UnsupportedScheme {
                kind: kind.label(),
                scheme,
            });
        }

        let path = if path.starts_with('/') {
            path.to_string()
        } else {
            format!("/{path}")
        };

        let raw = format!("{scheme}://{host}{path}");
        let url = Url::parse(&raw).map_err(|err| ConfigError::InvalidEndpoint {
            kind: kind.label(),
            url: raw.clone(),
            reason: err.to_string(),
        })?;

        Ok(Self {
            kind,
            host: host.to_string(),
            path,
            scheme,
            url,
        })
    }

    #[must_use]
    pub fn kind(&self) -> AuthorityKind {
        self.kind
    }

    #[must_use]
    pub fn host(&self) -> &str {
        &self.host
    }

    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    #[must_use]
    pub fn scheme(&self) -> &str {
        &self.scheme
    }

    #[must_use]
    pub fn url(&self) -> &Url {
        &self.url
    }
}

#[derive(Clone, Debug)]
pub struct GatewayConfig {
    authentication: AuthorityEndpoint,
    authorization: AuthorityEndpoint,
    upstream_timeout: Duration,
    session_ttl: Duration,
}

impl GatewayConfig {
    #[must_use]
    pub fn new(authentication: AuthorityEndpoint, authorization: AuthorityEndpoint) -> Self {
        Self {
            authentication,
            authorization,
            upstream_timeout: Duration::from_secs(DEFAULT_UPSTREAM_TIMEOUT_SECONDS),
            session_ttl: Duration::from_secs(DEFAULT_SESSION_TTL_SECONDS),
        }
    }

    #[must_use]
    pub fn with_upstream_timeout(mut self, timeout: Duration) -> Self {
        self.upstream_timeout = timeout;
        self
    }

    #[must_use]
    pub fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub fn authentication(&self) -> &AuthorityEndpoint {
        &self.authentication
    }

    #[must_use]
    pub fn authorization(&self) -> &AuthorityEndpoint {
        &self.authorization
    }

    #[must_use]
    pub fn upstream_timeout(&self) -> Duration {
        self.upstream_timeout
    }

    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        self.session_ttl
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn authentication_accepts_200_to_202() {
        let kind = AuthorityKind::Authentication;
        assert!(kind.is_success(200));
        assert!(kind.is_success(201));
        assert!(kind.is_success(202));
        assert!(!kind.is_success(203));
        assert!(!kind.is_success(204));
        assert!(!kind.is_success(401));
    }

    #[test]
    fn authorization_accepts_only_200() {
        let kind = AuthorityKind::Authorization;
        assert!(kind.is_success(200));
        assert!(!kind.is_success(201));
        assert!(!kind.is_success(202));
    }

    #[test]
    fn endpoint_builds_url() -> Result<(), ConfigError> {
        let endpoint = AuthorityEndpoint::new(
            AuthorityKind::Authentication,
            "oauth2-proxy.default.svc.cluster.local:4180",
            "oauth2/auth",
            "HTTP",
        )?;
        assert_eq!(endpoint.scheme(), "http");
        assert_eq!(endpoint.path(), "/oauth2/auth");
        assert_eq!(
            endpoint.url().as_str(),
            "http://oauth2-proxy.default.svc.cluster.local:4180/oauth2/auth"
        );
        Ok(())
    }

    #[test]
    fn endpoint_rejects_missing_host() {
        let result = AuthorityEndpoint::new(AuthorityKind::Authorization, " ", "/", "http");
        assert_eq!(
            result.map(|_| ()),
            Err(ConfigError::MissingHost("authorization"))
        );
    }

    #[test]
    fn endpoint_rejects_unknown_scheme() {
        let result =
            AuthorityEndpoint::new(AuthorityKind::Authorization, "webauthn", "/", "ftp");
        assert!(matches!(
            result,
            Err(ConfigError::UnsupportedScheme { .. })
        ));
    }

    #[test]
    fn endpoint_rejects_invalid_host() {
        let result =
            AuthorityEndpoint::new(AuthorityKind::Authentication, "bad host", "/", "http");
        assert!(matches!(result, Err(ConfigError::InvalidEndpoint { .. })));
    }
}
