//! Outbound calls to the authority services and classification of their
//! answers into typed verdicts.
//!
//! Classification happens here and only here; the decision engine never looks
//! at a raw status code.

use super::{
    config::{AuthorityEndpoint, AuthorityKind},
    probe::ProbeRequest,
};
use reqwest::{redirect::Policy, Client, StatusCode};
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, instrument, warn};

pub const X_AUTH_REQUEST_USER: &str = "x-auth-request-user";

#[derive(Debug, Error)]
pub enum AuthorityError {
    #[error("{authority} authority timed out: {source}")]
    Timeout {
        authority: &'static str,
        #[source]
        source: reqwest::Error,
    },
    #[error("{authority} authority unreachable: {source}")]
    Transport {
        authority: &'static str,
        #[source]
        source: reqwest::Error,
    },
}

/// Typed interpretation of one authority response.
#[derive(Debug)]
pub enum Verdict {
    /// The authority said yes. `subject` is present when the authority sent
    /// an identity header.
    Allowed { subject: Option<String> },
    /// The authority said no, or answered something it should not have.
    Denied { status: StatusCode },
    /// The authority could not be reached.
    Error(AuthorityError),
}

impl Verdict {
    #[must_use]
    pub fn is_allowed(&self) -> bool {
        matches!(self, Self::Allowed { .. })
    }
}

/// Client for one configured authority.
#[derive(Clone, Debug)]
pub struct AuthorityClient {
    client: Client,
    endpoint: AuthorityEndpoint,
}

impl AuthorityClient {
    /// # Errors
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(endpoint: AuthorityEndpoint, timeout: Duration) -> Result<Self, reqwest::Error> {
        let client = Client::builder()
            .user_agent(crate::APP_USER_AGENT)
            .timeout(timeout)
            // A redirect is an answer, not something to follow.
            .redirect(Policy::none())
            .build()?;

        Ok(Self { client, endpoint })
    }

    #[must_use]
    pub fn endpoint(&self) -> &AuthorityEndpoint {
        &self.endpoint
    }

    #[must_use]
    pub fn kind(&self) -> AuthorityKind {
        self.endpoint.kind()
    }

    /// Send `probe` once and classify the answer. No retries.
    #[instrument(skip(self, probe), fields(authority = self.kind().label(), url = %probe.url))]
    pub async fn check(&self, probe: ProbeRequest) -> Verdict {
        let kind = self.kind();
        debug!("Validating request against: {}", probe.url);

        let response = match self
            .client
            .request(probe.method, probe.url)
            .headers(probe.headers)
            .send()
            .await
        {
            Ok(response) => response,
            Err(err) if err.is_timeout() => {
                error!("{} authority timed out: {err}", kind.label());
                return Verdict::Error(AuthorityError::Timeout {
                    authority: kind.label(),
                    source: err,
                });
            }
            Err(err) => {
                error!("Error making request to {} authority: {err}", kind.label());
                return Verdict::Error(AuthorityError::Transport {
                    authority: kind.label(),
                    source: err,
                });
            }
        };

        classify(kind, response.status(), response.headers())
    }
}

/// Map a raw authority answer to a verdict.
#[must_use]
pub fn classify(
    kind: AuthorityKind,
    status: StatusCode,
    headers: &reqwest::header::HeaderMap,
) -> Verdict {
    if kind.is_success(status.as_u16()) {
        let subject = headers
            .get(X_AUTH_REQUEST_USER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty())
            .map(str::to_string);

        info!("{} validation successful", kind.label());
        return Verdict::Allowed { subject };
    }

    if status == StatusCode::UNAUTHORIZED {
        info!("{} authority rejected the request", kind.label());
    } else {
        warn!(
            "{} authority answered with unexpected status {status}, denying",
            kind.label()
        );
    }

    Verdict::Denied { status }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use reqwest::header::{HeaderMap, HeaderValue};
    use std::net::TcpListener;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn user_headers(user: &'static str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(X_AUTH_REQUEST_USER, HeaderValue::from_static(user));
        headers
    }

    #[test]
    fn authentication_accepts_accepted_with_subject() {
        let verdict = classify(
            AuthorityKind::Authentication,
            StatusCode::ACCEPTED,
            &user_headers("T3stUs3r"),
        );
        assert!(
            matches!(verdict, Verdict::Allowed { subject: Some(ref s) } if s == "T3stUs3r")
        );
    }

    #[test]
    fn authentication_allowed_without_identity_header() {
        let verdict = classify(
            AuthorityKind::Authentication,
            StatusCode::OK,
            &HeaderMap::new(),
        );
        assert!(matches!(verdict, Verdict::Allowed { subject: None }));
    }

    #[test]
    fn blank_identity_header_is_ignored() {
        let verdict = classify(
            AuthorityKind::Authentication,
            StatusCode::OK,
            &user_headers("   "),
        );
        assert!(matches!(verdict, Verdict::Allowed { subject: None }));
    }

    #[test]
    fn authorization_denies_accepted() {
        let verdict = classify(
            AuthorityKind::Authorization,
            StatusCode::ACCEPTED,
            &HeaderMap::new(),
        );
        assert!(matches!(
            verdict,
            Verdict::Denied {
                status: StatusCode::ACCEPTED
            }
        ));
    }

    #[test]
    fn unexpected_statuses_fail_closed() {
        for status in [
            StatusCode::UNAUTHORIZED,
            StatusCode::FORBIDDEN,
            StatusCode::FOUND,
            StatusCode::NO_CONTENT,
            StatusCode::INTERNAL_SERVER_ERROR,
        ] {
            let verdict = classify(AuthorityKind::Authentication, status, &HeaderMap::new());
            assert!(!verdict.is_allowed(), "{status} must not be allowed");
        }
    }

    fn client_for(kind: AuthorityKind, host: &str, path: &str) -> Result<AuthorityClient> {
        let endpoint = AuthorityEndpoint::new(kind, host, path, "http")?;
        Ok(AuthorityClient::new(endpoint, Duration::from_secs(2))?)
    }

    fn probe_for(client: &AuthorityClient) -> ProbeRequest {
        let mut headers = HeaderMap::new();
        headers.insert("cookie", HeaderValue::from_static("_oauth2_proxy=abc"));
        ProbeRequest {
            method: reqwest::Method::GET,
            url: client.endpoint().url().clone(),
            headers,
        }
    }

    #[tokio::test]
    async fn check_forwards_cookies_and_reads_subject() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/auth"))
            .and(header("cookie", "_oauth2_proxy=abc"))
            .respond_with(
                ResponseTemplate::new(202).insert_header("X-Auth-Request-User", "T3stUs3r"),
            )
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(
            AuthorityKind::Authentication,
            &server.address().to_string(),
            "/oauth2/auth",
        )?;
        let verdict = client.check(probe_for(&client)).await;

        assert!(
            matches!(verdict, Verdict::Allowed { subject: Some(ref s) } if s == "T3stUs3r")
        );
        Ok(())
    }

    #[tokio::test]
    async fn check_reports_unauthorized_as_denied() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/webauthn/auth"))
            .respond_with(ResponseTemplate::new(401))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(
            AuthorityKind::Authorization,
            &server.address().to_string(),
            "/webauthn/auth",
        )?;
        let verdict = client.check(probe_for(&client)).await;

        assert!(matches!(
            verdict,
            Verdict::Denied {
                status: StatusCode::UNAUTHORIZED
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn check_does_not_follow_redirects() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/oauth2/auth"))
            .respond_with(ResponseTemplate::new(302).insert_header("Location", "/oauth2/ok"))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/oauth2/ok"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client_for(
            AuthorityKind::Authentication,
            &server.address().to_string(),
            "/oauth2/auth",
        )?;
        let verdict = client.check(probe_for(&client)).await;

        assert!(matches!(
            verdict,
            Verdict::Denied {
                status: StatusCode::FOUND
            }
        ));
        Ok(())
    }

    #[tokio::test]
    async fn check_reports_connection_refused_as_error() -> Result<()> {
        // Reserve a port and release it so nothing is listening there.
        let address = TcpListener::bind("127.0.0.1:0")?.local_addr()?;

        let client = client_for(
            AuthorityKind::Authentication,
            &address.to_string(),
            "/oauth2/auth",
        )?;
        let verdict = client.check(probe_for(&client)).await;

        assert!(matches!(
            verdict,
            Verdict::Error(AuthorityError::Transport { .. })
        ));
        Ok(())
    }

    #[tokio::test]
    async fn check_reports_timeout_as_error() -> Result<()> {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_delay(Duration::from_secs(5)))
            .mount(&server)
            .await;

        let endpoint = AuthorityEndpoint::new(
            AuthorityKind::Authorization,
            &server.address().to_string(),
            "/webauthn/auth",
            "http",
        )?;
        let client = AuthorityClient::new(endpoint, Duration::from_millis(100))?;
        let verdict = client.check(probe_for(&client)).await;

        assert!(matches!(
            verdict,
            Verdict::Error(AuthorityError::Timeout { .. })
        ));
        Ok(())
    }
}
