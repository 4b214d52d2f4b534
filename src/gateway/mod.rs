//! Decision engine.
//!
//! Per request the engine walks a small state machine:
//!
//! ```text
//! Start -> AuthenticationPending -> AuthenticationFailed        (redirect to sign-in)
//!                                -> AuthenticationOk
//!                                   -> AuthorizationPending -> AuthorizationFailed (redirect to enrollment)
//!                                                           -> AuthorizationOk     (persist + allow)
//! ```
//!
//! Either pending state can also exit with an error when the authority is
//! unreachable. Errors never turn into redirects: sending a caller to a login
//! UI during an outage would only loop.

pub mod authority;
pub mod config;
pub mod host;
pub mod probe;
pub mod session;

use self::{
    authority::{AuthorityClient, Verdict},
    config::GatewayConfig,
    probe::InboundRequest,
    session::{SessionAdapter, SessionHandle, SessionRecord, SessionStore},
};
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Outcome of one decision, mapped to an HTTP response by the API layer.
#[derive(Debug)]
pub enum Decision {
    /// Let the request through. `session` is set when a record was just
    /// persisted under that handle and the caller needs the cookie.
    Allow {
        subject: String,
        session: Option<SessionHandle>,
    },
    /// Reject without a way forward (cheap check only).
    Deny,
    /// Send the caller to an authority UI.
    Redirect { location: String },
    /// An authority could not be consulted, or answered inconsistently.
    Failure { reason: String },
}

pub struct Gateway {
    authentication: AuthorityClient,
    authorization: AuthorityClient,
    sessions: SessionAdapter,
}

impl Gateway {
    /// # Errors
    /// Returns an error if an outbound HTTP client cannot be built.
    pub fn new(
        config: &GatewayConfig,
        store: Arc<dyn SessionStore>,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            authentication: AuthorityClient::new(
                config.authentication().clone(),
                config.upstream_timeout(),
            )?,
            authorization: AuthorityClient::new(
                config.authorization().clone(),
                config.upstream_timeout(),
            )?,
            sessions: SessionAdapter::new(store, config.session_ttl()),
        })
    }

    #[must_use]
    pub fn sessions(&self) -> &SessionAdapter {
        &self.sessions
    }

    /// Cheap check: answer from the cached record only, never calling out.
    #[instrument(skip_all)]
    pub fn check_only(&self, request: &InboundRequest, handle: Option<&SessionHandle>) -> Decision {
        let record = handle.and_then(|handle| self.sessions.load(handle));

        match record {
            Some(record) if record.is_complete() => {
                debug!("Cached session for {}", record.subject);
                Decision::Allow {
                    subject: record.subject,
                    session: None,
                }
            }
            _ => {
                debug!(
                    "No valid session for host {}, denying",
                    request.resolved_host()
                );
                Decision::Deny
            }
        }
    }

    /// Interactive step-up: check both authorities in order and persist the
    /// combined verdict when both agree.
    #[instrument(skip_all)]
    pub async fn check_and_register(
        &self,
        request: &InboundRequest,
        handle: Option<SessionHandle>,
    ) -> Decision {
        let host = request.resolved_host();
        let scheme = request.resolved_scheme();
        if host.is_empty() {
            warn!("Neither X-Forwarded-Host nor Host is set, redirects will be relative to an empty host");
        }

        // AuthenticationPending
        let probe = probe::build(request, self.authentication.endpoint(), &host);
        let subject = match self.authentication.check(probe).await {
            Verdict::Allowed {
                subject: Some(subject),
            } => subject,
            Verdict::Allowed { subject: None } => {
                error!("Authentication authority accepted the request without an identity header");
                return Decision::Failure {
                    reason: "authentication authority returned no subject".to_string(),
                };
            }
            Verdict::Denied { status } => {
                info!("Missing authentication ({status}), redirecting to sign in");
                return Decision::Redirect {
                    location: sign_in_url(&scheme, &host),
                };
            }
            Verdict::Error(err) => {
                return Decision::Failure {
                    reason: err.to_string(),
                };
            }
        };

        // AuthorizationPending
        let probe = probe::build(request, self.authorization.endpoint(), &host);
        match self.authorization.check(probe).await {
            Verdict::Allowed { .. } => {}
            Verdict::Denied { status } => {
                info!("Missing authorization for {subject} ({status}), redirecting to enrollment");
                return Decision::Redirect {
                    location: enrollment_url(&scheme, &host, &subject),
                };
            }
            Verdict::Error(err) => {
                return Decision::Failure {
                    reason: err.to_string(),
                };
            }
        }

        // AuthorizationOk: always issue a fresh handle, never the one the caller sent.
        if let Some(previous) = &handle {
            self.sessions.discard(previous);
        }
        let handle = match SessionHandle::generate() {
            Ok(handle) => handle,
            Err(err) => {
                error!("Failed to create session: {err}");
                return Decision::Failure {
                    reason: err.to_string(),
                };
            }
        };

        let record = SessionRecord::verified(subject);
        if let Err(err) = self.sessions.save(&handle, &record) {
            error!("Failed to persist session: {err}");
            return Decision::Failure {
                reason: err.to_string(),
            };
        }

        info!("Authentication and authorization successful for {}", record.subject);
        Decision::Allow {
            subject: record.subject,
            session: Some(handle),
        }
    }
}

/// Sign-in UI of the authentication authority.
#[must_use]
pub fn sign_in_url(scheme: &str, host: &str) -> String {
    format!("{scheme}://{host}/oauth2/sign_in")
}

/// Login/enrollment UI of the authorization authority, returning to the
/// caller's host afterwards.
#[must_use]
pub fn enrollment_url(scheme: &str, host: &str, subject: &str) -> String {
    format!("{scheme}://{host}/webauthn/login?redirect_url={scheme}://{host}&default_username={subject}")
}
