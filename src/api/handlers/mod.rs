pub mod auth;
pub use self::auth::auth;

pub mod register;
pub use self::register::register;

pub mod health;
pub use self::health::health;

// common response mapping for the forward-auth handlers
use crate::gateway::{authority::X_AUTH_REQUEST_USER, probe::InboundRequest, Decision};
use axum::{
    http::{
        header::{LOCATION, SET_COOKIE},
        HeaderMap, HeaderValue, StatusCode,
    },
    response::{IntoResponse, Response},
};
use std::time::Duration;
use tracing::error;

/// Map an engine decision to what the reverse proxy expects.
///
/// - allow: `202` with `X-Auth-Request-User` and a greeting
/// - deny: `401`
/// - redirect: `307` with `Location`
/// - failure: `500`, never a redirect
pub(crate) fn respond(
    decision: Decision,
    request: &InboundRequest,
    session_ttl: Duration,
) -> Response {
    match decision {
        Decision::Allow { subject, session } => {
            let mut headers = HeaderMap::new();

            let Ok(user) = HeaderValue::from_str(&subject) else {
                error!("Subject is not a valid header value");
                return StatusCode::INTERNAL_SERVER_ERROR.into_response();
            };
            headers.insert(X_AUTH_REQUEST_USER, user);

            if let Some(handle) = session {
                let secure = request.resolved_scheme() == "https";
                match handle.cookie(session_ttl, secure) {
                    Ok(cookie) => {
                        headers.insert(SET_COOKIE, cookie);
                    }
                    Err(err) => {
                        error!("Failed to build session cookie: {err}");
                        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
                    }
                }
            }

            (StatusCode::ACCEPTED, headers, format!("Hello, {subject}")).into_response()
        }
        Decision::Deny => StatusCode::UNAUTHORIZED.into_response(),
        Decision::Redirect { location } => match HeaderValue::from_str(&location) {
            Ok(location) => {
                (StatusCode::TEMPORARY_REDIRECT, [(LOCATION, location)]).into_response()
            }
            Err(err) => {
                error!("Invalid redirect location {location}: {err}");
                StatusCode::INTERNAL_SERVER_ERROR.into_response()
            }
        },
        Decision::Failure { reason } => {
            error!("Unable to reach a decision: {reason}");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::gateway::session::SessionHandle;
    use anyhow::Result;
    use axum::{body::to_bytes, http::Method};

    fn request(proto: &'static str) -> InboundRequest {
        let mut headers = HeaderMap::new();
        headers.insert("x-forwarded-proto", HeaderValue::from_static(proto));
        InboundRequest::new(Method::GET, headers)
    }

    #[tokio::test]
    async fn allow_sets_user_and_greets() -> Result<()> {
        let response = respond(
            Decision::Allow {
                subject: "T3stUs3r".to_string(),
                session: None,
            },
            &request("http"),
            Duration::from_secs(60),
        );

        assert_eq!(response.status(), StatusCode::ACCEPTED);
        assert_eq!(
            response
                .headers()
                .get(X_AUTH_REQUEST_USER)
                .and_then(|v| v.to_str().ok()),
            Some("T3stUs3r")
        );
        assert!(response.headers().get(SET_COOKIE).is_none());

        let body = to_bytes(response.into_body(), usize::MAX).await?;
        assert_eq!(String::from_utf8(body.to_vec())?, "Hello, T3stUs3r");
        Ok(())
    }

    #[test]
    fn allow_with_session_sets_secure_cookie_over_https() -> Result<()> {
        let response = respond(
            Decision::Allow {
                subject: "T3stUs3r".to_string(),
                session: Some(SessionHandle::generate()?),
            },
            &request("https"),
            Duration::from_secs(60),
        );

        let cookie = response
            .headers()
            .get(SET_COOKIE)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        assert!(cookie.starts_with("authgate_session="));
        assert!(cookie.contains("Max-Age=60"));
        assert!(cookie.ends_with("; Secure"));
        Ok(())
    }

    #[test]
    fn deny_is_unauthorized() {
        let response = respond(Decision::Deny, &request("http"), Duration::from_secs(60));
        assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn redirect_is_temporary() {
        let response = respond(
            Decision::Redirect {
                location: "http://localhost/oauth2/sign_in".to_string(),
            },
            &request("http"),
            Duration::from_secs(60),
        );
        assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(
            response
                .headers()
                .get(LOCATION)
                .and_then(|v| v.to_str().ok()),
            Some("http://localhost/oauth2/sign_in")
        );
    }

    #[test]
    fn failure_is_internal_error_without_location() {
        let response = respond(
            Decision::Failure {
                reason: "authentication authority unreachable".to_string(),
            },
            &request("http"),
            Duration::from_secs(60),
        );
        assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert!(response.headers().get(LOCATION).is_none());
    }
}
