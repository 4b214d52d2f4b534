use crate::gateway::{probe::InboundRequest, session::SessionHandle, Gateway};
use axum::{
    extract::Extension,
    http::{HeaderMap, Method},
    response::IntoResponse,
};
use std::sync::Arc;
use tracing::instrument;

#[utoipa::path(
    get,
    path = "/register",
    responses(
        (status = 202, description = "Both authorities accepted the caller, session cached", body = String,
            headers(
                ("X-Auth-Request-User" = String, description = "Verified subject"),
                ("Set-Cookie" = String, description = "Session cookie")
            )),
        (status = 307, description = "Redirect to the sign-in or enrollment UI",
            headers(("Location" = String, description = "Authority UI"))),
        (status = 500, description = "An authority could not be reached")
    ),
    tag = "forward-auth"
)]
// Interactive step-up: consults both authorities and caches the outcome.
#[instrument(skip_all)]
pub async fn register(
    method: Method,
    headers: HeaderMap,
    gateway: Extension<Arc<Gateway>>,
) -> impl IntoResponse {
    let request = InboundRequest::new(method, headers);
    let handle = SessionHandle::from_headers(request.headers());

    let decision = gateway.check_and_register(&request, handle).await;

    super::respond(decision, &request, gateway.sessions().ttl())
}
