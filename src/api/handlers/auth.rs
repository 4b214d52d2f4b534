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
    path = "/auth",
    responses(
        (status = 202, description = "Cached session is valid", body = String,
            headers(("X-Auth-Request-User" = String, description = "Verified subject"))),
        (status = 401, description = "No valid session")
    ),
    tag = "forward-auth"
)]
// Cheap path hit by the proxy on every request: session cache only.
#[instrument(skip_all)]
pub async fn auth(
    method: Method,
    headers: HeaderMap,
    gateway: Extension<Arc<Gateway>>,
) -> impl IntoResponse {
    let request = InboundRequest::new(method, headers);
    let handle = SessionHandle::from_headers(request.headers());

    let decision = gateway.check_only(&request, handle.as_ref());

    super::respond(decision, &request, gateway.sessions().ttl())
}
