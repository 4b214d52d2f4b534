//! # Authgate (Forward Authentication Gateway)
//!
//! `authgate` is consulted by a reverse proxy through its "auth request"
//! mechanism on every inbound request. It does not authenticate anyone itself:
//! it asks two independent authorities and combines their answers.
//!
//! 1. **Authentication authority** (e.g. oauth2-proxy, `/oauth2/auth`):
//!    success is any of `200`, `201`, `202`, and the subject arrives in
//!    `X-Auth-Request-User`.
//! 2. **Authorization authority** (e.g. a `WebAuthn` device check,
//!    `/webauthn/auth`): success is exactly `200`.
//!
//! ## Endpoints
//!
//! - `/auth`: cheap check. Only consults the caller's cached session record,
//!   never the authorities.
//! - `/register`: interactive step-up. Checks both authorities in order,
//!   redirects to the relevant sign-in/enrollment UI when one says no, and
//!   caches the combined verdict when both say yes.
//!
//! Upstream outages surface as `500`, never as a redirect to a login UI, so the
//! proxy can tell "unreachable" apart from "rejected".

pub mod api;
pub mod cli;
pub mod gateway;

#[allow(clippy::doc_markdown, clippy::needless_raw_string_hashes)]
pub mod built_info {
    include!(concat!(env!("OUT_DIR"), "/built.rs"));
}

pub const GIT_COMMIT_HASH: &str = match built_info::GIT_COMMIT_HASH {
    Some(hash) => hash,
    None => "unknown",
};

pub const APP_USER_AGENT: &str = concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION"),);
