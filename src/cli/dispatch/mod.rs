use crate::cli::{
    actions::{server::Args, Action},
    commands::{authority, ARG_PORT, ARG_SESSION_TTL},
};
use anyhow::{Context, Result};
use std::time::Duration;

/// # Errors
/// Returns an error if required arguments are missing.
pub fn handler(matches: &clap::ArgMatches) -> Result<Action> {
    let string = |id: &str| -> Result<String> {
        matches
            .get_one::<String>(id)
            .cloned()
            .with_context(|| format!("missing required argument: --{id}"))
    };

    let port = matches.get_one::<u16>(ARG_PORT).copied().unwrap_or(1338);
    let upstream_timeout = matches
        .get_one::<u64>(authority::ARG_UPSTREAM_TIMEOUT)
        .copied()
        .unwrap_or(5);
    let session_ttl = matches
        .get_one::<u64>(ARG_SESSION_TTL)
        .copied()
        .unwrap_or(43_200);

    Ok(Action::Server(Args {
        port,
        authentication_host: string(authority::ARG_AUTHENTICATION_HOST)?,
        authentication_path: string(authority::ARG_AUTHENTICATION_PATH)?,
        authentication_scheme: string(authority::ARG_AUTHENTICATION_SCHEME)?,
        authorization_host: string(authority::ARG_AUTHORIZATION_HOST)?,
        authorization_path: string(authority::ARG_AUTHORIZATION_PATH)?,
        authorization_scheme: string(authority::ARG_AUTHORIZATION_SCHEME)?,
        upstream_timeout: Duration::from_secs(upstream_timeout),
        session_ttl: Duration::from_secs(session_ttl),
    }))
}
