use crate::{
    api,
    cli::telemetry,
    gateway::{
        config::{AuthorityEndpoint, AuthorityKind, GatewayConfig},
        session::MemorySessionStore,
        Gateway,
    },
};
use anyhow::{Context, Result};
use std::{sync::Arc, time::Duration};
use tracing::info;

#[derive(Debug)]
pub struct Args {
    pub port: u16,
    pub authentication_host: String,
    pub authentication_path: String,
    pub authentication_scheme: String,
    pub authorization_host: String,
    pub authorization_path: String,
    pub authorization_scheme: String,
    pub upstream_timeout: Duration,
    pub session_ttl: Duration,
}

impl Args {
    /// # Errors
    /// Returns an error if either authority endpoint is invalid.
    pub fn gateway_config(&self) -> Result<GatewayConfig> {
        let authentication = AuthorityEndpoint::new(
            AuthorityKind::Authentication,
            &self.authentication_host,
            &self.authentication_path,
            &self.authentication_scheme,
        )
        .context("invalid authentication authority")?;

        let authorization = AuthorityEndpoint::new(
            AuthorityKind::Authorization,
            &self.authorization_host,
            &self.authorization_path,
            &self.authorization_scheme,
        )
        .context("invalid authorization authority")?;

        Ok(GatewayConfig::new(authentication, authorization)
            .with_upstream_timeout(self.upstream_timeout)
            .with_session_ttl(self.session_ttl))
    }
}

/// Execute the server action.
/// # Errors
/// Returns an error if the configuration is invalid or the server fails to start.
pub async fn execute(args: Args) -> Result<()> {
    let config = args.gateway_config()?;

    log_startup(args.port, &config);

    let gateway = Gateway::new(&config, Arc::new(MemorySessionStore::new()))
        .context("failed to build authority clients")?;

    let result = api::new(args.port, Arc::new(gateway)).await;

    telemetry::shutdown_tracer();

    result
}

fn log_startup(port: u16, config: &GatewayConfig) {
    let entries = [
        ("listen", format!("tcp:{port}")),
        ("authentication", config.authentication().url().to_string()),
        ("authorization", config.authorization().url().to_string()),
        (
            "upstream_timeout",
            format!("{}s", config.upstream_timeout().as_secs()),
        ),
        ("session_ttl", format!("{}s", config.session_ttl().as_secs())),
        ("session_store", "memory".to_string()),
    ];
    log_entries("Startup configuration", &entries);
}

fn log_entries(title: &str, entries: &[(&str, String)]) {
    let max_key_len = entries.iter().map(|(key, _)| key.len()).max().unwrap_or(0);
    let mut message = format!("{}\n\n{title}:", banner());
    for (key, value) in entries {
        let padding = " ".repeat(max_key_len.saturating_sub(key.len()));
        let _ =
            std::fmt::Write::write_fmt(&mut message, format_args!("\n  {key}:{padding} {value}"));
    }
    info!("{message}");
}

fn banner() -> String {
    BANNER.replace(
        "{VERSION}",
        &format!(
            " - {} - {}",
            env!("CARGO_PKG_VERSION"),
            short_commit(crate::GIT_COMMIT_HASH)
        ),
    )
}

fn short_commit(hash: &str) -> String {
    let trimmed = hash.trim();
    trimmed.get(..7).unwrap_or(trimmed).to_string()
}

const BANNER: &str = r"
    _____
   | ___ |
   ||   ||   A U T H G A T E {VERSION}
   ||___||
   |  _  |
   |_____|";
