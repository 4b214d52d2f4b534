use crate::gateway::config::{DEFAULT_AUTHENTICATION_PATH, DEFAULT_AUTHORIZATION_PATH};
use clap::{Arg, Command};

pub const ARG_AUTHENTICATION_HOST: &str = "authentication-host";
pub const ARG_AUTHENTICATION_PATH: &str = "authentication-path";
pub const ARG_AUTHENTICATION_SCHEME: &str = "authentication-scheme";
pub const ARG_AUTHORIZATION_HOST: &str = "authorization-host";
pub const ARG_AUTHORIZATION_PATH: &str = "authorization-path";
pub const ARG_AUTHORIZATION_SCHEME: &str = "authorization-scheme";
pub const ARG_UPSTREAM_TIMEOUT: &str = "upstream-timeout";

const SCHEMES: [&str; 2] = ["http", "https"];

#[must_use]
pub fn with_args(command: Command) -> Command {
    command
        .arg(
            Arg::new(ARG_AUTHENTICATION_HOST)
                .long(ARG_AUTHENTICATION_HOST)
                .help("Authentication authority host[:port], example: oauth2-proxy:4180")
                .env("AUTHGATE_AUTHENTICATION_HOST")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTHENTICATION_PATH)
                .long(ARG_AUTHENTICATION_PATH)
                .help("Authentication authority check path")
                .default_value(DEFAULT_AUTHENTICATION_PATH)
                .env("AUTHGATE_AUTHENTICATION_PATH"),
        )
        .arg(
            Arg::new(ARG_AUTHENTICATION_SCHEME)
                .long(ARG_AUTHENTICATION_SCHEME)
                .help("Scheme used to reach the authentication authority")
                .default_value("http")
                .env("AUTHGATE_AUTHENTICATION_SCHEME")
                .value_parser(SCHEMES),
        )
        .arg(
            Arg::new(ARG_AUTHORIZATION_HOST)
                .long(ARG_AUTHORIZATION_HOST)
                .help("Authorization authority host[:port], example: webauthn-proxy:8080")
                .env("AUTHGATE_AUTHORIZATION_HOST")
                .required(true),
        )
        .arg(
            Arg::new(ARG_AUTHORIZATION_PATH)
                .long(ARG_AUTHORIZATION_PATH)
                .help("Authorization authority check path")
                .default_value(DEFAULT_AUTHORIZATION_PATH)
                .env("AUTHGATE_AUTHORIZATION_PATH"),
        )
        .arg(
            Arg::new(ARG_AUTHORIZATION_SCHEME)
                .long(ARG_AUTHORIZATION_SCHEME)
                .help("Scheme used to reach the authorization authority")
                .default_value("http")
                .env("AUTHGATE_AUTHORIZATION_SCHEME")
                .value_parser(SCHEMES),
        )
        .arg(
            Arg::new(ARG_UPSTREAM_TIMEOUT)
                .long(ARG_UPSTREAM_TIMEOUT)
                .help("Seconds to wait for an authority before failing the request")
                .default_value("5")
                .env("AUTHGATE_UPSTREAM_TIMEOUT")
                .value_parser(clap::value_parser!(u64).range(1..)),
        )
}
