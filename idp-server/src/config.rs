use std::{fs, ops::RangeInclusive};

use anyhow::{Context, Result};
use clap::Parser;
use serde::Deserialize;

#[derive(Parser, Debug, Clone, Deserialize)]
#[command(name = "idp-server")]
#[command(author, version, about, long_about = None)]
pub struct AppConfig {
    #[clap(long)]
    #[arg(short = 'c')]
    #[serde(default)]
    pub config: Option<String>,
    #[clap(long, env)]
    #[arg(default_value_t = String::from("idp_server=info"))]
    #[serde(default = "default_rust_log")]
    pub rust_log: String,
    #[clap(long, env)]
    #[arg(value_parser = port_in_range,short = 'p', default_value_t = 30050)]
    #[serde(default = "default_port")]
    pub port: u16,
    /// Public base URL the IdP is reached at.
    #[clap(long, env)]
    #[arg(default_value_t = String::from("http://localhost:30050"))]
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Largest inflated SAMLRequest accepted, in bytes.
    #[clap(long, env)]
    #[arg(default_value_t = 131072)]
    #[serde(default = "default_max_inflate_size")]
    pub max_inflate_size: usize,
    /// Seconds to wait for a service provider's metadata.
    #[clap(long, env)]
    #[arg(default_value_t = 10)]
    #[serde(default = "default_metadata_timeout")]
    pub metadata_timeout: u64,
    #[clap(long, env)]
    #[arg(default_value_t = 300)]
    #[serde(default = "default_assertion_lifetime")]
    pub assertion_lifetime: i64,
    #[clap(long, env)]
    #[arg(default_value_t = 90)]
    #[serde(default = "default_max_issue_delay")]
    pub max_issue_delay: i64,
    /// Header carrying the user id asserted by the fronting proxy.
    #[clap(long, env)]
    #[arg(default_value_t = String::from("x-user-id"))]
    #[serde(default = "default_user_header")]
    pub user_header: String,
    /// Path of the PEM certificate advertised in the metadata.
    #[clap(long, env)]
    #[serde(default)]
    pub certificate: Option<String>,
    #[clap(skip)]
    #[serde(default)]
    pub service_providers: Vec<ServiceProviderConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ServiceProviderConfig {
    pub entity_id: String,
    pub acs_url: String,
    #[serde(default)]
    pub metadata_url: Option<String>,
}

impl AppConfig {
    pub fn entity_id(&self) -> String {
        format!("{}/metadata", self.endpoint.trim_end_matches('/'))
    }

    pub fn sso_url(&self) -> String {
        format!("{}/sso", self.endpoint.trim_end_matches('/'))
    }
}

fn default_rust_log() -> String {
    String::from("idp_server=info")
}

fn default_endpoint() -> String {
    String::from("http://localhost:30050")
}

fn default_port() -> u16 {
    30050
}

fn default_max_inflate_size() -> usize {
    idp_saml::codec::DEFAULT_MAX_INFLATE_SIZE
}

fn default_metadata_timeout() -> u64 {
    10
}

fn default_assertion_lifetime() -> i64 {
    300
}

fn default_max_issue_delay() -> i64 {
    90
}

fn default_user_header() -> String {
    String::from("x-user-id")
}

const PORT_RANGE: RangeInclusive<usize> = 1..=65535;

fn port_in_range(s: &str) -> Result<u16, String> {
    let port: usize = s
        .parse()
        .map_err(|_| format!("`{s}` isn't a port number"))?;
    if PORT_RANGE.contains(&port) {
        Ok(port as u16)
    } else {
        Err(format!(
            "port not in range {}-{}",
            PORT_RANGE.start(),
            PORT_RANGE.end()
        ))
    }
}

pub fn load(cfg: &str) -> Result<AppConfig> {
    let content =
        fs::read_to_string(cfg).context("could not read config file")?;
    toml::from_str(&content).context("could not parse config file")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_config_file() {
        let config: AppConfig = toml::from_str(
            r#"
endpoint = "https://idp.example.com/"
max_inflate_size = 4096

[[service_providers]]
entity_id = "https://sp.example.com/saml/metadata"
acs_url = "https://sp.example.com/saml/acs"
metadata_url = "https://sp.example.com/saml/metadata"
"#,
        )
        .unwrap();
        assert_eq!(config.port, 30050);
        assert_eq!(config.max_inflate_size, 4096);
        assert_eq!(config.metadata_timeout, 10);
        assert_eq!(config.user_header, "x-user-id");
        assert_eq!(config.entity_id(), "https://idp.example.com/metadata");
        assert_eq!(config.sso_url(), "https://idp.example.com/sso");
        assert_eq!(config.service_providers.len(), 1);
        assert_eq!(
            config.service_providers[0].acs_url,
            "https://sp.example.com/saml/acs"
        );
    }

    #[test]
    fn parse_cli_defaults() {
        let config = AppConfig::parse_from(["idp-server", "-p", "8080"]);
        assert_eq!(config.port, 8080);
        assert_eq!(config.max_inflate_size, 131072);
        assert!(config.service_providers.is_empty());
        assert!(port_in_range("0").is_err());
        assert!(port_in_range("http").is_err());
    }
}
