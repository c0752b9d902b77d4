use std::{net::Ipv4Addr, path::PathBuf, str::FromStr, time::Duration};

use clap::{Parser, command};
use serde::Deserialize;
use services::{
    execution::port::Address,
    query_manager::MULTICALL3_ADDRESS,
    request::{DEFAULT_FAST_TIMEOUT, DEFAULT_SLOW_TIMEOUT, Timeouts},
    transaction_manager::{DEFAULT_SAFE_GAS_BUFFER, DEFAULT_SAFE_GAS_MULTIPLIER},
};
use url::Url;

use crate::errors::{Error, Result};

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub execution: Upstream,
    pub beacon: Upstream,
    #[serde(default)]
    pub fallback: Fallback,
    pub app: App,
}

impl Config {
    pub fn validate(&self) -> Result<()> {
        for (name, upstream) in [("execution", &self.execution), ("beacon", &self.beacon)] {
            if upstream.fallback_url.as_ref() == Some(&upstream.primary_url) {
                return Err(Error::Other(format!(
                    "{name} fallback url must differ from its primary url"
                )));
            }
        }

        if !self.app.safe_gas_multiplier.is_finite() || self.app.safe_gas_multiplier < 1.0 {
            return Err(Error::Other(format!(
                "safe gas multiplier must be at least 1.0, got {}",
                self.app.safe_gas_multiplier
            )));
        }

        Ok(())
    }
}

/// One upstream kind, reachable through a primary and optionally a fallback endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct Upstream {
    #[serde(deserialize_with = "parse_url")]
    pub primary_url: Url,
    #[serde(default, deserialize_with = "parse_optional_url")]
    pub fallback_url: Option<Url>,
    /// Budget for ordinary calls.
    #[serde(
        default = "default_fast_timeout",
        deserialize_with = "human_readable_duration"
    )]
    pub fast_timeout: Duration,
    /// Budget for log filters, validator and committee lists.
    #[serde(
        default = "default_slow_timeout",
        deserialize_with = "human_readable_duration"
    )]
    pub slow_timeout: Duration,
}

impl Upstream {
    pub fn timeouts(&self) -> Timeouts {
        Timeouts {
            fast: self.fast_timeout,
            slow: self.slow_timeout,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct Fallback {
    /// How long a disconnected endpoint is skipped before it gets another chance.
    #[serde(
        default = "default_reconnect_delay",
        deserialize_with = "human_readable_duration"
    )]
    pub reconnect_delay: Duration,
}

impl Default for Fallback {
    fn default() -> Self {
        Self {
            reconnect_delay: default_reconnect_delay(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct App {
    /// Port used by the started server
    pub port: u16,
    /// IPv4 address on which the server will listen for connections
    pub host: Ipv4Addr,
    #[serde(default = "default_multicall_address")]
    pub multicall_address: Address,
    /// Batches kept in flight by the query manager. Defaults to half the cores.
    #[serde(default)]
    pub concurrent_call_limit: Option<usize>,
    #[serde(default = "default_safe_gas_buffer")]
    pub safe_gas_buffer: u64,
    #[serde(default = "default_safe_gas_multiplier")]
    pub safe_gas_multiplier: f64,
    /// How often both upstreams are polled for sync progress
    #[serde(
        default = "default_sync_check_interval",
        deserialize_with = "human_readable_duration"
    )]
    pub sync_check_interval: Duration,
    /// Deadline for the upstream calls made while serving one API request
    #[serde(
        default = "default_request_timeout",
        deserialize_with = "human_readable_duration"
    )]
    pub request_timeout: Duration,
    /// Etherscan gas tracker endpoint, including the api key. `/gas` is disabled without it.
    #[serde(default, deserialize_with = "parse_optional_url")]
    pub gas_oracle_url: Option<Url>,
}

fn default_fast_timeout() -> Duration {
    DEFAULT_FAST_TIMEOUT
}

fn default_slow_timeout() -> Duration {
    DEFAULT_SLOW_TIMEOUT
}

fn default_reconnect_delay() -> Duration {
    Duration::from_secs(60)
}

fn default_multicall_address() -> Address {
    MULTICALL3_ADDRESS
}

fn default_safe_gas_buffer() -> u64 {
    DEFAULT_SAFE_GAS_BUFFER
}

fn default_safe_gas_multiplier() -> f64 {
    DEFAULT_SAFE_GAS_MULTIPLIER
}

fn default_sync_check_interval() -> Duration {
    Duration::from_secs(12)
}

fn default_request_timeout() -> Duration {
    Duration::from_secs(10)
}

fn parse_url<'de, D>(deserializer: D) -> std::result::Result<Url, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let url_str: String = Deserialize::deserialize(deserializer)?;
    Url::from_str(&url_str).map_err(|e| {
        let msg = format!("Failed to parse URL '{url_str}': {e};");
        serde::de::Error::custom(msg)
    })
}

fn parse_optional_url<'de, D>(deserializer: D) -> std::result::Result<Option<Url>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let url_str: Option<String> = Deserialize::deserialize(deserializer)?;
    match url_str.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(url_str) => Url::from_str(url_str).map(Some).map_err(|e| {
            let msg = format!("Failed to parse URL '{url_str}': {e};");
            serde::de::Error::custom(msg)
        }),
    }
}

fn human_readable_duration<'de, D>(deserializer: D) -> std::result::Result<Duration, D::Error>
where
    D: serde::Deserializer<'de>,
{
    let duration_str: String = Deserialize::deserialize(deserializer)?;
    humantime::parse_duration(&duration_str).map_err(|e| {
        let msg = format!("Failed to parse duration '{duration_str}': {e};");
        serde::de::Error::custom(msg)
    })
}

#[derive(Parser)]
#[command(
    name = "upstream-node",
    version,
    about,
    propagate_version = true,
    arg_required_else_help(true)
)]
struct Cli {
    #[arg(value_name = "FILE", help = "Path to the configuration file")]
    config_path: PathBuf,
}

pub fn parse() -> Result<Config> {
    let cli = Cli::parse();

    load(
        config::File::from(cli.config_path),
        config::Environment::with_prefix("UPSTREAM").separator("__"),
    )
}

fn load<S>(file: S, env: config::Environment) -> Result<Config>
where
    S: config::Source + Send + Sync + 'static,
{
    let config: Config = config::Config::builder()
        .add_source(file)
        .add_source(env)
        .build()?
        .try_deserialize()?;

    config.validate()?;

    Ok(config)
}
