//! Cache configuration: defaults, environment variables, and the
//! process-property fallback layer.
//!
//! Recognized environment variables:
//! - `HOIST_CACHE`: cache root directory
//! - `HOIST_TTL`: freshness window for changing artifacts (`24h`, `30min`, ...)
//! - `HOIST_MODE`: cache policy tokens, comma- or space-separated
//! - `HOIST_CREDENTIALS`: inline credentials or a file path
//!
//! Process properties with the same names (lowercased, dotted:
//! `hoist.cache`, `hoist.ttl`, ...) are consulted when the environment
//! variable is unset.

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use hoist_util::errors::HoistError;

use crate::credentials::{self, Credential};
use crate::policy::{self, CachePolicy};

pub const ENV_CACHE: &str = "HOIST_CACHE";
pub const ENV_TTL: &str = "HOIST_TTL";
pub const ENV_MODE: &str = "HOIST_MODE";
pub const ENV_CREDENTIALS: &str = "HOIST_CREDENTIALS";

/// Everything the cache needs to know, gathered before construction.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub root: PathBuf,
    pub policies: Vec<CachePolicy>,
    pub ttl: Duration,
    /// Size of the download worker pool.
    pub parallel: usize,
    /// Retries for transport errors and HTTP 5xx.
    pub retry_count: u32,
    /// Separate retry budget for TLS handshake failures.
    pub ssl_retry_count: u32,
    pub max_redirections: u32,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    /// Wall-clock bound around one fetch including all its retries.
    pub request_timeout: Option<Duration>,
    pub credentials: Vec<Credential>,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            policies: policy::default_policies(),
            ttl: Duration::from_secs(24 * 60 * 60),
            parallel: 6,
            retry_count: 1,
            ssl_retry_count: 3,
            max_redirections: 20,
            connect_timeout: Duration::from_secs(10),
            read_timeout: Duration::from_secs(60),
            request_timeout: None,
            credentials: Vec::new(),
        }
    }
}

impl CacheConfig {
    /// Build a configuration from the environment.
    pub fn from_env() -> miette::Result<Self> {
        Self::from_env_with(&BTreeMap::new())
    }

    /// Build a configuration from the environment, falling back to
    /// process properties (`hoist.cache`, `hoist.ttl`, ...) for unset
    /// variables.
    pub fn from_env_with(properties: &BTreeMap<String, String>) -> miette::Result<Self> {
        let mut config = Self::default();

        if let Some(root) = lookup(ENV_CACHE, properties) {
            config.root = PathBuf::from(root);
        }
        if let Some(ttl) = lookup(ENV_TTL, properties) {
            config.ttl = parse_duration(&ttl)?;
        }
        if let Some(mode) = lookup(ENV_MODE, properties) {
            config.policies = policy::parse_mode(&mode)?;
        }
        if let Some(creds) = lookup(ENV_CREDENTIALS, properties) {
            config.credentials = credentials::load_credentials(&creds)?;
        }

        Ok(config)
    }
}

fn lookup(env_key: &str, properties: &BTreeMap<String, String>) -> Option<String> {
    if let Ok(value) = std::env::var(env_key) {
        if !value.is_empty() {
            return Some(value);
        }
    }
    let property_key = env_key.to_ascii_lowercase().replace('_', ".");
    properties.get(&property_key).cloned()
}

fn default_root() -> PathBuf {
    if let Some(home) = std::env::var_os("HOME") {
        PathBuf::from(home).join(".cache").join("hoist")
    } else {
        PathBuf::from(".hoist-cache")
    }
}

/// Parse durations like `24h`, `30min`, `90s`, `7d`, or a bare number of
/// seconds.
pub fn parse_duration(input: &str) -> miette::Result<Duration> {
    let s = input.trim();
    let split = s.find(|c: char| !c.is_ascii_digit()).unwrap_or(s.len());
    let (number, unit) = s.split_at(split);
    let value: u64 = number.parse().map_err(|_| HoistError::Config {
        message: format!("invalid duration {input:?}"),
    })?;
    let seconds = match unit.trim() {
        "" | "s" | "sec" | "seconds" => value,
        "min" | "m" | "minutes" => value * 60,
        "h" | "hours" => value * 60 * 60,
        "d" | "days" => value * 24 * 60 * 60,
        other => {
            return Err(HoistError::Config {
                message: format!("unknown duration unit {other:?} in {input:?}"),
            }
            .into());
        }
    };
    Ok(Duration::from_secs(seconds))
}
