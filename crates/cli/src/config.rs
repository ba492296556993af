//! Configuration management for the CLI
//!
//! Settings come from an optional TOML file layered under `VMCOST_*`
//! environment variables. Without `--config`, `./vmcost.toml` is used when it
//! exists, else `~/.config/vmcost/config.toml`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use vmcost_lib::arm::{ArmConfig, RetryPolicy, DEFAULT_MANAGEMENT_ENDPOINT};
use vmcost_lib::collector::DEFAULT_UTILIZATION_WINDOW_DAYS;
use vmcost_lib::credential::DEFAULT_LOGIN_ENDPOINT;
use vmcost_lib::pricing::DEFAULT_PRICING_ENDPOINT;

const LOCAL_CONFIG: &str = "vmcost.toml";

/// CLI settings
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    /// Azure Resource Manager endpoint
    #[serde(default = "default_management_endpoint")]
    pub management_endpoint: String,

    /// Retail Prices API endpoint
    #[serde(default = "default_pricing_endpoint")]
    pub pricing_endpoint: String,

    /// Entra ID login endpoint for client-secret authentication
    #[serde(default = "default_login_endpoint")]
    pub login_endpoint: String,

    /// Directory receiving the report files
    #[serde(default = "default_output_dir")]
    pub output_dir: PathBuf,

    /// Wait before retrying a throttled request
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_utilization_window")]
    pub utilization_window_days: i64,

    /// Subscriptions used when none are given on the command line
    #[serde(default)]
    pub subscriptions: Vec<String>,
}

fn default_management_endpoint() -> String {
    DEFAULT_MANAGEMENT_ENDPOINT.to_string()
}

fn default_pricing_endpoint() -> String {
    DEFAULT_PRICING_ENDPOINT.to_string()
}

fn default_login_endpoint() -> String {
    DEFAULT_LOGIN_ENDPOINT.to_string()
}

fn default_output_dir() -> PathBuf {
    PathBuf::from(".")
}

fn default_retry_delay() -> u64 {
    2
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout() -> u64 {
    60
}

fn default_utilization_window() -> i64 {
    DEFAULT_UTILIZATION_WINDOW_DAYS
}

impl Settings {
    /// Load settings from the config file and environment
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();

        match explicit {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                builder = builder.add_source(config::File::from(path.to_path_buf()).required(true));
            }
            None => {
                if let Some(path) = Self::default_path() {
                    debug!(path = %path.display(), "Loading configuration if present");
                    builder = builder.add_source(config::File::from(path).required(false));
                }
            }
        }

        let config = builder
            .add_source(
                config::Environment::with_prefix("VMCOST")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("subscriptions"),
            )
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid configuration")
    }

    /// Config file used when `--config` is not given
    fn default_path() -> Option<PathBuf> {
        let local = PathBuf::from(LOCAL_CONFIG);
        if local.exists() {
            return Some(local);
        }
        dirs_next::home_dir().map(|home| home.join(".config").join("vmcost").join("config.toml"))
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Resource Manager client settings
    pub fn arm_config(&self) -> ArmConfig {
        ArmConfig {
            endpoint: self.management_endpoint.clone(),
            request_timeout: self.request_timeout(),
            retry: RetryPolicy {
                delay: Duration::from_secs(self.retry_delay_secs),
                max_retries: self.max_retries,
            },
        }
    }
}
