use std::fmt;

use config::{Config, ConfigError, Environment};
use serde::Deserialize;

/// Deployment environment, echoed by the root endpoint.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum EnvironmentName {
    #[default]
    Development,
    Ci,
    Staging,
    Production,
}

impl fmt::Display for EnvironmentName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Development => "DEVELOPMENT",
            Self::Ci => "CI",
            Self::Staging => "STAGING",
            Self::Production => "PRODUCTION",
        };
        f.write_str(name)
    }
}

/// Application settings, loaded once at startup and passed into each
/// component's constructor. Env var names are the uppercased field names.
#[derive(Clone, Debug, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub environment: EnvironmentName,
    /// Topic that client messages are forwarded to and that the command
    /// queue subscribes to.
    pub sns_incoming_topic_arn: String,
    /// Name for the durable command queue. Generated when absent.
    #[serde(default)]
    pub sqs_command_queue_name: Option<String>,
    pub aws_region: String,
    /// Custom broker endpoint for local/testing setups. None targets AWS.
    #[serde(default)]
    pub aws_endpoint_url: Option<String>,
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

fn default_host() -> String {
    "127.0.0.1".into()
}

fn default_port() -> u16 {
    8000
}

fn default_log_level() -> String {
    "info".into()
}

impl Settings {
    /// Load settings from the process environment. `.env` files are the
    /// caller's concern (the binary loads one before calling this).
    pub fn load() -> Result<Self, ConfigError> {
        let cfg = Config::builder()
            .add_source(Environment::default())
            .build()?;
        cfg.try_deserialize()
    }
}
