use config::{Config, Environment, File};
use serde::Deserialize;

use crate::connection::ConnectionConfig;
use crate::error::Result;

/// File name (without extension) looked up in the working directory
pub const SETTINGS_FILE: &str = "rabbitmesh-rpc";
/// Environment prefix, e.g. `RABBITMESH_RPC__TEMPLATE__REPLY_TIMEOUT_MS=2000`
pub const ENV_PREFIX: &str = "RABBITMESH_RPC";

/// Template defaults applied by the AMQP transport
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct TemplateConfig {
    /// Exchange used when a call resolves no exchange
    pub default_exchange: String,
    /// Routing key used when a call resolves no routing key
    pub default_routing_key: String,
    /// How long a request-reply call waits for its reply
    pub reply_timeout_ms: u64,
    /// Prefix of the per-transport exclusive reply queue
    pub reply_queue_prefix: String,
}

impl Default for TemplateConfig {
    fn default() -> Self {
        Self {
            default_exchange: String::new(),
            default_routing_key: String::new(),
            reply_timeout_ms: 5_000,
            reply_queue_prefix: "rabbitmesh-rpc.replies".to_string(),
        }
    }
}

/// Runtime settings of the RPC client
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct RpcSettings {
    pub connection: ConnectionConfig,
    pub template: TemplateConfig,
}

impl RpcSettings {
    /// Load settings from `rabbitmesh-rpc.toml` (optional) and the environment
    pub fn load() -> Result<Self> {
        Self::from_config(&Self::load_config()?)
    }

    /// Raw configuration behind [`RpcSettings::load`]
    ///
    /// The same `Config` can back placeholder resolution, so `${...}` values in
    /// client declarations see the file and environment as well.
    pub fn load_config() -> Result<Config> {
        let config = Config::builder()
            .add_source(File::with_name(SETTINGS_FILE).required(false))
            .add_source(Environment::with_prefix(ENV_PREFIX).separator("__"))
            .build()?;
        Ok(config)
    }

    pub fn from_config(config: &Config) -> Result<Self> {
        Ok(config.clone().try_deserialize()?)
    }
}
