//! TOML configuration loading and validation.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use tradegate::{MarketSession, OrderTerm};
use tradegate_broker::ConsumerCredentials;
use tradegate_broker::etrade::ETradeConfig;

use crate::error::{Error, Result};

/// Environment variables that override the `[credentials]` section.
pub const CONSUMER_KEY_ENV: &str = "TRADEGATE_CONSUMER_KEY";
pub const CONSUMER_SECRET_ENV: &str = "TRADEGATE_CONSUMER_SECRET";

/// Top-level configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub broker: BrokerConfig,
    #[serde(default)]
    pub credentials: CredentialsConfig,
    pub account: AccountConfig,
    #[serde(default)]
    pub orders: OrdersConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BrokerConfig {
    #[serde(default = "default_backend")]
    pub backend: String,
    #[serde(default)]
    pub sandbox: bool,
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            backend: default_backend(),
            sandbox: false,
            timeout_secs: default_timeout(),
        }
    }
}

fn default_backend() -> String {
    "etrade".into()
}
fn default_timeout() -> u64 {
    30
}

#[derive(Clone, Default, Deserialize)]
pub struct CredentialsConfig {
    #[serde(default)]
    pub consumer_key: String,
    #[serde(default)]
    pub consumer_secret: String,
}

impl std::fmt::Debug for CredentialsConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CredentialsConfig")
            .field("consumer_key", &self.consumer_key)
            .field("consumer_secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct AccountConfig {
    pub id: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OrdersConfig {
    #[serde(default = "default_term")]
    pub order_term: OrderTerm,
    #[serde(default = "default_session")]
    pub market_session: MarketSession,
    #[serde(default = "default_interval")]
    pub order_interval_ms: u64,
    #[serde(default = "default_max_orders")]
    pub max_orders_per_run: usize,
}

impl Default for OrdersConfig {
    fn default() -> Self {
        Self {
            order_term: default_term(),
            market_session: default_session(),
            order_interval_ms: default_interval(),
            max_orders_per_run: default_max_orders(),
        }
    }
}

fn default_term() -> OrderTerm {
    OrderTerm::GoodForDay
}
fn default_session() -> MarketSession {
    MarketSession::Regular
}
fn default_interval() -> u64 {
    100
}
fn default_max_orders() -> usize {
    50
}

#[derive(Debug, Clone, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_idle_ttl")]
    pub idle_ttl_secs: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_ttl_secs: default_idle_ttl(),
        }
    }
}

fn default_idle_ttl() -> u64 {
    3600
}

#[derive(Debug, Clone, Deserialize)]
pub struct LoggingConfig {
    #[serde(default = "default_log_dir")]
    pub dir: String,
    #[serde(default = "default_audit_file")]
    pub audit_file: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            dir: default_log_dir(),
            audit_file: default_audit_file(),
        }
    }
}

fn default_log_dir() -> String {
    "./logs".into()
}
fn default_audit_file() -> String {
    "audit.jsonl".into()
}

impl Config {
    /// Load config from a TOML file, then apply credential overrides from
    /// the environment.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| Error::ConfigRead {
            path: path.to_path_buf(),
            source: e,
        })?;
        let mut config: Config = toml::from_str(&contents)?;
        config.apply_env(|name| std::env::var(name).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse from a TOML string without consulting the environment.
    pub fn from_toml(toml: &str) -> Result<Self> {
        let config: Config = toml::from_str(toml)?;
        config.validate()?;
        Ok(config)
    }

    /// Override credentials with non-empty values from `lookup`.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(key) = lookup(CONSUMER_KEY_ENV).filter(|v| !v.is_empty()) {
            self.credentials.consumer_key = key;
        }
        if let Some(secret) = lookup(CONSUMER_SECRET_ENV).filter(|v| !v.is_empty()) {
            self.credentials.consumer_secret = secret;
        }
    }

    /// Validate config invariants.
    fn validate(&self) -> Result<()> {
        if self.broker.backend.trim().is_empty() {
            return Err(Error::Config("broker backend must not be empty".into()));
        }
        if self.broker.timeout_secs == 0 {
            return Err(Error::Config("timeout_secs must be > 0".into()));
        }
        if self.credentials.consumer_key.is_empty() || self.credentials.consumer_secret.is_empty()
        {
            return Err(Error::Config(format!(
                "consumer key and secret are required ([credentials] or {CONSUMER_KEY_ENV}/{CONSUMER_SECRET_ENV})"
            )));
        }
        if self.account.id.trim().is_empty() {
            return Err(Error::Config("account id must not be empty".into()));
        }
        if self.orders.max_orders_per_run == 0 {
            return Err(Error::Config("max_orders_per_run must be > 0".into()));
        }
        Ok(())
    }

    pub fn consumer(&self) -> ConsumerCredentials {
        ConsumerCredentials::new(
            &self.credentials.consumer_key,
            &self.credentials.consumer_secret,
        )
    }

    pub fn etrade(&self) -> ETradeConfig {
        ETradeConfig {
            sandbox: self.broker.sandbox,
            timeout: Duration::from_secs(self.broker.timeout_secs),
        }
    }

    pub fn idle_ttl(&self) -> Duration {
        Duration::from_secs(self.session.idle_ttl_secs)
    }

    pub fn order_interval(&self) -> Duration {
        Duration::from_millis(self.orders.order_interval_ms)
    }

    /// Full path to the audit log file.
    pub fn audit_path(&self) -> PathBuf {
        Path::new(&self.logging.dir).join(&self.logging.audit_file)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn example_toml() -> &'static str {
        r#"
[broker]
backend = "etrade"
sandbox = true
timeout_secs = 15

[credentials]
consumer_key = "ck"
consumer_secret = "cs"

[account]
id = "1234-5678"

[orders]
order_term = "GOOD_UNTIL_CANCEL"
market_session = "EXTENDED"
order_interval_ms = 250
max_orders_per_run = 20

[session]
idle_ttl_secs = 600

[logging]
dir = "./logs"
audit_file = "audit.jsonl"
"#
    }

    #[test]
    fn parse_example_config() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.broker.backend, "etrade");
        assert!(config.etrade().sandbox);
        assert_eq!(config.etrade().timeout, Duration::from_secs(15));
        assert_eq!(config.orders.order_term, OrderTerm::GoodUntilCancel);
        assert_eq!(config.orders.market_session, MarketSession::Extended);
        assert_eq!(config.order_interval(), Duration::from_millis(250));
        assert_eq!(config.orders.max_orders_per_run, 20);
        assert_eq!(config.idle_ttl(), Duration::from_secs(600));
    }

    #[test]
    fn minimal_config_uses_defaults() {
        let config = Config::from_toml(
            r#"
[credentials]
consumer_key = "ck"
consumer_secret = "cs"

[account]
id = "12345678"
"#,
        )
        .unwrap();
        assert_eq!(config.broker.backend, "etrade");
        assert!(!config.broker.sandbox);
        assert_eq!(config.broker.timeout_secs, 30);
        assert_eq!(config.orders.order_term, OrderTerm::GoodForDay);
        assert_eq!(config.orders.market_session, MarketSession::Regular);
        assert_eq!(config.orders.max_orders_per_run, 50);
        assert_eq!(config.session.idle_ttl_secs, 3600);
    }

    #[test]
    fn validate_catches_missing_credentials() {
        let toml = example_toml().replace("consumer_secret = \"cs\"", "");
        assert!(matches!(Config::from_toml(&toml), Err(Error::Config(_))));
    }

    #[test]
    fn env_overrides_credentials() {
        let toml = example_toml().replace("consumer_secret = \"cs\"", "");
        let mut config: Config = toml::from_str(&toml).unwrap();
        config.apply_env(|name| match name {
            CONSUMER_SECRET_ENV => Some("from-env".into()),
            _ => None,
        });
        assert!(config.validate().is_ok());
        assert_eq!(config.credentials.consumer_secret, "from-env");
        assert_eq!(config.credentials.consumer_key, "ck");
    }

    #[test]
    fn validate_catches_bad_term() {
        let toml = example_toml().replace("GOOD_UNTIL_CANCEL", "FOREVER");
        assert!(Config::from_toml(&toml).is_err());
    }

    #[test]
    fn validate_catches_zero_timeout() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.broker.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn validate_catches_zero_max_orders() {
        let mut config = Config::from_toml(example_toml()).unwrap();
        config.orders.max_orders_per_run = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn audit_path() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert_eq!(config.audit_path(), PathBuf::from("./logs/audit.jsonl"));
    }

    #[test]
    fn credentials_not_in_debug() {
        let config = Config::from_toml(example_toml()).unwrap();
        assert!(!format!("{config:?}").contains("\"cs\""));
    }
}
