//! Configuration for Chainflow.
//!
//! Settings are loaded with priority: env var > TOML file > default.
//! `./.env` and `~/.chainflow/.env` are loaded via dotenvy first, so values
//! there behave like env vars.

pub(crate) mod helpers;

use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;
use crate::settings::Settings;
use crate::task::TaskKind;

/// Deployment environment. `Local` bills every task kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeEnv {
    Local,
    Dev,
    Prod,
}

impl RuntimeEnv {
    fn parse(value: &str, key: &str) -> Result<Self, ConfigError> {
        match normalize_variant(value).as_str() {
            "local" => Ok(Self::Local),
            "dev" | "development" => Ok(Self::Dev),
            "prod" | "production" => Ok(Self::Prod),
            _ => Err(ConfigError::InvalidValue {
                key: key.to_string(),
                message: format!("expected 'local', 'dev', or 'prod', got '{value}'"),
            }),
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Local => "local",
            Self::Dev => "dev",
            Self::Prod => "prod",
        }
    }
}

fn normalize_variant(value: &str) -> String {
    value.trim().to_ascii_lowercase().replace(['-', ' '], "_")
}

/// Execution limits shared by every task invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimeConfig {
    pub env: RuntimeEnv,
    pub task_timeout: Duration,
    pub starknet_task_timeout: Duration,
    /// Delay between confirmation polls.
    pub tx_poll_interval: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            env: RuntimeEnv::Prod,
            task_timeout: Duration::from_secs(120),
            starknet_task_timeout: Duration::from_secs(600),
            tx_poll_interval: Duration::from_millis(3_000),
        }
    }
}

impl RuntimeConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let env = RuntimeEnv::parse(
            &helpers::optional_env("CHAINFLOW_ENV")?
                .unwrap_or_else(|| settings.runtime.env.clone()),
            "CHAINFLOW_ENV",
        )?;

        let task_timeout_secs = positive(
            "TASK_TIMEOUT_SECS",
            helpers::parse_optional_env("TASK_TIMEOUT_SECS", settings.runtime.task_timeout_secs)?,
        )?;
        let starknet_task_timeout_secs = positive(
            "STARKNET_TASK_TIMEOUT_SECS",
            helpers::parse_optional_env(
                "STARKNET_TASK_TIMEOUT_SECS",
                settings.runtime.starknet_task_timeout_secs,
            )?,
        )?;
        let tx_poll_interval_ms = positive(
            "TX_POLL_INTERVAL_MS",
            helpers::parse_optional_env(
                "TX_POLL_INTERVAL_MS",
                settings.runtime.tx_poll_interval_ms,
            )?,
        )?;

        Ok(Self {
            env,
            task_timeout: Duration::from_secs(task_timeout_secs),
            starknet_task_timeout: Duration::from_secs(starknet_task_timeout_secs),
            tx_poll_interval: Duration::from_millis(tx_poll_interval_ms),
        })
    }

    /// Deadline applied to one invocation of `kind`.
    pub fn timeout_for(&self, kind: TaskKind) -> Duration {
        if kind.is_starknet() {
            self.starknet_task_timeout
        } else {
            self.task_timeout
        }
    }
}

fn positive(key: &str, value: u64) -> Result<u64, ConfigError> {
    if value == 0 {
        return Err(ConfigError::InvalidValue {
            key: key.to_string(),
            message: "must be > 0".to_string(),
        });
    }
    Ok(value)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive, overridden by `RUST_LOG`.
    pub filter: String,
    pub json: bool,
}

impl LoggingConfig {
    pub(crate) fn resolve(settings: &Settings) -> Result<Self, ConfigError> {
        let format = helpers::optional_env("LOG_FORMAT")?
            .unwrap_or_else(|| settings.logging.format.clone());
        let json = match normalize_variant(&format).as_str() {
            "json" => true,
            "pretty" | "text" => false,
            _ => {
                return Err(ConfigError::InvalidValue {
                    key: "LOG_FORMAT".to_string(),
                    message: format!("expected 'pretty' or 'json', got '{format}'"),
                });
            }
        };

        Ok(Self {
            filter: settings.logging.filter.clone(),
            json,
        })
    }
}

/// Main configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub runtime: RuntimeConfig,
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from env vars and the default TOML file.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_with_toml(None)
    }

    /// Load from env with an optional TOML config file overlay.
    pub fn from_env_with_toml(toml_path: Option<&Path>) -> Result<Self, ConfigError> {
        let _ = dotenvy::dotenv();
        crate::bootstrap::load_chainflow_env();

        let mut settings = Settings::default();
        Self::apply_toml_overlay(&mut settings, toml_path)?;

        Self::build(&settings)
    }

    /// Load and merge a TOML config file into settings.
    ///
    /// If `explicit_path` is `Some`, loads from that path (errors are fatal).
    /// If `None`, tries `~/.chainflow/config.toml` (missing file is ignored).
    fn apply_toml_overlay(
        settings: &mut Settings,
        explicit_path: Option<&Path>,
    ) -> Result<(), ConfigError> {
        let path = explicit_path
            .map(PathBuf::from)
            .unwrap_or_else(Settings::default_toml_path);

        match Settings::load_toml(&path) {
            Ok(Some(toml_settings)) => {
                settings.merge_from(&toml_settings);
                tracing::debug!("Loaded TOML config from {}", path.display());
            }
            Ok(None) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Config file not found: {}",
                        path.display()
                    )));
                }
            }
            Err(e) => {
                if explicit_path.is_some() {
                    return Err(ConfigError::ParseError(format!(
                        "Failed to load config file {}: {}",
                        path.display(),
                        e
                    )));
                }
                tracing::warn!("Failed to load default config file: {}", e);
            }
        }
        Ok(())
    }

    fn build(settings: &Settings) -> Result<Self, ConfigError> {
        Ok(Self {
            runtime: RuntimeConfig::resolve(settings)?,
            logging: LoggingConfig::resolve(settings)?,
        })
    }
}
