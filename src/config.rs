//! Application configuration

use std::env;
use std::path::Path;
use std::time::Duration;

use config::builder::DefaultState;
use config::{Config, ConfigBuilder, ConfigError, Environment, File};
use serde::Deserialize;
use serde_with::serde_as;

use crate::errors::EmulatorError;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub emulator: EmulatorConfig,
    pub backend: BackendConfig,
    pub collection: CollectionConfig,
    pub retention: RetentionConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
}

/// Where new emulators appear
#[derive(Debug, Deserialize, Clone)]
pub struct EmulatorConfig {
    pub default_latitude: f64,
    pub default_longitude: f64,
    /// Maximum random offset in degrees applied to the start position
    pub start_jitter: f64,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct BackendConfig {
    pub host: String,
    pub port: u16,
    /// Full base URL; takes precedence over `host` and `port`
    pub url: Option<String>,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub timeout: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub retry_interval: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub initial_delay: Duration,
}

#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct CollectionConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub interval: Duration,
    pub batch_size: usize,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub send_interval: Duration,
}

/// How long undelivered logs are kept, per stream
#[serde_as]
#[derive(Debug, Deserialize, Clone)]
pub struct RetentionConfig {
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub gps: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub power: Duration,
    #[serde_as(as = "serde_with::DurationSeconds<u64>")]
    pub geofence: Duration,
}

#[derive(Debug, Deserialize, Clone, Default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
}

/// Flat environment variables and the keys they override
const ENV_OVERRIDES: [(&str, &str); 6] = [
    ("DEFAULT_LATITUDE", "emulator.default_latitude"),
    ("DEFAULT_LONGITUDE", "emulator.default_longitude"),
    ("API_HOST", "backend.host"),
    ("API_PORT", "backend.port"),
    ("BACKEND_URL", "backend.url"),
    ("DATABASE_URL", "database.url"),
];

impl AppConfig {
    /// Load from `config/default`, `EMULATOR__*` and the flat overrides
    pub fn load() -> Result<Self, ConfigError> {
        Self::builder(File::with_name("config/default").required(false))?
            .build()?
            .try_deserialize()
    }

    /// Load with an explicit configuration file
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        Self::builder(File::from(path).required(true))?
            .build()?
            .try_deserialize()
    }

    fn builder<S>(file: S) -> Result<ConfigBuilder<DefaultState>, ConfigError>
    where
        S: config::Source + Send + Sync + 'static,
    {
        let mut builder = Config::builder()
            .set_default("emulator.default_latitude", 37.5665)?
            .set_default("emulator.default_longitude", 126.9780)?
            .set_default("emulator.start_jitter", 0.01)?
            .set_default("backend.host", "localhost")?
            .set_default("backend.port", 8080)?
            .set_default("backend.timeout", 10)?
            .set_default("backend.retry_interval", 300)?
            .set_default("backend.initial_delay", 5)?
            .set_default("collection.interval", 1)?
            .set_default("collection.batch_size", 60)?
            .set_default("collection.send_interval", 60)?
            .set_default("retention.gps", 3600)?
            .set_default("retention.power", 86400)?
            .set_default("retention.geofence", 3600)?
            .add_source(file)
            .add_source(
                Environment::with_prefix("EMULATOR")
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );

        for (var, key) in ENV_OVERRIDES {
            builder = builder.set_override_option(key, env::var(var).ok())?;
        }

        Ok(builder)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<(), EmulatorError> {
        self.emulator.validate()?;
        self.backend.validate()?;
        self.collection.validate()?;
        Ok(())
    }
}

fn configuration_error(message: impl Into<String>) -> EmulatorError {
    EmulatorError::ConfigurationError {
        message: message.into(),
    }
}

impl EmulatorConfig {
    pub fn validate(&self) -> Result<(), EmulatorError> {
        if !(-90.0..=90.0).contains(&self.default_latitude) {
            return Err(configuration_error("Default latitude must be within [-90, 90]"));
        }
        if !(-180.0..=180.0).contains(&self.default_longitude) {
            return Err(configuration_error(
                "Default longitude must be within [-180, 180]",
            ));
        }
        if !(0.0..=1.0).contains(&self.start_jitter) {
            return Err(configuration_error("Start jitter must be within [0, 1] degrees"));
        }
        Ok(())
    }
}

impl BackendConfig {
    /// Base URL of the collection service, without a trailing slash
    pub fn base_url(&self) -> String {
        match &self.url {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => format!("http://{}:{}", self.host, self.port),
        }
    }

    pub fn validate(&self) -> Result<(), EmulatorError> {
        let host = self.url.as_deref().unwrap_or(self.host.as_str());
        if host.trim().is_empty() {
            return Err(configuration_error("Backend host cannot be empty"));
        }
        if self.timeout.is_zero() {
            return Err(configuration_error("Backend timeout must be greater than zero"));
        }
        if self.retry_interval.is_zero() {
            return Err(configuration_error("Retry interval must be greater than zero"));
        }
        Ok(())
    }
}

impl CollectionConfig {
    pub fn validate(&self) -> Result<(), EmulatorError> {
        if self.interval.is_zero() {
            return Err(configuration_error(
                "Collection interval must be greater than zero",
            ));
        }
        if self.batch_size == 0 {
            return Err(configuration_error("Batch size must be greater than zero"));
        }
        if self.send_interval.is_zero() {
            return Err(configuration_error("Send interval must be greater than zero"));
        }
        Ok(())
    }
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            gps: Duration::from_secs(3600),
            power: Duration::from_secs(86400),
            geofence: Duration::from_secs(3600),
        }
    }
}
