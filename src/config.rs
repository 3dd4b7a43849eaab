use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use serde::Deserialize;

use crate::compliance::{MAX_RETENTION_DAYS, MIN_RETENTION_DAYS};
use crate::staff::MAX_TOKEN_TTL_MINUTES;

/// Application-level constants
pub const APP_NAME: &str = "Hospital";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Names the TOML file to load on top of the defaults.
pub const CONFIG_ENV: &str = "HOSPITAL_CONFIG";
const ENV_PREFIX: &str = "HOSPITAL_";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Cannot read config file {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid value for {key}: {value}")]
    InvalidValue { key: String, value: String },
}

/// Runtime settings. Every field has a default; a TOML file and
/// `HOSPITAL_*` environment variables override them in that order.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct AppConfig {
    pub bind_addr: SocketAddr,
    pub database_path: PathBuf,
    pub token_ttl_minutes: u32,
    pub rate_per_minute: u32,
    pub rate_per_hour: u32,
    pub audit_retention_days: u32,
    pub log_filter: String,
    pub bootstrap_admin_password: Option<String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8080)),
            database_path: app_data_dir().join("hospital.db"),
            token_ttl_minutes: 480,
            rate_per_minute: 100,
            rate_per_hour: 2000,
            audit_retention_days: 2555,
            log_filter: "hospital=info,hospital_lib=info,tower_http=info".into(),
            bootstrap_admin_password: None,
        }
    }
}

impl AppConfig {
    /// Defaults, then the file named by `HOSPITAL_CONFIG`, then env overrides.
    pub fn load() -> Result<Self, ConfigError> {
        let mut config = match std::env::var_os(CONFIG_ENV) {
            Some(path) => Self::from_file(Path::new(&path))?,
            None => Self::default(),
        };
        config.apply_env(|key| std::env::var(key).ok())?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values the service cannot run with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let check = |key: &str, value: u32, range: std::ops::RangeInclusive<u32>| {
            if range.contains(&value) {
                Ok(())
            } else {
                Err(ConfigError::InvalidValue {
                    key: key.into(),
                    value: format!("{value} (allowed {}..={})", range.start(), range.end()),
                })
            }
        };
        check("token_ttl_minutes", self.token_ttl_minutes, 1..=MAX_TOKEN_TTL_MINUTES)?;
        check("rate_per_minute", self.rate_per_minute, 1..=u32::MAX)?;
        check("rate_per_hour", self.rate_per_hour, 1..=u32::MAX)?;
        check(
            "audit_retention_days",
            self.audit_retention_days,
            MIN_RETENTION_DAYS..=MAX_RETENTION_DAYS,
        )
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(content)?)
    }

    /// Apply `HOSPITAL_<FIELD>` overrides. `lookup` is the environment in
    /// production and a map in tests.
    pub fn apply_env(&mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<(), ConfigError> {
        let get = |field: &str| lookup(&format!("{ENV_PREFIX}{}", field.to_uppercase()));

        if let Some(v) = get("bind_addr") {
            self.bind_addr = parse_value("bind_addr", &v)?;
        }
        if let Some(v) = get("database_path") {
            self.database_path = PathBuf::from(v);
        }
        if let Some(v) = get("token_ttl_minutes") {
            self.token_ttl_minutes = parse_value("token_ttl_minutes", &v)?;
        }
        if let Some(v) = get("rate_per_minute") {
            self.rate_per_minute = parse_value("rate_per_minute", &v)?;
        }
        if let Some(v) = get("rate_per_hour") {
            self.rate_per_hour = parse_value("rate_per_hour", &v)?;
        }
        if let Some(v) = get("audit_retention_days") {
            self.audit_retention_days = parse_value("audit_retention_days", &v)?;
        }
        if let Some(v) = get("log_filter") {
            self.log_filter = v;
        }
        if let Some(v) = get("bootstrap_admin_password") {
            self.bootstrap_admin_password = Some(v).filter(|p| !p.is_empty());
        }
        Ok(())
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidValue {
        key: format!("{ENV_PREFIX}{}", key.to_uppercase()),
        value: value.into(),
    })
}

/// Get the application data directory.
/// Falls back to the working directory when the platform has no data dir.
pub fn app_data_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(APP_NAME)
}
