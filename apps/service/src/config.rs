use std::collections::{BTreeMap, HashSet};
use std::time::Duration;
use std::{env, fmt, fs, io, path};

use serde::{Deserialize, Serialize};

use crate::monitoring::validation::{ValidationError, validate_service};

pub const DEFAULT_INTERVAL: Duration = Duration::from_secs(30);
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(5);
pub const DEFAULT_EXPECTED_STATUS: u16 = 200;
pub const DEFAULT_STORAGE_PATH: &str = "servprobe.db";
pub const DEFAULT_CONTAINER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("reading config {}: {source}", .path.display())]
    ReadFailed {
        path: path::PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("parsing config {}: {source}", .path.display())]
    ParseFailed {
        path: path::PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("parsing config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("no config path available: set XDG_CONFIG_HOME or HOME, or pass --config")]
    ConfigPathUnavailable,
    #[error("at least one service must be configured")]
    NoServices,
    #[error("service[{index}]: name is required")]
    MissingName { index: usize },
    #[error("duplicate service name {0:?}")]
    DuplicateName(String),
    #[error("service {name:?}: {source}")]
    InvalidService {
        name: String,
        #[source]
        source: ValidationError,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub container: ContainerConfig,
    #[serde(default)]
    pub alerts: AlertsConfig,
    #[serde(default)]
    pub services: Vec<ServiceConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_storage_path")]
    pub path: path::PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContainerConfig {
    /// Control socket of the container runtime
    #[serde(default = "default_container_socket")]
    pub socket: path::PathBuf,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AlertsConfig {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub webhook: Option<WebhookConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WebhookConfig {
    #[serde(default)]
    pub url: String,
    /// Minimum time between two alerts for the same service
    #[serde(default, with = "humantime_duration")]
    pub cooldown: Duration,
}

/// One monitored service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfig {
    #[serde(default)]
    pub name: String,
    /// Checker type: http, tcp, ping or container
    #[serde(rename = "type", default)]
    pub check_type: String,
    #[serde(default)]
    pub target: String,
    #[serde(default = "default_interval", with = "humantime_duration")]
    pub interval: Duration,
    #[serde(default = "default_timeout", with = "humantime_duration")]
    pub timeout: Duration,
    /// Status code an HTTP check must see to report the service up
    #[serde(default = "default_expected_status")]
    pub expected_status: u16,
    /// Extra request headers for HTTP checks
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub headers: BTreeMap<String, String>,
}

impl ServiceConfig {
    /// Create a service with default interval, timeout and expected status
    pub fn new(name: impl Into<String>, check_type: impl Into<String>, target: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            check_type: check_type.into(),
            target: target.into(),
            interval: DEFAULT_INTERVAL,
            timeout: DEFAULT_TIMEOUT,
            expected_status: DEFAULT_EXPECTED_STATUS,
            headers: BTreeMap::new(),
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_expected_status(mut self, expected_status: u16) -> Self {
        self.expected_status = expected_status;
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }
}

fn default_interval() -> Duration {
    DEFAULT_INTERVAL
}

fn default_timeout() -> Duration {
    DEFAULT_TIMEOUT
}

fn default_expected_status() -> u16 {
    DEFAULT_EXPECTED_STATUS
}

fn default_storage_path() -> path::PathBuf {
    DEFAULT_STORAGE_PATH.into()
}

fn default_container_socket() -> path::PathBuf {
    DEFAULT_CONTAINER_SOCKET.into()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { path: default_storage_path() }
    }
}

impl Default for ContainerConfig {
    fn default() -> Self {
        Self { socket: default_container_socket() }
    }
}

/// Durations written the way people type them: `30s`, `1m 30s`, `250ms`
mod humantime_duration {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*duration).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(raw.trim()).map_err(serde::de::Error::custom)
    }
}

/// Used to ensure we are actually reading a toml file
fn normalize_toml_path(path: &path::Path) -> path::PathBuf {
    let mut path = path.to_path_buf();
    if path.extension().map(|ext| ext != "toml").unwrap_or(true) {
        path.set_extension("toml");
    }
    path
}

/// Get default config path ($XDG_CONFIG_HOME/servprobe/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("servprobe/config.toml"))
}

impl fmt::Display for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let write_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str, value: &dyn fmt::Display| {
                writeln!(f, "  {:indent$}{}: {}", "", label, value, indent = level * 2)
            }
        };
        let write_title_indented = |level: usize| {
            move |f: &mut fmt::Formatter<'_>, label: &str| {
                writeln!(f, "{:indent$}{}", "", label, indent = level * 2)
            }
        };

        let write_title_1 = write_title_indented(1);
        let write_title_2 = write_title_indented(2);
        let write_1 = write_indented(1);
        let write_2 = write_indented(2);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Storage")?;
        write_1(f, "Path", &self.storage.path.display())?;

        write_title_1(f, "Container Runtime")?;
        write_1(f, "Socket", &self.container.socket.display())?;

        write_title_1(f, "Alerts")?;
        match self.webhook() {
            Some(webhook) => {
                write_1(f, "Webhook", &webhook.url)?;
                write_1(f, "Cooldown", &humantime::format_duration(webhook.cooldown))?;
            }
            None => write_1(f, "Webhook", &"disabled")?,
        }

        write_title_1(f, "Services")?;
        for service in &self.services {
            write_title_2(f, &service.name)?;
            write_2(f, "Type", &service.check_type)?;
            write_2(f, "Target", &service.target)?;
            write_2(f, "Interval", &humantime::format_duration(service.interval))?;
            write_2(f, "Timeout", &humantime::format_duration(service.timeout))?;
            if service.check_type == "http" {
                write_2(f, "Expected Status", &service.expected_status)?;
                for name in service.headers.keys() {
                    write_2(f, "Header", name)?;
                }
            }
        }

        Ok(())
    }
}

impl Config {
    /// Load, parse and validate the config file
    ///
    /// Reads the given path (forcing a `.toml` extension) or, when none is
    /// given, `~/.config/servprobe/config.toml`.
    ///
    /// ```no_run
    /// let cfg = servprobe::config::Config::from_config(None::<&std::path::Path>)?;
    /// println!("{}", cfg);
    /// # Ok::<(), servprobe::config::ConfigError>(())
    /// ```
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let raw_string = fs::read_to_string(&config_path)
            .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;

        let config: Self = toml::from_str(raw_string.as_str())
            .map_err(|source| ConfigError::ParseFailed { path: config_path.clone(), source })?;

        config.validate()?;
        tracing::debug!(path = %config_path.display(), services = config.services.len(), "Loaded config");
        Ok(config)
    }

    /// Parse and validate a config held in memory
    pub fn from_toml(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Check service invariants: at least one service, unique non-empty
    /// names, and a well-formed descriptor for each
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.services.is_empty() {
            return Err(ConfigError::NoServices);
        }

        let mut names = HashSet::with_capacity(self.services.len());
        for (index, service) in self.services.iter().enumerate() {
            if service.name.trim().is_empty() {
                return Err(ConfigError::MissingName { index });
            }
            if !names.insert(service.name.as_str()) {
                return Err(ConfigError::DuplicateName(service.name.clone()));
            }
            validate_service(service)
                .map_err(|source| ConfigError::InvalidService { name: service.name.clone(), source })?;
        }

        Ok(())
    }

    /// Webhook settings, if alerting is enabled
    pub fn webhook(&self) -> Option<&WebhookConfig> {
        self.alerts.webhook.as_ref().filter(|webhook| !webhook.url.trim().is_empty())
    }
}
