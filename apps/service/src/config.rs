use std::time::Duration;
use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read config {path}: {source}")]
    ReadFailed { path: path::PathBuf, source: std::io::Error },

    #[error("write config {path}: {source}")]
    WriteFailed { path: path::PathBuf, source: std::io::Error },

    #[error("parse config: {0}")]
    ParseFailed(#[from] toml::de::Error),

    #[error("serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),

    #[error("no config path available: set XDG_CONFIG_HOME or HOME")]
    ConfigPathUnavailable,

    #[error("invalid config: {0}")]
    Invalid(String),
}

/// Longest accepted check or maintenance interval
const MAX_INTERVAL_SECS: u64 = 30 * 24 * 3600;
const MAX_CORRELATION_WINDOW_SECS: u64 = 7 * 24 * 3600;
const MAX_RETENTION_DAYS: u32 = 36_500;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub pulse: PulseConfig,
    pub notifications: NotificationsConfig,
    pub database: DatabaseConfig,
}

/// Check scheduling, alerting and retention
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PulseConfig {
    pub check_interval_secs: u64,
    pub ping_timeout_secs: u64,
    pub ping_count: u16,
    /// Consecutive failures before an alert; twice this raises critical
    pub consecutive_failures: u32,
    pub retention_days: u32,
    pub max_workers: usize,
    pub maintenance_interval_secs: u64,
    pub correlation_window_secs: u64,
}

impl Default for PulseConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 30,
            ping_timeout_secs: 5,
            ping_count: 3,
            consecutive_failures: 3,
            retention_days: 30,
            max_workers: 10,
            maintenance_interval_secs: 3600,
            correlation_window_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NotificationsConfig {
    pub timeout_secs: u64,
}

impl Default for NotificationsConfig {
    fn default() -> Self {
        Self { timeout_secs: 10 }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub path: String,
    pub max_connections: usize,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self { path: "pulse.db".into(), max_connections: 8 }
    }
}

impl PulseConfig {
    pub fn check_interval(&self) -> Duration {
        Duration::from_secs(self.check_interval_secs)
    }

    pub fn ping_timeout(&self) -> Duration {
        Duration::from_secs(self.ping_timeout_secs)
    }

    pub fn maintenance_interval(&self) -> Duration {
        Duration::from_secs(self.maintenance_interval_secs)
    }

    pub fn correlation_window(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.correlation_window_secs as i64)
    }

    pub fn retention(&self) -> chrono::Duration {
        chrono::Duration::days(i64::from(self.retention_days))
    }
}

impl NotificationsConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
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

/// Get default config path ($XDG_CONFIG_HOME/pulse/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, ConfigError> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(ConfigError::ConfigPathUnavailable);
    };

    Ok(path.join("pulse/config.toml"))
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
        let write_1 = write_indented(1);

        writeln!(f, "Current Configuration:")?;
        write_title_1(f, "Pulse")?;
        write_1(f, "Check Interval (s)", &self.pulse.check_interval_secs)?;
        write_1(f, "Ping Timeout (s)", &self.pulse.ping_timeout_secs)?;
        write_1(f, "Ping Count", &self.pulse.ping_count)?;
        write_1(f, "Alert Threshold", &self.pulse.consecutive_failures)?;
        write_1(f, "Retention (days)", &self.pulse.retention_days)?;
        write_1(f, "Max Workers", &self.pulse.max_workers)?;
        write_1(f, "Maintenance Interval (s)", &self.pulse.maintenance_interval_secs)?;
        write_1(f, "Correlation Window (s)", &self.pulse.correlation_window_secs)?;
        write_title_1(f, "Notifications")?;
        write_1(f, "Timeout (s)", &self.notifications.timeout_secs)?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_1(f, "Max Connections", &self.database.max_connections)?;

        Ok(())
    }
}

impl Config {
    /// Load the config from `optional_path` or the default location,
    /// writing a default file first if none exists.
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, ConfigError> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        let config = if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path)
                .map_err(|source| ConfigError::ReadFailed { path: config_path.clone(), source })?;
            toml::from_str::<Self>(&raw_string)?
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            config
        };

        config.validate()?;
        Ok(config)
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &path::Path) -> Result<(), ConfigError> {
        let config_str = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .map_err(|source| ConfigError::WriteFailed { path: parent.to_path_buf(), source })?;
        }

        fs::write(path, config_str).map_err(|source| ConfigError::WriteFailed { path: path.to_path_buf(), source })
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let pulse = &self.pulse;
        if pulse.max_workers == 0 {
            return Err(ConfigError::Invalid("pulse.max_workers must be at least 1".into()));
        }
        if pulse.consecutive_failures == 0 {
            return Err(ConfigError::Invalid("pulse.consecutive_failures must be at least 1".into()));
        }
        check_range("pulse.check_interval_secs", pulse.check_interval_secs, 1, MAX_INTERVAL_SECS)?;
        check_range("pulse.maintenance_interval_secs", pulse.maintenance_interval_secs, 1, MAX_INTERVAL_SECS)?;
        check_range("pulse.correlation_window_secs", pulse.correlation_window_secs, 0, MAX_CORRELATION_WINDOW_SECS)?;
        check_range("pulse.retention_days", u64::from(pulse.retention_days), 1, u64::from(MAX_RETENTION_DAYS))?;
        Ok(())
    }
}

fn check_range(name: &str, value: u64, min: u64, max: u64) -> Result<(), ConfigError> {
    if value < min || value > max {
        return Err(ConfigError::Invalid(format!("{name} must be between {min} and {max}, got {value}")));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_file_is_created_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/pulse");

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.pulse.consecutive_failures, 3);
        assert_eq!(config.pulse.max_workers, 10);
        assert_eq!(config.notifications.timeout_secs, 10);
        assert!(dir.path().join("nested/pulse.toml").exists());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pulse]\nmax_workers = 4\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.pulse.max_workers, 4);
        assert_eq!(config.pulse.check_interval(), Duration::from_secs(30));
        assert_eq!(config.pulse.correlation_window(), chrono::Duration::minutes(5));
        assert_eq!(config.pulse.retention(), chrono::Duration::days(30));
        assert_eq!(config.database.path, "pulse.db");
    }

    #[test]
    fn test_invalid_values_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        for bad in [
            "[pulse]\nmax_workers = 0\n",
            "[pulse]\nmaintenance_interval_secs = 0\n",
            "[pulse]\ncheck_interval_secs = 0\n",
            "[pulse]\ncorrelation_window_secs = 9223372036854775807\n",
            "[pulse]\nretention_days = 4000000000\n",
        ] {
            fs::write(&path, bad).unwrap();
            assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::Invalid(_))), "{bad}");
        }

        fs::write(&path, "[pulse\n").unwrap();
        assert!(matches!(Config::from_config(Some(&path)), Err(ConfigError::ParseFailed(_))));
    }

    #[test]
    fn test_display_lists_sections() {
        let shown = Config::default().to_string();
        assert!(shown.contains("Pulse"));
        assert!(shown.contains("Alert Threshold: 3"));
        assert!(shown.contains("Path: pulse.db"));
    }
}
