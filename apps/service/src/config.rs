use std::{env, fmt, fs, path};

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("failed to read config file: {0}")]
    ReadFailed(#[source] std::io::Error),
    #[error("failed to write config file: {0}")]
    WriteFailed(#[source] std::io::Error),
    #[error("failed to parse config file: {0}")]
    ParseFailed(#[from] toml::de::Error),
    #[error("failed to serialize config: {0}")]
    SerializeFailed(#[from] toml::ser::Error),
    #[error("no config path available (set XDG_CONFIG_HOME or HOME)")]
    ConfigPathUnavailable,
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub database: Database,
    #[serde(default)]
    pub probing: Probing,
    #[serde(default)]
    pub certificates: Certificates,
    #[serde(default)]
    pub scheduler: Cadences,
    #[serde(default)]
    pub retention: Retention,
    #[serde(default)]
    pub alerts: Alerts,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Database {
    /// Path of the local libsql database file
    pub path: String,
}

impl Default for Database {
    fn default() -> Self {
        Self { path: "vigil.db".into() }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Probing {
    /// Total timeout for one probe request
    pub timeout_seconds: u64,
    /// Cap on simultaneous outbound probe connections
    pub max_concurrent: usize,
}

impl Default for Probing {
    fn default() -> Self {
        Self { timeout_seconds: 10, max_concurrent: 8 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Certificates {
    /// Total timeout for one TLS handshake
    pub timeout_seconds: u64,
}

impl Default for Certificates {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Cadences {
    pub uptime_interval_seconds: u64,
    pub certificate_interval_seconds: u64,
    pub cleanup_interval_seconds: u64,
}

impl Default for Cadences {
    fn default() -> Self {
        Self {
            uptime_interval_seconds: 60,
            certificate_interval_seconds: 24 * 3600,
            cleanup_interval_seconds: 7 * 24 * 3600,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Retention {
    /// Days of observation history to keep
    pub window_days: i64,
}

impl Default for Retention {
    fn default() -> Self {
        Self { window_days: 30 }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Alerts {
    /// Webhook to deliver alerts to; empty means log-only
    pub webhook_url: String,
    pub timeout_seconds: u64,
    pub queue_capacity: usize,
}

impl Default for Alerts {
    fn default() -> Self {
        Self { webhook_url: String::new(), timeout_seconds: 10, queue_capacity: 64 }
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

/// Get default config path ($XDG_CONFIG_HOME/vigil/config.toml or
/// $HOME/.config/...)
fn default_config_path() -> Result<path::PathBuf, Error> {
    let path = if let Ok(config_home) = env::var("XDG_CONFIG_HOME") {
        path::PathBuf::from(config_home)
    } else if let Some(home_dir) = env::home_dir() {
        home_dir.join(".config")
    } else {
        return Err(Error::ConfigPathUnavailable);
    };

    Ok(path.join("vigil/config.toml"))
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

        writeln!(f, "Current Internal Configuration State:")?;
        write_title_1(f, "Database")?;
        write_1(f, "Path", &self.database.path)?;
        write_title_1(f, "Probing")?;
        write_1(f, "Timeout (s)", &self.probing.timeout_seconds)?;
        write_1(f, "Max Concurrent", &self.probing.max_concurrent)?;
        write_title_1(f, "Certificates")?;
        write_1(f, "Timeout (s)", &self.certificates.timeout_seconds)?;
        write_title_1(f, "Scheduler")?;
        write_1(f, "Uptime Interval (s)", &self.scheduler.uptime_interval_seconds)?;
        write_1(f, "Certificate Interval (s)", &self.scheduler.certificate_interval_seconds)?;
        write_1(f, "Cleanup Interval (s)", &self.scheduler.cleanup_interval_seconds)?;
        write_title_1(f, "Retention")?;
        write_1(f, "Window (days)", &self.retention.window_days)?;
        write_title_1(f, "Alerts")?;
        write_1(
            f,
            "Webhook",
            &if self.alerts.webhook_url.is_empty() { "(log only)" } else { "(configured)" },
        )?;
        write_1(f, "Queue Capacity", &self.alerts.queue_capacity)?;

        Ok(())
    }
}

impl Config {
    /// Generate Config structure from file
    ///
    /// Creates a default config in ~/.config/vigil/config.toml
    ///  or the specified path, with the name config.toml if one does not exist
    pub fn from_config(optional_path: Option<impl AsRef<path::Path>>) -> Result<Self, Error> {
        let config_path: path::PathBuf = if let Some(path) = optional_path {
            normalize_toml_path(path.as_ref())
        } else {
            default_config_path()?
        };

        if config_path.exists() {
            let raw_string = fs::read_to_string(&config_path).map_err(Error::ReadFailed)?;
            Ok(toml::from_str(raw_string.as_str())?)
        } else {
            let config = Self::default();
            config.write_config(&config_path)?;
            Ok(config)
        }
    }

    /// Serialize and write a config to a file
    pub fn write_config(&self, path: &std::path::Path) -> Result<(), Error> {
        let config_str: String = toml::to_string_pretty(self)?;

        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(Error::WriteFailed)?;
        }

        std::fs::write(path, config_str).map_err(Error::WriteFailed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn missing_file_writes_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let config = Config::from_config(Some(&path)).unwrap();
        assert!(path.exists());
        assert_eq!(config.retention.window_days, 30);
        assert_eq!(config.scheduler.uptime_interval_seconds, 60);

        // Reads back identically.
        let reread = Config::from_config(Some(&path)).unwrap();
        assert_eq!(reread.probing.timeout_seconds, config.probing.timeout_seconds);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, "[retention]\nwindow_days = 7\n").unwrap();

        let config = Config::from_config(Some(&path)).unwrap();
        assert_eq!(config.retention.window_days, 7);
        assert_eq!(config.probing.max_concurrent, 8);
    }
}
