//! Configuration file.
//!
//! TOML, read once at startup. A missing or invalid file is the only error
//! that stops the program outright.

use crate::error::{Error, Result};
use crate::location::{expand_tilde, Location};
use crate::logging::LogFormat;
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};

const APP_DIR: &str = "transatlantic";

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub satellite: SatelliteConfig,
    pub local: LocalConfig,
    #[serde(default)]
    pub transfer: TransferConfig,
    #[serde(default)]
    pub download_client: DownloadClientConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// Where files are pulled from. Without host and user the path is local.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SatelliteConfig {
    pub host: Option<String>,
    pub user: Option<String>,
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LocalConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TransferConfig {
    /// Put video files into a folder named after the file.
    pub create_video_folders: bool,
    pub video_extensions: Vec<String>,
    /// Defaults to `<cache dir>/transatlantic/speed`.
    pub speed_file: Option<PathBuf>,
    /// Discard speed samples above this multiple of the current estimate.
    pub outlier_factor: Option<f64>,
}

impl Default for TransferConfig {
    fn default() -> Self {
        Self {
            create_video_folders: true,
            video_extensions: default_video_extensions(),
            speed_file: None,
            outlier_factor: None,
        }
    }
}

fn default_video_extensions() -> Vec<String> {
    ["mkv", "mp4", "avi", "m4v", "mov", "wmv", "mpg", "mpeg", "ts", "webm"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct DownloadClientConfig {
    pub enabled: bool,
    pub interpreter: PathBuf,
    pub script: Option<PathBuf>,
}

impl Default for DownloadClientConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            interpreter: PathBuf::from("/usr/bin/python2"),
            script: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct LoggingConfig {
    /// Defaults to `<data dir>/transatlantic/output.log`.
    pub file: Option<PathBuf>,
    pub format: LogFormat,
    /// Level for the log file.
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            file: None,
            format: LogFormat::Text,
            level: "debug".to_string(),
        }
    }
}

impl Config {
    /// `$XDG_CONFIG_HOME/transatlantic/config.toml` or the platform equivalent.
    pub fn default_path() -> PathBuf {
        dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(APP_DIR)
            .join("config.toml")
    }

    pub fn load(path: &Path) -> Result<Self> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(Error::ConfigNotFound {
                    path: path.to_path_buf(),
                })
            }
            Err(e) => return Err(e.into()),
        };

        let config = Self::from_toml_str(&content)?;
        tracing::debug!(path = %path.display(), "Config loaded");
        Ok(config)
    }

    pub fn from_toml_str(content: &str) -> Result<Self> {
        let mut config: Config =
            toml::from_str(content).map_err(|e| Error::Config(e.to_string()))?;
        config.validate()?;
        config.expand_paths();
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.satellite.path.trim().is_empty() {
            return Err(Error::Config("satellite.path must not be empty".to_string()));
        }
        if self.local.path.as_os_str().is_empty() {
            return Err(Error::Config("local.path must not be empty".to_string()));
        }

        match (&self.satellite.host, &self.satellite.user) {
            (Some(_), None) | (None, Some(_)) => {
                return Err(Error::Config(
                    "satellite.host and satellite.user must be set together".to_string(),
                ))
            }
            (Some(host), Some(user)) if host.is_empty() || user.is_empty() => {
                return Err(Error::Config(
                    "satellite.host and satellite.user must not be empty".to_string(),
                ))
            }
            _ => {}
        }

        if let Some(factor) = self.transfer.outlier_factor {
            if factor.is_nan() || factor <= 1.0 {
                return Err(Error::Config(format!(
                    "transfer.outlier_factor must be greater than 1, got {}",
                    factor
                )));
            }
        }

        if self.download_client.enabled && self.download_client.script.is_none() {
            return Err(Error::Config(
                "download_client.script is required when the client is enabled".to_string(),
            ));
        }

        Ok(())
    }

    fn expand_paths(&mut self) {
        self.local.path = expand_tilde(&self.local.path);
        if let Some(p) = self.transfer.speed_file.as_mut() {
            *p = expand_tilde(p);
        }
        if let Some(p) = self.download_client.script.as_mut() {
            *p = expand_tilde(p);
        }
        if let Some(p) = self.logging.file.as_mut() {
            *p = expand_tilde(p);
        }
        self.download_client.interpreter = expand_tilde(&self.download_client.interpreter);
    }

    pub fn satellite_location(&self) -> Location {
        match (&self.satellite.host, &self.satellite.user) {
            (Some(host), Some(user)) => {
                Location::remote(host.as_str(), user.as_str(), self.satellite.path.as_str())
            }
            _ => Location::local(expand_tilde(Path::new(&self.satellite.path))),
        }
    }

    pub fn local_location(&self) -> Location {
        Location::local(self.local.path.clone())
    }

    pub fn speed_file(&self) -> PathBuf {
        self.transfer.speed_file.clone().unwrap_or_else(|| {
            dirs::cache_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("speed")
        })
    }

    pub fn log_file(&self) -> PathBuf {
        self.logging.file.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join(APP_DIR)
                .join("output.log")
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FULL: &str = r#"
[satellite]
host = "seedbox.example.com"
user = "media"
path = "~/downloads/complete"

[local]
path = "/srv/media/incoming"

[transfer]
create_video_folders = false
video_extensions = ["mkv"]
speed_file = "/var/lib/transatlantic/speed"
outlier_factor = 10.0

[download_client]
enabled = true
interpreter = "/usr/bin/python3"
script = "/opt/deluge/remove.py"

[logging]
file = "/var/log/transatlantic.log"
format = "json"
level = "info"
"#;

    #[test]
    fn test_parse_full_config() {
        let config = Config::from_toml_str(FULL).unwrap();

        assert_eq!(
            config.satellite_location(),
            Location::remote("seedbox.example.com", "media", "~/downloads/complete")
        );
        assert_eq!(config.local_location(), Location::local("/srv/media/incoming"));
        assert!(!config.transfer.create_video_folders);
        assert_eq!(config.transfer.video_extensions, vec!["mkv"]);
        assert_eq!(config.speed_file(), PathBuf::from("/var/lib/transatlantic/speed"));
        assert_eq!(config.transfer.outlier_factor, Some(10.0));
        assert!(config.download_client.enabled);
        assert_eq!(config.logging.format, LogFormat::Json);
        assert_eq!(config.log_file(), PathBuf::from("/var/log/transatlantic.log"));
    }

    #[test]
    fn test_minimal_config_defaults() {
        let config = Config::from_toml_str(
            r#"
[satellite]
path = "/mnt/satellite"

[local]
path = "/srv/media"
"#,
        )
        .unwrap();

        assert_eq!(config.satellite_location(), Location::local("/mnt/satellite"));
        assert!(config.transfer.create_video_folders);
        assert!(config.transfer.video_extensions.contains(&"mp4".to_string()));
        assert!(!config.download_client.enabled);
        assert_eq!(config.logging.format, LogFormat::Text);
        assert_eq!(config.logging.level, "debug");
        assert!(config.speed_file().ends_with("transatlantic/speed"));
    }

    #[test]
    fn test_host_without_user_rejected() {
        let err = Config::from_toml_str(
            r#"
[satellite]
host = "seedbox"
path = "/data"

[local]
path = "/srv"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_enabled_client_needs_script() {
        let err = Config::from_toml_str(
            r#"
[satellite]
path = "/data"

[local]
path = "/srv"

[download_client]
enabled = true
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("download_client.script"));
    }

    #[test]
    fn test_bad_outlier_factor_rejected() {
        let err = Config::from_toml_str(
            r#"
[satellite]
path = "/data"

[local]
path = "/srv"

[transfer]
outlier_factor = 0.5
"#,
        )
        .unwrap_err();
        assert!(err.to_string().contains("outlier_factor"));
    }

    #[test]
    fn test_unknown_key_rejected() {
        let err = Config::from_toml_str(
            r#"
[satellite]
path = "/data"
hots = "typo"

[local]
path = "/srv"
"#,
        )
        .unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_load_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::load(&dir.path().join("config.toml")).unwrap_err();
        assert!(matches!(err, Error::ConfigNotFound { .. }));
    }

    #[test]
    fn test_load_from_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        fs::write(&path, FULL).unwrap();
        assert!(Config::load(&path).is_ok());
    }
}
