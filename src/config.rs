// Determine config stuffs
//
// The config is a JSON file in the per-user app data dir. Every field has a
// default, so a missing file (or a partial one) still gives a usable config.

use crate::error::ConfigError;
use directories::ProjectDirs;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

lazy_static! {
    // None when the platform gives us no home directory to hang it off.
    pub static ref APP_DATA: Option<ProjectDirs> =
        ProjectDirs::from("edu", "classroom", "QrAttendance");
}

pub const CONFIG_ENV_VAR: &str = "QR_ATTENDANCE_CONFIG";

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    pub bearer_token: Option<String>,
    pub request_timeout_secs: u64,
    pub default_duration_minutes: u32,
    pub scan_throttle_ms: u64,
    pub error_clear_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:5000/api".to_owned(),
            bearer_token: None,
            request_timeout_secs: 10,
            default_duration_minutes: crate::token::DEFAULT_VALIDITY_MINUTES,
            scan_throttle_ms: 3000,
            error_clear_ms: 5000,
        }
    }
}

impl Config {
    pub fn default_path() -> Result<PathBuf, ConfigError> {
        if let Some(path) = std::env::var_os(CONFIG_ENV_VAR) {
            return Ok(PathBuf::from(path));
        }
        APP_DATA
            .as_ref()
            .map(|dirs| dirs.data_dir().join("config.json"))
            .ok_or(ConfigError::NoHomeDirectory)
    }

    pub fn load() -> Result<Config, ConfigError> {
        let path = Self::default_path()?;
        if !path.exists() {
            tracing::info!(path = %path.display(), "no config file found, using defaults");
            return Ok(Config::default());
        }
        Self::from_path(&path)
    }

    pub fn from_path(path: &Path) -> Result<Config, ConfigError> {
        let file = std::fs::File::open(path).map_err(|source| ConfigError::Io {
            path: path.to_owned(),
            source,
        })?;
        serde_json::from_reader(std::io::BufReader::new(file)).map_err(|source| {
            ConfigError::Parse {
                path: path.to_owned(),
                source,
            }
        })
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn scan_throttle(&self) -> Duration {
        Duration::from_millis(self.scan_throttle_ms)
    }

    pub fn error_clear_delay(&self) -> Duration {
        Duration::from_millis(self.error_clear_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn partial_file_falls_back_to_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "api_base_url": "https://attendance.example.edu/api", "bearer_token": "abc" }}"#
        )
        .unwrap();

        let config = Config::from_path(file.path()).unwrap();
        assert_eq!(config.api_base_url, "https://attendance.example.edu/api");
        assert_eq!(config.bearer_token.as_deref(), Some("abc"));
        assert_eq!(config.default_duration_minutes, 15);
        assert_eq!(config.scan_throttle(), Duration::from_millis(3000));
        assert_eq!(config.error_clear_delay(), Duration::from_millis(5000));
        assert_eq!(config.request_timeout(), Duration::from_secs(10));
    }

    #[test]
    fn malformed_json_is_a_parse_error() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "{{ not json").unwrap();

        let err = Config::from_path(file.path()).unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn missing_file_is_an_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = Config::from_path(&dir.path().join("nope.json")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
