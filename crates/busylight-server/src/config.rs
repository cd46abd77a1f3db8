//! Daemon configuration.
//!
//! Read from TOML at start and again on every inactive → active transition.
//! The log destination, PID file and control socket are fixed by the first
//! load; later changes to them are ignored with a warning.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use busylight_providers::CalendarSettings;
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ServerError, ServerResult};
use crate::pidfile::default_pid_path;
use crate::transport::SUPPORTED_BAUD_RATES;

/// Where to find the light.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DeviceConfig {
    /// Fixed device path. Takes precedence over `dir` + `pattern`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Directory scanned for candidate devices.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub dir: Option<PathBuf>,
    /// Regex matched against file names in `dir`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
    pub baud_rate: u32,
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            path: None,
            dir: None,
            pattern: None,
            baud_rate: 9600,
        }
    }
}

impl DeviceConfig {
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self {
            path: Some(path.into()),
            ..Self::default()
        }
    }

    pub fn scanning(dir: impl Into<PathBuf>, pattern: impl Into<String>) -> Self {
        Self {
            dir: Some(dir.into()),
            pattern: Some(pattern.into()),
            ..Self::default()
        }
    }

    pub fn validate(&self) -> ServerResult<()> {
        match (&self.path, &self.dir, &self.pattern) {
            (Some(_), _, _) => {}
            (None, Some(_), Some(pattern)) => {
                Regex::new(pattern).map_err(|e| {
                    ServerError::config(format!("device.pattern is not a valid regex: {e}"))
                })?;
            }
            _ => {
                return Err(ServerError::config(
                    "device needs either 'path' or both 'dir' and 'pattern'",
                ));
            }
        }
        if !SUPPORTED_BAUD_RATES.contains(&self.baud_rate) {
            return Err(ServerError::config(format!(
                "unsupported baud_rate {} (supported: {:?})",
                self.baud_rate, SUPPORTED_BAUD_RATES
            )));
        }
        Ok(())
    }
}

/// Timing of calendar polls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ScheduleConfig {
    pub refresh_interval_secs: u64,
    /// Upper bound on one calendar query, on top of the HTTP timeout.
    pub calendar_timeout_secs: u64,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            refresh_interval_secs: 3600,
            calendar_timeout_secs: 30,
        }
    }
}

/// Complete daemon configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct DaemonConfig {
    /// Google OAuth client JSON.
    pub credential_file: PathBuf,
    /// Cached OAuth token JSON.
    pub token_file: PathBuf,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub log_file: Option<PathBuf>,
    #[serde(default = "default_pid_path")]
    pub pid_file: PathBuf,
    #[serde(default = "default_socket_path")]
    pub socket_path: PathBuf,
    #[serde(default)]
    pub device: DeviceConfig,
    #[serde(default)]
    pub schedule: ScheduleConfig,
    /// Monitored calendars keyed by id.
    #[serde(default)]
    pub calendars: BTreeMap<String, CalendarSettings>,
}

impl DaemonConfig {
    /// Reads, parses and validates the file at `path`.
    pub fn load(path: &Path) -> ServerResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ServerError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml(&content).map_err(|source| ServerError::ConfigParse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        debug!(path = %path.display(), calendars = config.calendars.len(), "Loaded configuration");
        Ok(config)
    }

    /// Parses TOML without validating, expanding a leading `~/` in paths.
    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_home();
        Ok(config)
    }

    /// Renders the configuration back to TOML.
    pub fn to_toml(&self) -> ServerResult<String> {
        toml::to_string_pretty(self)
            .map_err(|e| ServerError::config(format!("failed to serialize config: {e}")))
    }

    pub fn validate(&self) -> ServerResult<()> {
        if self.calendars.is_empty() {
            return Err(ServerError::config("at least one calendar must be configured"));
        }
        self.device.validate()?;
        if self.schedule.refresh_interval_secs == 0 {
            return Err(ServerError::config("schedule.refresh_interval_secs must be non-zero"));
        }
        if self.schedule.calendar_timeout_secs == 0 {
            return Err(ServerError::config("schedule.calendar_timeout_secs must be non-zero"));
        }
        Ok(())
    }

    /// Merges a freshly loaded configuration, keeping the fields that cannot
    /// change while the daemon runs.
    #[must_use]
    pub fn reload(&self, mut next: DaemonConfig) -> DaemonConfig {
        if next.log_file != self.log_file {
            warn!(
                current = ?self.log_file,
                requested = ?next.log_file,
                "log_file cannot change while running, ignoring"
            );
            next.log_file = self.log_file.clone();
        }
        if next.pid_file != self.pid_file {
            warn!(
                current = %self.pid_file.display(),
                requested = %next.pid_file.display(),
                "pid_file cannot change while running, ignoring"
            );
            next.pid_file = self.pid_file.clone();
        }
        if next.socket_path != self.socket_path {
            warn!(
                current = %self.socket_path.display(),
                requested = %next.socket_path.display(),
                "socket_path cannot change while running, ignoring"
            );
            next.socket_path = self.socket_path.clone();
        }
        next
    }

    pub fn refresh_interval(&self) -> Duration {
        Duration::from_secs(self.schedule.refresh_interval_secs)
    }

    pub fn calendar_timeout(&self) -> Duration {
        Duration::from_secs(self.schedule.calendar_timeout_secs)
    }

    fn expand_home(&mut self) {
        let expand = |path: &mut PathBuf| {
            if let Ok(rest) = path.strip_prefix("~")
                && let Some(home) = dirs::home_dir()
            {
                *path = home.join(rest);
            }
        };
        expand(&mut self.credential_file);
        expand(&mut self.token_file);
        expand(&mut self.pid_file);
        expand(&mut self.socket_path);
        if let Some(ref mut log_file) = self.log_file {
            expand(log_file);
        }
        if let Some(ref mut path) = self.device.path {
            expand(path);
        }
        if let Some(ref mut dir) = self.device.dir {
            expand(dir);
        }
    }
}

/// Returns the default configuration file path,
/// `$XDG_CONFIG_HOME/busylight/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("busylight").join("config.toml"))
}

/// Returns the default control socket path.
///
/// Uses `$XDG_RUNTIME_DIR/busylight.sock` if available,
/// otherwise falls back to `/tmp/busylight-$UID.sock`.
pub fn default_socket_path() -> PathBuf {
    if let Ok(runtime_dir) = std::env::var("XDG_RUNTIME_DIR") {
        PathBuf::from(runtime_dir).join("busylight.sock")
    } else {
        #[cfg(unix)]
        let uid = unsafe { libc::getuid() };
        #[cfg(not(unix))]
        let uid = 0;
        PathBuf::from(format!("/tmp/busylight-{uid}.sock"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = r#"
credential_file = "/etc/busylight/credentials.json"
token_file = "/var/lib/busylight/token.json"
log_file = "/var/log/busylight.log"
pid_file = "/run/busylight.pid"
socket_path = "/run/busylight.sock"

[device]
dir = "/dev"
pattern = "^ttyACM[0-9]+$"
baud_rate = 19200

[schedule]
refresh_interval_secs = 1800

[calendars."me@example.com"]
title = "Work"
ignore_all_day_events = true

[calendars."family@example.com"]
"#;

    fn sample() -> DaemonConfig {
        DaemonConfig::from_toml(SAMPLE).unwrap()
    }

    #[test]
    fn parses_full_file() {
        let config = sample();
        assert_eq!(config.token_file, PathBuf::from("/var/lib/busylight/token.json"));
        assert_eq!(config.device.pattern.as_deref(), Some("^ttyACM[0-9]+$"));
        assert_eq!(config.device.baud_rate, 19200);
        assert_eq!(config.refresh_interval(), Duration::from_secs(1800));
        assert_eq!(config.calendar_timeout(), Duration::from_secs(30));
        assert_eq!(config.calendars.len(), 2);
        assert!(config.calendars["me@example.com"].ignore_all_day_events);
        assert_eq!(config.calendars["family@example.com"], CalendarSettings::default());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn defaults_apply() {
        let config = DaemonConfig::from_toml(
            r#"
credential_file = "/c.json"
token_file = "/t.json"
[device]
path = "/dev/ttyUSB0"
[calendars.primary]
"#,
        )
        .unwrap();
        assert_eq!(config.device.baud_rate, 9600);
        assert_eq!(config.schedule, ScheduleConfig::default());
        assert!(config.log_file.is_none());
        assert_eq!(config.socket_path, default_socket_path());
        assert_eq!(config.pid_file, default_pid_path());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn expands_home_directory() {
        let Some(home) = dirs::home_dir() else {
            return;
        };
        let config = DaemonConfig::from_toml(
            r#"
credential_file = "~/.config/busylight/credentials.json"
token_file = "/t.json"
"#,
        )
        .unwrap();
        assert_eq!(
            config.credential_file,
            home.join(".config/busylight/credentials.json")
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let result = DaemonConfig::from_toml(
            r#"
credential_file = "/c.json"
token_file = "/t.json"
colour = "blue"
"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn validation_requires_calendar() {
        let mut config = sample();
        config.calendars.clear();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("at least one calendar"));
    }

    #[test]
    fn validation_requires_device_location() {
        let mut config = sample();
        config.device = DeviceConfig {
            dir: Some("/dev".into()),
            ..DeviceConfig::default()
        };
        assert!(config.validate().is_err());

        config.device = DeviceConfig::at_path("/dev/ttyUSB0");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn validation_rejects_bad_pattern_and_baud() {
        let mut config = sample();
        config.device = DeviceConfig::scanning("/dev", "tty(");
        assert!(config.validate().unwrap_err().to_string().contains("regex"));

        config.device = DeviceConfig {
            baud_rate: 12345,
            ..DeviceConfig::at_path("/dev/ttyUSB0")
        };
        assert!(config.validate().unwrap_err().to_string().contains("baud_rate"));
    }

    #[test]
    fn reload_keeps_frozen_fields() {
        let current = sample();
        let mut next = sample();
        next.log_file = Some("/tmp/other.log".into());
        next.pid_file = "/tmp/other.pid".into();
        next.socket_path = "/tmp/other.sock".into();
        next.device = DeviceConfig::at_path("/dev/ttyUSB1");
        next.calendars.remove("family@example.com");

        let merged = current.reload(next);
        assert_eq!(merged.log_file, current.log_file);
        assert_eq!(merged.pid_file, current.pid_file);
        assert_eq!(merged.socket_path, current.socket_path);
        assert_eq!(merged.device.path, Some(PathBuf::from("/dev/ttyUSB1")));
        assert_eq!(merged.calendars.len(), 1);
    }

    #[test]
    fn load_reports_path_on_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        let err = DaemonConfig::load(&path).unwrap_err();
        assert!(matches!(err, ServerError::ConfigRead { .. }));

        std::fs::write(&path, "credential_file = [").unwrap();
        let err = DaemonConfig::load(&path).unwrap_err();
        assert!(matches!(err, ServerError::ConfigParse { .. }));

        std::fs::write(&path, SAMPLE).unwrap();
        assert_eq!(DaemonConfig::load(&path).unwrap(), sample());
    }

    #[test]
    fn toml_round_trip() {
        let config = sample();
        let rendered = config.to_toml().unwrap();
        assert_eq!(DaemonConfig::from_toml(&rendered).unwrap(), config);
    }

    #[test]
    fn default_paths() {
        assert!(default_socket_path().to_string_lossy().ends_with(".sock"));
        if let Some(path) = default_config_path() {
            assert!(path.ends_with("busylight/config.toml"));
        }
    }
}
