use std::env;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::time::{parse_time_string, Timeout};

fn env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key).ok().filter(|s| !s.is_empty())
}

/// The scheduler's own tunables (§3.7). Deserialized from TOML, overlaid by
/// environment variables prefixed `SCHEDULER_`, following an env-var-first
/// configuration convention adapted to a single-file settings struct
/// appropriate for a standalone binary.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SchedulerSettings {
    pub min_cycle_interval_ms: u64,
    pub default_timeout: String,
    pub log_inaction: bool,
    pub force_status_from_logs: bool,
    pub log_cap_per_task: usize,
}

impl Default for SchedulerSettings {
    fn default() -> Self {
        Self {
            min_cycle_interval_ms: 1,
            default_timeout: "never".to_string(),
            log_inaction: false,
            force_status_from_logs: false,
            log_cap_per_task: 10_000,
        }
    }
}

impl SchedulerSettings {
    pub fn default_timeout(&self) -> Result<Timeout, ConfigError> {
        parse_time_string(&self.default_timeout)
    }

    pub fn min_cycle_interval(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.min_cycle_interval_ms)
    }

    /// Loads settings from a TOML file if present, overlaid by
    /// `SCHEDULER_*` environment variables; falls back to defaults (with a
    /// logged warning, not a hard failure) when the file is absent. A
    /// present-but-unparsable file is a fatal `ConfigError`, per §7.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut settings = match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str::<SchedulerSettings>(&contents)
                .map_err(|e| ConfigError::MalformedFile(e.to_string()))?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::warn!(path = %path.display(), "settings file not found, using defaults");
                SchedulerSettings::default()
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };
        settings.apply_env_overlay();
        settings.validate()?;
        Ok(settings)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        let mut settings = SchedulerSettings::default();
        settings.apply_env_overlay();
        settings.validate()?;
        Ok(settings)
    }

    fn apply_env_overlay(&mut self) {
        if let Some(v) = env_opt("SCHEDULER_MIN_CYCLE_INTERVAL_MS") {
            if let Ok(parsed) = v.parse() {
                self.min_cycle_interval_ms = parsed;
            }
        }
        self.default_timeout = env_or("SCHEDULER_DEFAULT_TIMEOUT", &self.default_timeout);
        if let Some(v) = env_opt("SCHEDULER_LOG_INACTION") {
            self.log_inaction = v == "true";
        }
        if let Some(v) = env_opt("SCHEDULER_FORCE_STATUS_FROM_LOGS") {
            self.force_status_from_logs = v == "true";
        }
        if let Some(v) = env_opt("SCHEDULER_LOG_CAP_PER_TASK") {
            if let Ok(parsed) = v.parse() {
                self.log_cap_per_task = parsed;
            }
        }
    }

    fn validate(&self) -> Result<(), ConfigError> {
        self.default_timeout()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let settings = SchedulerSettings::default();
        assert!(settings.validate().is_ok());
        assert_eq!(settings.default_timeout().unwrap(), Timeout::Never);
    }

    #[test]
    fn load_missing_file_falls_back_to_defaults() {
        let settings = SchedulerSettings::load(Path::new("/nonexistent/scheduler.toml")).unwrap();
        assert_eq!(settings.min_cycle_interval_ms, 1);
    }

    #[test]
    fn load_malformed_file_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(&path, "not valid = [toml").unwrap();
        let err = SchedulerSettings::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::MalformedFile(_)));
    }

    #[test]
    fn load_valid_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scheduler.toml");
        std::fs::write(&path, "log_cap_per_task = 42\ndefault_timeout = \"5 seconds\"\n").unwrap();
        let settings = SchedulerSettings::load(&path).unwrap();
        assert_eq!(settings.log_cap_per_task, 42);
        assert_eq!(
            settings.default_timeout().unwrap(),
            Timeout::After(chrono::Duration::seconds(5))
        );
    }
}
