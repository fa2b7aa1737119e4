// src/settings.rs
//
// Persistent settings (TOML). Every field has a serde default so partial or
// older files keep loading.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::events::ConsumerPolicy;
use crate::framing::DEFAULT_MAX_FRAME_LEN;
use crate::io::{LinkConfig, LinkError};
use crate::sessions::SessionOptions;

#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct LinkSettings {
    #[serde(default)]
    pub link: LinkConfig,
    #[serde(default = "default_retry_interval_ms")]
    pub retry_interval_ms: u64,
    #[serde(default = "default_max_frame_len")]
    pub max_frame_len: usize,
    #[serde(default = "default_line_ending")]
    pub line_ending: String,
    #[serde(default)]
    pub policy: ConsumerPolicy,
    /// Diagnostic log directory; file logging is off when unset
    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_retry_interval_ms() -> u64 {
    2000
}
fn default_max_frame_len() -> usize {
    DEFAULT_MAX_FRAME_LEN
}
fn default_line_ending() -> String {
    "\n".to_string()
}

impl Default for LinkSettings {
    fn default() -> Self {
        Self {
            link: LinkConfig::default(),
            retry_interval_ms: default_retry_interval_ms(),
            max_frame_len: default_max_frame_len(),
            line_ending: default_line_ending(),
            policy: ConsumerPolicy::default(),
            log_dir: None,
        }
    }
}

impl LinkSettings {
    pub fn session_options(&self) -> SessionOptions {
        SessionOptions {
            retry_interval: Duration::from_millis(self.retry_interval_ms),
            max_frame_len: self.max_frame_len,
            line_ending: self.line_ending.clone(),
        }
    }

    pub fn validate(&self) -> Result<(), LinkError> {
        if self.retry_interval_ms == 0 {
            return Err(LinkError::InvalidConfig("retry_interval_ms must be non-zero".to_string()));
        }
        if self.max_frame_len == 0 {
            return Err(LinkError::InvalidConfig("max_frame_len must be non-zero".to_string()));
        }
        self.link.validate()
    }
}

/// `<config dir>/wandi-link/settings.toml`
pub fn default_settings_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wandi-link").join("settings.toml"))
}

/// Load settings from `path`. A missing file yields the defaults.
pub fn load_settings(path: &Path) -> Result<LinkSettings, String> {
    if !path.exists() {
        return Ok(LinkSettings::default());
    }

    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("Failed to read settings: {}", e))?;

    toml::from_str(&content).map_err(|e| format!("Failed to parse settings: {}", e))
}

pub fn save_settings(path: &Path, settings: &LinkSettings) -> Result<(), String> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create settings dir: {}", e))?;
    }

    let content = toml::to_string_pretty(settings)
        .map_err(|e| format!("Failed to serialize settings: {}", e))?;

    std::fs::write(path, content).map_err(|e| format!("Failed to write settings: {}", e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::ValueRange;
    use crate::io::TransportMode;

    fn temp_path(name: &str) -> PathBuf {
        std::env::temp_dir()
            .join(format!("wandi-link-settings-{}-{}", std::process::id(), name))
            .join("settings.toml")
    }

    #[test]
    fn test_missing_file_gives_defaults() {
        let settings = load_settings(&temp_path("missing")).unwrap();
        assert_eq!(settings, LinkSettings::default());
        assert_eq!(settings.session_options(), SessionOptions::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let content = r#"
            retry_interval_ms = 500

            [link]
            mode = "bridge"
            endpointUrl = "ws://localhost:8765"

            [policy]
            log_telemetry = true
            valid_range = { min = -360.0, max = 360.0 }
        "#;
        let settings: LinkSettings = toml::from_str(content).unwrap();
        assert_eq!(settings.link.mode, TransportMode::Bridge);
        assert_eq!(settings.link.endpoint_url.as_deref(), Some("ws://localhost:8765"));
        assert_eq!(settings.max_frame_len, 4096);
        assert_eq!(settings.line_ending, "\n");
        assert_eq!(settings.policy.valid_range, Some(ValueRange::symmetric(360.0)));
        assert_eq!(settings.session_options().retry_interval, Duration::from_millis(500));
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_save_then_load() {
        let path = temp_path("save");
        let mut settings = LinkSettings::default();
        settings.link = LinkConfig::device(115200).with_port("/dev/ttyUSB0");
        settings.log_dir = Some(PathBuf::from("/tmp/wandi-logs"));

        save_settings(&path, &settings).unwrap();
        assert_eq!(load_settings(&path).unwrap(), settings);

        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }

    #[test]
    fn test_invalid_settings() {
        let settings = LinkSettings {
            retry_interval_ms: 0,
            ..LinkSettings::default()
        };
        assert!(matches!(settings.validate(), Err(LinkError::InvalidConfig(_))));

        let settings = LinkSettings {
            link: LinkConfig::bridge("http://example.com"),
            ..LinkSettings::default()
        };
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_garbage_file_is_an_error() {
        let path = temp_path("garbage");
        if let Some(dir) = path.parent() {
            std::fs::create_dir_all(dir).unwrap();
        }
        std::fs::write(&path, "retry_interval_ms = \"soon\"").unwrap();
        assert!(load_settings(&path).unwrap_err().starts_with("Failed to parse settings"));
        if let Some(dir) = path.parent() {
            let _ = std::fs::remove_dir_all(dir);
        }
    }
}
