//! Configuration types.
//!
//! Configuration lives in `<config dir>/guestview/config.toml`. Every field
//! has a default, so a missing file or a partial file is fine.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::error::ConfigError;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Forwarded method tables.
    #[serde(default)]
    pub methods: MethodConfig,

    /// Event names that get an `on<event>` property.
    #[serde(default = "default_events")]
    pub events: Vec<String>,

    /// User agent override added to every guest's construction params.
    #[serde(default)]
    pub user_agent_override: Option<String>,

    #[serde(default)]
    pub runtime: RuntimeConfig,

    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            methods: MethodConfig::default(),
            events: default_events(),
            user_agent_override: None,
            runtime: RuntimeConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl EngineConfig {
    /// Parse configuration from TOML text and validate it.
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig =
            toml::from_str(text).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a file. A missing file yields the defaults.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path).map_err(|e| ConfigError::Io(e.to_string()))?;
        Self::from_toml(&text)
    }

    /// Load configuration from the default location.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_path().ok_or(ConfigError::NoConfigDir)?;
        Self::load_from(&path)
    }

    /// Check the method tables are disjoint and names are non-empty.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for name in self.methods.blocking.iter().chain(&self.methods.non_blocking) {
            if name.trim().is_empty() {
                return Err(ConfigError::InvalidMethodTable(
                    "empty method name".to_string(),
                ));
            }
            if !seen.insert(name.as_str()) {
                return Err(ConfigError::InvalidMethodTable(format!(
                    "'{}' is listed more than once",
                    name
                )));
            }
        }
        Ok(())
    }
}

/// Method names forwarded to the guest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MethodConfig {
    /// Methods called synchronously on the guest handle.
    #[serde(default = "default_blocking_methods")]
    pub blocking: Vec<String>,

    /// Methods sent as one-way async messages.
    #[serde(default = "default_non_blocking_methods")]
    pub non_blocking: Vec<String>,
}

impl Default for MethodConfig {
    fn default() -> Self {
        Self {
            blocking: default_blocking_methods(),
            non_blocking: default_non_blocking_methods(),
        }
    }
}

/// Owning-thread runtime settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuntimeConfig {
    /// Timeout for round trips into the runtime thread, in milliseconds.
    #[serde(default = "default_request_timeout_ms")]
    pub request_timeout_ms: u64,
}

impl RuntimeConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            request_timeout_ms: default_request_timeout_ms(),
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default `EnvFilter` directive when `RUST_LOG` is unset.
    #[serde(default = "default_log_filter")]
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: default_log_filter(),
        }
    }
}

/// Get the config directory path.
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("guestview"))
}

/// Get the path to config.toml.
pub fn config_path() -> Option<PathBuf> {
    config_dir().map(|p| p.join("config.toml"))
}

// =============================================================================
// Defaults
// =============================================================================

fn to_strings(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn default_blocking_methods() -> Vec<String> {
    to_strings(&[
        "getURL",
        "getTitle",
        "isLoading",
        "isWaitingForResponse",
        "stop",
        "reload",
        "reloadIgnoringCache",
        "canGoBack",
        "canGoForward",
        "canGoToOffset",
        "clearHistory",
        "goBack",
        "goForward",
        "goToIndex",
        "goToOffset",
        "isCrashed",
        "setUserAgent",
        "getUserAgent",
        "openDevTools",
        "closeDevTools",
        "isDevToolsOpened",
        "isDevToolsFocused",
        "inspectElement",
        "setAudioMuted",
        "isAudioMuted",
        "undo",
        "redo",
        "cut",
        "copy",
        "paste",
        "pasteAndMatchStyle",
        "delete",
        "selectAll",
        "unselect",
        "replace",
        "replaceMisspelling",
        "findInPage",
        "stopFindInPage",
        "getId",
        "downloadURL",
        "inspectServiceWorker",
        "print",
        "printToPDF",
    ])
}

fn default_non_blocking_methods() -> Vec<String> {
    to_strings(&[
        "executeJavaScript",
        "insertCSS",
        "insertText",
        "send",
        "sendInputEvent",
        "setZoomFactor",
        "setZoomLevel",
        "setZoomLevelLimits",
    ])
}

fn default_events() -> Vec<String> {
    to_strings(&[
        "load-commit",
        "did-attach",
        "did-finish-load",
        "did-fail-load",
        "did-frame-finish-load",
        "did-start-loading",
        "did-stop-loading",
        "did-get-response-details",
        "did-get-redirect-request",
        "dom-ready",
        "console-message",
        "devtools-opened",
        "devtools-closed",
        "devtools-focused",
        "new-window",
        "will-navigate",
        "did-navigate",
        "did-navigate-in-page",
        "close",
        "crashed",
        "gpu-crashed",
        "plugin-crashed",
        "destroyed",
        "page-title-updated",
        "page-favicon-updated",
        "enter-html-full-screen",
        "leave-html-full-screen",
        "media-started-playing",
        "media-paused",
        "found-in-page",
        "did-change-theme-color",
        "ipc-message",
        "size-changed",
        "resize",
    ])
}

fn default_request_timeout_ms() -> u64 {
    5000
}

fn default_log_filter() -> String {
    "info".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = EngineConfig::default();
        config.validate().unwrap();
        assert!(config.methods.blocking.contains(&"goBack".to_string()));
        assert!(config.methods.non_blocking.contains(&"executeJavaScript".to_string()));
        assert!(config.events.contains(&"resize".to_string()));
        assert_eq!(config.runtime.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = EngineConfig::from_toml(
            r#"
            user_agent_override = "Embedder/1.0"

            [methods]
            non_blocking = ["executeJavaScript"]

            [logging]
            filter = "guestview_engine=debug"
            "#,
        )
        .unwrap();

        assert_eq!(config.user_agent_override.as_deref(), Some("Embedder/1.0"));
        assert_eq!(config.methods.non_blocking, vec!["executeJavaScript"]);
        assert!(!config.methods.blocking.is_empty());
        assert_eq!(config.logging.filter, "guestview_engine=debug");
        assert_eq!(config.runtime.request_timeout_ms, 5000);
    }

    #[test]
    fn test_overlapping_tables_rejected() {
        let err = EngineConfig::from_toml(
            r#"
            [methods]
            blocking = ["stop"]
            non_blocking = ["stop"]
            "#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidMethodTable(_)));
    }

    #[test]
    fn test_parse_error() {
        let err = EngineConfig::from_toml("events = 3").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");

        // Missing file -> defaults
        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.logging.filter, "info");

        std::fs::write(&path, "[runtime]\nrequest_timeout_ms = 250\n").unwrap();
        let config = EngineConfig::load_from(&path).unwrap();
        assert_eq!(config.runtime.request_timeout(), Duration::from_millis(250));
    }
}
