//! Application configuration.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Global application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Render pipeline settings.
    pub render: RenderSettings,

    /// Logging configuration.
    pub logging: LoggingConfig,
}

/// Settings consumed by the render pipeline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RenderSettings {
    /// Directory where final export renders are written.
    pub export_dir: PathBuf,

    /// Scratch directory for preview renders. Swept periodically.
    pub preview_dir: PathBuf,

    /// Root directory for per-job temp workspaces (generated XML etc.).
    pub temp_dir: PathBuf,

    /// Explicit path to the melt binary. When unset the binary is resolved
    /// from PATH and a set of well-known install locations.
    pub engine_path: Option<PathBuf>,

    /// Minimum interval between progress updates delivered to subscribers,
    /// in milliseconds. The final update is always delivered.
    pub progress_interval_ms: u64,

    /// Watchdog: a job that produces no progress output for this many
    /// seconds is treated as stuck and force-terminated.
    pub progress_timeout_secs: u64,

    /// How long a cancelled process gets to exit after the termination
    /// signal before the kill is escalated, in milliseconds.
    pub cancel_grace_ms: u64,

    /// Temp workspaces older than this are removed by the startup sweep.
    pub orphan_max_age_secs: u64,

    /// Keep generated XML and work directories after the job finishes.
    pub keep_artifacts: bool,
}

/// Logging configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Log level filter (e.g., "info", "debug", "dreamcloud=debug,warn").
    pub level: String,

    /// Whether to output structured JSON logs.
    pub json: bool,

    /// Optional log file path.
    pub file: Option<PathBuf>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            render: RenderSettings::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl Default for RenderSettings {
    fn default() -> Self {
        let base = dreamcloud_home();
        Self {
            export_dir: base.join("renders"),
            preview_dir: base.join("previews"),
            temp_dir: base.join("mlt-temp"),
            engine_path: None,
            progress_interval_ms: 250,
            progress_timeout_secs: 60,
            cancel_grace_ms: 2000,
            orphan_max_age_secs: 24 * 60 * 60,
            keep_artifacts: false,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
            file: None,
        }
    }
}

impl AppConfig {
    /// Load config from the standard location, falling back to defaults.
    pub fn load() -> Self {
        let config_path = config_file_path();
        if config_path.exists() {
            match std::fs::read_to_string(&config_path) {
                Ok(content) => match serde_json::from_str(&content) {
                    Ok(config) => return config,
                    Err(e) => {
                        tracing::warn!("Failed to parse config at {:?}: {}", config_path, e);
                    }
                },
                Err(e) => {
                    tracing::warn!("Failed to read config at {:?}: {}", config_path, e);
                }
            }
        }
        Self::default()
    }

    /// Save config to the standard location.
    pub fn save(&self) -> Result<(), std::io::Error> {
        let config_path = config_file_path();
        if let Some(parent) = config_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let json = serde_json::to_string_pretty(self).map_err(std::io::Error::other)?;
        std::fs::write(config_path, json)
    }
}

/// Standard config file location.
fn config_file_path() -> PathBuf {
    let base = std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".config")
        });
    base.join("dreamcloud").join("config.json")
}

/// The `~/.dreamcloud` state directory used for renders and temp files.
fn dreamcloud_home() -> PathBuf {
    let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
    PathBuf::from(home).join(".dreamcloud")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directories_live_under_dreamcloud_home() {
        let settings = RenderSettings::default();
        assert!(settings.export_dir.ends_with(".dreamcloud/renders"));
        assert!(settings.preview_dir.ends_with(".dreamcloud/previews"));
        assert!(settings.temp_dir.ends_with(".dreamcloud/mlt-temp"));
    }

    #[test]
    fn test_config_roundtrip() {
        let config = AppConfig::default();
        let json = serde_json::to_string_pretty(&config).unwrap();
        let parsed: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.render.progress_interval_ms, 250);
        assert_eq!(parsed.logging.level, "info");
    }
}
