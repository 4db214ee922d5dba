//! External render engine discovery and version probing.
//!
//! The melt binary is resolved from an explicit override, then `PATH`, then
//! a short list of well-known install locations (package managers put it in
//! different places, and GUI-launched processes do not always inherit a
//! useful `PATH`). Probe results are cached with a short TTL so repeated
//! render requests do not re-spawn `melt --version` every time.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio::sync::Mutex;

use dreamcloud_common::{DreamcloudError, DreamcloudResult};

/// How long a probe result stays valid.
pub const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(30);

/// Upper bound on the `--version` probe.
const VERSION_PROBE_TIMEOUT: Duration = Duration::from_secs(3);

/// Oldest engine release with stable `-progress2` support.
const MIN_SUPPORTED_MAJOR: u32 = 6;

const WELL_KNOWN_PATHS: &[&str] = &[
    "/usr/bin/melt",
    "/usr/local/bin/melt",
    "/opt/homebrew/bin/melt",
];

/// Snapshot of the engine binary's presence and version.
#[derive(Debug, Clone, Serialize)]
pub struct MeltCheckResult {
    pub available: bool,
    pub version: Option<String>,
    pub path: Option<PathBuf>,
    pub error: Option<String>,
}

impl MeltCheckResult {
    fn unavailable(error: impl Into<String>) -> Self {
        Self {
            available: false,
            version: None,
            path: None,
            error: Some(error.into()),
        }
    }
}

/// Cached availability checker for the external engine.
pub struct EngineChecker {
    path_override: Option<PathBuf>,
    ttl: Duration,
    cached: Mutex<Option<(Instant, MeltCheckResult)>>,
}

impl EngineChecker {
    pub fn new(path_override: Option<PathBuf>) -> Self {
        Self::with_ttl(path_override, DEFAULT_CACHE_TTL)
    }

    pub fn with_ttl(path_override: Option<PathBuf>, ttl: Duration) -> Self {
        Self {
            path_override,
            ttl,
            cached: Mutex::new(None),
        }
    }

    /// Check engine availability, reusing a recent probe when possible.
    pub async fn check(&self) -> MeltCheckResult {
        let mut cached = self.cached.lock().await;
        if let Some((at, result)) = cached.as_ref() {
            if at.elapsed() < self.ttl {
                return result.clone();
            }
        }
        let result = self.probe().await;
        *cached = Some((Instant::now(), result.clone()));
        result
    }

    /// The engine version string, if the engine is usable.
    pub async fn version(&self) -> Option<String> {
        self.check().await.version
    }

    /// Resolve a usable engine binary or fail fast.
    pub async fn require(&self) -> DreamcloudResult<PathBuf> {
        let result = self.check().await;
        if !result.available {
            return Err(DreamcloudError::engine_not_found(result.error.unwrap_or_else(
                || "melt not found. Install with: sudo apt install melt".to_string(),
            )));
        }
        if let Some(version) = &result.version {
            if let Some(major) = major_version(version) {
                if major < MIN_SUPPORTED_MAJOR {
                    return Err(DreamcloudError::engine_version(format!(
                        "melt {version} is too old, {MIN_SUPPORTED_MAJOR}.0 or newer is required"
                    )));
                }
            }
        }
        result
            .path
            .ok_or_else(|| DreamcloudError::engine_not_found("engine path missing from probe"))
    }

    /// Drop the cached probe result.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }

    fn resolve_binary(&self) -> Option<PathBuf> {
        if let Some(path) = &self.path_override {
            // An explicit override is authoritative; do not fall back.
            return path.exists().then(|| path.clone());
        }

        if let Ok(path) = which::which("melt") {
            return Some(path);
        }

        WELL_KNOWN_PATHS
            .iter()
            .map(Path::new)
            .find(|p| p.exists())
            .map(Path::to_path_buf)
    }

    async fn probe(&self) -> MeltCheckResult {
        let Some(path) = self.resolve_binary() else {
            return MeltCheckResult::unavailable(
                "melt not found. Install with: sudo apt install melt",
            );
        };

        let output = tokio::time::timeout(
            VERSION_PROBE_TIMEOUT,
            tokio::process::Command::new(&path)
                .arg("--version")
                .kill_on_drop(true)
                .output(),
        )
        .await;

        match output {
            Err(_) => MeltCheckResult::unavailable(format!(
                "{} did not answer a version probe within {}s",
                path.display(),
                VERSION_PROBE_TIMEOUT.as_secs()
            )),
            Ok(Err(e)) => {
                MeltCheckResult::unavailable(format!("failed to run {}: {e}", path.display()))
            }
            Ok(Ok(output)) if !output.status.success() => MeltCheckResult::unavailable(format!(
                "{} exited with {} on a version probe",
                path.display(),
                output.status
            )),
            Ok(Ok(output)) => {
                let stdout = String::from_utf8_lossy(&output.stdout);
                let version = parse_version(&stdout);
                tracing::debug!(
                    path = %path.display(),
                    version = version.as_deref().unwrap_or("unknown"),
                    "Engine probe succeeded"
                );
                MeltCheckResult {
                    available: true,
                    version,
                    path: Some(path),
                    error: None,
                }
            }
        }
    }
}

/// Extract a version number from `melt --version` output (`melt 7.22.0`).
fn parse_version(output: &str) -> Option<String> {
    output
        .split_whitespace()
        .find(|token| token.chars().next().is_some_and(|c| c.is_ascii_digit()))
        .map(str::to_string)
}

/// Leading major component of a version string.
fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.parse().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_version_from_probe_output() {
        assert_eq!(parse_version("melt 7.22.0\n"), Some("7.22.0".to_string()));
        assert_eq!(parse_version("melt (MLT) 6.26.1"), Some("6.26.1".to_string()));
        assert_eq!(parse_version("no digits here"), None);
    }

    #[test]
    fn test_major_version() {
        assert_eq!(major_version("7.22.0"), Some(7));
        assert_eq!(major_version("6"), Some(6));
        assert_eq!(major_version("garbage"), None);
    }

    #[tokio::test]
    async fn test_missing_override_is_unavailable() {
        let checker = EngineChecker::new(Some(PathBuf::from("/nonexistent/melt-binary")));
        let result = checker.check().await;
        assert!(!result.available);
        assert!(result.path.is_none());
        assert!(result.error.is_some());
    }

    #[tokio::test]
    async fn test_require_fails_fast_when_unavailable() {
        let checker = EngineChecker::new(Some(PathBuf::from("/nonexistent/melt-binary")));
        let err = checker.require().await.unwrap_err();
        assert!(matches!(err, DreamcloudError::EngineNotFound { .. }));
    }

    #[tokio::test]
    async fn test_check_caches_the_probe() {
        let checker = EngineChecker::new(Some(PathBuf::from("/nonexistent/melt-binary")));
        let first = checker.check().await;
        let second = checker.check().await;
        assert_eq!(first.available, second.available);
        checker.invalidate().await;
        assert!(!checker.check().await.available);
    }
}
