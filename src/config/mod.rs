//! Configuration for sinks, sources and the CLI.
//!
//! One JSON document (`capview.json`, camelCase keys) with every field
//! defaulted, so a missing file or a partial file is fine.
//!
//! ## Resolution order
//!
//! 1. explicit path (CLI `--config`, `capview_sink_new(path)`)
//! 2. `CAPVIEW_CONFIG`
//! 3. `<config dir>/capview/capview.json`

pub mod capture;
pub mod render;
pub mod runtime;

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub use capture::{CaptureConfig, SourceConfig, SourceKind};
pub use render::{Layout, RenderConfig};
pub use runtime::{AudioConfig, LogConfig, SessionConfig};

use crate::error::{CapviewError, CapviewResult, ResultExt};

/// Environment variable overriding the config location.
pub const CONFIG_ENV: &str = "CAPVIEW_CONFIG";

const CONFIG_FILE: &str = "capview.json";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CapviewConfig {
    pub source: SourceConfig,
    pub capture: CaptureConfig,
    pub render: RenderConfig,
    pub audio: AudioConfig,
    pub session: SessionConfig,
    pub log: LogConfig,
}

impl CapviewConfig {
    /// Resolve the config path and load it. A missing file yields defaults.
    pub fn load(explicit: Option<&Path>) -> CapviewResult<Self> {
        let env = std::env::var_os(CONFIG_ENV).map(PathBuf::from);
        match resolve_path(explicit, env, dirs::config_dir()) {
            Some(path) if path.exists() => Self::from_file(&path),
            Some(path) => {
                if explicit.is_some() {
                    return Err(CapviewError::Config(format!(
                        "config file not found: {}",
                        path.display()
                    )));
                }
                log::debug!("[CONFIG] No config at {}, using defaults", path.display());
                Ok(Self::default())
            },
            None => Ok(Self::default()),
        }
    }

    pub fn from_file(path: &Path) -> CapviewResult<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        let config = Self::from_json(&text)?;
        log::info!("[CONFIG] Loaded {}", path.display());
        Ok(config)
    }

    pub fn from_json(text: &str) -> CapviewResult<Self> {
        let config: Self = serde_json::from_str(text)
            .map_err(|e| CapviewError::Config(format!("invalid config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    pub fn save(&self, path: &Path) -> CapviewResult<()> {
        self.validate()?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, serde_json::to_string_pretty(self)?)?;
        Ok(())
    }

    /// Reject settings that would stall or spin.
    pub fn validate(&self) -> CapviewResult<()> {
        let zero = |name: &str| -> CapviewResult<()> {
            Err(CapviewError::Config(format!("{} must be greater than zero", name)))
        };

        if self.capture.transfer_timeout_ms == 0 {
            return zero("capture.transferTimeoutMs");
        }
        if self.capture.reenumeration_timeout_ms == 0 {
            return zero("capture.reenumerationTimeoutMs");
        }
        if self.capture.poll_interval_ms == 0 {
            return zero("capture.pollIntervalMs");
        }
        if self.session.first_frame_timeout_ms == 0 {
            return zero("session.firstFrameTimeoutMs");
        }
        if self.session.frame_buffer == 0 {
            return zero("session.frameBuffer");
        }
        if self.session.event_buffer == 0 {
            return zero("session.eventBuffer");
        }
        if self.audio.buffer_ms == 0 {
            return zero("audio.bufferMs");
        }
        if !(0.0..=2.0).contains(&self.audio.volume) {
            return Err(CapviewError::Config(format!(
                "audio.volume {} outside 0.0-2.0",
                self.audio.volume
            )));
        }
        if self.source.kind == SourceKind::Replay && self.source.replay_path.is_none() {
            return Err(CapviewError::Config(
                "source.replayPath is required for the replay source".to_string(),
            ));
        }
        Ok(())
    }
}

/// Pick the config path: explicit, then environment, then the user config dir.
pub fn resolve_path(
    explicit: Option<&Path>,
    env: Option<PathBuf>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    explicit
        .map(Path::to_path_buf)
        .or(env)
        .or_else(|| config_dir.map(|d| d.join("capview").join(CONFIG_FILE)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = CapviewConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.source.kind, SourceKind::Device);
        assert_eq!(config.render.layout, Layout::Stacked);
    }

    #[test]
    fn test_partial_json_uses_defaults() {
        let config = CapviewConfig::from_json(
            r#"{ "source": { "kind": "pattern" }, "render": { "layout": "sideBySide" } }"#,
        )
        .unwrap();

        assert_eq!(config.source.kind, SourceKind::Pattern);
        assert_eq!(config.source.frame_rate, 60);
        assert_eq!(config.render.layout, Layout::SideBySide);
        assert!(config.audio.enabled);
    }

    #[test]
    fn test_unknown_layout_rejected() {
        let err = CapviewConfig::from_json(r#"{ "render": { "layout": "diagonal" } }"#).unwrap_err();
        assert!(matches!(err, CapviewError::Config(_)));
    }

    #[test]
    fn test_zero_timeout_rejected() {
        let err =
            CapviewConfig::from_json(r#"{ "session": { "firstFrameTimeoutMs": 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("firstFrameTimeoutMs"));
    }

    #[test]
    fn test_replay_needs_path() {
        let err = CapviewConfig::from_json(r#"{ "source": { "kind": "replay" } }"#).unwrap_err();
        assert!(err.to_string().contains("replayPath"));
    }

    #[test]
    fn test_resolve_path_order() {
        let explicit = PathBuf::from("/a/explicit.json");
        let env = PathBuf::from("/b/env.json");
        let dir = PathBuf::from("/c");

        assert_eq!(
            resolve_path(Some(&explicit), Some(env.clone()), Some(dir.clone())),
            Some(explicit)
        );
        assert_eq!(resolve_path(None, Some(env.clone()), Some(dir.clone())), Some(env));
        assert_eq!(
            resolve_path(None, None, Some(dir)),
            Some(PathBuf::from("/c/capview/capview.json"))
        );
        assert_eq!(resolve_path(None, None, None), None);
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("capview.json");

        let mut config = CapviewConfig::default();
        config.render.layout = Layout::TopOnly;
        config.audio.enabled = false;
        config.save(&path).unwrap();

        let loaded = CapviewConfig::load(Some(&path)).unwrap();
        assert_eq!(loaded.render.layout, Layout::TopOnly);
        assert!(!loaded.audio.enabled);
    }

    #[test]
    fn test_missing_explicit_file_is_error() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("nope.json");
        assert!(CapviewConfig::load(Some(&missing)).is_err());
    }
}
