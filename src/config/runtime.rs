//! Audio, session and logging settings.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct AudioConfig {
    /// Play captured audio on the default output device.
    pub enabled: bool,

    /// Output queue length; larger values add latency but survive hiccups.
    pub buffer_ms: u32,

    /// Linear gain applied to samples (0.0 - 2.0).
    pub volume: f32,
}

impl Default for AudioConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buffer_ms: 100,
            volume: 1.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SessionConfig {
    /// Report a failure if no frame arrives within this window.
    pub first_frame_timeout_ms: u64,

    /// Frames buffered per subscriber before frames are dropped.
    pub frame_buffer: usize,

    /// Capacity of the sink event channel; events beyond it are dropped.
    pub event_buffer: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            first_frame_timeout_ms: 15_000,
            frame_buffer: 2,
            event_buffer: 64,
        }
    }
}

impl SessionConfig {
    pub fn first_frame_timeout(&self) -> Duration {
        Duration::from_millis(self.first_frame_timeout_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct LogConfig {
    /// `env_logger` filter, e.g. "info" or "capview=debug". `RUST_LOG` wins.
    pub level: String,

    /// Also append to a dated file in `dir`.
    pub file: bool,

    /// None = `<data dir>/capview/logs`.
    pub dir: Option<PathBuf>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: false,
            dir: None,
        }
    }
}

impl LogConfig {
    pub fn resolved_dir(&self) -> PathBuf {
        self.dir.clone().unwrap_or_else(|| {
            dirs::data_local_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("capview")
                .join("logs")
        })
    }
}
