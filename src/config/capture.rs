//! Frame source and capture board settings.

use std::path::PathBuf;
use std::time::Duration;

use capview_katsukity::ConnectOptions;
use serde::{Deserialize, Serialize};

/// Where frames come from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum SourceKind {
    /// Live capture board over USB.
    #[default]
    Device,
    /// Raw bulk dump recorded with `capview record`.
    Replay,
    /// Generated test pattern, no hardware needed.
    Pattern,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SourceConfig {
    pub kind: SourceKind,

    /// Dump file read by the replay source.
    pub replay_path: Option<PathBuf>,

    /// Start over at end of file instead of ending the stream.
    pub replay_loop: bool,

    /// Pacing for replay and pattern sources. 0 = as fast as possible.
    pub frame_rate: u32,

    /// Pattern frames to generate. None = endless.
    pub pattern_frames: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Device,
            replay_path: None,
            replay_loop: true,
            frame_rate: 60,
            pattern_frames: None,
        }
    }
}

impl SourceConfig {
    /// Delay between frames for paced sources.
    pub fn frame_interval(&self) -> Option<Duration> {
        (self.frame_rate > 0).then(|| Duration::from_secs_f64(1.0 / self.frame_rate as f64))
    }
}

/// Capture board bring-up settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct CaptureConfig {
    /// Directory holding the FX2 firmware and FPGA bitstream.
    /// None = `<data dir>/capview/firmware`.
    pub firmware_dir: Option<PathBuf>,
    pub firmware_file: String,
    pub bitstream_file: String,

    pub transfer_timeout_ms: u64,
    pub reenumeration_timeout_ms: u64,
    pub poll_interval_ms: u64,
    pub fpga_settle_ms: u64,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            firmware_dir: None,
            firmware_file: "firm.bin".to_string(),
            bitstream_file: "bitstream.bin".to_string(),
            transfer_timeout_ms: 1000,
            reenumeration_timeout_ms: 10_000,
            poll_interval_ms: 250,
            fpga_settle_ms: 1000,
        }
    }
}

impl CaptureConfig {
    pub fn resolved_firmware_dir(&self) -> PathBuf {
        self.firmware_dir.clone().unwrap_or_else(|| {
            dirs::data_dir()
                .unwrap_or_else(std::env::temp_dir)
                .join("capview")
                .join("firmware")
        })
    }

    pub fn firmware_path(&self) -> PathBuf {
        self.resolved_firmware_dir().join(&self.firmware_file)
    }

    pub fn bitstream_path(&self) -> PathBuf {
        self.resolved_firmware_dir().join(&self.bitstream_file)
    }

    pub fn connect_options(&self) -> ConnectOptions {
        ConnectOptions {
            transfer_timeout: Duration::from_millis(self.transfer_timeout_ms),
            reenumeration_timeout: Duration::from_millis(self.reenumeration_timeout_ms),
            poll_interval: Duration::from_millis(self.poll_interval_ms),
            fpga_settle: Duration::from_millis(self.fpga_settle_ms),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_interval() {
        let mut source = SourceConfig::default();
        assert_eq!(source.frame_interval().unwrap().as_micros(), 16_666);

        source.frame_rate = 0;
        assert!(source.frame_interval().is_none());
    }

    #[test]
    fn test_firmware_paths() {
        let capture = CaptureConfig {
            firmware_dir: Some(PathBuf::from("/opt/fw")),
            ..Default::default()
        };
        assert_eq!(capture.firmware_path(), PathBuf::from("/opt/fw/firm.bin"));
        assert_eq!(capture.bitstream_path(), PathBuf::from("/opt/fw/bitstream.bin"));
    }

    #[test]
    fn test_connect_options() {
        let opts = CaptureConfig::default().connect_options();
        assert_eq!(opts.transfer_timeout, Duration::from_secs(1));
        assert_eq!(opts.reenumeration_timeout, Duration::from_secs(10));
    }

    #[test]
    fn test_source_kind_serde() {
        let kind: SourceKind = serde_json::from_str("\"replay\"").unwrap();
        assert_eq!(kind, SourceKind::Replay);
        assert!(serde_json::from_str::<SourceKind>("\"camera\"").is_err());
    }
}
