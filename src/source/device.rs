use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use capview_katsukity::{Frame, FrameAssembler, KatsukityDevice, TRANSFER_SIZE};

use super::{decode_raw, FrameSource};
use crate::config::CaptureConfig;
use crate::error::{CapviewError, CapviewResult, ResultExt};

/// Consecutive empty reads before the board is considered gone.
const MAX_IDLE_READS: u32 = 5;

/// Live capture from the USB board.
pub struct DeviceSource {
    device: KatsukityDevice,
    assembler: FrameAssembler,
    buf: Vec<u8>,
    ready: VecDeque<Vec<u8>>,
    sequence: u64,
}

impl DeviceSource {
    /// Load the firmware blobs and bring the board up.
    pub fn open(config: &CaptureConfig) -> CapviewResult<Self> {
        let device = connect(config)?;
        Ok(Self {
            device,
            assembler: FrameAssembler::new(),
            buf: vec![0u8; TRANSFER_SIZE],
            ready: VecDeque::new(),
            sequence: 0,
        })
    }
}

impl FrameSource for DeviceSource {
    fn next_frame(&mut self) -> CapviewResult<Option<Frame>> {
        let mut idle = 0;
        loop {
            while let Some(raw) = self.ready.pop_front() {
                match decode_raw(&raw, self.sequence) {
                    Ok(frame) => {
                        self.sequence += 1;
                        return Ok(Some(frame));
                    },
                    Err(e) => log::warn!("[FEED] Skipping damaged frame: {}", e),
                }
            }

            let n = self.device.read_chunk(&mut self.buf)?;
            if n == 0 {
                idle += 1;
                if idle >= MAX_IDLE_READS {
                    return Err(CapviewError::Device(
                        "capture board stopped sending data".to_string(),
                    ));
                }
                continue;
            }
            idle = 0;
            self.ready.extend(self.assembler.push(&self.buf[..n]));
        }
    }

    fn name(&self) -> &str {
        "device"
    }
}

fn connect(config: &CaptureConfig) -> CapviewResult<KatsukityDevice> {
    let firmware_path = config.firmware_path();
    let bitstream_path = config.bitstream_path();
    // Either blob may be unnecessary if the board is already programmed
    let firmware = std::fs::read(&firmware_path).unwrap_or_else(|e| {
        log::debug!("[FEED] No firmware at {}: {}", firmware_path.display(), e);
        Vec::new()
    });
    let bitstream = std::fs::read(&bitstream_path).unwrap_or_else(|e| {
        log::debug!("[FEED] No bitstream at {}: {}", bitstream_path.display(), e);
        Vec::new()
    });

    let device = KatsukityDevice::connect(&firmware, &bitstream, &config.connect_options())?;
    Ok(device)
}

/// Record `chunks` raw bulk transfers from the board into `out`.
///
/// The dump is the concatenated transfer payloads, readable by
/// [`super::ReplaySource`]. Returns the number of bytes written.
pub fn record_raw(config: &CaptureConfig, out: &Path, chunks: usize) -> CapviewResult<u64> {
    let mut device = connect(config)?;
    let file = File::create(out).with_context(|| format!("failed to create {}", out.display()))?;
    let mut writer = BufWriter::new(file);
    let mut buf = vec![0u8; TRANSFER_SIZE];
    let mut written = 0u64;
    let mut recorded = 0usize;
    let mut idle = 0;

    while recorded < chunks {
        let n = device.read_chunk(&mut buf)?;
        if n == 0 {
            idle += 1;
            if idle >= MAX_IDLE_READS {
                log::warn!("[FEED] Board went quiet after {} transfers", recorded);
                break;
            }
            continue;
        }
        idle = 0;
        writer.write_all(&buf[..n])?;
        written += n as u64;
        recorded += 1;
    }

    writer.flush()?;
    device.stop()?;
    log::info!("[FEED] Recorded {} bytes to {}", written, out.display());
    Ok(written)
}
