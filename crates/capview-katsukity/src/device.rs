//! Device discovery and the streaming handle.

use std::thread;
use std::time::{Duration, Instant};

use rusb::{DeviceHandle, GlobalContext};

use crate::assembler::TRANSFER_SIZE;
use crate::error::{KatsukityError, Result};
use crate::{fpga, fx2};

pub const VENDOR_ID: u16 = 0x0752;
pub const BOOTLOADER_PID: u16 = 0x8613;
pub const PROGRAMMED_PID: u16 = 0xF2C0;

/// Capture hardware we recognise on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KnownDevice {
    pub name: &'static str,
    pub vendor_id: u16,
    pub product_id: u16,
    pub supported: bool,
}

pub const KNOWN_DEVICES: &[KnownDevice] = &[
    KnownDevice {
        name: "Katsukity (FX2 bootloader)",
        vendor_id: VENDOR_ID,
        product_id: BOOTLOADER_PID,
        supported: true,
    },
    KnownDevice {
        name: "Katsukity",
        vendor_id: VENDOR_ID,
        product_id: PROGRAMMED_PID,
        supported: true,
    },
    KnownDevice {
        name: "loopy USB-DS",
        vendor_id: 0x16D0,
        product_id: 0x0647,
        supported: false,
    },
];

pub fn lookup(vendor_id: u16, product_id: u16) -> Option<&'static KnownDevice> {
    KNOWN_DEVICES
        .iter()
        .find(|d| d.vendor_id == vendor_id && d.product_id == product_id)
}

/// A recognised device present on the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachedDevice {
    pub known: &'static KnownDevice,
    pub bus: u8,
    pub address: u8,
}

/// List recognised capture devices currently attached.
pub fn scan() -> Result<Vec<AttachedDevice>> {
    let mut found = Vec::new();
    for device in rusb::devices()?.iter() {
        let desc = match device.device_descriptor() {
            Ok(desc) => desc,
            Err(e) => {
                tracing::debug!("[KATSUKITY] Skipping device without descriptor: {}", e);
                continue;
            }
        };
        if let Some(known) = lookup(desc.vendor_id(), desc.product_id()) {
            found.push(AttachedDevice {
                known,
                bus: device.bus_number(),
                address: device.address(),
            });
        }
    }
    Ok(found)
}

/// Timing knobs for [`KatsukityDevice::connect`].
#[derive(Debug, Clone)]
pub struct ConnectOptions {
    /// Timeout for individual control/bulk transfers.
    pub transfer_timeout: Duration,
    /// How long to wait for the board to come back after the firmware upload.
    pub reenumeration_timeout: Duration,
    pub poll_interval: Duration,
    /// Pause after the FPGA bitstream before it answers.
    pub fpga_settle: Duration,
}

impl Default for ConnectOptions {
    fn default() -> Self {
        Self {
            transfer_timeout: Duration::from_millis(1000),
            reenumeration_timeout: Duration::from_secs(10),
            poll_interval: Duration::from_millis(250),
            fpga_settle: Duration::from_secs(1),
        }
    }
}

/// An open, streaming capture board.
pub struct KatsukityDevice {
    handle: DeviceHandle<GlobalContext>,
    timeout: Duration,
    streaming: bool,
}

impl KatsukityDevice {
    /// Bring the board up and start the video FIFO.
    ///
    /// `firmware` is only needed when the board still runs the FX2
    /// bootloader, `bitstream` only when the FPGA is unconfigured.
    pub fn connect(firmware: &[u8], bitstream: &[u8], opts: &ConnectOptions) -> Result<Self> {
        if let Some(mut boot) = rusb::open_device_with_vid_pid(VENDOR_ID, BOOTLOADER_PID) {
            tracing::info!("[KATSUKITY] Bootloader found, uploading FX2 firmware");
            if firmware.is_empty() {
                return Err(KatsukityError::NotFound("FX2 firmware image is empty".to_string()));
            }
            fx2::send_firmware(&mut boot, firmware, opts.transfer_timeout)?;
            drop(boot);
        }

        let mut handle = wait_for_programmed(opts)?;
        // Not supported on every platform
        let _ = handle.set_auto_detach_kernel_driver(true);
        handle.claim_interface(0)?;

        let timeout = opts.transfer_timeout;
        fpga::read_eeprom(&handle, timeout)?;

        if fpga::is_programmed(&handle, timeout) {
            tracing::info!("[KATSUKITY] FPGA already configured");
        } else {
            if bitstream.is_empty() {
                return Err(KatsukityError::Fpga("bitstream is empty".to_string()));
            }
            fpga::configure(&handle, bitstream, timeout, opts.fpga_settle)?;
        }

        fpga::configure_port(&handle, timeout)?;
        fpga::fifo_start(&handle, timeout)?;
        tracing::info!("[KATSUKITY] Streaming started");

        Ok(Self {
            handle,
            timeout,
            streaming: true,
        })
    }

    /// Read one bulk transfer from the video endpoint into `buf`.
    ///
    /// A timeout yields `Ok(0)` so callers can poll a stop flag.
    pub fn read_chunk(&self, buf: &mut [u8]) -> Result<usize> {
        let len = buf.len().min(TRANSFER_SIZE);
        match self.handle.read_bulk(fpga::EP_VIDEO_IN, &mut buf[..len], self.timeout) {
            Ok(n) => Ok(n),
            Err(rusb::Error::Timeout) => Ok(0),
            Err(e) => Err(e.into()),
        }
    }

    /// Stop the FIFO and release the interface. Idempotent.
    pub fn stop(&mut self) -> Result<()> {
        if !self.streaming {
            return Ok(());
        }
        self.streaming = false;
        fpga::fifo_stop(&self.handle, self.timeout)?;
        self.handle.release_interface(0)?;
        tracing::info!("[KATSUKITY] Streaming stopped");
        Ok(())
    }
}

impl Drop for KatsukityDevice {
    fn drop(&mut self) {
        if let Err(e) = self.stop() {
            tracing::warn!("[KATSUKITY] Failed to stop device cleanly: {}", e);
        }
    }
}

fn wait_for_programmed(opts: &ConnectOptions) -> Result<DeviceHandle<GlobalContext>> {
    let deadline = Instant::now() + opts.reenumeration_timeout;
    loop {
        if let Some(handle) = rusb::open_device_with_vid_pid(VENDOR_ID, PROGRAMMED_PID) {
            return Ok(handle);
        }
        if Instant::now() >= deadline {
            return if rusb::open_device_with_vid_pid(VENDOR_ID, BOOTLOADER_PID).is_some() {
                Err(KatsukityError::ReenumerationTimeout)
            } else {
                Err(KatsukityError::NotFound(format!(
                    "no device {:04x}:{:04x} or {:04x}:{:04x}",
                    VENDOR_ID, PROGRAMMED_PID, VENDOR_ID, BOOTLOADER_PID
                )))
            };
        }
        thread::sleep(opts.poll_interval);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_known_devices() {
        assert!(lookup(VENDOR_ID, PROGRAMMED_PID).unwrap().supported);
        assert!(lookup(VENDOR_ID, BOOTLOADER_PID).unwrap().supported);
        assert!(!lookup(0x16D0, 0x0647).unwrap().supported);
        assert!(lookup(0x1234, 0x5678).is_none());
    }

    #[test]
    fn test_default_options_wait_longer_than_poll() {
        let opts = ConnectOptions::default();
        assert!(opts.reenumeration_timeout > opts.poll_interval);
    }
}
