//! Board bring-up once the FX2 runs the capture firmware.

use std::thread;
use std::time::Duration;

use rusb::{DeviceHandle, UsbContext};

use crate::error::{KatsukityError, Result};

pub const EP_COMMAND_OUT: u8 = 0x01;
pub const EP_COMMAND_IN: u8 = 0x81;
pub const EP_VIDEO_IN: u8 = 0x82;

const BITSTREAM_CHUNK: usize = 62;
const BITSTREAM_PREFIX: [u8; 2] = [0x60, 0x1F];

/// Status the FX2 returns when no bitstream has been loaded.
const FPGA_EMPTY_RESPONSE: [u8; 7] = [0x09, 0x02, 0x27, 0x00, 0x01, 0x01, 0x00];

const SETUP_COMMANDS: &[&str] = &[
    "646001ffff600200ff00ff",
    "600230ff60c9600120ff610400ff00ff00ff80ff600101ff",
    "600230ff60c9600120ff610400ff00ff00ff80ff600101ff",
    "70",
    "600230ff60d0600230ff60cb600200ff00ff",
    "600230ff60f1600120ff610800ff00ff00ff00ff00ff00ff00ff80ff600101ff600200ff00ff",
    "600200ff00ff600230ff60cb600230ff60c56664600230ff60c5",
    "600120ff",
    "60040000000000008000",
    "600101ff",
    "600230ff60c5",
    "600120ff",
];

/// Sent after the bitstream; selects RGB565 output.
const FINISH_COMMANDS: &[&str] = &[
    "600b00000004000000040000000400000004000000048000",
    "600101ff",
    "600230ff60d6600200ff00ff600230ff60ff600120ff",
    "60018000",
    "600101ff",
    "600230ff60cc600200ff00ff600230ff60ff600230ff60ff",
    "71038f9db726685e0140c300000230ff6065",
    "64600200ff00ff600230ff60c2600120ff",
    "6107000f003e00f800100056800a0100",
];

fn decode_commands(commands: &[&str]) -> Result<Vec<Vec<u8>>> {
    commands
        .iter()
        .map(|c| hex::decode(c).map_err(|e| KatsukityError::Fpga(format!("bad command {}: {}", c, e))))
        .collect()
}

/// Bitstream split into prefixed bulk packets.
pub(crate) fn bitstream_packets(bitstream: &[u8]) -> impl Iterator<Item = Vec<u8>> + '_ {
    bitstream.chunks(BITSTREAM_CHUNK).map(|chunk| {
        let mut packet = Vec::with_capacity(BITSTREAM_PREFIX.len() + chunk.len());
        packet.extend_from_slice(&BITSTREAM_PREFIX);
        packet.extend_from_slice(chunk);
        packet
    })
}

/// Read the 128-byte configuration EEPROM in 16-byte pages.
pub fn read_eeprom<T: UsbContext>(handle: &DeviceHandle<T>, timeout: Duration) -> Result<Vec<u8>> {
    let mut eeprom = Vec::with_capacity(128);
    let mut page = [0u8; 16];

    for offset in (0x00..=0x70u8).step_by(0x10) {
        handle.write_bulk(EP_COMMAND_OUT, &[0x38, offset, 0x10, 0x30], timeout)?;
        let n = handle.read_bulk(EP_COMMAND_IN, &mut page, timeout)?;
        eeprom.extend_from_slice(&page[..n]);
    }

    tracing::debug!("[KATSUKITY] EEPROM: {:02X?}", eeprom);
    Ok(eeprom)
}

/// Whether the FPGA already holds a bitstream (survives USB re-plugs
/// while the board stays powered).
pub fn is_programmed<T: UsbContext>(handle: &DeviceHandle<T>, timeout: Duration) -> bool {
    let mut status = [0u8; 7];
    match handle.read_bulk(EP_COMMAND_IN, &mut status, timeout) {
        Ok(_) => {
            tracing::debug!("[KATSUKITY] FPGA status {:02X?}", status);
            status != FPGA_EMPTY_RESPONSE
        }
        Err(e) => {
            tracing::debug!("[KATSUKITY] FPGA status read failed: {}", e);
            false
        }
    }
}

pub fn configure<T: UsbContext>(
    handle: &DeviceHandle<T>,
    bitstream: &[u8],
    timeout: Duration,
    settle: Duration,
) -> Result<()> {
    for command in decode_commands(SETUP_COMMANDS)? {
        handle.write_bulk(EP_COMMAND_OUT, &command, timeout)?;
    }

    let mut packets = 0usize;
    for packet in bitstream_packets(bitstream) {
        handle.write_bulk(EP_COMMAND_OUT, &packet, timeout)?;
        packets += 1;
    }
    tracing::info!("[KATSUKITY] FPGA bitstream sent in {} packets", packets);

    for command in decode_commands(FINISH_COMMANDS)? {
        handle.write_bulk(EP_COMMAND_OUT, &command, timeout)?;
    }

    thread::sleep(settle);

    // The FPGA answers with its id string once it is up
    let mut id = [0u8; 7];
    let n = handle
        .read_bulk(EP_COMMAND_IN, &mut id, timeout)
        .map_err(|e| KatsukityError::Fpga(format!("no id after configuration: {}", e)))?;
    tracing::info!("[KATSUKITY] FPGA id {:02X?}", &id[..n]);

    Ok(())
}

pub fn configure_port<T: UsbContext>(handle: &DeviceHandle<T>, timeout: Duration) -> Result<()> {
    handle.write_bulk(EP_COMMAND_OUT, &[0x65], timeout)?;
    Ok(())
}

pub fn fifo_start<T: UsbContext>(handle: &DeviceHandle<T>, timeout: Duration) -> Result<()> {
    handle.write_bulk(EP_COMMAND_OUT, &[0x5B, 0x59, 0x03], timeout)?;
    handle.write_bulk(EP_COMMAND_OUT, &[0x40], timeout)?;
    Ok(())
}

pub fn fifo_stop<T: UsbContext>(handle: &DeviceHandle<T>, timeout: Duration) -> Result<()> {
    handle.write_bulk(EP_COMMAND_OUT, &[0x41], timeout)?;
    Ok(())
}
