//! Driver for the Katsukity handheld capture board.
//!
//! The board is a Cypress FX2 in front of an FPGA. Bring-up uploads the FX2
//! firmware, configures the FPGA and starts a FIFO that streams frames of
//! both console screens plus audio over bulk endpoint `0x82`.
//!
//! ```ignore
//! let mut device = KatsukityDevice::connect(&firmware, &bitstream, &ConnectOptions::default())?;
//! let mut asm = FrameAssembler::new();
//! let mut buf = vec![0u8; TRANSFER_SIZE];
//! let n = device.read_chunk(&mut buf)?;
//! for raw in asm.push(&buf[..n]) {
//!     let frame = Frame::from_split(0, &split_frame(&raw)?)?;
//! }
//! ```

mod assembler;
mod device;
mod error;
mod fpga;
mod frame;
mod fx2;
pub mod parse;

pub use assembler::{FrameAssembler, TRANSFER_SIZE};
pub use device::{
    lookup, scan, AttachedDevice, ConnectOptions, KatsukityDevice, KnownDevice, BOOTLOADER_PID,
    KNOWN_DEVICES, PROGRAMMED_PID, VENDOR_ID,
};
pub use error::{KatsukityError, Result};
pub use frame::{Frame, Screen, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};
pub use parse::{split_frame, SplitFrame, FRAME_SIZE};
