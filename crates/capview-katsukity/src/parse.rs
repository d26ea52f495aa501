//! Capture stream wire format.
//!
//! A frame is 801 lines of 496 bytes. Every line carries 16 bytes of audio
//! and, except in the prelude, 240 RGB565 pixels:
//!
//! ```text
//! line   0..81   [audio 16][unused 480]
//! line  81..400  [audio 16][bottom 480]
//! line 400       [bottom 480][audio 16]
//! line 401..801  [top 480][audio 16]
//! ```
//!
//! Each pixel line is one column of the physical screen.

use crate::error::{KatsukityError, Result};

pub const LINE_SIZE: usize = 496;
pub const LINE_AUDIO_BYTES: usize = 16;
pub const LINE_PIXEL_BYTES: usize = 480;
pub const LINE_PIXELS: usize = LINE_PIXEL_BYTES / 2;

pub const PRELUDE_LINES: usize = 81;
pub const BOTTOM_LINES: usize = 320;
pub const TOP_LINES: usize = 400;
pub const FRAME_LINES: usize = PRELUDE_LINES + BOTTOM_LINES + TOP_LINES;
pub const FRAME_SIZE: usize = FRAME_LINES * LINE_SIZE;

/// Line index where the audio/pixel order flips.
const SWAP_LINE: usize = PRELUDE_LINES + BOTTOM_LINES - 1;

/// Marker at the start of every frame.
pub const FRAME_START: [u8; 4] = [0x33, 0xCC, 0x00, 0x00];

/// One frame split into its raw parts, still RGB565.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitFrame {
    pub top: Vec<u8>,
    pub bottom: Vec<u8>,
    pub audio: Vec<u8>,
}

/// Split a frame (starting at [`FRAME_START`]) into screens and audio.
///
/// Bytes past [`FRAME_SIZE`] are ignored.
pub fn split_frame(data: &[u8]) -> Result<SplitFrame> {
    if data.len() < FRAME_SIZE {
        return Err(KatsukityError::ShortFrame {
            len: data.len(),
            expected: FRAME_SIZE,
        });
    }

    let mut top = Vec::with_capacity(TOP_LINES * LINE_PIXEL_BYTES);
    let mut bottom = Vec::with_capacity(BOTTOM_LINES * LINE_PIXEL_BYTES);
    let mut audio = Vec::with_capacity(FRAME_LINES * LINE_AUDIO_BYTES);

    for (index, line) in data[..FRAME_SIZE].chunks_exact(LINE_SIZE).enumerate() {
        let (head, tail) = line.split_at(LINE_AUDIO_BYTES);
        let (pixels_first, audio_last) = line.split_at(LINE_PIXEL_BYTES);

        if index < PRELUDE_LINES {
            audio.extend_from_slice(head);
        } else if index < SWAP_LINE {
            audio.extend_from_slice(head);
            bottom.extend_from_slice(tail);
        } else if index == SWAP_LINE {
            bottom.extend_from_slice(pixels_first);
            audio.extend_from_slice(audio_last);
        } else {
            top.extend_from_slice(pixels_first);
            audio.extend_from_slice(audio_last);
        }
    }

    Ok(SplitFrame { top, bottom, audio })
}

#[inline]
fn expand565(c: u16) -> [u8; 3] {
    let r = ((c >> 11) & 0x1F) as u8;
    let g = ((c >> 5) & 0x3F) as u8;
    let b = (c & 0x1F) as u8;
    [(r << 3) | (r >> 2), (g << 2) | (g >> 4), (b << 3) | (b >> 2)]
}

/// Little-endian RGB565 to RGBA8 (opaque).
pub fn rgb565_to_rgba(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 4);
    for px in data.chunks_exact(2) {
        let [r, g, b] = expand565(u16::from_le_bytes([px[0], px[1]]));
        out.extend_from_slice(&[r, g, b, 0xFF]);
    }
    out
}

/// Little-endian RGB565 to RGB8.
pub fn rgb565_to_rgb(data: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(data.len() / 2 * 3);
    for px in data.chunks_exact(2) {
        out.extend_from_slice(&expand565(u16::from_le_bytes([px[0], px[1]])));
    }
    out
}

/// Interleaved stereo i16 samples, little-endian.
pub fn decode_audio(data: &[u8]) -> Vec<i16> {
    data.chunks_exact(2)
        .map(|s| i16::from_le_bytes([s[0], s[1]]))
        .collect()
}
