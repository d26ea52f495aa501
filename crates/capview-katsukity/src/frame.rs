use crate::error::{KatsukityError, Result};
use crate::parse::{self, SplitFrame, BOTTOM_LINES, LINE_PIXELS, TOP_LINES};

/// Native audio rate of the console's DAC.
pub const AUDIO_SAMPLE_RATE: u32 = 32_728;
pub const AUDIO_CHANNELS: u16 = 2;

/// The two console screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Screen {
    Top,
    Bottom,
}

impl Screen {
    /// Number of scan lines (display columns).
    pub const fn lines(self) -> usize {
        match self {
            Screen::Top => TOP_LINES,
            Screen::Bottom => BOTTOM_LINES,
        }
    }

    /// Landscape size in pixels.
    pub const fn landscape_size(self) -> (u32, u32) {
        (self.lines() as u32, LINE_PIXELS as u32)
    }

    /// Byte length of one RGBA8 screen buffer.
    pub const fn rgba_len(self) -> usize {
        self.lines() * LINE_PIXELS * 4
    }
}

/// A decoded capture frame.
///
/// Screens are RGBA8 in scan order: `lines` rows of 240 pixels, each row being
/// one column of the physical display. Use [`Frame::landscape`] for an
/// upright image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub top: Vec<u8>,
    pub bottom: Vec<u8>,
    /// Interleaved stereo at [`AUDIO_SAMPLE_RATE`].
    pub audio: Vec<i16>,
}

impl Frame {
    pub fn new(sequence: u64, top: Vec<u8>, bottom: Vec<u8>, audio: Vec<i16>) -> Result<Self> {
        for (what, buf, screen) in [("top", &top, Screen::Top), ("bottom", &bottom, Screen::Bottom)] {
            if buf.len() != screen.rgba_len() {
                return Err(KatsukityError::BadBuffer {
                    what,
                    len: buf.len(),
                    expected: screen.rgba_len(),
                });
            }
        }

        Ok(Self {
            sequence,
            top,
            bottom,
            audio,
        })
    }

    pub fn from_split(sequence: u64, split: &SplitFrame) -> Result<Self> {
        Self::new(
            sequence,
            parse::rgb565_to_rgba(&split.top),
            parse::rgb565_to_rgba(&split.bottom),
            parse::decode_audio(&split.audio),
        )
    }

    pub fn screen(&self, screen: Screen) -> &[u8] {
        match screen {
            Screen::Top => &self.top,
            Screen::Bottom => &self.bottom,
        }
    }

    /// Upright RGBA8 image of one screen.
    ///
    /// Display pixel `(x, y)` (y down) is scan line `x`, pixel `239 - y`.
    pub fn landscape(&self, screen: Screen) -> (u32, u32, Vec<u8>) {
        let lines = screen.lines();
        let src = self.screen(screen);
        let mut out = vec![0u8; src.len()];

        for x in 0..lines {
            for y in 0..LINE_PIXELS {
                let s = (x * LINE_PIXELS + (LINE_PIXELS - 1 - y)) * 4;
                let d = (y * lines + x) * 4;
                out[d..d + 4].copy_from_slice(&src[s..s + 4]);
            }
        }

        let (w, h) = screen.landscape_size();
        (w, h, out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parse::tests::synthetic_frame;

    fn solid(screen: Screen, rgba: [u8; 4]) -> Vec<u8> {
        rgba.iter()
            .copied()
            .cycle()
            .take(screen.rgba_len())
            .collect()
    }

    #[test]
    fn test_new_validates_sizes() {
        let ok = Frame::new(0, solid(Screen::Top, [0; 4]), solid(Screen::Bottom, [0; 4]), vec![]);
        assert!(ok.is_ok());

        let err = Frame::new(0, vec![0; 10], solid(Screen::Bottom, [0; 4]), vec![]).unwrap_err();
        assert!(matches!(err, KatsukityError::BadBuffer { what: "top", .. }));
    }

    #[test]
    fn test_from_split() {
        let data = synthetic_frame(0xFFFF, 0x0000, 0);
        let split = parse::split_frame(&data).unwrap();
        let frame = Frame::from_split(7, &split).unwrap();

        assert_eq!(frame.sequence, 7);
        assert_eq!(&frame.top[..4], &[255, 255, 255, 255]);
        assert_eq!(&frame.bottom[..4], &[0, 0, 0, 255]);
        assert_eq!(frame.audio.len(), parse::FRAME_LINES * 8);
    }

    #[test]
    fn test_landscape_rotation() {
        let mut top = solid(Screen::Top, [0, 0, 0, 255]);
        // Scan line 3, last pixel -> display (3, 0)
        let s = (3 * LINE_PIXELS + LINE_PIXELS - 1) * 4;
        top[s..s + 4].copy_from_slice(&[9, 8, 7, 255]);
        // Scan line 0, first pixel -> display (0, 239)
        top[..4].copy_from_slice(&[1, 2, 3, 255]);

        let frame = Frame::new(0, top, solid(Screen::Bottom, [0; 4]), vec![]).unwrap();
        let (w, h, img) = frame.landscape(Screen::Top);

        assert_eq!((w, h), (400, 240));
        let at = |x: usize, y: usize| &img[(y * w as usize + x) * 4..(y * w as usize + x) * 4 + 4];
        assert_eq!(at(3, 0), &[9, 8, 7, 255]);
        assert_eq!(at(0, 239), &[1, 2, 3, 255]);
    }
}
