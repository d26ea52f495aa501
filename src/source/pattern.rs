use std::f32::consts::TAU;
use std::thread;
use std::time::{Duration, Instant};

use capview_katsukity::parse::{FRAME_LINES, LINE_AUDIO_BYTES, LINE_PIXELS};
use capview_katsukity::{Frame, Screen, AUDIO_CHANNELS, AUDIO_SAMPLE_RATE};

use super::FrameSource;
use crate::error::CapviewResult;

const TONE_HZ: f32 = 440.0;
const TONE_AMPLITUDE: f32 = 0.2;

/// Stereo sample frames carried by one capture frame.
const AUDIO_FRAMES_PER_FRAME: usize = FRAME_LINES * LINE_AUDIO_BYTES / 2 / AUDIO_CHANNELS as usize;

/// Generated test pattern: a gradient with a sweeping bar on the top screen,
/// a scrolling checkerboard on the bottom one, and a 440 Hz tone.
pub struct PatternSource {
    remaining: Option<u64>,
    interval: Option<Duration>,
    last_frame: Option<Instant>,
    sequence: u64,
    phase: f32,
}

impl PatternSource {
    pub fn new(frames: Option<u64>, interval: Option<Duration>) -> Self {
        Self {
            remaining: frames,
            interval,
            last_frame: None,
            sequence: 0,
            phase: 0.0,
        }
    }

    fn tone(&mut self) -> Vec<i16> {
        let step = TAU * TONE_HZ / AUDIO_SAMPLE_RATE as f32;
        let mut audio = Vec::with_capacity(AUDIO_FRAMES_PER_FRAME * AUDIO_CHANNELS as usize);
        for _ in 0..AUDIO_FRAMES_PER_FRAME {
            let sample = (self.phase.sin() * TONE_AMPLITUDE * i16::MAX as f32) as i16;
            audio.push(sample);
            audio.push(sample);
            self.phase = (self.phase + step) % TAU;
        }
        audio
    }
}

/// Fill a scan-order RGBA buffer from a function of upright display coordinates.
fn paint(screen: Screen, mut color: impl FnMut(usize, usize) -> [u8; 4]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(screen.rgba_len());
    for x in 0..screen.lines() {
        for pixel in 0..LINE_PIXELS {
            buf.extend_from_slice(&color(x, LINE_PIXELS - 1 - pixel));
        }
    }
    buf
}

pub(crate) fn pattern_frame(sequence: u64, audio: Vec<i16>) -> CapviewResult<Frame> {
    let offset = (sequence as usize * 4) % Screen::Top.lines();
    let shade = (sequence % 256) as u8;

    let top = paint(Screen::Top, |x, y| {
        if x == offset {
            [255, 255, 255, 255]
        } else {
            let r = (x * 255 / (Screen::Top.lines() - 1)) as u8;
            let g = (y * 255 / (LINE_PIXELS - 1)) as u8;
            [r, g, shade, 255]
        }
    });

    let scroll = sequence as usize;
    let bottom = paint(Screen::Bottom, |x, y| {
        if ((x + scroll) / 16 + y / 16) % 2 == 0 {
            [230, 230, 230, 255]
        } else {
            [40, 40, 60, 255]
        }
    });

    Ok(Frame::new(sequence, top, bottom, audio)?)
}

impl FrameSource for PatternSource {
    fn next_frame(&mut self) -> CapviewResult<Option<Frame>> {
        if let Some(remaining) = self.remaining.as_mut() {
            if *remaining == 0 {
                return Ok(None);
            }
            *remaining -= 1;
        }

        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());

        let audio = self.tone();
        let frame = pattern_frame(self.sequence, audio)?;
        self.sequence += 1;
        Ok(Some(frame))
    }

    fn name(&self) -> &str {
        "pattern"
    }
}
