//! Reassembles frames from fixed-size bulk transfers.

use memchr::memmem;

use crate::parse::{FRAME_SIZE, FRAME_START};

/// Bulk transfer size used when reading the video endpoint.
pub const TRANSFER_SIZE: usize = 0x4000;

/// Partial frames growing past this are out of sync and get dropped.
const MAX_PENDING: usize = FRAME_SIZE * 2;

const MARKER_TAIL: usize = FRAME_START.len() - 1;

/// Accumulates transfer payloads and yields complete frames.
///
/// Data before the first start marker is discarded. A frame runs from its
/// marker up to the next marker at least `FRAME_SIZE` bytes later, so marker
/// bytes inside pixel data never cut a frame short. Markers may straddle
/// two transfers.
pub struct FrameAssembler {
    buf: Vec<u8>,
    in_frame: bool,
    /// Offset in `buf` where the next marker search starts. Never below
    /// `FRAME_SIZE` while a frame is in progress.
    scanned: usize,
    finder: memmem::Finder<'static>,
    dropped: u64,
}

impl Default for FrameAssembler {
    fn default() -> Self {
        Self::new()
    }
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self {
            buf: Vec::with_capacity(FRAME_SIZE + TRANSFER_SIZE),
            in_frame: false,
            scanned: 0,
            finder: memmem::Finder::new(&FRAME_START).into_owned(),
            dropped: 0,
        }
    }

    /// Feed one transfer. Returns the raw bytes of every frame it completed.
    pub fn push(&mut self, chunk: &[u8]) -> Vec<Vec<u8>> {
        self.buf.extend_from_slice(chunk);
        let mut frames = Vec::new();

        loop {
            let found = self
                .buf
                .get(self.scanned..)
                .and_then(|rest| self.finder.find(rest))
                .map(|i| i + self.scanned);

            match (self.in_frame, found) {
                (false, Some(start)) => {
                    self.buf.drain(..start);
                    self.in_frame = true;
                    self.scanned = FRAME_SIZE;
                }
                (false, None) => {
                    let keep = self.buf.len().min(MARKER_TAIL);
                    self.buf.drain(..self.buf.len() - keep);
                    self.scanned = 0;
                    break;
                }
                (true, Some(end)) => {
                    let rest = self.buf.split_off(end);
                    frames.push(std::mem::replace(&mut self.buf, rest));
                    self.scanned = FRAME_SIZE;
                }
                (true, None) => {
                    self.scanned = self.buf.len().saturating_sub(MARKER_TAIL).max(FRAME_SIZE);
                    break;
                }
            }
        }

        if self.in_frame && self.buf.len() > MAX_PENDING {
            tracing::warn!(
                "[KATSUKITY] Dropping {} bytes without a frame marker",
                self.buf.len()
            );
            self.reset();
            self.dropped += 1;
        }

        frames
    }

    /// End of input: hand out the frame in progress, if any.
    ///
    /// The last frame of a finite stream has no following marker, so it is
    /// only complete once the caller knows no more data will come.
    pub fn finish(&mut self) -> Option<Vec<u8>> {
        let pending = self.in_frame.then(|| std::mem::take(&mut self.buf));
        self.reset();
        pending
    }

    /// Frames discarded because they overflowed.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }

    /// Forget any partial frame.
    pub fn reset(&mut self) {
        self.buf.clear();
        self.in_frame = false;
        self.scanned = 0;
    }
}
