use std::collections::VecDeque;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use capview_katsukity::{Frame, FrameAssembler, TRANSFER_SIZE};

use super::{decode_raw, FrameSource};
use crate::error::{CapviewError, CapviewResult, ResultExt};

/// Plays back a raw bulk dump as if it came from the board.
pub struct ReplaySource {
    path: PathBuf,
    reader: BufReader<File>,
    assembler: FrameAssembler,
    ready: VecDeque<Vec<u8>>,
    looping: bool,
    interval: Option<Duration>,
    last_frame: Option<Instant>,
    sequence: u64,
    frames_this_pass: u64,
    exhausted: bool,
}

impl ReplaySource {
    pub fn open(path: &Path, looping: bool, interval: Option<Duration>) -> CapviewResult<Self> {
        let file = File::open(path).with_context(|| format!("failed to open {}", path.display()))?;
        log::info!(
            "[FEED] Replaying {} (loop={}, interval={:?})",
            path.display(),
            looping,
            interval
        );
        Ok(Self {
            path: path.to_path_buf(),
            reader: BufReader::new(file),
            assembler: FrameAssembler::new(),
            ready: VecDeque::new(),
            looping,
            interval,
            last_frame: None,
            sequence: 0,
            frames_this_pass: 0,
            exhausted: false,
        })
    }

    /// Next raw frame, reading more of the file as needed.
    fn next_raw(&mut self) -> CapviewResult<Option<Vec<u8>>> {
        let mut chunk = vec![0u8; TRANSFER_SIZE];
        loop {
            if let Some(raw) = self.ready.pop_front() {
                return Ok(Some(raw));
            }
            if self.exhausted {
                return Ok(None);
            }

            let n = self.reader.read(&mut chunk)?;
            if n > 0 {
                self.ready.extend(self.assembler.push(&chunk[..n]));
                continue;
            }

            // End of file
            if let Some(last) = self.assembler.finish() {
                self.ready.push_back(last);
                continue;
            }
            if !self.looping {
                self.exhausted = true;
                continue;
            }
            if self.frames_this_pass == 0 {
                return Err(CapviewError::Parse(format!(
                    "no frames in {}",
                    self.path.display()
                )));
            }
            log::debug!("[FEED] Replay looping after {} frames", self.frames_this_pass);
            self.frames_this_pass = 0;
            self.reader.seek(SeekFrom::Start(0))?;
        }
    }

    fn pace(&mut self) {
        if let (Some(interval), Some(last)) = (self.interval, self.last_frame) {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_frame = Some(Instant::now());
    }
}

impl FrameSource for ReplaySource {
    fn next_frame(&mut self) -> CapviewResult<Option<Frame>> {
        while let Some(raw) = self.next_raw()? {
            match decode_raw(&raw, self.sequence) {
                Ok(frame) => {
                    self.sequence += 1;
                    self.frames_this_pass += 1;
                    self.pace();
                    return Ok(Some(frame));
                },
                Err(e) => log::debug!("[FEED] Skipping partial frame in dump: {}", e),
            }
        }
        Ok(None)
    }

    fn name(&self) -> &str {
        "replay"
    }
}
