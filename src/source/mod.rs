//! Frame sources.
//!
//! A source produces decoded frames one at a time on the feed's capture
//! thread. `Ok(None)` ends the stream.

mod device;
mod pattern;
mod replay;

pub use device::{record_raw, DeviceSource};
pub use pattern::PatternSource;
pub use replay::ReplaySource;

use std::sync::Arc;

use capview_katsukity::{split_frame, Frame};

use crate::config::{CapviewConfig, SourceKind};
use crate::error::{CapviewError, CapviewResult};

pub trait FrameSource: Send {
    fn next_frame(&mut self) -> CapviewResult<Option<Frame>>;

    fn name(&self) -> &str;
}

/// Opens a fresh source whenever a feed starts.
pub type SourceFactory = Arc<dyn Fn() -> CapviewResult<Box<dyn FrameSource>> + Send + Sync>;

/// Factory for the source described by `config`.
pub fn factory_from_config(config: &CapviewConfig) -> SourceFactory {
    let config = config.clone();
    Arc::new(move || open_source(&config))
}

pub fn open_source(config: &CapviewConfig) -> CapviewResult<Box<dyn FrameSource>> {
    let source = &config.source;
    Ok(match source.kind {
        SourceKind::Device => Box::new(DeviceSource::open(&config.capture)?),
        SourceKind::Replay => {
            let path = source.replay_path.as_deref().ok_or_else(|| {
                CapviewError::Config("replay source needs source.replayPath".to_string())
            })?;
            Box::new(ReplaySource::open(path, source.replay_loop, source.frame_interval())?)
        },
        SourceKind::Pattern => Box::new(PatternSource::new(
            source.pattern_frames,
            source.frame_interval(),
        )),
    })
}

/// Decode one assembled raw frame.
pub(crate) fn decode_raw(raw: &[u8], sequence: u64) -> CapviewResult<Frame> {
    let split = split_frame(raw)?;
    Ok(Frame::from_split(sequence, &split)?)
}
