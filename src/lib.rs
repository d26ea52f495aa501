//! capview: render a live handheld-console capture into host-owned views.
//!
//! The host hands native views to a [`ViewSink`]; each view gets a session
//! that draws the capture feed into it until the host detaches it.
//!
//! ```ignore
//! let sink = ViewSink::with_defaults(CapviewConfig::load(None)?);
//! let events = sink.events();
//! sink.submit(ViewHandle::from_view(&window)?);
//! while let Ok(event) = events.recv() {
//!     log::info!("{:?}", event);
//! }
//! ```

pub mod audio;
pub mod config;
pub mod error;
pub mod feed;
pub mod ffi;
pub mod logging;
pub mod rendering;
pub mod sink;
pub mod source;
pub mod view;

pub use capview_katsukity::{Frame, Screen};
pub use config::CapviewConfig;
pub use error::{CapviewError, CapviewResult};
pub use feed::{FrameFeed, Subscription};
pub use sink::backend::{Presenter, SurfaceBackend};
pub use sink::{SinkEvent, ViewSink};
pub use source::{FrameSource, SourceFactory};
pub use view::{ViewHandle, ViewId, ViewKind};
