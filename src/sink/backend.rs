//! The seam between sessions and whatever draws into a host view.

use capview_katsukity::Frame;

use crate::config::RenderConfig;
use crate::error::CapviewResult;
use crate::view::ViewHandle;

/// Creates presenters for host views. Shared by all sessions of a sink.
pub trait SurfaceBackend: Send + Sync {
    /// Bind to `view`. Runs on the session worker, never on the caller of
    /// `submit`.
    fn attach(&self, view: &ViewHandle, config: &RenderConfig) -> CapviewResult<Box<dyn Presenter>>;

    fn name(&self) -> &'static str {
        "backend"
    }
}

/// Draws frames into one view. Owned by its session worker.
pub trait Presenter: Send {
    fn present(&mut self, frame: &Frame) -> CapviewResult<()>;

    /// The host resized the view (physical pixels).
    fn resize(&mut self, width: u32, height: u32);

    fn size(&self) -> (u32, u32);
}
