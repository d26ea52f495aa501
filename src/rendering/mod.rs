//! Drawing captured frames.
//!
//! ## Components
//! - `layout`: canvas arrangement of the two screens and per-screen transforms
//! - `gpu`: wgpu presenter that draws into a host view
//! - `snapshot`: upright PNG snapshots of single screens

pub mod gpu;
pub mod layout;
pub mod snapshot;

pub use gpu::{GpuBackend, GpuPresenter};
pub use layout::{fit, layout_transforms, Layout, Rect, Viewport};
pub use snapshot::{save_frame, save_screen};
