//! Presentation settings for sessions.

use serde::{Deserialize, Serialize};

pub use crate::rendering::Layout;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct RenderConfig {
    /// How the two screens are arranged on the canvas.
    pub layout: Layout,

    /// Letterbox colour, linear RGBA.
    pub clear_color: [f64; 4],

    /// Nearest-neighbour sampling keeps pixel edges sharp when scaling.
    pub pixelated: bool,

    /// Wait for vblank (Fifo) instead of presenting immediately.
    pub vsync: bool,

    /// Surface size used until the host reports the view size.
    pub initial_size: [u32; 2],
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            layout: Layout::Stacked,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            pixelated: true,
            vsync: true,
            initial_size: [400, 480],
        }
    }
}

impl RenderConfig {
    pub fn clear(&self) -> wgpu::Color {
        let [r, g, b, a] = self.clear_color;
        wgpu::Color { r, g, b, a }
    }
}
