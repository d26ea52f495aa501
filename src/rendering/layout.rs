//! Canvas layout and the transforms that place each screen on a surface.
//!
//! All screens are drawn as unit quads (`0..1` in both axes, y down). The
//! per-screen transform maps that quad onto its rectangle of the letterboxed
//! canvas in normalized device coordinates.

use capview_katsukity::Screen;
use serde::{Deserialize, Serialize};

/// Arrangement of the two screens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Layout {
    /// Top screen above the bottom screen, bottom centred (400 x 480).
    #[default]
    Stacked,
    /// Top screen left of the bottom screen (720 x 240).
    SideBySide,
    TopOnly,
    BottomOnly,
}

/// Rectangle in canvas pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
}

impl Rect {
    pub const fn new(x: f32, y: f32, w: f32, h: f32) -> Self {
        Self { x, y, w, h }
    }
}

const TOP_W: f32 = 400.0;
const BOTTOM_W: f32 = 320.0;
const SCREEN_H: f32 = 240.0;

impl Layout {
    /// Logical canvas size in pixels.
    pub fn canvas_size(self) -> (f32, f32) {
        match self {
            Layout::Stacked => (TOP_W, SCREEN_H * 2.0),
            Layout::SideBySide => (TOP_W + BOTTOM_W, SCREEN_H),
            Layout::TopOnly => (TOP_W, SCREEN_H),
            Layout::BottomOnly => (BOTTOM_W, SCREEN_H),
        }
    }

    /// Screens drawn in this layout and where they go on the canvas.
    pub fn placements(self) -> Vec<(Screen, Rect)> {
        match self {
            Layout::Stacked => vec![
                (Screen::Top, Rect::new(0.0, 0.0, TOP_W, SCREEN_H)),
                (
                    Screen::Bottom,
                    Rect::new((TOP_W - BOTTOM_W) / 2.0, SCREEN_H, BOTTOM_W, SCREEN_H),
                ),
            ],
            Layout::SideBySide => vec![
                (Screen::Top, Rect::new(0.0, 0.0, TOP_W, SCREEN_H)),
                (Screen::Bottom, Rect::new(TOP_W, 0.0, BOTTOM_W, SCREEN_H)),
            ],
            Layout::TopOnly => vec![(Screen::Top, Rect::new(0.0, 0.0, TOP_W, SCREEN_H))],
            Layout::BottomOnly => vec![(Screen::Bottom, Rect::new(0.0, 0.0, BOTTOM_W, SCREEN_H))],
        }
    }
}

/// Where the canvas lands on the surface, in surface pixels.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    pub x: f32,
    pub y: f32,
    pub scale: f32,
}

/// Scale the canvas to fit the surface, preserving aspect ratio, centred.
pub fn fit(canvas: (f32, f32), surface: (u32, u32)) -> Viewport {
    let (sw, sh) = (surface.0.max(1) as f32, surface.1.max(1) as f32);
    let scale = (sw / canvas.0).min(sh / canvas.1);
    Viewport {
        x: (sw - canvas.0 * scale) / 2.0,
        y: (sh - canvas.1 * scale) / 2.0,
        scale,
    }
}

/// Column-major transform from the unit quad to NDC for one placement.
pub fn quad_transform(rect: Rect, viewport: Viewport, surface: (u32, u32)) -> [[f32; 4]; 4] {
    let (sw, sh) = (surface.0.max(1) as f32, surface.1.max(1) as f32);
    let px = viewport.x + rect.x * viewport.scale;
    let py = viewport.y + rect.y * viewport.scale;

    let sx = 2.0 * rect.w * viewport.scale / sw;
    let sy = -2.0 * rect.h * viewport.scale / sh;
    let tx = 2.0 * px / sw - 1.0;
    let ty = 1.0 - 2.0 * py / sh;

    [
        [sx, 0.0, 0.0, 0.0],
        [0.0, sy, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [tx, ty, 0.0, 1.0],
    ]
}

/// Transforms for every screen of `layout` on a surface of the given size.
pub fn layout_transforms(layout: Layout, surface: (u32, u32)) -> Vec<(Screen, [[f32; 4]; 4])> {
    let viewport = fit(layout.canvas_size(), surface);
    layout
        .placements()
        .into_iter()
        .map(|(screen, rect)| (screen, quad_transform(rect, viewport, surface)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn apply(m: &[[f32; 4]; 4], p: [f32; 2]) -> [f32; 2] {
        [
            m[0][0] * p[0] + m[1][0] * p[1] + m[3][0],
            m[0][1] * p[0] + m[1][1] * p[1] + m[3][1],
        ]
    }

    fn close(a: [f32; 2], b: [f32; 2]) -> bool {
        (a[0] - b[0]).abs() < 1e-5 && (a[1] - b[1]).abs() < 1e-5
    }

    #[test]
    fn test_fit_letterboxes_wide_surface() {
        let vp = fit((400.0, 480.0), (1600, 960));
        assert_eq!(vp.scale, 2.0);
        assert_eq!((vp.x, vp.y), (400.0, 0.0));
    }

    #[test]
    fn test_fit_pillarboxes_tall_surface() {
        let vp = fit((400.0, 480.0), (400, 1000));
        assert_eq!(vp.scale, 1.0);
        assert_eq!((vp.x, vp.y), (0.0, 260.0));
    }

    #[test]
    fn test_stacked_fills_exact_surface() {
        let transforms = layout_transforms(Layout::Stacked, (400, 480));
        let (screen, top) = transforms[0];
        assert_eq!(screen, Screen::Top);
        // Top screen covers the upper half
        assert!(close(apply(&top, [0.0, 0.0]), [-1.0, 1.0]));
        assert!(close(apply(&top, [1.0, 1.0]), [1.0, 0.0]));

        let (screen, bottom) = transforms[1];
        assert_eq!(screen, Screen::Bottom);
        // Bottom screen is centred: 40px margins on a 400px canvas
        assert!(close(apply(&bottom, [0.0, 0.0]), [-0.8, 0.0]));
        assert!(close(apply(&bottom, [1.0, 1.0]), [0.8, -1.0]));
    }

    #[test]
    fn test_side_by_side_canvas() {
        assert_eq!(Layout::SideBySide.canvas_size(), (720.0, 240.0));
        let placements = Layout::SideBySide.placements();
        assert_eq!(placements[1].1, Rect::new(400.0, 0.0, 320.0, 240.0));
    }

    #[test]
    fn test_single_screen_layouts() {
        assert_eq!(Layout::TopOnly.placements().len(), 1);
        let only = Layout::BottomOnly.placements();
        assert_eq!(only[0].0, Screen::Bottom);

        let transforms = layout_transforms(Layout::BottomOnly, (320, 240));
        assert!(close(apply(&transforms[0].1, [1.0, 0.0]), [1.0, 1.0]));
    }

    #[test]
    fn test_zero_surface_does_not_divide_by_zero() {
        let transforms = layout_transforms(Layout::Stacked, (0, 0));
        assert!(transforms.iter().all(|(_, m)| m.iter().flatten().all(|v| v.is_finite())));
    }
}
