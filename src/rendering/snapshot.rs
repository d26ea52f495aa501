//! PNG snapshots of captured screens, rotated upright on the CPU.

use std::path::{Path, PathBuf};

use capview_katsukity::{Frame, Screen};
use image::RgbaImage;

use crate::error::{CapviewError, CapviewResult};

/// Write one screen of `frame` as an upright PNG.
pub fn save_screen(frame: &Frame, screen: Screen, path: &Path) -> CapviewResult<()> {
    let (width, height, pixels) = frame.landscape(screen);
    let image = RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| CapviewError::Image(format!("{}x{} buffer size mismatch", width, height)))?;
    image.save_with_format(path, image::ImageFormat::Png)?;
    Ok(())
}

/// Write `top_<n>.png` and `bottom_<n>.png` into `dir`.
pub fn save_frame(frame: &Frame, index: u64, dir: &Path) -> CapviewResult<[PathBuf; 2]> {
    let top = dir.join(format!("top_{}.png", index));
    let bottom = dir.join(format!("bottom_{}.png", index));
    save_screen(frame, Screen::Top, &top)?;
    save_screen(frame, Screen::Bottom, &bottom)?;
    log::debug!("[SNAPSHOT] Frame {} written to {}", frame.sequence, dir.display());
    Ok([top, bottom])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> Frame {
        let top = [10u8, 20, 30, 255].repeat(Screen::Top.rgba_len() / 4);
        let bottom = [200u8, 100, 50, 255].repeat(Screen::Bottom.rgba_len() / 4);
        Frame::new(3, top, bottom, vec![]).unwrap()
    }

    #[test]
    fn test_save_frame_writes_upright_pngs() {
        let dir = tempfile::tempdir().unwrap();
        let [top, bottom] = save_frame(&frame(), 0, dir.path()).unwrap();

        let top = image::open(&top).unwrap().to_rgba8();
        assert_eq!(top.dimensions(), (400, 240));
        assert_eq!(top.get_pixel(0, 0).0, [10, 20, 30, 255]);

        let bottom = image::open(&bottom).unwrap().to_rgba8();
        assert_eq!(bottom.dimensions(), (320, 240));
        assert_eq!(bottom.get_pixel(319, 239).0, [200, 100, 50, 255]);
    }
}
