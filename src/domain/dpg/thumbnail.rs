use super::settings::{CANVAS_HEIGHT, CANVAS_WIDTH};
use image::imageops::{self, FilterType};
use image::RgbImage;

/// Second of the video the thumbnail is taken from: a tenth of the way in,
/// on whole seconds.
pub fn sample_second(frames: u32, fps: u32) -> u32 {
    if fps == 0 {
        return 0;
    }
    (frames / fps) / 10
}

/// Region of a `width`x`height` picture that, scaled uniformly, exactly
/// covers the canvas. The overflowing axis is cropped evenly on both sides.
pub fn cover_crop(width: u32, height: u32) -> (u32, u32, u32, u32) {
    // width / height > canvas ratio: too wide, crop the sides
    if width as u64 * CANVAS_HEIGHT as u64 > height as u64 * CANVAS_WIDTH as u64 {
        let crop_w = ((height as u64 * CANVAS_WIDTH as u64) / CANVAS_HEIGHT as u64).max(1) as u32;
        ((width - crop_w) / 2, 0, crop_w, height)
    } else {
        let crop_h = ((width as u64 * CANVAS_HEIGHT as u64) / CANVAS_WIDTH as u64).max(1) as u32;
        (0, (height - crop_h) / 2, width, crop_h)
    }
}

/// Packs an 8-bit RGB pixel as `1 | blue:5 | green:5 | red:5`, dropping the
/// three low bits of each channel.
pub fn pack_rgb15(red: u8, green: u8, blue: u8) -> u16 {
    (1 << 15) | ((blue as u16 >> 3) << 10) | ((green as u16 >> 3) << 5) | (red as u16 >> 3)
}

/// Resamples a frame onto the canvas and quantizes it. Output is row-major,
/// two little-endian bytes per pixel.
pub fn render(frame: &RgbImage) -> Vec<u8> {
    let (x, y, w, h) = cover_crop(frame.width(), frame.height());
    let cropped = imageops::crop_imm(frame, x, y, w, h).to_image();
    let canvas = imageops::resize(&cropped, CANVAS_WIDTH, CANVAS_HEIGHT, FilterType::CatmullRom);

    let mut out = Vec::with_capacity((CANVAS_WIDTH * CANVAS_HEIGHT * 2) as usize);
    for pixel in canvas.pixels() {
        let [red, green, blue] = pixel.0;
        out.extend_from_slice(&pack_rgb15(red, green, blue).to_le_bytes());
    }
    out
}
