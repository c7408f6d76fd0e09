//! Captured frames and the pixel operations the capture loops need.

use chrono::{DateTime, Local};
use image::{Rgb, RgbImage, imageops};

/// An RGB image tagged with the local time it was captured.
#[derive(Debug, Clone, PartialEq)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: Local::now(),
        }
    }

    pub fn with_timestamp(image: RgbImage, captured_at: DateTime<Local>) -> Self {
        Self { image, captured_at }
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Rotate by 180 degrees, keeping the capture time.
    pub fn rotate_180(self) -> Self {
        Self {
            image: imageops::rotate180(&self.image),
            captured_at: self.captured_at,
        }
    }
}

/// Place frames side by side, left to right.
///
/// The result is as tall as the tallest frame; shorter frames are padded with
/// black below. Returns `None` when there is nothing to concatenate.
pub fn hconcat(frames: &[&Frame]) -> Option<RgbImage> {
    if frames.is_empty() {
        return None;
    }
    let width: u32 = frames.iter().map(|f| f.width()).sum();
    let height = frames.iter().map(|f| f.height()).max().unwrap_or(0);
    let mut canvas = RgbImage::new(width, height);
    let mut x: i64 = 0;
    for frame in frames {
        imageops::replace(&mut canvas, &frame.image, x, 0);
        x += frame.width() as i64;
    }
    Some(canvas)
}

const NO_SIGNAL: &str = "NO SIGNAL";
const GLYPH_W: u32 = 5;
const GLYPH_H: u32 = 7;
const TEXT_X: u32 = 20;

/// 5x7 glyphs, one byte per row, bit 4 is the leftmost column.
fn glyph(c: char) -> [u8; 7] {
    match c {
        'A' => [0x0e, 0x11, 0x11, 0x1f, 0x11, 0x11, 0x11],
        'G' => [0x0e, 0x11, 0x10, 0x17, 0x11, 0x11, 0x0f],
        'I' => [0x0e, 0x04, 0x04, 0x04, 0x04, 0x04, 0x0e],
        'L' => [0x10, 0x10, 0x10, 0x10, 0x10, 0x10, 0x1f],
        'N' => [0x11, 0x19, 0x15, 0x13, 0x11, 0x11, 0x11],
        'O' => [0x0e, 0x11, 0x11, 0x11, 0x11, 0x11, 0x0e],
        'S' => [0x0f, 0x10, 0x10, 0x0e, 0x01, 0x01, 0x1e],
        _ => [0; 7],
    }
}

fn draw_text(image: &mut RgbImage, text: &str, x: u32, baseline: u32, color: Rgb<u8>) {
    let top = baseline.saturating_sub(GLYPH_H);
    for (i, c) in text.chars().enumerate() {
        let gx = x + i as u32 * (GLYPH_W + 1);
        for (row, bits) in glyph(c).iter().enumerate() {
            for col in 0..GLYPH_W {
                if bits & (0x10 >> col) == 0 {
                    continue;
                }
                let (px, py) = (gx + col, top + row as u32);
                if px < image.width() && py < image.height() {
                    image.put_pixel(px, py, color);
                }
            }
        }
    }
}

/// Black frame with `NO SIGNAL` written across it, shown for cameras that
/// have not delivered anything yet.
pub fn placeholder(width: u32, height: u32) -> Frame {
    let mut image = RgbImage::new(width, height);
    draw_text(&mut image, NO_SIGNAL, TEXT_X, height / 2, Rgb([255, 255, 255]));
    Frame::new(image)
}
