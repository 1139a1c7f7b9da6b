//! Status overlay drawn onto outgoing frames

use camera_capture::VideoFrame;
use image::{Rgb, RgbImage};
use imageproc::drawing::{draw_filled_rect_mut, draw_hollow_rect_mut};
use imageproc::rect::Rect;

use crate::state::AlertState;
use crate::DmsError;

const GLYPH_WIDTH: u32 = 5;
const GLYPH_HEIGHT: u32 = 7;

/// Draws the alertness label and a coloured border
#[derive(Debug, Clone)]
pub struct Annotator {
    /// Top-left of the label, in pixels
    pub origin: (i32, i32),
    /// Pixel size of one glyph dot
    pub scale: u32,
    /// Border thickness (0 disables the border)
    pub border: u32,
}

impl Default for Annotator {
    fn default() -> Self {
        Self {
            origin: (40, 30),
            scale: 4,
            border: 4,
        }
    }
}

impl Annotator {
    pub fn annotate(&self, frame: &mut VideoFrame, state: AlertState) -> Result<(), DmsError> {
        let color = Rgb(state.color());
        frame.with_image(|img| {
            self.draw_border(img, color);
            self.draw_label(img, state.as_str(), color);
        })?;
        Ok(())
    }

    fn draw_border(&self, img: &mut RgbImage, color: Rgb<u8>) {
        let (width, height) = img.dimensions();
        for inset in 0..self.border {
            if width <= inset * 2 || height <= inset * 2 {
                break;
            }
            let rect = Rect::at(inset as i32, inset as i32)
                .of_size(width - inset * 2, height - inset * 2);
            draw_hollow_rect_mut(img, rect, color);
        }
    }

    fn draw_label(&self, img: &mut RgbImage, text: &str, color: Rgb<u8>) {
        let scale = self.scale.max(1);
        let advance = (GLYPH_WIDTH + 1) * scale;
        let padding = scale * 2;
        let (x0, y0) = self.origin;

        let text_width = advance * text.chars().count() as u32;
        let background = Rect::at(x0 - padding as i32, y0 - padding as i32)
            .of_size(text_width + padding * 2, GLYPH_HEIGHT * scale + padding * 2);
        draw_filled_rect_mut(img, background, Rgb([0, 0, 0]));

        for (i, ch) in text.chars().enumerate() {
            let Some(rows) = glyph(ch) else {
                continue;
            };
            let gx = x0 + (i as u32 * advance) as i32;
            for (row, bits) in rows.iter().enumerate() {
                for col in 0..GLYPH_WIDTH {
                    if (bits >> (GLYPH_WIDTH - 1 - col)) & 1 == 1 {
                        let dot = Rect::at(
                            gx + (col * scale) as i32,
                            y0 + (row as u32 * scale) as i32,
                        )
                        .of_size(scale, scale);
                        draw_filled_rect_mut(img, dot, color);
                    }
                }
            }
        }
    }
}

/// 5x7 bitmaps for the letters of the state labels
fn glyph(ch: char) -> Option<[u8; 7]> {
    let rows = match ch.to_ascii_uppercase() {
        'A' => [0b01110, 0b10001, 0b10001, 0b11111, 0b10001, 0b10001, 0b10001],
        'C' => [0b01110, 0b10001, 0b10000, 0b10000, 0b10000, 0b10001, 0b01110],
        'D' => [0b11110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b11110],
        'E' => [0b11111, 0b10000, 0b10000, 0b11110, 0b10000, 0b10000, 0b11111],
        'I' => [0b01110, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b01110],
        'L' => [0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b10000, 0b11111],
        'N' => [0b10001, 0b11001, 0b10101, 0b10011, 0b10001, 0b10001, 0b10001],
        'O' => [0b01110, 0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01110],
        'P' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10000, 0b10000, 0b10000],
        'R' => [0b11110, 0b10001, 0b10001, 0b11110, 0b10100, 0b10010, 0b10001],
        'S' => [0b01111, 0b10000, 0b10000, 0b01110, 0b00001, 0b00001, 0b11110],
        'T' => [0b11111, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100, 0b00100],
        'V' => [0b10001, 0b10001, 0b10001, 0b10001, 0b10001, 0b01010, 0b00100],
        'W' => [0b10001, 0b10001, 0b10001, 0b10101, 0b10101, 0b10101, 0b01010],
        'Y' => [0b10001, 0b10001, 0b01010, 0b00100, 0b00100, 0b00100, 0b00100],
        _ => return None,
    };
    Some(rows)
}
