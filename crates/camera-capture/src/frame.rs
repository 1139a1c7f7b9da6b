//! Video frame types and processing

use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, RgbImage};

use crate::CameraError;

/// Decoded RGB video frame
#[derive(Debug, Clone)]
pub struct VideoFrame {
    /// RGB pixel data (width * height * 3)
    pub data: Vec<u8>,
    /// Frame width
    pub width: u32,
    /// Frame height
    pub height: u32,
    /// Capture timestamp (nanoseconds since the source was opened)
    pub timestamp_ns: u64,
    /// Frame sequence number
    pub sequence: u32,
}

impl VideoFrame {
    /// Create a new video frame from raw RGB data
    pub fn new(data: Vec<u8>, width: u32, height: u32, timestamp_ns: u64, sequence: u32) -> Self {
        Self {
            data,
            width,
            height,
            timestamp_ns,
            sequence,
        }
    }

    /// Create a frame filled with a single colour
    pub fn filled(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data = rgb
            .iter()
            .copied()
            .cycle()
            .take((width * height * 3) as usize)
            .collect();
        Self::new(data, width, height, 0, 0)
    }

    /// Convert any decoded image into an RGB frame
    pub fn from_image(img: DynamicImage, timestamp_ns: u64, sequence: u32) -> Self {
        let rgb = img.to_rgb8();
        let (width, height) = rgb.dimensions();
        Self::new(rgb.into_raw(), width, height, timestamp_ns, sequence)
    }

    /// Get pixel at (x, y)
    pub fn get_pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = ((y * self.width + x) * 3) as usize;
        self.data.get(idx..idx + 3).map(|p| [p[0], p[1], p[2]])
    }

    /// Mirror the frame left-to-right (self-facing camera view)
    pub fn flip_horizontal(&mut self) {
        let row_len = (self.width * 3) as usize;
        if row_len == 0 {
            return;
        }
        for row in self.data.chunks_exact_mut(row_len) {
            let (mut left, mut right) = (0usize, self.width as usize - 1);
            while left < right {
                for c in 0..3 {
                    row.swap(left * 3 + c, right * 3 + c);
                }
                left += 1;
                right -= 1;
            }
        }
    }

    /// Run a closure against the frame as an `RgbImage` without copying pixels
    pub fn with_image<R>(&mut self, f: impl FnOnce(&mut RgbImage) -> R) -> Result<R, CameraError> {
        self.check_len()?;
        let data = std::mem::take(&mut self.data);
        let mut img = RgbImage::from_raw(self.width, self.height, data)
            .ok_or_else(|| CameraError::Format("frame buffer rejected".into()))?;
        let out = f(&mut img);
        self.data = img.into_raw();
        Ok(out)
    }

    pub(crate) fn check_len(&self) -> Result<(), CameraError> {
        let expected = self.width as usize * self.height as usize * 3;
        if self.data.len() != expected {
            return Err(CameraError::Format(format!(
                "{} bytes do not match {}x{} RGB",
                self.data.len(),
                self.width,
                self.height
            )));
        }
        Ok(())
    }

    /// Copy the pixels into an image buffer
    pub fn to_image(&self) -> Result<RgbImage, CameraError> {
        self.check_len()?;
        RgbImage::from_raw(self.width, self.height, self.data.clone())
            .ok_or_else(|| CameraError::Format("frame buffer rejected".into()))
    }

    /// Encode the frame as JPEG
    pub fn encode_jpeg(&self, quality: u8) -> Result<Vec<u8>, CameraError> {
        let img = self.to_image()?;
        let mut buffer = Vec::with_capacity(self.data.len() / 8);
        JpegEncoder::new_with_quality(&mut buffer, quality.clamp(1, 100))
            .encode_image(&img)
            .map_err(|e| CameraError::Encode(e.to_string()))?;
        Ok(buffer)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> VideoFrame {
        let mut data = Vec::new();
        for _y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, 0, 255 - x as u8]);
            }
        }
        VideoFrame::new(data, width, height, 0, 0)
    }

    #[test]
    fn test_flip_horizontal() {
        let mut frame = gradient(5, 2);
        frame.flip_horizontal();

        assert_eq!(frame.get_pixel(0, 0), Some([4, 0, 251]));
        assert_eq!(frame.get_pixel(4, 1), Some([0, 0, 255]));
        // Centre column stays put on odd widths
        assert_eq!(frame.get_pixel(2, 0), Some([2, 0, 253]));
    }

    #[test]
    fn test_flip_twice_is_identity() {
        let original = gradient(8, 3);
        let mut frame = original.clone();
        frame.flip_horizontal();
        frame.flip_horizontal();
        assert_eq!(frame.data, original.data);
    }

    #[test]
    fn test_encode_jpeg() {
        let frame = VideoFrame::filled(32, 16, [10, 200, 30]);
        let jpeg = frame.encode_jpeg(80).unwrap();

        // SOI marker
        assert_eq!(&jpeg[..2], &[0xFF, 0xD8]);
        let decoded = image::load_from_memory(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 16);
    }

    #[test]
    fn test_mismatched_buffer_is_rejected() {
        let frame = VideoFrame::new(vec![0; 10], 4, 4, 0, 0);
        assert!(matches!(frame.encode_jpeg(80), Err(CameraError::Format(_))));
    }

    #[test]
    fn test_with_image_round_trips_pixels() {
        let mut frame = VideoFrame::filled(4, 4, [0, 0, 0]);
        frame
            .with_image(|img| img.put_pixel(1, 2, image::Rgb([9, 8, 7])))
            .unwrap();
        assert_eq!(frame.get_pixel(1, 2), Some([9, 8, 7]));
        assert_eq!(frame.data.len(), 48);
    }

    #[test]
    fn test_with_image_keeps_pixels_on_error() {
        let mut frame = VideoFrame::new(vec![1; 10], 4, 4, 0, 0);
        assert!(frame.with_image(|_| ()).is_err());
        assert_eq!(frame.data, vec![1; 10]);
    }
}
