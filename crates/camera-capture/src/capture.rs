//! Live cameras and video files through OpenCV `VideoCapture`

use std::path::Path;
use std::time::Instant;

use opencv::{
    core::{Mat, CV_8UC3},
    imgproc,
    prelude::*,
    videoio::{self, VideoCapture},
};
use tracing::{debug, info, warn};

use crate::source::{FrameSource, Pacer};
use crate::{CameraError, SourceConfig, VideoFrame};

impl From<opencv::Error> for CameraError {
    fn from(err: opencv::Error) -> Self {
        CameraError::Stream(err.to_string())
    }
}

/// Frames read from a `VideoCapture` device or file
pub struct CaptureSource {
    cap: VideoCapture,
    /// Rewind instead of ending (files only)
    rewind: bool,
    max_frames: Option<u64>,
    produced: u64,
    started: Instant,
    pacer: Pacer,
}

impl CaptureSource {
    /// Open camera `index`; the device paces the frames itself
    pub fn camera(index: i32, config: &SourceConfig) -> Result<Self, CameraError> {
        let mut cap = VideoCapture::new(index, videoio::CAP_ANY)
            .map_err(|e| CameraError::Open(format!("camera {}: {}", index, e)))?;
        if !cap.is_opened()? {
            return Err(CameraError::Open(format!("camera {} is not available", index)));
        }

        // Keep only the latest frame so a slow loop never works on stale ones
        cap.set(videoio::CAP_PROP_BUFFERSIZE, 1.0)?;
        cap.set(videoio::CAP_PROP_FRAME_WIDTH, config.width as f64)?;
        cap.set(videoio::CAP_PROP_FRAME_HEIGHT, config.height as f64)?;
        if config.fps > 0 {
            cap.set(videoio::CAP_PROP_FPS, config.fps as f64)?;
        }
        info!(
            "Opened camera {} at {}x{}",
            index,
            cap.get(videoio::CAP_PROP_FRAME_WIDTH)?,
            cap.get(videoio::CAP_PROP_FRAME_HEIGHT)?
        );

        Ok(Self {
            cap,
            rewind: false,
            max_frames: config.max_frames,
            produced: 0,
            started: Instant::now(),
            pacer: Pacer::new(0),
        })
    }

    /// Open a video file, replayed at `config.fps`
    pub fn file(path: &Path, config: &SourceConfig) -> Result<Self, CameraError> {
        let name = path
            .to_str()
            .ok_or_else(|| CameraError::Open(format!("non UTF-8 path {}", path.display())))?;
        let cap = VideoCapture::from_file(name, videoio::CAP_ANY)
            .map_err(|e| CameraError::Open(format!("{}: {}", path.display(), e)))?;
        if !cap.is_opened()? {
            return Err(CameraError::Open(format!(
                "cannot open video file {}",
                path.display()
            )));
        }
        info!(
            "Opened video file {} ({} frames @ {} fps)",
            path.display(),
            cap.get(videoio::CAP_PROP_FRAME_COUNT)?,
            cap.get(videoio::CAP_PROP_FPS)?
        );

        Ok(Self {
            cap,
            rewind: config.loop_playback,
            max_frames: config.max_frames,
            produced: 0,
            started: Instant::now(),
            pacer: Pacer::new(config.fps),
        })
    }

    /// `None` on an empty read
    fn read_mat(&mut self) -> Result<Option<Mat>, CameraError> {
        let mut mat = Mat::default();
        if !self.cap.read(&mut mat)? || mat.empty() {
            return Ok(None);
        }
        Ok(Some(mat))
    }
}

impl FrameSource for CaptureSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.max_frames.is_some_and(|max| self.produced >= max) {
            return Ok(None);
        }
        self.pacer.wait();

        let mat = match self.read_mat()? {
            Some(mat) => mat,
            None if self.rewind && self.produced > 0 => {
                debug!("Rewinding video after {} frames", self.produced);
                self.cap.set(videoio::CAP_PROP_POS_FRAMES, 0.0)?;
                match self.read_mat()? {
                    Some(mat) => mat,
                    None => return Ok(None),
                }
            }
            None => {
                warn!("Capture returned no frame after {}", self.produced);
                return Ok(None);
            }
        };

        let frame = bgr_to_frame(
            &mat,
            self.started.elapsed().as_nanos() as u64,
            self.produced as u32,
        )?;
        self.produced += 1;
        Ok(Some(frame))
    }
}

/// Packed RGB copy of an 8-bit BGR `Mat`
fn bgr_to_frame(mat: &Mat, timestamp_ns: u64, sequence: u32) -> Result<VideoFrame, CameraError> {
    if mat.typ() != CV_8UC3 {
        return Err(CameraError::Format(format!(
            "expected 8-bit BGR frame, got Mat type {}",
            mat.typ()
        )));
    }

    let mut rgb = Mat::default();
    imgproc::cvt_color(mat, &mut rgb, imgproc::COLOR_BGR2RGB, 0)?;
    let data = rgb.data_bytes()?.to_vec();

    let frame = VideoFrame::new(
        data,
        rgb.cols() as u32,
        rgb.rows() as u32,
        timestamp_ns,
        sequence,
    );
    frame.check_len()?;
    Ok(frame)
}

#[cfg(test)]
mod tests {
    use super::*;
    use opencv::core::{Scalar, CV_8UC1};

    #[test]
    fn test_bgr_mat_becomes_rgb_frame() {
        let mat = Mat::new_rows_cols_with_default(4, 6, CV_8UC3, Scalar::new(10.0, 20.0, 30.0, 0.0))
            .unwrap();
        let frame = bgr_to_frame(&mat, 0, 7).unwrap();

        assert_eq!((frame.width, frame.height), (6, 4));
        assert_eq!(frame.sequence, 7);
        assert_eq!(frame.get_pixel(5, 3), Some([30, 20, 10]));
    }

    #[test]
    fn test_grey_mat_rejected() {
        let mat =
            Mat::new_rows_cols_with_default(4, 6, CV_8UC1, Scalar::all(0.0)).unwrap();
        assert!(matches!(bgr_to_frame(&mat, 0, 0), Err(CameraError::Format(_))));
    }

    #[test]
    fn test_missing_video_file_fails_to_open() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing.mp4");
        let result = CaptureSource::file(&path, &SourceConfig::video(&path));
        assert!(matches!(result, Err(CameraError::Open(_))));
    }
}
