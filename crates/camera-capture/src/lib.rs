//! Camera Capture Library for the Drowsiness Monitor
//!
//! Provides the decoded RGB frame type and the sources that feed the
//! streaming loop:
//! - Still-image sequences replayed at a fixed frame rate
//! - Synthetic flat-colour frames for demos and tests
//! - Cameras and video files via OpenCV (`opencv` feature)

#[cfg(feature = "opencv")]
pub mod capture;
pub mod frame;
pub mod source;

#[cfg(feature = "opencv")]
pub use capture::CaptureSource;
pub use frame::VideoFrame;
pub use source::{open_source, FrameSource, ImageSequenceSource, SyntheticSource};

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open source: {0}")]
    Open(String),

    #[error("Invalid frame: {0}")]
    Format(String),

    #[error("Failed to decode frame {path}: {reason}")]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode frame: {0}")]
    Encode(String),

    #[error("Streaming error: {0}")]
    Stream(String),
}

impl From<std::io::Error> for CameraError {
    fn from(err: std::io::Error) -> Self {
        CameraError::Stream(err.to_string())
    }
}

/// Kind of video source
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    /// Flat-colour generated frames
    #[default]
    Synthetic,
    /// Directory of still images, replayed in file-name order
    Images,
    /// Camera device (`opencv` feature)
    Camera,
    /// Video file (`opencv` feature)
    Video,
}

/// Video source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    /// Source kind
    pub kind: SourceKind,
    /// Image directory or video file
    pub path: Option<PathBuf>,
    /// Camera device index
    pub device: i32,
    /// Target FPS (0 = as fast as frames can be produced)
    pub fps: u32,
    /// Restart from the first image once the sequence is exhausted
    pub loop_playback: bool,
    /// Synthetic frame width
    pub width: u32,
    /// Synthetic frame height
    pub height: u32,
    /// Stop after this many frames
    pub max_frames: Option<u64>,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            kind: SourceKind::Synthetic,
            path: None,
            device: 0,
            fps: 15,
            loop_playback: false,
            width: 640,
            height: 480,
            max_frames: None,
        }
    }
}

impl SourceConfig {
    /// Replay a directory of images
    pub fn images(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Images,
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Camera device at its native rate
    pub fn camera(device: i32) -> Self {
        Self {
            kind: SourceKind::Camera,
            device,
            fps: 0,
            ..Default::default()
        }
    }

    /// Play back a video file
    pub fn video(path: impl Into<PathBuf>) -> Self {
        Self {
            kind: SourceKind::Video,
            path: Some(path.into()),
            ..Default::default()
        }
    }

    /// Unpaced synthetic source, for tests
    pub fn synthetic(width: u32, height: u32, max_frames: u64) -> Self {
        Self {
            kind: SourceKind::Synthetic,
            fps: 0,
            width,
            height,
            max_frames: Some(max_frames),
            ..Default::default()
        }
    }
}
