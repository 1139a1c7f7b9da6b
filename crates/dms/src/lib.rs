//! Driver Monitoring System (DMS)
//!
//! Eye-openness based alertness monitoring:
//! - Facial landmark extraction behind a swappable provider
//! - Eye aspect ratio (EAR) from six eye landmarks
//! - Debounced ACTIVE / DROWSY / SLEEP classification with a one-shot alert latch
//! - Status overlay for outgoing frames

pub mod analysis;
pub mod config;
pub mod detector;
pub mod ear;
#[cfg(feature = "onnx")]
pub mod onnx;
pub mod overlay;
pub mod state;

pub use analysis::{DmsAnalysis, SkipReason};
pub use config::{LandmarkConfig, ProviderKind, ScriptStep, ThresholdConfig};
pub use detector::{build_provider, FaceLandmarks, LandmarkProvider, NoFaceProvider, ScriptedLandmarks};
pub use ear::{eye_aspect_ratio, frame_ear, EarReading, EyeLandmarks, Keypoint};
pub use overlay::Annotator;
pub use state::{AlertState, AlertnessMachine, RunCounters, StateUpdate, StatusSnapshot};

use camera_capture::{CameraError, VideoFrame};
use thiserror::Error;
use tracing::debug;

/// DMS error types
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("Model loading failed: {0}")]
    ModelLoad(String),

    #[error("Inference failed: {0}")]
    Inference(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Degenerate eye landmarks: {0}")]
    DegenerateEye(String),

    #[error("Keypoint {index} missing ({available} available)")]
    KeypointsMissing { index: usize, available: usize },

    #[error("Frame error: {0}")]
    Frame(#[from] CameraError),
}

/// Driver monitoring module: landmarks in, alertness out
pub struct DmsModule {
    provider: Box<dyn LandmarkProvider>,
    machine: AlertnessMachine,
}

impl DmsModule {
    /// Create a new DMS module; fails on invalid thresholds
    pub fn new(thresholds: &ThresholdConfig, provider: Box<dyn LandmarkProvider>) -> Result<Self, DmsError> {
        Ok(Self {
            provider,
            machine: AlertnessMachine::new(thresholds)?,
        })
    }

    /// Analyze a single frame.
    ///
    /// Only the first detected face drives the state. A face whose eyes
    /// cannot be measured is reported as skipped and leaves the state
    /// untouched, as does a frame without faces. Provider failures are
    /// returned to the caller.
    pub fn analyze(&mut self, frame: &VideoFrame) -> Result<DmsAnalysis, DmsError> {
        let faces = self.provider.detect(frame)?;

        let Some(face) = faces.first() else {
            return Ok(DmsAnalysis {
                state: self.machine.state(),
                ..Default::default()
            });
        };
        if faces.len() > 1 {
            debug!("{} faces detected, using the first", faces.len());
        }

        let mut analysis = DmsAnalysis {
            faces: faces.len(),
            ..Default::default()
        };

        match Self::measure(face, frame.width, frame.height) {
            Ok(reading) => {
                analysis.ear = Some(reading);
                analysis.update = Some(self.machine.update(reading.mean));
            }
            Err(DmsError::DegenerateEye(reason)) => {
                debug!("Skipping face: degenerate eye ({})", reason);
                analysis.skipped = Some(SkipReason::DegenerateEye(reason));
            }
            Err(DmsError::KeypointsMissing { available, .. }) => {
                debug!("Skipping face: only {} keypoints", available);
                analysis.skipped = Some(SkipReason::KeypointsMissing(available));
            }
            Err(e) => return Err(e),
        }

        analysis.state = self.machine.state();
        Ok(analysis)
    }

    fn measure(face: &FaceLandmarks, width: u32, height: u32) -> Result<EarReading, DmsError> {
        let left = face.left_eye(width, height)?;
        let right = face.right_eye(width, height)?;
        frame_ear(&left, &right)
    }

    pub fn state(&self) -> AlertState {
        self.machine.state()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        self.machine.snapshot()
    }

    pub fn machine(&self) -> &AlertnessMachine {
        &self.machine
    }

    /// Enter the terminal state after the video source ends
    pub fn mark_ended(&mut self) {
        self.machine.mark_ended();
    }
}
