//! DMS configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use crate::DmsError;

/// Alertness classification thresholds
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    /// EAR below this counts towards SLEEP
    pub sleep_threshold: f32,

    /// EAR below this (and not below `sleep_threshold`) counts towards DROWSY
    pub drowsy_threshold: f32,

    /// Consecutive frames a condition must hold before the state changes
    pub consec_frames: u32,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            sleep_threshold: 0.20,
            drowsy_threshold: 0.25,
            consec_frames: 6,
        }
    }
}

impl ThresholdConfig {
    /// Create strict config (reacts to partially closed eyes sooner)
    pub fn strict() -> Self {
        Self {
            sleep_threshold: 0.22,
            drowsy_threshold: 0.28,
            consec_frames: 4,
        }
    }

    /// Create lenient config (tolerates longer closures)
    pub fn lenient() -> Self {
        Self {
            sleep_threshold: 0.18,
            drowsy_threshold: 0.23,
            consec_frames: 10,
        }
    }

    /// Reject threshold combinations that make a state unreachable
    pub fn validate(&self) -> Result<(), DmsError> {
        for (name, value) in [
            ("sleep_threshold", self.sleep_threshold),
            ("drowsy_threshold", self.drowsy_threshold),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(DmsError::Config(format!(
                    "{name} must be a positive number, got {value}"
                )));
            }
        }
        if self.sleep_threshold >= self.drowsy_threshold {
            return Err(DmsError::Config(format!(
                "sleep_threshold ({}) must be below drowsy_threshold ({})",
                self.sleep_threshold, self.drowsy_threshold
            )));
        }
        if self.consec_frames == 0 {
            return Err(DmsError::Config("consec_frames must be at least 1".into()));
        }
        Ok(())
    }
}

/// Landmark provider selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Replays a scripted EAR sequence
    #[default]
    Scripted,
    /// Never detects a face
    None,
    /// Face-mesh model via ONNX Runtime (requires the `onnx` feature)
    Onnx,
}

/// One step of a scripted EAR sequence
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScriptStep {
    /// EAR to synthesize; absent means no face in the frame
    #[serde(default)]
    pub ear: Option<f32>,
    /// Number of frames to hold this value
    pub frames: u32,
}

impl ScriptStep {
    pub const fn face(ear: f32, frames: u32) -> Self {
        Self {
            ear: Some(ear),
            frames,
        }
    }

    pub const fn no_face(frames: u32) -> Self {
        Self { ear: None, frames }
    }
}

/// Landmark provider configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LandmarkConfig {
    pub kind: ProviderKind,

    /// Face-mesh model path (onnx only)
    pub model_path: Option<PathBuf>,

    /// Face presence confidence threshold (onnx only)
    pub face_confidence: f32,

    /// Scripted EAR sequence (scripted only)
    pub script: Vec<ScriptStep>,

    /// Restart the script when it runs out
    pub loop_script: bool,
}

impl Default for LandmarkConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Scripted,
            model_path: None,
            face_confidence: 0.5,
            script: demo_script(),
            loop_script: true,
        }
    }
}

/// Awake, drifting off, asleep, woken up, looked away
fn demo_script() -> Vec<ScriptStep> {
    vec![
        ScriptStep::face(0.31, 60),
        ScriptStep::face(0.23, 30),
        ScriptStep::face(0.15, 30),
        ScriptStep::face(0.31, 60),
        ScriptStep::no_face(15),
    ]
}
