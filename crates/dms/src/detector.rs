//! Facial landmark providers

use camera_capture::VideoFrame;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::config::{LandmarkConfig, ProviderKind, ScriptStep};
use crate::ear::{EyeLandmarks, Keypoint};
use crate::DmsError;

/// Number of points in a face mesh
pub const FACE_MESH_POINTS: usize = 468;

/// Face-mesh indices of the left eye, ordered P0..P5
pub const LEFT_EYE: [usize; 6] = [33, 160, 158, 133, 153, 144];

/// Face-mesh indices of the right eye, ordered P0..P5
pub const RIGHT_EYE: [usize; 6] = [263, 387, 385, 362, 380, 373];

/// Landmark in normalized [0, 1] image coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct NormalizedPoint {
    pub x: f32,
    pub y: f32,
}

impl NormalizedPoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    /// Convert to pixel space
    pub fn to_pixel(&self, width: u32, height: u32) -> Keypoint {
        Keypoint::new(self.x * width as f32, self.y * height as f32)
    }
}

/// Landmarks of one detected face
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FaceLandmarks {
    pub points: Vec<NormalizedPoint>,
}

impl FaceLandmarks {
    pub fn new(points: Vec<NormalizedPoint>) -> Self {
        Self { points }
    }

    /// Pixel-space eye landmarks for the given mesh indices
    pub fn eye(&self, indices: &[usize; 6], width: u32, height: u32) -> Result<EyeLandmarks, DmsError> {
        let mut eye = [Keypoint::default(); 6];
        for (slot, &index) in eye.iter_mut().zip(indices) {
            let point = self
                .points
                .get(index)
                .ok_or(DmsError::KeypointsMissing { index, available: self.points.len() })?;
            *slot = point.to_pixel(width, height);
        }
        Ok(EyeLandmarks(eye))
    }

    pub fn left_eye(&self, width: u32, height: u32) -> Result<EyeLandmarks, DmsError> {
        self.eye(&LEFT_EYE, width, height)
    }

    pub fn right_eye(&self, width: u32, height: u32) -> Result<EyeLandmarks, DmsError> {
        self.eye(&RIGHT_EYE, width, height)
    }
}

/// Source of facial landmarks for a frame.
///
/// Returns zero or more faces; an empty result is not an error.
pub trait LandmarkProvider: Send {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, DmsError>;
}

/// Provider that never sees a face
#[derive(Debug, Default)]
pub struct NoFaceProvider;

impl LandmarkProvider for NoFaceProvider {
    fn detect(&mut self, _frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, DmsError> {
        Ok(Vec::new())
    }
}

/// Deterministic provider replaying a scripted EAR sequence.
///
/// Each frame yields a synthetic mesh whose eyes measure exactly the
/// scripted EAR in the frame's pixel space.
#[derive(Debug, Clone)]
pub struct ScriptedLandmarks {
    steps: Vec<ScriptStep>,
    step: usize,
    frame_in_step: u32,
    looping: bool,
}

impl ScriptedLandmarks {
    pub fn new(steps: Vec<ScriptStep>, looping: bool) -> Self {
        Self {
            steps: steps.into_iter().filter(|s| s.frames > 0).collect(),
            step: 0,
            frame_in_step: 0,
            looping,
        }
    }

    /// One EAR value per frame
    pub fn from_ears(ears: impl IntoIterator<Item = f32>) -> Self {
        Self::new(ears.into_iter().map(|ear| ScriptStep::face(ear, 1)).collect(), false)
    }

    fn next_step(&mut self) -> Option<Option<f32>> {
        if self.step >= self.steps.len() {
            if !self.looping || self.steps.is_empty() {
                return None;
            }
            self.step = 0;
        }
        let current = self.steps[self.step];
        self.frame_in_step += 1;
        if self.frame_in_step >= current.frames {
            self.step += 1;
            self.frame_in_step = 0;
        }
        Some(current.ear)
    }
}

impl LandmarkProvider for ScriptedLandmarks {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, DmsError> {
        match self.next_step() {
            Some(Some(ear)) => Ok(vec![synthetic_face(ear, frame.width, frame.height)]),
            _ => Ok(Vec::new()),
        }
    }
}

/// Face mesh with both eyes open to `ear`
pub fn synthetic_face(ear: f32, width: u32, height: u32) -> FaceLandmarks {
    let mut points = vec![NormalizedPoint::new(0.5, 0.5); FACE_MESH_POINTS];
    let aspect = width.max(1) as f32 / height.max(1) as f32;

    for (indices, cx) in [(&LEFT_EYE, 0.38), (&RIGHT_EYE, 0.62)] {
        let half_w = 0.06;
        // Opening in normalized y that gives `ear` once scaled to pixels
        let half_h = ear * half_w * aspect;
        let cy = 0.4;
        let eye = [
            NormalizedPoint::new(cx - half_w, cy),
            NormalizedPoint::new(cx - half_w / 3.0, cy - half_h),
            NormalizedPoint::new(cx + half_w / 3.0, cy - half_h),
            NormalizedPoint::new(cx + half_w, cy),
            NormalizedPoint::new(cx + half_w / 3.0, cy + half_h),
            NormalizedPoint::new(cx - half_w / 3.0, cy + half_h),
        ];
        for (&index, point) in indices.iter().zip(eye) {
            points[index] = point;
        }
    }
    FaceLandmarks::new(points)
}

/// Build the provider named in the configuration
pub fn build_provider(config: &LandmarkConfig) -> Result<Box<dyn LandmarkProvider>, DmsError> {
    match config.kind {
        ProviderKind::Scripted => {
            info!(
                "Using scripted landmarks ({} steps, loop: {})",
                config.script.len(),
                config.loop_script
            );
            Ok(Box::new(ScriptedLandmarks::new(
                config.script.clone(),
                config.loop_script,
            )))
        }
        ProviderKind::None => {
            warn!("Landmark provider disabled; no face will ever be detected");
            Ok(Box::new(NoFaceProvider))
        }
        ProviderKind::Onnx => build_onnx(config),
    }
}

#[cfg(feature = "onnx")]
fn build_onnx(config: &LandmarkConfig) -> Result<Box<dyn LandmarkProvider>, DmsError> {
    let path = config
        .model_path
        .as_deref()
        .ok_or_else(|| DmsError::Config("onnx provider requires model_path".into()))?;
    Ok(Box::new(crate::onnx::OnnxFaceMesh::new(
        path,
        config.face_confidence,
    )?))
}

#[cfg(not(feature = "onnx"))]
fn build_onnx(_config: &LandmarkConfig) -> Result<Box<dyn LandmarkProvider>, DmsError> {
    Err(DmsError::Config(
        "onnx provider requested but dms was built without the `onnx` feature".into(),
    ))
}
