//! Face-mesh landmark model through ONNX Runtime

use std::path::Path;

use camera_capture::VideoFrame;
use ndarray::Array4;
use ort::session::builder::GraphOptimizationLevel;
use ort::session::Session;
use tracing::{debug, error, info};

use crate::detector::{FaceLandmarks, LandmarkProvider, NormalizedPoint, FACE_MESH_POINTS};
use crate::DmsError;

/// Square input edge of the face-landmark model
const INPUT_SIZE: u32 = 192;

/// MediaPipe face-landmark model run on the whole frame.
///
/// Output 0 holds 468 (x, y, z) points in input pixels; output 1, when the
/// model has it, is the face-presence logit.
pub struct OnnxFaceMesh {
    face_confidence: f32,
    session: Session,
}

impl OnnxFaceMesh {
    pub fn new(model_path: &Path, face_confidence: f32) -> Result<Self, DmsError> {
        info!("Loading face mesh model from {}", model_path.display());
        let session = Session::builder()
            .and_then(|builder| builder.with_optimization_level(GraphOptimizationLevel::Level3))
            .and_then(|builder| builder.commit_from_file(model_path))
            .map_err(|e| {
                error!("Failed to load face mesh model: {}", e);
                DmsError::ModelLoad(e.to_string())
            })?;

        Ok(Self {
            face_confidence,
            session,
        })
    }

    fn preprocess(frame: &VideoFrame) -> Result<Array4<f32>, DmsError> {
        let img = frame.to_image()?;
        let resized = image::imageops::resize(
            &img,
            INPUT_SIZE,
            INPUT_SIZE,
            image::imageops::FilterType::Triangle,
        );

        // NHWC, 0..1
        let mut input = Array4::<f32>::zeros((1, INPUT_SIZE as usize, INPUT_SIZE as usize, 3));
        for (x, y, pixel) in resized.enumerate_pixels() {
            for c in 0..3 {
                input[[0, y as usize, x as usize, c]] = pixel[c] as f32 / 255.0;
            }
        }
        Ok(input)
    }
}

impl LandmarkProvider for OnnxFaceMesh {
    fn detect(&mut self, frame: &VideoFrame) -> Result<Vec<FaceLandmarks>, DmsError> {
        let input = Self::preprocess(frame)?;
        let has_presence = self.session.outputs.len() > 1;

        let outputs = self
            .session
            .run(ort::inputs![input].map_err(|e| DmsError::Inference(e.to_string()))?)
            .map_err(|e| DmsError::Inference(e.to_string()))?;

        if has_presence {
            let logits = outputs[1]
                .try_extract_tensor::<f32>()
                .map_err(|e| DmsError::Inference(e.to_string()))?;
            let presence = logits
                .iter()
                .next()
                .map(|logit| 1.0 / (1.0 + (-logit).exp()))
                .unwrap_or(0.0);
            if presence < self.face_confidence {
                debug!("Face presence {:.2} below threshold", presence);
                return Ok(Vec::new());
            }
        }

        let raw = outputs[0]
            .try_extract_tensor::<f32>()
            .map_err(|e| DmsError::Inference(e.to_string()))?;
        let values: Vec<f32> = raw.iter().copied().collect();
        if values.len() < FACE_MESH_POINTS * 3 {
            return Err(DmsError::Inference(format!(
                "expected {} landmark values, got {}",
                FACE_MESH_POINTS * 3,
                values.len()
            )));
        }

        let scale = INPUT_SIZE as f32;
        let points = values
            .chunks_exact(3)
            .take(FACE_MESH_POINTS)
            .map(|p| NormalizedPoint::new(p[0] / scale, p[1] / scale))
            .collect();
        Ok(vec![FaceLandmarks::new(points)])
    }
}
