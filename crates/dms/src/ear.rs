//! Eye aspect ratio (EAR) from six eye landmarks

use serde::{Deserialize, Serialize};

use crate::DmsError;

/// 2D point in image pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Keypoint {
    pub x: f32,
    pub y: f32,
}

impl Keypoint {
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn distance(&self, other: &Keypoint) -> f32 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

/// Six ordered points of one eye: outer corner, two upper-lid points,
/// inner corner, two lower-lid points.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EyeLandmarks(pub [Keypoint; 6]);

/// Per-eye and mean EAR for one face
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EarReading {
    pub left: f32,
    pub right: f32,
    pub mean: f32,
}

/// Eye aspect ratio: (|P1-P5| + |P2-P4|) / (2 |P0-P3|).
///
/// A zero-width eye (coincident corners) yields `DmsError::DegenerateEye`
/// instead of a division by zero.
pub fn eye_aspect_ratio(eye: &EyeLandmarks) -> Result<f32, DmsError> {
    let p = &eye.0;
    let a = p[1].distance(&p[5]);
    let b = p[2].distance(&p[4]);
    let c = p[0].distance(&p[3]);

    if c.is_nan() || c <= f32::EPSILON {
        return Err(DmsError::DegenerateEye(format!("eye width {c}")));
    }
    let ear = (a + b) / (2.0 * c);
    if !ear.is_finite() {
        return Err(DmsError::DegenerateEye(format!("non-finite ratio {ear}")));
    }
    Ok(ear)
}

/// Frame-level EAR: mean of both eyes
pub fn frame_ear(left: &EyeLandmarks, right: &EyeLandmarks) -> Result<EarReading, DmsError> {
    let left = eye_aspect_ratio(left)?;
    let right = eye_aspect_ratio(right)?;
    Ok(EarReading {
        left,
        right,
        mean: (left + right) / 2.0,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    /// Eye of the given width whose lids are `opening` apart
    fn eye(cx: f32, cy: f32, width: f32, opening: f32) -> EyeLandmarks {
        let half_w = width / 2.0;
        let half_h = opening / 2.0;
        EyeLandmarks([
            Keypoint::new(cx - half_w, cy),
            Keypoint::new(cx - half_w / 3.0, cy - half_h),
            Keypoint::new(cx + half_w / 3.0, cy - half_h),
            Keypoint::new(cx + half_w, cy),
            Keypoint::new(cx + half_w / 3.0, cy + half_h),
            Keypoint::new(cx - half_w / 3.0, cy + half_h),
        ])
    }

    #[test]
    fn test_known_ratio() {
        let ear = eye_aspect_ratio(&eye(100.0, 100.0, 40.0, 12.0)).unwrap();
        assert!((ear - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_closed_eye_is_zero() {
        let ear = eye_aspect_ratio(&eye(50.0, 50.0, 30.0, 0.0)).unwrap();
        assert_eq!(ear, 0.0);
    }

    #[test]
    fn test_zero_width_is_degenerate() {
        let point = Keypoint::new(10.0, 10.0);
        let collapsed = EyeLandmarks([point; 6]);
        assert!(matches!(
            eye_aspect_ratio(&collapsed),
            Err(DmsError::DegenerateEye(_))
        ));
    }

    #[test]
    fn test_nan_coordinates_are_degenerate() {
        let mut landmarks = eye(10.0, 10.0, 20.0, 5.0);
        landmarks.0[3] = Keypoint::new(f32::NAN, 10.0);
        assert!(eye_aspect_ratio(&landmarks).is_err());
    }

    #[test]
    fn test_frame_ear_is_mean() {
        let reading = frame_ear(&eye(0.0, 0.0, 10.0, 2.0), &eye(50.0, 0.0, 10.0, 4.0)).unwrap();
        assert!((reading.left - 0.2).abs() < 1e-6);
        assert!((reading.right - 0.4).abs() < 1e-6);
        assert!((reading.mean - 0.3).abs() < 1e-6);
    }

    #[test]
    fn test_frame_ear_fails_if_either_eye_degenerate() {
        let bad = EyeLandmarks([Keypoint::default(); 6]);
        assert!(frame_ear(&eye(0.0, 0.0, 10.0, 2.0), &bad).is_err());
    }

    proptest! {
        #[test]
        fn ear_is_non_negative(
            coords in proptest::array::uniform12(-1000.0f32..1000.0),
        ) {
            let points: Vec<Keypoint> = coords
                .chunks_exact(2)
                .map(|c| Keypoint::new(c[0], c[1]))
                .collect();
            let landmarks = EyeLandmarks([
                points[0], points[1], points[2], points[3], points[4], points[5],
            ]);
            if let Ok(ear) = eye_aspect_ratio(&landmarks) {
                prop_assert!(ear >= 0.0);
            }
        }

        #[test]
        fn ear_is_scale_invariant(
            width in 5.0f32..200.0,
            opening in 0.0f32..80.0,
            scale in 0.1f32..10.0,
        ) {
            let base = eye_aspect_ratio(&eye(300.0, 200.0, width, opening)).unwrap();
            let scaled = eye_aspect_ratio(
                &eye(300.0 * scale, 200.0 * scale, width * scale, opening * scale),
            ).unwrap();
            prop_assert!((base - scaled).abs() <= 1e-3 * base.max(1.0));
        }
    }
}
