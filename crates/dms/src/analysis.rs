//! Per-frame DMS analysis results

use serde::{Deserialize, Serialize};

use crate::ear::EarReading;
use crate::state::{AlertState, StateUpdate};

/// Why a detected face did not update the state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum SkipReason {
    /// Eye landmarks collapsed to zero width
    DegenerateEye(String),
    /// Provider returned too few points
    KeypointsMissing(usize),
}

/// Complete analysis of one frame
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DmsAnalysis {
    /// Number of faces the provider returned
    pub faces: usize,

    /// EAR of the canonical (first) face
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ear: Option<EarReading>,

    /// State machine output, when the face was usable
    #[serde(skip_serializing_if = "Option::is_none")]
    pub update: Option<StateUpdate>,

    /// Set when a face was found but could not be measured
    #[serde(skip_serializing_if = "Option::is_none")]
    pub skipped: Option<SkipReason>,

    /// State after this frame
    pub state: AlertState,
}

impl DmsAnalysis {
    pub fn face_detected(&self) -> bool {
        self.faces > 0
    }

    /// True when the alert collaborator must be invoked
    pub fn should_alert(&self) -> bool {
        self.update.is_some_and(|u| u.should_alert)
    }
}
