//! Alertness state tracking

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::{DmsError, ThresholdConfig};

/// Alertness classification
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AlertState {
    /// No state confirmed yet
    #[default]
    Inactive,
    Active,
    Drowsy,
    Sleep,
    /// Video source exhausted; no further updates
    Ended,
}

impl AlertState {
    /// Label used on the status endpoint and the overlay
    pub fn as_str(&self) -> &'static str {
        match self {
            AlertState::Inactive => "INACTIVE",
            AlertState::Active => "ACTIVE",
            AlertState::Drowsy => "DROWSY",
            AlertState::Sleep => "SLEEP",
            AlertState::Ended => "ENDED",
        }
    }

    /// Overlay colour (RGB)
    pub fn color(&self) -> [u8; 3] {
        match self {
            AlertState::Active => [0, 255, 0],
            AlertState::Drowsy => [255, 255, 0],
            AlertState::Sleep => [255, 0, 0],
            AlertState::Inactive | AlertState::Ended => [160, 160, 160],
        }
    }
}

impl std::fmt::Display for AlertState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Consecutive-frame runs; at most one is non-zero
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunCounters {
    pub sleep_run: u32,
    pub drowsy_run: u32,
    pub active_run: u32,
}

/// Sticky flag set when an alert fires, cleared on confirmed ACTIVE
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AlertLatch(bool);

impl AlertLatch {
    /// Arm the latch; returns true only on the false -> true edge
    fn trigger(&mut self) -> bool {
        !std::mem::replace(&mut self.0, true)
    }

    fn clear(&mut self) {
        self.0 = false;
    }

    pub fn is_set(&self) -> bool {
        self.0
    }
}

/// Result of feeding one EAR sample to the machine
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StateUpdate {
    pub state: AlertState,
    pub blinks: u64,
    pub closed: u64,
    /// Edge-triggered: true once per confirmed DROWSY/SLEEP episode
    pub should_alert: bool,
}

/// Point-in-time status as exposed to readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct StatusSnapshot {
    pub status: AlertState,
    pub blinks: u64,
    pub closed: u64,
}

/// Debounced EAR classifier.
///
/// Each sample extends the run of the band it falls in and resets the other
/// two. Once a run reaches `consec_frames` the state is confirmed, and stays
/// confirmed on every further frame of that run: SLEEP bumps `closed`,
/// ACTIVE bumps `blinks` and clears the alert latch.
#[derive(Debug, Clone)]
pub struct AlertnessMachine {
    sleep_threshold: f32,
    drowsy_threshold: f32,
    consec_frames: u32,
    state: AlertState,
    runs: RunCounters,
    blink_count: u64,
    closed_count: u64,
    latch: AlertLatch,
}

impl AlertnessMachine {
    pub fn new(config: &ThresholdConfig) -> Result<Self, DmsError> {
        config.validate()?;
        Ok(Self {
            sleep_threshold: config.sleep_threshold,
            drowsy_threshold: config.drowsy_threshold,
            consec_frames: config.consec_frames,
            state: AlertState::Inactive,
            runs: RunCounters::default(),
            blink_count: 0,
            closed_count: 0,
            latch: AlertLatch::default(),
        })
    }

    /// Feed one frame's EAR
    pub fn update(&mut self, ear: f32) -> StateUpdate {
        let mut should_alert = false;

        if ear < self.sleep_threshold {
            self.runs = RunCounters {
                sleep_run: self.runs.sleep_run.saturating_add(1),
                ..Default::default()
            };
            if self.runs.sleep_run >= self.consec_frames {
                self.confirm(AlertState::Sleep);
                self.closed_count += 1;
                should_alert = self.latch.trigger();
            }
        } else if ear < self.drowsy_threshold {
            self.runs = RunCounters {
                drowsy_run: self.runs.drowsy_run.saturating_add(1),
                ..Default::default()
            };
            if self.runs.drowsy_run >= self.consec_frames {
                self.confirm(AlertState::Drowsy);
                should_alert = self.latch.trigger();
            }
        } else {
            self.runs = RunCounters {
                active_run: self.runs.active_run.saturating_add(1),
                ..Default::default()
            };
            if self.runs.active_run >= self.consec_frames {
                self.confirm(AlertState::Active);
                self.blink_count += 1;
                self.latch.clear();
            }
        }

        if should_alert {
            info!("Alert triggered: {} (ear {:.3})", self.state, ear);
        }

        StateUpdate {
            state: self.state,
            blinks: self.blink_count,
            closed: self.closed_count,
            should_alert,
        }
    }

    fn confirm(&mut self, state: AlertState) {
        if self.state != state {
            debug!("Alertness {} -> {}", self.state, state);
        }
        self.state = state;
    }

    pub fn state(&self) -> AlertState {
        self.state
    }

    pub fn counters(&self) -> RunCounters {
        self.runs
    }

    pub fn latch(&self) -> bool {
        self.latch.is_set()
    }

    pub fn snapshot(&self) -> StatusSnapshot {
        StatusSnapshot {
            status: self.state,
            blinks: self.blink_count,
            closed: self.closed_count,
        }
    }

    /// Terminal state once the video source is exhausted
    pub fn mark_ended(&mut self) {
        self.state = AlertState::Ended;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn machine() -> AlertnessMachine {
        AlertnessMachine::new(&ThresholdConfig::default()).unwrap()
    }

    fn feed(machine: &mut AlertnessMachine, ear: f32, frames: usize) -> Vec<StateUpdate> {
        (0..frames).map(|_| machine.update(ear)).collect()
    }

    fn assert_exclusive(runs: RunCounters) {
        let non_zero = [runs.sleep_run, runs.drowsy_run, runs.active_run]
            .iter()
            .filter(|&&r| r > 0)
            .count();
        assert!(non_zero <= 1, "runs not exclusive: {:?}", runs);
    }

    #[test]
    fn test_sleep_confirmed_on_sixth_frame() {
        let mut m = machine();
        let updates = feed(&mut m, 0.15, 6);

        for update in &updates[..5] {
            assert_eq!(update.state, AlertState::Inactive);
            assert!(!update.should_alert);
            assert_eq!(update.closed, 0);
        }
        let last = updates[5];
        assert_eq!(last.state, AlertState::Sleep);
        assert_eq!(last.closed, 1);
        assert!(last.should_alert);
        assert!(m.latch());
    }

    #[test]
    fn test_alert_fires_once_per_episode() {
        let mut m = machine();
        let updates = feed(&mut m, 0.15, 20);

        assert_eq!(updates.iter().filter(|u| u.should_alert).count(), 1);
        // closed keeps counting every confirmed frame
        assert_eq!(updates.last().unwrap().closed, 15);
    }

    #[test]
    fn test_active_recovery_clears_latch() {
        let mut m = machine();
        feed(&mut m, 0.15, 6);
        assert!(m.latch());

        let updates = feed(&mut m, 0.30, 6);
        let last = updates[5];
        assert_eq!(last.state, AlertState::Active);
        assert_eq!(last.blinks, 1);
        assert!(!m.latch());
        assert!(!updates.iter().any(|u| u.should_alert));

        // A new episode alerts again
        let updates = feed(&mut m, 0.22, 6);
        assert_eq!(updates[5].state, AlertState::Drowsy);
        assert!(updates[5].should_alert);
    }

    #[test]
    fn test_drowsy_to_sleep_does_not_rearm() {
        let mut m = machine();
        let drowsy = feed(&mut m, 0.22, 6);
        assert!(drowsy[5].should_alert);

        let sleep = feed(&mut m, 0.10, 6);
        assert_eq!(sleep[5].state, AlertState::Sleep);
        assert!(!sleep.iter().any(|u| u.should_alert));
        assert_eq!(sleep[5].closed, 1);
    }

    #[test]
    fn test_oscillation_never_confirms() {
        let mut m = machine();
        for i in 0..100 {
            let ear = if i % 2 == 0 { 0.22 } else { 0.30 };
            let update = m.update(ear);
            assert_eq!(update.state, AlertState::Inactive);
            assert!(!update.should_alert);
            assert_exclusive(m.counters());
        }
        assert_eq!(m.snapshot(), StatusSnapshot::default());
    }

    #[test]
    fn test_debounce_interrupted_by_active_frame() {
        let mut m = machine();
        feed(&mut m, 0.15, 6);
        assert_eq!(m.state(), AlertState::Sleep);

        feed(&mut m, 0.22, 5);
        assert_eq!(m.counters().drowsy_run, 5);
        let update = m.update(0.30);

        assert_eq!(update.state, AlertState::Sleep);
        assert_eq!(
            m.counters(),
            RunCounters {
                sleep_run: 0,
                drowsy_run: 0,
                active_run: 1
            }
        );
    }

    #[test]
    fn test_threshold_boundaries() {
        let mut m = machine();
        // Exactly on the sleep threshold counts as drowsy
        m.update(0.20);
        assert_eq!(m.counters().drowsy_run, 1);
        // Exactly on the drowsy threshold counts as active
        m.update(0.25);
        assert_eq!(m.counters().active_run, 1);
        assert_exclusive(m.counters());
    }

    #[test]
    fn test_snapshot_is_stable_without_updates() {
        let mut m = machine();
        feed(&mut m, 0.30, 8);
        let first = m.snapshot();
        assert_eq!(first, m.snapshot());
        assert_eq!(first.status, AlertState::Active);
        assert_eq!(first.blinks, 3);
    }

    #[test]
    fn test_mark_ended_keeps_counters() {
        let mut m = machine();
        feed(&mut m, 0.15, 7);
        m.mark_ended();
        assert_eq!(m.snapshot().status, AlertState::Ended);
        assert_eq!(m.snapshot().closed, 2);
        assert!(m.latch());
    }

    #[test]
    fn test_invalid_config_rejected() {
        let config = ThresholdConfig {
            sleep_threshold: 0.3,
            ..Default::default()
        };
        assert!(AlertnessMachine::new(&config).is_err());
    }

    #[test]
    fn test_status_serialization() {
        assert_eq!(serde_json::to_string(&AlertState::Drowsy).unwrap(), "\"DROWSY\"");
        let snapshot = StatusSnapshot {
            status: AlertState::Sleep,
            blinks: 4,
            closed: 2,
        };
        assert_eq!(
            serde_json::to_string(&snapshot).unwrap(),
            r#"{"status":"SLEEP","blinks":4,"closed":2}"#
        );
    }
}
