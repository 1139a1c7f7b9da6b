//! Alerting System
//!
//! Plays the drowsiness alert without blocking the frame loop.

mod player;

pub use player::{
    build_player, AlertConfig, AlertPlayer, CommandAlertPlayer, LogAlertPlayer,
    RecordingAlertPlayer,
};

use thiserror::Error;

/// Alerting error types
#[derive(Error, Debug)]
pub enum AlertError {
    #[error("Alert command is empty")]
    EmptyCommand,

    #[error("Failed to start alert command: {0}")]
    Spawn(String),
}
