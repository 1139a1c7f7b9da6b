//! Alert players

use serde::{Deserialize, Serialize};
use std::process::{Command, Stdio};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::AlertError;

/// Alert configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertConfig {
    /// Program and arguments run on every alert, e.g. `["aplay", "beep.wav"]`.
    /// Without a command alerts are only logged.
    pub command: Option<Vec<String>>,
}

/// Side effect run when an alert fires.
///
/// `play` must return immediately and may be called while a previous
/// alert is still playing.
pub trait AlertPlayer: Send + Sync {
    fn play(&self);
}

/// Logs the alert and nothing else
#[derive(Debug, Default)]
pub struct LogAlertPlayer;

impl AlertPlayer for LogAlertPlayer {
    fn play(&self) {
        warn!("Drowsiness alert");
    }
}

/// Runs an external command (typically an audio player) per alert
#[derive(Debug, Clone)]
pub struct CommandAlertPlayer {
    program: String,
    args: Vec<String>,
}

impl CommandAlertPlayer {
    pub fn new(command: &[String]) -> Result<Self, AlertError> {
        let (program, args) = command.split_first().ok_or(AlertError::EmptyCommand)?;
        if program.trim().is_empty() {
            return Err(AlertError::EmptyCommand);
        }
        Ok(Self {
            program: program.clone(),
            args: args.to_vec(),
        })
    }

    fn spawn(&self) -> Result<(), AlertError> {
        let mut child = Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
            .map_err(|e| AlertError::Spawn(format!("{}: {}", self.program, e)))?;

        // Reap the child off the caller's thread
        let program = self.program.clone();
        std::thread::Builder::new()
            .name("alert-reaper".into())
            .spawn(move || match child.wait() {
                Ok(status) if !status.success() => {
                    warn!("Alert command {} exited with {}", program, status)
                }
                Ok(_) => debug!("Alert command {} finished", program),
                Err(e) => warn!("Failed to wait for alert command {}: {}", program, e),
            })
            .map_err(|e| AlertError::Spawn(e.to_string()))?;
        Ok(())
    }
}

impl AlertPlayer for CommandAlertPlayer {
    fn play(&self) {
        warn!("Drowsiness alert, running {}", self.program);
        if let Err(e) = self.spawn() {
            warn!("{}", e);
        }
    }
}

/// Counts alerts; for tests and dry runs
#[derive(Debug, Default, Clone)]
pub struct RecordingAlertPlayer {
    plays: Arc<AtomicUsize>,
}

impl RecordingAlertPlayer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn plays(&self) -> usize {
        self.plays.load(Ordering::SeqCst)
    }
}

impl AlertPlayer for RecordingAlertPlayer {
    fn play(&self) {
        self.plays.fetch_add(1, Ordering::SeqCst);
    }
}

/// Create the player described by the configuration
pub fn build_player(config: &AlertConfig) -> Result<Arc<dyn AlertPlayer>, AlertError> {
    match &config.command {
        Some(command) => {
            let player = CommandAlertPlayer::new(command)?;
            info!("Alerts run {:?}", command);
            Ok(Arc::new(player))
        }
        None => {
            info!("No alert command configured; alerts are logged only");
            Ok(Arc::new(LogAlertPlayer))
        }
    }
}
