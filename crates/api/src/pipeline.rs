//! Streaming loop: frame -> landmarks -> EAR -> state -> overlay -> JPEG
//!
//! A single blocking thread owns the DMS state. Readers only ever see the
//! `watch` status snapshot and the bounded `broadcast` frame feed, so neither
//! HTTP clients nor a slow viewer can stall the loop.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use alerting::AlertPlayer;
use axum::body::Bytes;
use camera_capture::{FrameSource, VideoFrame};
use dms::{Annotator, DmsModule, StatusSnapshot};
use serde::Serialize;
use tokio::sync::{broadcast, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::PipelineConfig;

/// Why the loop stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineExit {
    /// Source has no more frames
    EndOfStream,
    /// Source failed to produce a frame
    SourceError(String),
    /// Stopped through a [`ShutdownHandle`]
    Shutdown,
}

/// Asks a running pipeline to stop before its next frame
#[derive(Debug, Clone, Default)]
pub struct ShutdownHandle(Arc<AtomicBool>);

impl ShutdownHandle {
    pub fn trigger(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// Counters shared with the health endpoint
#[derive(Debug, Default)]
pub struct PipelineStats {
    running: AtomicBool,
    frames: AtomicU64,
    faces_skipped: AtomicU64,
    detection_errors: AtomicU64,
    alerts: AtomicU64,
}

/// Plain copy of [`PipelineStats`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct StatsSnapshot {
    pub running: bool,
    pub frames_processed: u64,
    pub faces_skipped: u64,
    pub detection_errors: u64,
    pub alerts_fired: u64,
}

impl PipelineStats {
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            running: self.running.load(Ordering::Acquire),
            frames_processed: self.frames.load(Ordering::Relaxed),
            faces_skipped: self.faces_skipped.load(Ordering::Relaxed),
            detection_errors: self.detection_errors.load(Ordering::Relaxed),
            alerts_fired: self.alerts.load(Ordering::Relaxed),
        }
    }
}

/// Consumer side of the pipeline
#[derive(Debug, Clone)]
pub struct PipelineFeeds {
    /// Latest status; always readable, never blocks the writer
    pub status: watch::Receiver<StatusSnapshot>,
    /// Encoded JPEG frames; subscribe per viewer
    pub frames: broadcast::Sender<Bytes>,
    pub stats: Arc<PipelineStats>,
}

/// Owns the source, the DMS state and the alert side effect
pub struct Pipeline {
    source: Box<dyn FrameSource>,
    dms: DmsModule,
    alert_player: Arc<dyn AlertPlayer>,
    annotator: Annotator,
    config: PipelineConfig,
    status_tx: watch::Sender<StatusSnapshot>,
    frames_tx: broadcast::Sender<Bytes>,
    stats: Arc<PipelineStats>,
    shutdown: ShutdownHandle,
}

impl Pipeline {
    pub fn new(
        source: Box<dyn FrameSource>,
        dms: DmsModule,
        alert_player: Arc<dyn AlertPlayer>,
        config: PipelineConfig,
    ) -> (Self, PipelineFeeds) {
        let (status_tx, status_rx) = watch::channel(dms.snapshot());
        let (frames_tx, _) = broadcast::channel(config.frame_channel_capacity.max(1));
        let stats = Arc::new(PipelineStats::default());

        let feeds = PipelineFeeds {
            status: status_rx,
            frames: frames_tx.clone(),
            stats: stats.clone(),
        };
        let pipeline = Self {
            source,
            dms,
            alert_player,
            annotator: Annotator::default(),
            config,
            status_tx,
            frames_tx,
            stats,
            shutdown: ShutdownHandle::default(),
        };
        (pipeline, feeds)
    }

    /// Handle that stops the loop from another task
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.shutdown.clone()
    }

    /// Run on a dedicated blocking thread
    pub fn spawn(self) -> JoinHandle<PipelineExit> {
        tokio::task::spawn_blocking(move || self.run())
    }

    /// Process frames until the source ends, fails or shutdown is requested
    pub fn run(mut self) -> PipelineExit {
        self.stats.running.store(true, Ordering::Release);
        info!("Streaming loop started");

        let exit = loop {
            if self.shutdown.is_triggered() {
                break PipelineExit::Shutdown;
            }
            let mut frame = match self.source.next_frame() {
                Ok(Some(frame)) => frame,
                Ok(None) => break PipelineExit::EndOfStream,
                Err(e) => {
                    warn!("Video source failed: {}", e);
                    break PipelineExit::SourceError(e.to_string());
                }
            };
            self.process(&mut frame);
        };

        self.dms.mark_ended();
        self.publish_status();
        self.stats.running.store(false, Ordering::Release);
        info!(
            "Streaming loop stopped after {} frames: {:?}",
            self.stats.frames.load(Ordering::Relaxed),
            exit
        );
        exit
    }

    fn process(&mut self, frame: &mut VideoFrame) {
        if self.config.mirror {
            frame.flip_horizontal();
        }

        let annotate = match self.dms.analyze(frame) {
            Ok(analysis) => {
                if let Some(reading) = analysis.ear {
                    metrics::gauge!("dms_ear").set(reading.mean as f64);
                }
                if analysis.skipped.is_some() {
                    self.stats.faces_skipped.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("dms_faces_skipped_total").increment(1);
                }
                if analysis.should_alert() {
                    self.stats.alerts.fetch_add(1, Ordering::Relaxed);
                    metrics::counter!("dms_alerts_total").increment(1);
                    self.alert_player.play();
                }
                true
            }
            Err(e) => {
                // Frame still goes out, just without the overlay
                warn!("Landmark extraction failed on frame {}: {}", frame.sequence, e);
                self.stats.detection_errors.fetch_add(1, Ordering::Relaxed);
                false
            }
        };

        if annotate {
            if let Err(e) = self.annotator.annotate(frame, self.dms.state()) {
                warn!("Failed to annotate frame {}: {}", frame.sequence, e);
            }
        }

        match frame.encode_jpeg(self.config.jpeg_quality) {
            Ok(jpeg) => {
                // No subscribers is fine; frames are simply dropped
                if self.frames_tx.send(Bytes::from(jpeg)).is_err() {
                    debug!("No viewers for frame {}", frame.sequence);
                }
            }
            Err(e) => warn!("Failed to encode frame {}: {}", frame.sequence, e),
        }

        self.publish_status();
        self.stats.frames.fetch_add(1, Ordering::Relaxed);
        metrics::counter!("dms_frames_total").increment(1);
    }

    fn publish_status(&self) {
        let snapshot = self.dms.snapshot();
        self.status_tx.send_if_modified(|current| {
            if *current == snapshot {
                false
            } else {
                *current = snapshot;
                true
            }
        });
    }
}
