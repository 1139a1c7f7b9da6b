//! Frame sources feeding the streaming loop

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::{CameraError, SourceConfig, SourceKind, VideoFrame};

/// Blocking source of video frames.
///
/// `Ok(None)` signals end of stream; an `Err` is an unreadable frame. Both
/// terminate the streaming loop.
pub trait FrameSource: Send {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError>;
}

/// Sleeps until the next frame slot for a target FPS
pub(crate) struct Pacer {
    interval: Option<Duration>,
    next_due: Option<Instant>,
}

impl Pacer {
    pub(crate) fn new(fps: u32) -> Self {
        Self {
            interval: (fps > 0).then(|| Duration::from_secs_f64(1.0 / fps as f64)),
            next_due: None,
        }
    }

    pub(crate) fn wait(&mut self) {
        let Some(interval) = self.interval else {
            return;
        };
        let now = Instant::now();
        if let Some(due) = self.next_due {
            if due > now {
                std::thread::sleep(due - now);
            }
        }
        self.next_due = Some(self.next_due.map_or(now, |due| due.max(now)) + interval);
    }
}

/// Generated flat-colour frames
pub struct SyntheticSource {
    width: u32,
    height: u32,
    max_frames: Option<u64>,
    produced: u64,
    started: Instant,
    pacer: Pacer,
}

impl SyntheticSource {
    pub fn new(config: &SourceConfig) -> Self {
        Self {
            width: config.width,
            height: config.height,
            max_frames: config.max_frames,
            produced: 0,
            started: Instant::now(),
            pacer: Pacer::new(config.fps),
        }
    }
}

impl FrameSource for SyntheticSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.max_frames.is_some_and(|max| self.produced >= max) {
            return Ok(None);
        }
        self.pacer.wait();

        // Slow grey ramp so consecutive frames differ
        let shade = 64 + (self.produced % 128) as u8;
        let mut frame = VideoFrame::filled(self.width, self.height, [shade, shade, shade]);
        frame.timestamp_ns = self.started.elapsed().as_nanos() as u64;
        frame.sequence = self.produced as u32;
        self.produced += 1;
        Ok(Some(frame))
    }
}

/// Still images decoded from a directory in file-name order
pub struct ImageSequenceSource {
    paths: Vec<PathBuf>,
    cursor: usize,
    loop_playback: bool,
    max_frames: Option<u64>,
    produced: u64,
    started: Instant,
    pacer: Pacer,
}

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "bmp", "ppm"];

impl ImageSequenceSource {
    pub fn open(dir: &Path, config: &SourceConfig) -> Result<Self, CameraError> {
        let entries = std::fs::read_dir(dir)
            .map_err(|e| CameraError::Open(format!("{}: {}", dir.display(), e)))?;

        let mut paths = Vec::new();
        for entry in entries {
            let path = entry?.path();
            let is_image = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()));
            if is_image {
                paths.push(path);
            }
        }
        paths.sort();

        if paths.is_empty() {
            return Err(CameraError::Open(format!(
                "no images found in {}",
                dir.display()
            )));
        }
        info!("Opened image sequence {} ({} frames)", dir.display(), paths.len());

        Ok(Self {
            paths,
            cursor: 0,
            loop_playback: config.loop_playback,
            max_frames: config.max_frames,
            produced: 0,
            started: Instant::now(),
            pacer: Pacer::new(config.fps),
        })
    }

    /// Number of images in the sequence
    pub fn len(&self) -> usize {
        self.paths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.paths.is_empty()
    }
}

impl FrameSource for ImageSequenceSource {
    fn next_frame(&mut self) -> Result<Option<VideoFrame>, CameraError> {
        if self.max_frames.is_some_and(|max| self.produced >= max) {
            return Ok(None);
        }
        if self.cursor >= self.paths.len() {
            if !self.loop_playback {
                debug!("Image sequence exhausted after {} frames", self.produced);
                return Ok(None);
            }
            self.cursor = 0;
        }
        self.pacer.wait();

        let path = &self.paths[self.cursor];
        let img = image::open(path).map_err(|e| CameraError::Decode {
            path: path.clone(),
            reason: e.to_string(),
        })?;
        let frame = VideoFrame::from_image(
            img,
            self.started.elapsed().as_nanos() as u64,
            self.produced as u32,
        );

        self.cursor += 1;
        self.produced += 1;
        Ok(Some(frame))
    }
}

/// Open the source described by the configuration
pub fn open_source(config: &SourceConfig) -> Result<Box<dyn FrameSource>, CameraError> {
    match config.kind {
        SourceKind::Synthetic => {
            info!(
                "Using synthetic source {}x{} @ {} fps",
                config.width, config.height, config.fps
            );
            Ok(Box::new(SyntheticSource::new(config)))
        }
        SourceKind::Images => {
            let dir = config
                .path
                .as_deref()
                .ok_or_else(|| CameraError::Open("images source requires a path".into()))?;
            Ok(Box::new(ImageSequenceSource::open(dir, config)?))
        }
        #[cfg(feature = "opencv")]
        SourceKind::Camera => Ok(Box::new(crate::capture::CaptureSource::camera(
            config.device,
            config,
        )?)),
        #[cfg(feature = "opencv")]
        SourceKind::Video => {
            let file = config
                .path
                .as_deref()
                .ok_or_else(|| CameraError::Open("video source requires a path".into()))?;
            Ok(Box::new(crate::capture::CaptureSource::file(file, config)?))
        }
        #[cfg(not(feature = "opencv"))]
        SourceKind::Camera | SourceKind::Video => Err(CameraError::Open(format!(
            "{:?} source needs the `opencv` feature",
            config.kind
        ))),
    }
}
