//! Drowsiness Monitor API Server
//!
//! Runs the streaming loop and serves the annotated video feed, the live
//! alertness status and health/metrics endpoints.

use axum::{
    extract::State,
    routing::get,
    Json, Router,
};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use serde::Serialize;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::{broadcast, watch};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{error, info, warn};
use tracing_subscriber::FmtSubscriber;

pub mod config;
pub mod pipeline;
mod routes;

pub use crate::config::{AppConfig, LoggingConfig, PipelineConfig, ServerConfig};
pub use crate::pipeline::{
    Pipeline, PipelineExit, PipelineFeeds, PipelineStats, ShutdownHandle, StatsSnapshot,
};

use axum::body::Bytes;
use dms::{AlertState, DmsModule, StatusSnapshot};

/// API error types
#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Dms(#[from] dms::DmsError),

    #[error(transparent)]
    Camera(#[from] camera_capture::CameraError),

    #[error(transparent)]
    Alert(#[from] alerting::AlertError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Server error: {0}")]
    Io(#[from] std::io::Error),
}

/// Application state shared across handlers
pub struct AppState {
    /// Latest alertness snapshot published by the pipeline
    pub status_rx: watch::Receiver<StatusSnapshot>,
    /// Encoded frame feed
    pub frames: broadcast::Sender<Bytes>,
    /// Pipeline counters
    pub stats: Arc<PipelineStats>,
    /// Prometheus handle, when a recorder is installed
    pub metrics: Option<PrometheusHandle>,
    /// Version string
    pub version: String,
    /// Start time
    pub start_time: std::time::Instant,
}

impl AppState {
    /// Create new application state
    pub fn new(feeds: PipelineFeeds, metrics: Option<PrometheusHandle>) -> Self {
        Self {
            status_rx: feeds.status,
            frames: feeds.frames,
            stats: feeds.stats,
            metrics,
            version: env!("CARGO_PKG_VERSION").to_string(),
            start_time: std::time::Instant::now(),
        }
    }

    /// Tear-free copy of the current status
    pub fn status(&self) -> StatusSnapshot {
        *self.status_rx.borrow()
    }
}

/// Health response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub timestamp: u64,
    pub version: String,
    pub uptime_seconds: u64,
    pub pipeline: StatsSnapshot,
    pub current: StatusSnapshot,
    pub viewers: usize,
}

/// Create the application router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/", get(routes::status::index))
        .route("/video_feed", get(routes::stream::video_feed))
        .route("/status", get(routes::status::get_status))
        .route("/metrics", get(routes::status::get_metrics))
        .route("/api/v1/health", get(health_handler))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

/// Health check handler
async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    let timestamp = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0);
    let current = state.status();
    let pipeline = state.stats.snapshot();

    let status = if current.status == AlertState::Ended {
        "stream_ended"
    } else if pipeline.running {
        "healthy"
    } else {
        "starting"
    };

    Json(HealthResponse {
        status: status.to_string(),
        timestamp,
        version: state.version.clone(),
        uptime_seconds: state.start_time.elapsed().as_secs(),
        pipeline,
        current,
        viewers: state.frames.receiver_count(),
    })
}

/// Initialize logging
pub fn init_logging(config: &LoggingConfig) -> Result<(), ApiError> {
    let level = config.max_level()?;
    let builder = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true);

    let result = if config.json {
        tracing::subscriber::set_global_default(builder.json().finish())
    } else {
        tracing::subscriber::set_global_default(builder.finish())
    };
    result.map_err(|e| ApiError::Logging(e.to_string()))
}

/// Build the pipeline from configuration, start it and serve HTTP until Ctrl-C
pub async fn run_server(config: AppConfig) -> Result<(), ApiError> {
    let metrics = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => Some(handle),
        Err(e) => {
            warn!("Metrics disabled: {}", e);
            None
        }
    };

    let source = camera_capture::open_source(&config.source)?;
    let provider = dms::build_provider(&config.landmarks)?;
    let dms = DmsModule::new(&config.thresholds, provider)?;
    let player = alerting::build_player(&config.alert)?;

    let (pipeline, feeds) = Pipeline::new(source, dms, player, config.pipeline.clone());
    let state = Arc::new(AppState::new(feeds, metrics));

    let shutdown = pipeline.shutdown_handle();
    let handle = pipeline.spawn();
    let watcher = tokio::spawn(async move {
        match handle.await {
            Ok(PipelineExit::EndOfStream) => info!("Video source exhausted; status is ENDED"),
            Ok(PipelineExit::SourceError(e)) => warn!("Video source failed: {}; status is ENDED", e),
            Ok(PipelineExit::Shutdown) => info!("Streaming loop stopped on shutdown"),
            Err(e) => error!("Streaming loop panicked: {}", e),
        }
    });

    let app = create_router(state);

    info!("Starting API server on {}", config.server.addr);
    let listener = tokio::net::TcpListener::bind(&config.server.addr).await?;
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(shutdown.clone()))
        .await;

    // Serve may also return on an accept error; the loop must not outlive it
    shutdown.trigger();
    if let Err(e) = watcher.await {
        error!("Pipeline watcher failed: {}", e);
    }
    served?;

    info!("Server stopped");
    Ok(())
}

/// Resolves on Ctrl-C after telling the streaming loop to stop, which ends
/// every open video feed so graceful shutdown can complete
async fn shutdown_signal(pipeline: ShutdownHandle) {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for shutdown signal: {}", e);
    }
    info!("Shutdown requested");
    pipeline.trigger();
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use tower::ServiceExt;

    struct Harness {
        app: Router,
        status_tx: watch::Sender<StatusSnapshot>,
        frames_tx: broadcast::Sender<Bytes>,
    }

    fn harness() -> Harness {
        harness_with_capacity(4)
    }

    fn harness_with_capacity(capacity: usize) -> Harness {
        let (status_tx, status_rx) = watch::channel(StatusSnapshot::default());
        let (frames_tx, _) = broadcast::channel(capacity);
        let feeds = PipelineFeeds {
            status: status_rx,
            frames: frames_tx.clone(),
            stats: Arc::new(PipelineStats::default()),
        };
        Harness {
            app: create_router(Arc::new(AppState::new(feeds, None))),
            status_tx,
            frames_tx,
        }
    }

    async fn get(app: &Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .clone()
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, body.to_vec())
    }

    #[tokio::test]
    async fn test_initial_status() {
        let h = harness();
        let (code, body) = get(&h.app, "/status").await;

        assert_eq!(code, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json, serde_json::json!({"status": "INACTIVE", "blinks": 0, "closed": 0}));
    }

    #[tokio::test]
    async fn test_status_is_idempotent_and_follows_updates() {
        let h = harness();
        h.status_tx.send_replace(StatusSnapshot {
            status: AlertState::Drowsy,
            blinks: 12,
            closed: 3,
        });

        let (_, first) = get(&h.app, "/status").await;
        let (_, second) = get(&h.app, "/status").await;
        assert_eq!(first, second);
        let json: serde_json::Value = serde_json::from_slice(&first).unwrap();
        assert_eq!(json["status"], "DROWSY");
        assert_eq!(json["blinks"], 12);
        assert_eq!(json["closed"], 3);
    }

    #[tokio::test]
    async fn test_health_reports_ended_stream() {
        let h = harness();
        h.status_tx.send_replace(StatusSnapshot {
            status: AlertState::Ended,
            ..Default::default()
        });

        let (code, body) = get(&h.app, "/api/v1/health").await;
        assert_eq!(code, StatusCode::OK);
        let json: serde_json::Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(json["status"], "stream_ended");
        assert_eq!(json["current"]["status"], "ENDED");
        assert_eq!(json["pipeline"]["frames_processed"], 0);
    }

    #[tokio::test]
    async fn test_index_page() {
        let h = harness();
        let (code, body) = get(&h.app, "/").await;
        assert_eq!(code, StatusCode::OK);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("/video_feed"));
        assert!(html.contains("/status"));
    }

    #[tokio::test]
    async fn test_metrics_without_recorder() {
        let h = harness();
        let (code, _) = get(&h.app, "/metrics").await;
        assert_eq!(code, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_video_feed_streams_until_pipeline_ends() {
        let h = harness();
        let response = h
            .app
            .clone()
            .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(
            response.headers()[axum::http::header::CONTENT_TYPE],
            "multipart/x-mixed-replace; boundary=frame"
        );

        // Handler has subscribed by now
        h.frames_tx.send(Bytes::from_static(b"jpeg-one")).unwrap();
        h.frames_tx.send(Bytes::from_static(b"jpeg-two")).unwrap();
        h.status_tx.send_replace(StatusSnapshot {
            status: AlertState::Ended,
            ..Default::default()
        });

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let expected = [
            routes::stream::multipart_part(b"jpeg-one"),
            routes::stream::multipart_part(b"jpeg-two"),
        ]
        .concat();
        assert_eq!(body.to_vec(), expected);
    }

    #[tokio::test]
    async fn test_lagging_viewer_still_gets_last_frames_after_end() {
        let h = harness_with_capacity(2);
        let response = h
            .app
            .clone()
            .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();

        // Overrun the viewer before it reads, then end the stream
        for jpeg in [&b"one"[..], b"two", b"three", b"four"] {
            h.frames_tx.send(Bytes::copy_from_slice(jpeg)).unwrap();
        }
        h.status_tx.send_replace(StatusSnapshot {
            status: AlertState::Ended,
            ..Default::default()
        });

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let expected = [
            routes::stream::multipart_part(b"three"),
            routes::stream::multipart_part(b"four"),
        ]
        .concat();
        assert_eq!(body.to_vec(), expected);
    }

    #[tokio::test]
    async fn test_video_feed_with_live_pipeline() {
        use alerting::RecordingAlertPlayer;
        use camera_capture::{SourceConfig, SyntheticSource};
        use dms::{ScriptStep, ScriptedLandmarks, ThresholdConfig};

        let source = Box::new(SyntheticSource::new(&SourceConfig::synthetic(64, 48, 3)));
        let provider = ScriptedLandmarks::new(vec![ScriptStep::face(0.3, 3)], false);
        let dms = DmsModule::new(&ThresholdConfig::default(), Box::new(provider)).unwrap();
        let config = PipelineConfig {
            frame_channel_capacity: 8,
            ..Default::default()
        };
        let (pipeline, feeds) =
            Pipeline::new(source, dms, Arc::new(RecordingAlertPlayer::new()), config);
        let app = create_router(Arc::new(AppState::new(feeds, None)));

        let response = app
            .oneshot(Request::builder().uri("/video_feed").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(pipeline.spawn().await.unwrap(), PipelineExit::EndOfStream);

        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let parts = body
            .windows(b"--frame\r\n".len())
            .filter(|w| *w == b"--frame\r\n")
            .count();
        assert_eq!(parts, 3);
    }
}
