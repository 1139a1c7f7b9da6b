//! Live video feed as a multipart JPEG stream

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    body::{Body, Bytes},
    extract::State,
    http::header,
    response::{IntoResponse, Response},
};
use dms::AlertState;
use tokio::sync::broadcast::error::{RecvError, TryRecvError};
use tracing::debug;

use crate::AppState;

pub const BOUNDARY: &str = "frame";

/// Wrap one JPEG as a multipart part
pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut payload = Vec::with_capacity(jpeg.len() + 64);
    payload.extend_from_slice(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n");
    payload.extend_from_slice(jpeg);
    payload.extend_from_slice(b"\r\n");
    Bytes::from(payload)
}

/// `multipart/x-mixed-replace` stream of annotated frames.
///
/// Each viewer gets its own bounded subscription; a viewer that falls behind
/// skips frames. The response ends once the pipeline has stopped and the
/// frames already buffered for this viewer have been sent.
pub async fn video_feed(State(state): State<Arc<AppState>>) -> Response {
    let mut frames = state.frames.subscribe();
    let mut status = state.status_rx.clone();

    let stream = async_stream::stream! {
        loop {
            let ended = status.borrow_and_update().status == AlertState::Ended;
            if ended {
                // Flush what is still buffered, newest frames included
                loop {
                    match frames.try_recv() {
                        Ok(jpeg) => yield Ok::<Bytes, Infallible>(multipart_part(&jpeg)),
                        Err(TryRecvError::Lagged(skipped)) => {
                            debug!("Viewer lagging at end of stream, skipped {} frames", skipped);
                        }
                        Err(_) => break,
                    }
                }
                break;
            }

            tokio::select! {
                frame = frames.recv() => match frame {
                    Ok(jpeg) => yield Ok(multipart_part(&jpeg)),
                    Err(RecvError::Lagged(skipped)) => {
                        debug!("Viewer lagging, skipped {} frames", skipped);
                    }
                    Err(RecvError::Closed) => break,
                },
                changed = status.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }
    };

    (
        [
            (
                header::CONTENT_TYPE,
                format!("multipart/x-mixed-replace; boundary={BOUNDARY}"),
            ),
            (header::CACHE_CONTROL, "no-cache".to_string()),
        ],
        Body::from_stream(stream),
    )
        .into_response()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_multipart_part_framing() {
        let part = multipart_part(&[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n"));
        assert!(part.ends_with(&[0xFF, 0xD9, b'\r', b'\n']));
    }
}
