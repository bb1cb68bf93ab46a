//! Web server module: axum HTTP for browser viewing.
//!
//! - `GET /` — landing page with the live image and a stop button
//! - `GET /video` — multipart JPEG live feed
//! - `POST /stop` — stop the stream, redirect back to `/`
//! - `GET /api/status` — session and camera status

pub mod multipart;
pub mod page;

use std::net::SocketAddr;
use std::sync::{Arc, Weak};
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use axum::body::Body;
use axum::extract::State;
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Json, Redirect, Response};
use axum::routing::{get, post};
use axum::Router;
use serde::Serialize;
use tokio::task::JoinHandle;
use tokio::time::{timeout, Duration};
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::core::VIDEO_CONTENT_TYPE;

/// How long shutdown waits for in-flight requests before aborting the server
const SHUTDOWN_GRACE: Duration = Duration::from_secs(3);

/// Stream state as reported to browsers
#[derive(Debug, Clone, Default, Serialize)]
pub struct StreamStatus {
    pub streaming: bool,
    pub public_url: Option<String>,
}

/// Session operations reachable from the web page
#[async_trait]
pub trait StreamControl: Send + Sync {
    /// Stop the stream (stop button)
    async fn stop_stream(&self);

    /// Current stream state
    async fn stream_status(&self) -> StreamStatus;
}

/// Shared state for the web server
struct WebState {
    source: Arc<FrameSource>,
    control: Weak<dyn StreamControl>,
    start_time: Instant,
}

/// Handle to the running HTTP server
pub struct StreamServer {
    local_addr: SocketAddr,
    shutdown: CancellationToken,
    task: Option<JoinHandle<()>>,
}

impl StreamServer {
    /// Bind `bind` and serve in a background task.
    ///
    /// The listener is bound before returning, so a port conflict is reported
    /// here rather than lost inside the task.
    pub async fn start(
        bind: SocketAddr,
        source: Arc<FrameSource>,
        control: Weak<dyn StreamControl>,
    ) -> Result<Self> {
        let state = Arc::new(WebState {
            source,
            control,
            start_time: Instant::now(),
        });

        let app = Router::new()
            .route("/", get(index))
            .route("/video", get(video))
            .route("/stop", post(stop))
            .route("/api/status", get(api_status))
            .layer(TraceLayer::new_for_http())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(bind)
            .await
            .context(format!("Failed to bind to {}", bind))?;
        let local_addr = listener.local_addr().context("Failed to read bound address")?;

        info!("Web server listening on http://{}", local_addr);

        let shutdown = CancellationToken::new();
        let signal = shutdown.clone();
        let task = tokio::spawn(async move {
            let served = axum::serve(listener, app)
                .with_graceful_shutdown(async move { signal.cancelled().await })
                .await;
            match served {
                Ok(()) => info!("Web server stopped"),
                Err(e) => warn!("Web server error: {}", e),
            }
        });

        Ok(Self {
            local_addr,
            shutdown,
            task: Some(task),
        })
    }

    /// Address the server is listening on
    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Whether the server task is still serving
    pub fn is_running(&self) -> bool {
        self.task.as_ref().is_some_and(|task| !task.is_finished())
    }

    /// Stop accepting connections and wait for the server task
    pub async fn shutdown(&mut self) {
        self.shutdown.cancel();
        if let Some(mut task) = self.task.take() {
            if timeout(SHUTDOWN_GRACE, &mut task).await.is_err() {
                warn!("Web server did not stop within {:?}, aborting", SHUTDOWN_GRACE);
                task.abort();
            }
        }
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

/// GET / — landing page
async fn index() -> Html<&'static str> {
    Html(page::INDEX_HTML)
}

/// GET /video — multipart live feed
async fn video(State(state): State<Arc<WebState>>) -> Response {
    match state.source.frame_sequence().await {
        Ok(frames) => (
            [
                (header::CONTENT_TYPE, VIDEO_CONTENT_TYPE),
                (header::CACHE_CONTROL, "no-cache, no-store"),
            ],
            Body::from_stream(multipart::multipart_stream(frames)),
        )
            .into_response(),
        Err(e) => {
            warn!("Live feed unavailable: {}", e);
            (StatusCode::SERVICE_UNAVAILABLE, e.to_string()).into_response()
        }
    }
}

/// POST /stop — stop button
async fn stop(State(state): State<Arc<WebState>>) -> Redirect {
    match state.control.upgrade() {
        Some(control) => control.stop_stream().await,
        // No session attached: still release the camera
        None => {
            state.source.release().await;
        }
    }
    Redirect::to("/")
}

/// GET /api/status — session and camera status
async fn api_status(State(state): State<Arc<WebState>>) -> Json<serde_json::Value> {
    let stream = match state.control.upgrade() {
        Some(control) => control.stream_status().await,
        None => StreamStatus::default(),
    };
    let stats = state.source.stats().await;

    Json(serde_json::json!({
        "streaming": stream.streaming,
        "public_url": stream.public_url,
        "camera_live": stats.live,
        "viewers": stats.viewers,
        "frames_captured": stats.frames_captured,
        "snapshots_taken": stats.snapshots_taken,
        "uptime_secs": state.start_time.elapsed().as_secs(),
    }))
}
