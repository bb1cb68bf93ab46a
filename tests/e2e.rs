//! E2E regression test suite for CatVision
//!
//! Starts the real web server on an ephemeral port with the synthetic camera
//! (no hardware, no Telegram) and talks to it over HTTP:
//!
//! - Browser → `/`, `/video`, `/stop`, `/api/status`
//! - Session → web server + tunnel process → `/api/status`
//!
//! Run: `cargo test --test e2e`

use std::net::{Ipv4Addr, SocketAddr};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;
use reqwest::StatusCode;

use catvision::{
    FrameSource, FrameSourceConfig, PhotoStore, PhotoStoreConfig, StreamControl, StreamServer,
    StreamStatus, TestCamera, TestSourceConfig,
};

// ── Shared helpers ───────────────────────────────────────────────────

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

fn test_source(root: &std::path::Path, camera: TestCamera) -> Arc<FrameSource> {
    Arc::new(FrameSource::new(
        Arc::new(camera),
        PhotoStore::new(PhotoStoreConfig {
            root_path: root.join("photos"),
            prefix: "photo".to_string(),
        }),
        FrameSourceConfig {
            warmup: Duration::from_millis(20),
            open_timeout: Duration::from_secs(2),
            ..Default::default()
        },
    ))
}

fn small_camera() -> TestCamera {
    TestCamera::new(TestSourceConfig {
        fps: 20,
        width: 64,
        height: 48,
        ..Default::default()
    })
}

fn localhost() -> SocketAddr {
    SocketAddr::from((Ipv4Addr::LOCALHOST, 0))
}

fn client() -> reqwest::Client {
    reqwest::Client::builder()
        .redirect(Policy::none())
        .timeout(Duration::from_secs(10))
        .build()
        .unwrap()
}

/// Records stop requests coming from the web page
#[derive(Default)]
struct RecordingControl {
    stops: AtomicUsize,
}

#[async_trait]
impl StreamControl for RecordingControl {
    async fn stop_stream(&self) {
        self.stops.fetch_add(1, Ordering::SeqCst);
    }

    async fn stream_status(&self) -> StreamStatus {
        StreamStatus {
            streaming: true,
            public_url: Some("https://test.loca.lt".to_string()),
        }
    }
}

async fn start_server(
    source: Arc<FrameSource>,
    control: &Arc<RecordingControl>,
) -> StreamServer {
    let control: Arc<dyn StreamControl> = control.clone();
    let weak: Weak<dyn StreamControl> = Arc::downgrade(&control);
    // The caller's Arc keeps the control alive
    drop(control);
    StreamServer::start(localhost(), source, weak).await.unwrap()
}

async fn status(base: &str) -> serde_json::Value {
    let body = client()
        .get(format!("{base}/api/status"))
        .send()
        .await
        .unwrap()
        .text()
        .await
        .unwrap();
    serde_json::from_str(&body).unwrap()
}

/// Read from a streaming response until at least `min` bytes arrived
async fn read_at_least(response: &mut reqwest::Response, min: usize) -> Vec<u8> {
    let mut data = Vec::new();
    while data.len() < min {
        match response.chunk().await.unwrap() {
            Some(chunk) => data.extend_from_slice(&chunk),
            None => break,
        }
    }
    data
}

// ── Web layer ────────────────────────────────────────────────────────

#[tokio::test(flavor = "multi_thread")]
async fn index_page_links_video_and_stop() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let server = start_server(test_source(dir.path(), small_camera()), &control).await;
    let base = format!("http://{}", server.local_addr());

    let response = client().get(format!("{base}/")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let html = response.text().await.unwrap();
    assert!(html.contains(r#"<img src="/video""#));
    assert!(html.contains(r#"action="/stop""#));
    assert!(html.contains(r#"method="post""#));
}

#[tokio::test(flavor = "multi_thread")]
async fn video_is_multipart_jpeg() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let source = test_source(dir.path(), small_camera());
    let server = start_server(Arc::clone(&source), &control).await;
    let base = format!("http://{}", server.local_addr());

    let mut response = client().get(format!("{base}/video")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[reqwest::header::CONTENT_TYPE],
        "multipart/x-mixed-replace; boundary=frame"
    );

    let data = read_at_least(&mut response, PART_HEADER.len() + 2).await;
    assert!(data.starts_with(PART_HEADER));
    assert_eq!(&data[PART_HEADER.len()..PART_HEADER.len() + 2], &[0xFF, 0xD8]);

    let stats = status(&base).await;
    assert_eq!(stats["camera_live"], true);
    assert_eq!(stats["viewers"], 1);

    // Releasing the camera ends the response
    assert!(source.release().await);
    let ended = tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(Some(_)) = response.chunk().await {}
    })
    .await;
    assert!(ended.is_ok(), "feed should end once the camera is released");
}

#[tokio::test(flavor = "multi_thread")]
async fn two_viewers_share_the_camera() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let server = start_server(test_source(dir.path(), small_camera()), &control).await;
    let base = format!("http://{}", server.local_addr());

    let mut first = client().get(format!("{base}/video")).send().await.unwrap();
    let mut second = client().get(format!("{base}/video")).send().await.unwrap();

    assert!(read_at_least(&mut first, PART_HEADER.len()).await.starts_with(PART_HEADER));
    assert!(read_at_least(&mut second, PART_HEADER.len()).await.starts_with(PART_HEADER));

    assert_eq!(status(&base).await["viewers"], 2);
}

#[tokio::test(flavor = "multi_thread")]
async fn viewer_leaving_releases_camera() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let server = start_server(test_source(dir.path(), small_camera()), &control).await;
    let base = format!("http://{}", server.local_addr());

    let mut response = client().get(format!("{base}/video")).send().await.unwrap();
    read_at_least(&mut response, PART_HEADER.len()).await;
    drop(response);

    let released = tokio::time::timeout(Duration::from_secs(5), async {
        while status(&base).await["camera_live"] == true {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    })
    .await;
    assert!(released.is_ok(), "camera should be released after the viewer left");
}

#[tokio::test(flavor = "multi_thread")]
async fn video_without_camera_is_unavailable() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let server = start_server(test_source(dir.path(), TestCamera::unavailable()), &control).await;
    let base = format!("http://{}", server.local_addr());

    let response = client().get(format!("{base}/video")).send().await.unwrap();
    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test(flavor = "multi_thread")]
async fn stop_button_redirects_home() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let server = start_server(test_source(dir.path(), small_camera()), &control).await;
    let base = format!("http://{}", server.local_addr());

    let response = client().post(format!("{base}/stop")).send().await.unwrap();

    assert_eq!(response.status(), StatusCode::SEE_OTHER);
    assert_eq!(response.headers()[reqwest::header::LOCATION], "/");
    assert_eq!(control.stops.load(Ordering::SeqCst), 1);
}

#[tokio::test(flavor = "multi_thread")]
async fn status_reports_session_and_camera() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let server = start_server(test_source(dir.path(), small_camera()), &control).await;
    let base = format!("http://{}", server.local_addr());

    let stats = status(&base).await;

    assert_eq!(stats["streaming"], true);
    assert_eq!(stats["public_url"], "https://test.loca.lt");
    assert_eq!(stats["camera_live"], false);
    assert_eq!(stats["viewers"], 0);
    assert!(stats["uptime_secs"].is_u64());
}

#[tokio::test(flavor = "multi_thread")]
async fn port_conflict_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let control = Arc::new(RecordingControl::default());
    let mut server = start_server(test_source(dir.path(), small_camera()), &control).await;

    let weak: Weak<dyn StreamControl> = Weak::<RecordingControl>::new();
    let result = StreamServer::start(
        server.local_addr(),
        test_source(dir.path(), small_camera()),
        weak,
    )
    .await;
    assert!(result.is_err());

    server.shutdown().await;
    assert!(!server.is_running());
}

// ── Session layer ────────────────────────────────────────────────────

#[cfg(unix)]
mod session {
    use super::*;
    use catvision::{Session, SessionConfig, SessionState, StopOutcome, TunnelConfig};

    fn session_with_tunnel(root: &std::path::Path, script: &str) -> Arc<Session> {
        Session::new(
            test_source(root, small_camera()),
            SessionConfig {
                bind: localhost(),
                tunnel: TunnelConfig {
                    command: vec!["sh".to_string(), "-c".to_string(), script.to_string()],
                    url_timeout: Duration::from_secs(5),
                },
            },
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stream_lifecycle_over_http() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_tunnel(
            dir.path(),
            "echo starting; echo 'your url is: https://whiskers.loca.lt'; sleep 30",
        );

        let started = session.start_stream().await.unwrap();
        assert_eq!(started.url(), "https://whiskers.loca.lt");
        assert!(started.url().contains("://"));

        let addr = session.server_addr().await.unwrap();
        let base = format!("http://{addr}");

        let stats = status(&base).await;
        assert_eq!(stats["streaming"], true);
        assert_eq!(stats["public_url"], "https://whiskers.loca.lt");

        // A viewer opens the camera
        let mut response = client().get(format!("{base}/video")).send().await.unwrap();
        read_at_least(&mut response, PART_HEADER.len()).await;
        assert_eq!(status(&base).await["camera_live"], true);

        // Snapshot during the stream comes from the live feed
        let photo = session.snapshot().await.unwrap();
        assert!(photo.exists());

        // Stop button ends the session but leaves the server up
        let stop = client().post(format!("{base}/stop")).send().await.unwrap();
        assert_eq!(stop.status(), StatusCode::SEE_OTHER);
        assert_eq!(session.state().await, SessionState::Idle);

        let stats = status(&base).await;
        assert_eq!(stats["streaming"], false);
        assert!(stats["public_url"].is_null());
        assert_eq!(stats["camera_live"], false);

        assert_eq!(session.stop().await, StopOutcome::Noop);

        session.shutdown().await;
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn failed_tunnel_keeps_server_for_retry() {
        let dir = tempfile::tempdir().unwrap();
        let session = session_with_tunnel(dir.path(), "echo 'npm ERR! offline' >&2");

        assert!(session.start_stream().await.is_err());
        assert_eq!(session.state().await, SessionState::Idle);

        let addr = session.server_addr().await.unwrap();
        let response = client().get(format!("http://{addr}/")).send().await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        session.shutdown().await;
    }
}
