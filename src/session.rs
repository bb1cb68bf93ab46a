//! Stream session: owner of all transient runtime state
//!
//! One session exists per process. It holds the web server handle, the tunnel
//! process and its public URL, and the Idle/Streaming state. The live camera
//! itself lives in the [`FrameSource`], which the session releases on stop.

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::{Arc, Weak};

use async_trait::async_trait;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::capture::FrameSource;
use crate::core::DEFAULT_WEB_PORT;
use crate::error::SessionError;
use crate::tunnel::{Tunnel, TunnelConfig, UrlDiscovery, DEFAULT_TUNNEL_COMMAND};
use crate::web::{StreamControl, StreamServer, StreamStatus};

/// Dispatcher-visible session state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Streaming,
}

/// Result of a stream request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamStart {
    /// A new tunnel was opened
    Started(String),
    /// Already streaming; nothing changed
    AlreadyStreaming(String),
}

impl StreamStart {
    pub fn url(&self) -> &str {
        match self {
            Self::Started(url) | Self::AlreadyStreaming(url) => url,
        }
    }
}

/// Result of a stop request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Something was running and has been released
    Stopped { camera: bool, tunnel: bool },
    /// Nothing was active
    Noop,
}

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Web server bind address
    pub bind: SocketAddr,
    /// Tunnel command and URL wait
    pub tunnel: TunnelConfig,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from((Ipv4Addr::UNSPECIFIED, DEFAULT_WEB_PORT)),
            tunnel: TunnelConfig::from_command_line(DEFAULT_TUNNEL_COMMAND, DEFAULT_WEB_PORT),
        }
    }
}

struct SessionInner {
    state: SessionState,
    server: Option<StreamServer>,
    tunnel: Option<Tunnel>,
    public_url: Option<String>,
}

impl SessionInner {
    /// Fall back to Idle if the tunnel process died after announcing its URL
    fn reap_dead_tunnel(&mut self) {
        let exited = self.tunnel.as_mut().is_some_and(Tunnel::has_exited);
        if exited {
            warn!(url = ?self.public_url, "Tunnel exited, stream no longer reachable");
            self.tunnel = None;
            self.public_url = None;
            self.state = SessionState::Idle;
        }
    }
}

/// Explicit session object shared by the dispatcher and the web server
pub struct Session {
    source: Arc<FrameSource>,
    config: SessionConfig,
    inner: Mutex<SessionInner>,
    cancel: CancellationToken,
}

impl Session {
    pub fn new(source: Arc<FrameSource>, config: SessionConfig) -> Arc<Self> {
        Arc::new(Self {
            source,
            config,
            inner: Mutex::new(SessionInner {
                state: SessionState::Idle,
                server: None,
                tunnel: None,
                public_url: None,
            }),
            cancel: CancellationToken::new(),
        })
    }

    pub fn source(&self) -> &Arc<FrameSource> {
        &self.source
    }

    pub async fn state(&self) -> SessionState {
        let mut inner = self.inner.lock().await;
        inner.reap_dead_tunnel();
        inner.state
    }

    pub async fn public_url(&self) -> Option<String> {
        let mut inner = self.inner.lock().await;
        inner.reap_dead_tunnel();
        inner.public_url.clone()
    }

    /// Address of the web server, if it has been started
    pub async fn server_addr(&self) -> Option<SocketAddr> {
        self.inner
            .lock()
            .await
            .server
            .as_ref()
            .map(StreamServer::local_addr)
    }

    /// Take a photo
    pub async fn snapshot(&self) -> Result<PathBuf, SessionError> {
        Ok(self.source.capture_snapshot().await?)
    }

    /// Start the web server if needed, open the tunnel and wait for its URL.
    ///
    /// The session stays locked for the whole start so two concurrent requests
    /// cannot open two tunnels.
    pub async fn start_stream(self: &Arc<Self>) -> Result<StreamStart, SessionError> {
        let mut inner = self.inner.lock().await;
        inner.reap_dead_tunnel();

        if inner.state == SessionState::Streaming {
            if let Some(url) = inner.public_url.clone() {
                return Ok(StreamStart::AlreadyStreaming(url));
            }
        }

        if !inner.server.as_ref().is_some_and(StreamServer::is_running) {
            let weak: Weak<Self> = Arc::downgrade(self);
            let control: Weak<dyn StreamControl> = weak;
            let server = StreamServer::start(self.config.bind, Arc::clone(&self.source), control)
                .await
                .map_err(|e| SessionError::Server(format!("{:#}", e)))?;
            inner.server = Some(server);
        }

        let mut tunnel = Tunnel::start(&self.config.tunnel)?;
        match tunnel.get_public_url(&self.cancel).await {
            UrlDiscovery::Found(url) => {
                inner.tunnel = Some(tunnel);
                inner.public_url = Some(url.clone());
                inner.state = SessionState::Streaming;
                info!(url = %url, "Streaming");
                Ok(StreamStart::Started(url))
            }
            other => {
                tunnel.stop().await;
                let reason = match other {
                    UrlDiscovery::Exited => "tunnel exited without announcing a URL".to_string(),
                    UrlDiscovery::TimedOut => format!(
                        "no tunnel URL within {:?}",
                        self.config.tunnel.url_timeout
                    ),
                    _ => "cancelled".to_string(),
                };
                Err(SessionError::StreamUnreachable(reason))
            }
        }
    }

    /// Release the camera and the tunnel. The web server keeps running.
    pub async fn stop(&self) -> StopOutcome {
        let mut inner = self.inner.lock().await;

        let camera = self.source.release().await;
        let tunnel = match inner.tunnel.take() {
            Some(tunnel) => {
                tunnel.stop().await;
                true
            }
            None => false,
        };

        let was_streaming = inner.state == SessionState::Streaming;
        inner.state = SessionState::Idle;
        inner.public_url = None;

        if camera || tunnel || was_streaming {
            info!(camera, tunnel, "Stream stopped");
            StopOutcome::Stopped { camera, tunnel }
        } else {
            StopOutcome::Noop
        }
    }

    /// Stop everything including the web server
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.stop().await;

        let server = self.inner.lock().await.server.take();
        if let Some(mut server) = server {
            server.shutdown().await;
        }
        info!("Session shut down");
    }
}

#[async_trait]
impl StreamControl for Session {
    async fn stop_stream(&self) {
        if self.stop().await == StopOutcome::Noop {
            warn!("Stop requested from the web page with nothing running");
        }
    }

    async fn stream_status(&self) -> StreamStatus {
        let mut inner = self.inner.lock().await;
        inner.reap_dead_tunnel();
        StreamStatus {
            streaming: inner.state == SessionState::Streaming,
            public_url: inner.public_url.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{FrameSourceConfig, TestCamera, TestSourceConfig};
    use crate::error::TunnelError;
    use crate::storage::{PhotoStore, PhotoStoreConfig};
    use tempfile::tempdir;
    use tokio::time::Duration;

    fn test_session(root: &std::path::Path, tunnel: Vec<&str>) -> Arc<Session> {
        let source = FrameSource::new(
            Arc::new(TestCamera::new(TestSourceConfig {
                fps: 30,
                width: 32,
                height: 24,
                ..Default::default()
            })),
            PhotoStore::new(PhotoStoreConfig {
                root_path: root.join("photos"),
                prefix: "photo".to_string(),
            }),
            FrameSourceConfig {
                warmup: Duration::from_millis(20),
                ..Default::default()
            },
        );
        Session::new(
            Arc::new(source),
            SessionConfig {
                bind: SocketAddr::from((Ipv4Addr::LOCALHOST, 0)),
                tunnel: TunnelConfig {
                    command: tunnel.into_iter().map(String::from).collect(),
                    url_timeout: Duration::from_secs(5),
                },
            },
        )
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stop_when_idle_is_noop() {
        let dir = tempdir().unwrap();
        let session = test_session(dir.path(), vec!["true"]);

        assert_eq!(session.stop().await, StopOutcome::Noop);
        assert_eq!(session.state().await, SessionState::Idle);
        assert!(std::fs::read_dir(dir.path()).unwrap().next().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn snapshot_leaves_state_alone() {
        let dir = tempdir().unwrap();
        let session = test_session(dir.path(), vec!["true"]);

        let path = session.snapshot().await.unwrap();
        assert!(path.exists());
        assert_eq!(session.state().await, SessionState::Idle);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn missing_tunnel_program_keeps_idle() {
        let dir = tempdir().unwrap();
        let session = test_session(dir.path(), vec!["catvision-no-such-tunnel"]);

        let result = session.start_stream().await;

        assert!(matches!(
            result,
            Err(SessionError::Tunnel(TunnelError::CommandNotFound(_)))
        ));
        assert_eq!(session.state().await, SessionState::Idle);
        session.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn tunnel_without_url_is_unreachable() {
        let dir = tempdir().unwrap();
        let session = test_session(dir.path(), vec!["sh", "-c", "echo starting"]);

        let result = session.start_stream().await;

        assert!(matches!(result, Err(SessionError::StreamUnreachable(_))));
        assert_eq!(session.state().await, SessionState::Idle);
        assert!(session.public_url().await.is_none());
        // The server stays up for the next attempt
        assert!(session.server_addr().await.is_some());
        session.shutdown().await;
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn stream_then_stop() {
        let dir = tempdir().unwrap();
        let session = test_session(
            dir.path(),
            vec!["sh", "-c", "echo 'your url is: https://cat.loca.lt'; sleep 30"],
        );

        let started = session.start_stream().await.unwrap();
        assert_eq!(started, StreamStart::Started("https://cat.loca.lt".to_string()));
        assert_eq!(session.state().await, SessionState::Streaming);

        let again = session.start_stream().await.unwrap();
        assert_eq!(again, StreamStart::AlreadyStreaming("https://cat.loca.lt".to_string()));

        let status = session.stream_status().await;
        assert!(status.streaming);
        assert_eq!(status.public_url.as_deref(), Some("https://cat.loca.lt"));

        assert_eq!(
            session.stop().await,
            StopOutcome::Stopped {
                camera: false,
                tunnel: true
            }
        );
        assert_eq!(session.state().await, SessionState::Idle);
        assert_eq!(session.stop().await, StopOutcome::Noop);

        session.shutdown().await;
        assert!(session.server_addr().await.is_none());
    }

    #[cfg(unix)]
    #[tokio::test(flavor = "multi_thread")]
    async fn exited_tunnel_is_not_reused() {
        let dir = tempdir().unwrap();
        let session = test_session(
            dir.path(),
            vec!["sh", "-c", "echo 'your url is: https://gone.loca.lt'"],
        );

        let first = session.start_stream().await.unwrap();
        assert_eq!(first, StreamStart::Started("https://gone.loca.lt".to_string()));

        // Let the tunnel process exit
        let idle = tokio::time::timeout(Duration::from_secs(5), async {
            while session.state().await != SessionState::Idle {
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        })
        .await;
        assert!(idle.is_ok(), "session should drop back to Idle");
        assert!(session.public_url().await.is_none());
        assert!(!session.stream_status().await.streaming);

        let second = session.start_stream().await.unwrap();
        assert!(matches!(second, StreamStart::Started(_)));

        session.shutdown().await;
    }
}
