//! Tunnel publisher: exposes the local web server on a public URL
//!
//! Runs an external tunnel client (localtunnel by default) and scans its
//! stdout for the line announcing the public URL.

use std::path::{Path, PathBuf};
use std::process::Stdio;

use tokio::io::{AsyncBufRead, AsyncBufReadExt, BufReader, Lines};
use tokio::process::{Child, ChildStdout, Command};
use tokio::time::{sleep, Duration};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::core::{PORT_PLACEHOLDER, TUNNEL_URL_MARKER};
use crate::error::TunnelError;

/// Default tunnel command line; `{port}` is replaced with the web port
pub const DEFAULT_TUNNEL_COMMAND: &str = "npx localtunnel --port {port}";

/// Time allowed for the tunnel process to exit after being killed
const STOP_GRACE: Duration = Duration::from_secs(5);

/// Tunnel configuration
#[derive(Debug, Clone)]
pub struct TunnelConfig {
    /// Program followed by its arguments
    pub command: Vec<String>,
    /// Maximum wait for the public URL
    pub url_timeout: Duration,
}

impl TunnelConfig {
    /// Build from a whitespace-separated command line, substituting `{port}`.
    ///
    /// Quoting is not supported.
    pub fn from_command_line(template: &str, port: u16) -> Self {
        let port = port.to_string();
        Self {
            command: template
                .split_whitespace()
                .map(|part| part.replace(PORT_PLACEHOLDER, &port))
                .collect(),
            url_timeout: Duration::from_secs(30),
        }
    }

    /// Resolve the program to an executable path
    pub fn resolve(&self) -> Result<PathBuf, TunnelError> {
        let program = self.command.first().ok_or(TunnelError::EmptyCommand)?;
        which_binary(program).ok_or_else(|| TunnelError::CommandNotFound(program.clone()))
    }
}

/// Locate `name` on PATH. Names containing a path separator are checked as given.
fn which_binary(name: &str) -> Option<PathBuf> {
    let as_path = Path::new(name);
    if as_path.components().count() > 1 || as_path.is_absolute() {
        return is_executable(as_path).then(|| as_path.to_path_buf());
    }

    let path_var = std::env::var_os("PATH")?;
    for dir in std::env::split_paths(&path_var) {
        for candidate in executable_names(name) {
            let candidate = dir.join(candidate);
            if is_executable(&candidate) {
                return Some(candidate);
            }
        }
    }
    None
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .is_ok_and(|meta| meta.is_file() && meta.permissions().mode() & 0o111 != 0)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(windows)]
fn executable_names(name: &str) -> Vec<String> {
    vec![
        name.to_string(),
        format!("{name}.exe"),
        format!("{name}.cmd"),
        format!("{name}.bat"),
    ]
}

#[cfg(not(windows))]
fn executable_names(name: &str) -> Vec<String> {
    vec![name.to_string()]
}

/// Outcome of waiting for the public URL
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UrlDiscovery {
    /// The tunnel announced its URL
    Found(String),
    /// Output ended without the marker
    Exited,
    /// No URL within the configured wait
    TimedOut,
    /// The wait was cancelled
    Cancelled,
}

impl UrlDiscovery {
    pub fn url(&self) -> Option<&str> {
        match self {
            Self::Found(url) => Some(url),
            _ => None,
        }
    }
}

/// Running tunnel process
pub struct Tunnel {
    child: Child,
    stdout: Option<Lines<BufReader<ChildStdout>>>,
    url_timeout: Duration,
}

impl Tunnel {
    /// Spawn the tunnel process
    pub fn start(config: &TunnelConfig) -> Result<Self, TunnelError> {
        let program = config.resolve()?;
        let args = &config.command[1..];

        info!("Starting tunnel: {:?} {:?}", program, args);

        let mut child = Command::new(&program)
            .args(args)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()?;

        if let Some(stderr) = child.stderr.take() {
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(target: "catvision::tunnel::stderr", "{}", line);
                }
            });
        }

        let stdout = child.stdout.take().map(|out| BufReader::new(out).lines());

        debug!(pid = ?child.id(), "Tunnel process spawned");

        Ok(Self {
            child,
            stdout,
            url_timeout: config.url_timeout,
        })
    }

    /// OS process id, if still running
    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Whether the tunnel process has terminated
    pub fn has_exited(&mut self) -> bool {
        !matches!(self.child.try_wait(), Ok(None))
    }

    /// Wait for the tunnel to announce its public URL.
    ///
    /// Output after the announcement keeps being drained into the log.
    pub async fn get_public_url(&mut self, cancel: &CancellationToken) -> UrlDiscovery {
        let Some(mut lines) = self.stdout.take() else {
            return UrlDiscovery::Exited;
        };

        let outcome = scan_for_url(&mut lines, self.url_timeout, cancel).await;

        match &outcome {
            UrlDiscovery::Found(url) => info!(url = %url, "Tunnel is up"),
            other => warn!("No tunnel URL: {:?}", other),
        }

        tokio::spawn(async move {
            while let Ok(Some(line)) = lines.next_line().await {
                debug!(target: "catvision::tunnel::stdout", "{}", line);
            }
        });

        outcome
    }

    /// Kill the tunnel process and reap it
    pub async fn stop(mut self) {
        if let Err(e) = self.child.start_kill() {
            debug!("Tunnel already exited: {}", e);
        }
        match tokio::time::timeout(STOP_GRACE, self.child.wait()).await {
            Ok(Ok(status)) => info!("Tunnel stopped ({})", status),
            Ok(Err(e)) => warn!("Failed to reap tunnel process: {}", e),
            Err(_) => warn!("Tunnel did not exit within {:?}", STOP_GRACE),
        }
    }
}

/// Read lines until one carries the URL marker
pub async fn scan_for_url<R>(
    lines: &mut Lines<R>,
    url_timeout: Duration,
    cancel: &CancellationToken,
) -> UrlDiscovery
where
    R: AsyncBufRead + Unpin,
{
    let deadline = sleep(url_timeout);
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => return UrlDiscovery::Cancelled,
            _ = &mut deadline => return UrlDiscovery::TimedOut,
            line = lines.next_line() => match line {
                Ok(Some(line)) => {
                    debug!(target: "catvision::tunnel::stdout", "{}", line);
                    if let Some(url) = extract_url(&line) {
                        return UrlDiscovery::Found(url);
                    }
                }
                Ok(None) => return UrlDiscovery::Exited,
                Err(e) => {
                    warn!("Error reading tunnel output: {}", e);
                    return UrlDiscovery::Exited;
                }
            },
        }
    }
}

/// The trimmed text after the last URL marker in `line`
pub fn extract_url(line: &str) -> Option<String> {
    let (_, rest) = line.rsplit_once(TUNNEL_URL_MARKER)?;
    let url = rest.trim();
    (!url.is_empty()).then(|| url.to_string())
}
