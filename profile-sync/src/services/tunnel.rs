//! SSH local port forward to the reporting database
//!
//! Runs the system `ssh` client (`ssh -N -L ...`) as a child process. When a
//! password is configured the client is wrapped in `sshpass -e`, which reads
//! it from the `SSHPASS` environment variable; otherwise `BatchMode` is used
//! and keys or an agent must be available.
//!
//! # Requirements
//! - `ssh` on `PATH`
//! - `sshpass` on `PATH` for password authentication

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use elements_common::config::SshCredentials;
use std::net::SocketAddr;
use std::process::Stdio;
use std::time::{Duration, Instant};
use tokio::net::{TcpListener, TcpStream};
use tokio::process::{Child, Command};
use tracing::{debug, info};

const SSH_COMMAND: &str = "ssh";
const SSHPASS_COMMAND: &str = "sshpass";
const READY_POLL_INTERVAL: Duration = Duration::from_millis(200);

/// An open forwarding channel
#[async_trait]
pub trait Tunnel: Send {
    /// Local end of the forward
    fn local_addr(&self) -> SocketAddr;

    /// Tear the tunnel down
    async fn close(self: Box<Self>) -> SyncResult<()>;
}

/// Opens a [`Tunnel`] for one batch
#[async_trait]
pub trait TunnelOpener: Send + Sync {
    async fn open(&self) -> SyncResult<Box<dyn Tunnel>>;
}

/// Opens tunnels with the system SSH client
pub struct SshTunnelOpener {
    credentials: SshCredentials,
    ready_timeout: Duration,
}

impl SshTunnelOpener {
    pub fn new(credentials: SshCredentials) -> Self {
        Self {
            credentials,
            ready_timeout: Duration::from_secs(15),
        }
    }

    pub fn with_ready_timeout(mut self, ready_timeout: Duration) -> Self {
        self.ready_timeout = ready_timeout;
        self
    }

    /// Argument to `-L`
    pub fn forward_arg(&self) -> String {
        let local = self.credentials.local_bind;
        format!(
            "{}:{}:{}:{}",
            local.ip(),
            local.port(),
            self.credentials.remote_host,
            self.credentials.remote_port
        )
    }

    /// Command that runs the forward in the foreground
    pub fn command(&self) -> Command {
        let ssh = &self.credentials;

        let mut command = match ssh.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                let mut c = Command::new(SSHPASS_COMMAND);
                c.arg("-e").arg(SSH_COMMAND).env("SSHPASS", password);
                c
            }
            None => {
                let mut c = Command::new(SSH_COMMAND);
                c.args(["-o", "BatchMode=yes"]);
                c
            }
        };

        command
            .args(["-N", "-o", "ExitOnForwardFailure=yes"])
            .args(["-o", "StrictHostKeyChecking=accept-new"])
            .arg("-p")
            .arg(ssh.port.to_string())
            .arg("-L")
            .arg(self.forward_arg())
            .arg(format!("{}@{}", ssh.username, ssh.host))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        command
    }
}

#[async_trait]
impl TunnelOpener for SshTunnelOpener {
    async fn open(&self) -> SyncResult<Box<dyn Tunnel>> {
        let local_addr = self.credentials.local_bind;
        info!(
            host = %self.credentials.host,
            local = %local_addr,
            "Opening SSH tunnel"
        );

        // Anything already listening would pass the readiness check below
        ensure_port_free(local_addr).await?;

        let mut child = self.command().spawn().map_err(|e| {
            SyncError::Connection(format!("Failed to start SSH client: {}", e))
        })?;

        let deadline = Instant::now() + self.ready_timeout;
        loop {
            if let Some(status) = child.try_wait().map_err(|e| SyncError::Connection(e.to_string()))? {
                return Err(SyncError::Connection(format!(
                    "SSH client exited before the tunnel was ready ({})",
                    status
                )));
            }

            if TcpStream::connect(local_addr).await.is_ok() {
                if let Some(status) = child.try_wait().map_err(|e| SyncError::Connection(e.to_string()))? {
                    return Err(SyncError::Connection(format!(
                        "SSH client exited while opening the tunnel ({})",
                        status
                    )));
                }
                info!(local = %local_addr, "SSH tunnel ready");
                return Ok(Box::new(SshTunnel { child, local_addr }));
            }

            if Instant::now() >= deadline {
                let _ = child.kill().await;
                return Err(SyncError::Connection(format!(
                    "SSH tunnel on {} not ready after {:?}",
                    local_addr, self.ready_timeout
                )));
            }

            debug!("Waiting for SSH tunnel on {}", local_addr);
            tokio::time::sleep(READY_POLL_INTERVAL).await;
        }
    }
}

async fn ensure_port_free(local_addr: SocketAddr) -> SyncResult<()> {
    match TcpListener::bind(local_addr).await {
        Ok(listener) => {
            drop(listener);
            Ok(())
        }
        Err(e) => Err(SyncError::Connection(format!(
            "Tunnel bind address {} is already in use: {}",
            local_addr, e
        ))),
    }
}

/// Running `ssh -N -L` child; killed on close or drop
pub struct SshTunnel {
    child: Child,
    local_addr: SocketAddr,
}

#[async_trait]
impl Tunnel for SshTunnel {
    fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    async fn close(mut self: Box<Self>) -> SyncResult<()> {
        info!(local = %self.local_addr, "Closing SSH tunnel");
        self.child
            .kill()
            .await
            .map_err(|e| SyncError::Connection(format!("Failed to stop SSH client: {}", e)))
    }
}
