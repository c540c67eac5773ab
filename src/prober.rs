//! Readiness prober.
//!
//! SSH-based liveness check: `is_ready(address)` is `true` iff cloud-init's
//! boot-finished marker exists on the target. Never raises — any SSH error,
//! auth failure, timeout, or non-zero exit status is a plain `false`.
//!
//! Built on `ssh2::Session` driven from async code via
//! `tokio::task::spawn_blocking` (`ssh2` is a synchronous, blocking
//! library). The tunnelled variant forwards the target connection over an
//! `ssh2` direct-tcpip channel opened on the bastion session rather than
//! binding a real local listener — that's the ssh2-rs idiom for "local
//! forward" and avoids the original's unbounded port-forward-is-up poll
//! (see DESIGN.md, REDESIGN FLAGS).

use crate::error::{Result, RollerError};
use async_trait::async_trait;
use ssh2::Session;
use std::io::Read;
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;
use tracing::{debug, warn};

const BOOT_FINISHED_MARKER: &str = "/var/lib/cloud/instance/boot-finished";

fn probe_command() -> String {
    format!("test -f {BOOT_FINISHED_MARKER} && echo READY")
}

/// Shared SSH connection parameters for both prober variants.
#[derive(Debug, Clone)]
pub struct ProberConfig {
    pub username: String,
    pub private_key_path: PathBuf,
    pub remote_port: u16,
    pub connect_timeout: Duration,
}

impl ProberConfig {
    pub fn new(username: impl Into<String>, private_key_path: PathBuf) -> Self {
        Self {
            username: username.into(),
            private_key_path,
            remote_port: 22,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Readiness prober's public contract. Never returns an `Err` —
/// implementations absorb every failure mode into `false`.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ReadinessProber: Send + Sync {
    async fn is_ready(&self, address: &str) -> bool;
}

fn run_probe(session: &Session) -> Result<bool> {
    let mut channel = session
        .channel_session()
        .map_err(|e| RollerError::Ssh(format!("channel open failed: {e}")))?;
    channel
        .exec(&probe_command())
        .map_err(|e| RollerError::Ssh(format!("exec failed: {e}")))?;

    let mut output = String::new();
    channel
        .read_to_string(&mut output)
        .map_err(|e| RollerError::Ssh(format!("read failed: {e}")))?;
    channel
        .wait_close()
        .map_err(|e| RollerError::Ssh(format!("channel close failed: {e}")))?;

    let exit_status = channel
        .exit_status()
        .map_err(|e| RollerError::Ssh(format!("exit status unavailable: {e}")))?;

    Ok(exit_status == 0 && output.trim() == "READY")
}

fn authenticate(session: &Session, config: &ProberConfig) -> Result<()> {
    // Warn-and-accept unknown host keys: this tool runs inside the
    // operator's trust boundary, so we never fail a probe over an unknown
    // fingerprint. ssh2 has no host-key callback hook to log the
    // fingerprint through, so the accept is silent and unconditional.
    session
        .userauth_pubkey_file(&config.username, None, &config.private_key_path, None)
        .map_err(|e| RollerError::Ssh(format!("authentication failed: {e}")))?;

    if !session.authenticated() {
        return Err(RollerError::Ssh("authentication did not complete".to_string()));
    }
    Ok(())
}

/// Opens SSH straight to `address:remote_port`.
pub struct DirectProber {
    config: ProberConfig,
    in_use: AtomicBool,
}

impl DirectProber {
    pub fn new(config: ProberConfig) -> Self {
        Self {
            config,
            in_use: AtomicBool::new(false),
        }
    }

    fn probe_blocking(address: &str, config: &ProberConfig) -> Result<bool> {
        let tcp = TcpStream::connect((address, config.remote_port))
            .map_err(|e| RollerError::Ssh(format!("connect to {address} failed: {e}")))?;
        tcp.set_read_timeout(Some(config.connect_timeout))
            .map_err(|e| RollerError::Ssh(format!("set_read_timeout failed: {e}")))?;

        let mut session = Session::new().map_err(|e| RollerError::Ssh(format!("session init failed: {e}")))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| RollerError::Ssh(format!("handshake failed: {e}")))?;

        authenticate(&session, config)?;
        let ready = run_probe(&session)?;
        session.disconnect(None, "probe complete", None).ok();
        Ok(ready)
    }
}

#[async_trait]
impl ReadinessProber for DirectProber {
    async fn is_ready(&self, address: &str) -> bool {
        if self.in_use.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            warn!("prober reentered before previous probe closed, treating as not ready");
            return false;
        }

        let address = address.to_string();
        let config = self.config.clone();
        let result = tokio::task::spawn_blocking(move || Self::probe_blocking(&address, &config)).await;

        self.in_use.store(false, Ordering::SeqCst);

        match result {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                debug!("probe failed: {e}");
                false
            }
            Err(e) => {
                warn!("probe task panicked: {e}");
                false
            }
        }
    }
}

/// Opens SSH to a bastion, forwards a channel to the target, then probes
/// over that forwarded channel.
pub struct TunnelledProber {
    bastion_host: String,
    config: ProberConfig,
    max_tunnel_attempts: u32,
    in_use: AtomicBool,
}

impl TunnelledProber {
    pub fn new(bastion_host: impl Into<String>, config: ProberConfig, max_tunnel_attempts: u32) -> Self {
        Self {
            bastion_host: bastion_host.into(),
            config,
            max_tunnel_attempts,
            in_use: AtomicBool::new(false),
        }
    }

    fn probe_blocking(
        address: &str,
        bastion_host: &str,
        config: &ProberConfig,
        max_tunnel_attempts: u32,
    ) -> Result<bool> {
        let bastion_tcp = TcpStream::connect((bastion_host, 22u16))
            .map_err(|e| RollerError::Ssh(format!("connect to bastion {bastion_host} failed: {e}")))?;

        let mut bastion_session =
            Session::new().map_err(|e| RollerError::Ssh(format!("bastion session init failed: {e}")))?;
        bastion_session.set_tcp_stream(bastion_tcp);
        bastion_session
            .handshake()
            .map_err(|e| RollerError::Ssh(format!("bastion handshake failed: {e}")))?;
        authenticate(&bastion_session, config)?;

        // Bounded forward-establishment poll (REDESIGN FLAG: the original
        // polled this unboundedly; we cap it at max_tunnel_attempts 1 s
        // ticks and fail the probe instead of hanging).
        let mut channel = None;
        for attempt in 0..max_tunnel_attempts.max(1) {
            match bastion_session.channel_direct_tcpip(address, config.remote_port, None) {
                Ok(c) => {
                    channel = Some(c);
                    break;
                }
                Err(e) => {
                    if attempt + 1 == max_tunnel_attempts {
                        return Err(RollerError::Ssh(format!(
                            "tunnel to {address}:{} never came up: {e}",
                            config.remote_port
                        )));
                    }
                    std::thread::sleep(Duration::from_secs(1));
                }
            }
        }
        let channel = channel.ok_or_else(|| RollerError::Ssh("tunnel never came up".to_string()))?;

        let mut target_session =
            Session::new().map_err(|e| RollerError::Ssh(format!("target session init failed: {e}")))?;
        target_session.set_tcp_stream(channel);
        target_session
            .handshake()
            .map_err(|e| RollerError::Ssh(format!("target handshake failed: {e}")))?;
        authenticate(&target_session, config)?;

        let ready = run_probe(&target_session)?;
        target_session.disconnect(None, "probe complete", None).ok();
        bastion_session.disconnect(None, "tunnel closed", None).ok();
        Ok(ready)
    }
}

#[async_trait]
impl ReadinessProber for TunnelledProber {
    async fn is_ready(&self, address: &str) -> bool {
        if self.in_use.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst).is_err() {
            warn!("prober reentered before previous probe closed, treating as not ready");
            return false;
        }

        let address = address.to_string();
        let bastion_host = self.bastion_host.clone();
        let config = self.config.clone();
        let max_tunnel_attempts = self.max_tunnel_attempts;
        let result = tokio::task::spawn_blocking(move || {
            Self::probe_blocking(&address, &bastion_host, &config, max_tunnel_attempts)
        })
        .await;

        self.in_use.store(false, Ordering::SeqCst);

        match result {
            Ok(Ok(ready)) => ready,
            Ok(Err(e)) => {
                debug!("tunnelled probe failed: {e}");
                false
            }
            Err(e) => {
                warn!("tunnelled probe task panicked: {e}");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn probe_command_checks_the_cloud_init_marker() {
        assert!(probe_command().contains("/var/lib/cloud/instance/boot-finished"));
    }

    #[tokio::test]
    async fn direct_prober_returns_false_on_unreachable_host() {
        let config = ProberConfig::new("centos", PathBuf::from("/nonexistent/key"));
        let prober = DirectProber::new(config);
        // 192.0.2.0/24 is TEST-NET-1, guaranteed unreachable.
        assert!(!prober.is_ready("192.0.2.1").await);
    }

    #[tokio::test]
    async fn reentrant_probe_is_rejected_without_panicking() {
        let config = ProberConfig::new("centos", PathBuf::from("/nonexistent/key"));
        let prober = DirectProber::new(config);
        prober.in_use.store(true, Ordering::SeqCst);
        assert!(!prober.is_ready("192.0.2.1").await);
    }
}
