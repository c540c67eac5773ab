//! Command-line surface.
//!
//! A single command with the flags `parse_args` exposed, translated to
//! `clap` derive macros.

use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Parser, Debug)]
#[command(name = "asg-roller", about = "Roll drifted auto-scaling group instances onto their current launch configuration")]
pub struct RunArgs {
    /// Group-name prefix selector; anchored and resolved to exactly one
    /// auto-scaling group.
    #[arg(long)]
    pub limit: String,

    /// Bastion host; when set, the tunnelled readiness prober is used.
    #[arg(long = "ssh-tunnel")]
    pub ssh_tunnel: Option<String>,

    /// Private key file for SSH authentication.
    #[arg(long = "ssh-private-key")]
    pub ssh_private_key: PathBuf,

    /// SSH login name.
    #[arg(long = "ssh-username", default_value = "centos")]
    pub ssh_username: String,

    /// Polling cap per wait phase.
    #[arg(long = "max-wait-attempts", default_value_t = 40)]
    pub max_wait_attempts: u32,

    /// Poll interval, in seconds.
    #[arg(long = "sleep", default_value_t = 30)]
    pub sleep: u64,

    /// Suppress real terminations.
    #[arg(long = "dry-run")]
    pub dry_run: bool,

    /// Verbose logging.
    #[arg(long)]
    pub debug: bool,
}

impl RunArgs {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.sleep)
    }
}
