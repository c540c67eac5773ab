//! asg-roller CLI entry point
//!
//! Parses command-line arguments and runs one convergence pass against the
//! selected auto-scaling group.

use anyhow::{Context, Result};
use asg_roller::cli::RunArgs;
use asg_roller::cloud::AwsFacade;
use asg_roller::controller::{ConvergeOptions, Controller};
use asg_roller::prober::{DirectProber, ProberConfig, ReadinessProber, TunnelledProber};
use clap::Parser;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    let args = RunArgs::parse();

    let filter = if args.debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: RunArgs) -> Result<()> {
    let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
    let cloud = AwsFacade::new(&sdk_config);

    let prober_config = ProberConfig::new(args.ssh_username.clone(), args.ssh_private_key.clone());
    let options = ConvergeOptions {
        dry_run: args.dry_run,
        max_wait_attempts: args.max_wait_attempts,
        poll_interval: args.poll_interval(),
    };

    match &args.ssh_tunnel {
        Some(bastion) => {
            let prober = TunnelledProber::new(bastion.clone(), prober_config, args.max_wait_attempts);
            converge(cloud, prober, options, &args.limit).await
        }
        None => {
            let prober = DirectProber::new(prober_config);
            converge(cloud, prober, options, &args.limit).await
        }
    }
}

async fn converge(
    cloud: AwsFacade,
    prober: impl ReadinessProber,
    options: ConvergeOptions,
    selector: &str,
) -> Result<()> {
    let controller = Controller::new(cloud, prober, options);
    controller
        .converge(selector)
        .await
        .context("rolling upgrade did not converge")
}
