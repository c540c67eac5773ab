//! asg-roller library
//!
//! Rolling-upgrade controller for auto-scaling group instances that have
//! drifted from their launch configuration.
//!
//! ## Architecture
//!
//! - **Cloud Façade** (`cloud`): the typed, retrying contract over the
//!   cloud provider API. `cloud::AwsFacade` is the live implementation;
//!   tests use a `mockall` mock of `cloud::CloudFacade`.
//! - **Readiness Prober** (`prober`): SSH-based liveness check, direct or
//!   tunnelled through a bastion.
//! - **Config Comparator** (`comparator`): pure structural diff between a
//!   running instance and the launch configuration it should match.
//! - **Convergence Controller** (`controller`): the control loop that ties
//!   the three above together.
//! - **Error Handling**: `error` module with structured error types and
//!   retry awareness.
//! - **Retry Logic**: `retry` module with exponential backoff, used by the
//!   cloud façade for throttled calls.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use asg_roller::cloud::AwsFacade;
//! use asg_roller::controller::{Controller, ConvergeOptions};
//! use asg_roller::prober::{DirectProber, ProberConfig};
//!
//! # async fn example() -> asg_roller::error::Result<()> {
//! let sdk_config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
//! let cloud = AwsFacade::new(&sdk_config);
//! let prober = DirectProber::new(ProberConfig::new("centos", "/home/op/.ssh/id_rsa".into()));
//! let controller = Controller::new(cloud, prober, ConvergeOptions::default());
//! controller.converge("web-servers").await?;
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod cloud;
pub mod comparator;
pub mod controller;
pub mod error;
pub mod prober;
pub mod retry;

pub use cloud::CloudFacade;
pub use controller::{ConvergeOptions, Controller};
pub use error::{Result, RollerError};
pub use prober::ReadinessProber;
