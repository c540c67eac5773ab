//! Cloud façade.
//!
//! `CloudFacade` is the typed, retrying contract the convergence controller
//! consumes. The live implementation (`AwsFacade`, in `aws_facade.rs`) talks
//! to `aws-sdk-autoscaling` and `aws-sdk-ec2`; tests swap in a `mockall` mock
//! of the same trait instead.

pub mod aws_facade;
pub mod types;

pub use aws_facade::AwsFacade;
pub use types::{AsgHandle, BlockDeviceMapping, InstanceSnapshot, LaunchConfig};

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// The cloud façade's public contract.
///
/// Every method may fail with a transient cloud error; implementations are
/// expected to retry throttling internally (see [`is_throttling_error`]) and
/// propagate everything else immediately.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait CloudFacade: Send + Sync {
    /// Paginate the provider's describe-groups endpoint, concatenating
    /// pages in order.
    async fn list_groups(&self) -> Result<Vec<AsgHandle>>;

    /// Groups whose name matches the given (not necessarily anchored)
    /// regular expression. The façade itself does not anchor the pattern —
    /// see DESIGN.md "Open question: non-anchored regex".
    async fn find_groups(&self, pattern: &str) -> Result<Vec<AsgHandle>>;

    /// Fetch the launch configuration for the given name.
    async fn describe_launch_config(&self, name: &str) -> Result<LaunchConfig>;

    /// Running instances tagged with the given auto-scaling group name.
    async fn list_instances(&self, group_name: &str) -> Result<Vec<InstanceSnapshot>>;

    /// Volume records for one instance, keyed by device name.
    async fn describe_volumes(
        &self,
        instance: &InstanceSnapshot,
    ) -> Result<BTreeMap<String, BlockDeviceMapping>>;

    /// Raw user-data bytes for one instance (a separate API call).
    async fn get_user_data(&self, instance_id: &str) -> Result<Vec<u8>>;

    /// Terminate an instance. When `dry_run` is set, the provider's
    /// "would-have-succeeded" error is swallowed; any other error
    /// propagates.
    async fn terminate(&self, instance_id: &str, dry_run: bool) -> Result<()>;
}

/// Centralized throttling classification: `true` iff the message contains
/// the substring "throttling" (case-insensitive).
///
/// Kept as a single predicate so it can later be swapped for a structured
/// error-code check without touching any call site.
pub fn is_throttling_error(message: &str) -> bool {
    message.to_lowercase().contains("throttling")
}
