//! Error types for asg-roller
//!
//! This module defines the error handling strategy. There are two error
//! types: `RollerError` (main error enum) and `ConfigError` (launch-config
//! validation errors).
//!
//! ## Error Handling Philosophy
//!
//! Library code uses `crate::error::Result<T>` which returns `RollerError`.
//! The CLI binary uses `anyhow::Result<T>` for top-level error handling; the
//! conversion happens at the CLI boundary using `anyhow::Error::from` so the
//! full source chain is preserved rather than collapsed to a string.
//!
//! ## Retry Awareness
//!
//! Errors implement `IsRetryable` to indicate whether an operation should be
//! retried. `ExponentialBackoffPolicy` (see `src/retry.rs`) uses this to
//! decide whether to back off and try again or fail immediately. Only
//! `CloudProvider` and `Retryable` are retryable by default — a throttled
//! cloud call is worth retrying, a misconfigured launch config or an
//! ambiguous group selector is not.
//!
//! ## When to Use Which Error
//!
//! - `Config`: the launch configuration is missing a required field — this
//!   is an operator misconfiguration, never retried.
//! - `CloudProvider`: generic, retryable cloud API failure.
//! - `GroupSelector`: `--limit` resolved to zero or more than one group.
//! - `WaitTimeout`: the wait-phase state machine exhausted `max_attempts`.
//! - `Ssh`: used internally by the prober; never escapes `is_ready`, which
//!   always converts it to `false` instead.

use thiserror::Error;

/// Main error type for asg-roller
#[derive(Error, Debug)]
pub enum RollerError {
    #[error("launch configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("cloud provider error: {provider} - {message}")]
    CloudProvider {
        provider: String,
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("group selector {pattern:?} matched {matches} groups, expected exactly 1")]
    GroupSelector { pattern: String, matches: usize },

    #[error("retryable error (attempt {attempt}/{max_attempts}): {reason}")]
    Retryable {
        attempt: u32,
        max_attempts: u32,
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("wait phase exhausted {attempts} attempts waiting for the group to converge")]
    WaitTimeout { attempts: u32 },

    #[error("ssh error: {0}")]
    Ssh(String),

    #[error("AWS SDK error: {0}")]
    Aws(String),
}

/// Launch-configuration validation errors.
///
/// A `LaunchConfig` must carry non-null values for the four required
/// fields; absence is a configuration error, not a drift report.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("launch configuration is missing required attribute: {0}")]
    MissingField(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, RollerError>;

/// Trait for determining if an error is retryable.
///
/// Used by `RetryPolicy` implementations to decide whether an error should
/// trigger a retry attempt.
pub trait IsRetryable {
    fn is_retryable(&self) -> bool;
}

impl IsRetryable for RollerError {
    fn is_retryable(&self) -> bool {
        matches!(
            self,
            RollerError::Retryable { .. } | RollerError::CloudProvider { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cloud_provider_is_retryable() {
        let err = RollerError::CloudProvider {
            provider: "aws".into(),
            message: "throttling: rate exceeded".into(),
            source: None,
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn group_selector_is_not_retryable() {
        let err = RollerError::GroupSelector {
            pattern: "^web".into(),
            matches: 0,
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn wait_timeout_is_not_retryable() {
        let err = RollerError::WaitTimeout { attempts: 40 };
        assert!(!err.is_retryable());
    }

    #[test]
    fn config_error_is_not_retryable() {
        let err: RollerError = ConfigError::MissingField("ImageId".into()).into();
        assert!(!err.is_retryable());
    }
}
