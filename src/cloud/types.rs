//! Data model shared between the cloud façade, the comparator, and the
//! convergence controller.
//!
//! These are the crate's own domain types, independent of the AWS SDK's wire
//! types — the façade (`aws_facade.rs`) translates at the boundary so the
//! rest of the crate never touches `aws_sdk_ec2`/`aws_sdk_autoscaling` types
//! directly.

use chrono::{DateTime, Utc};
use std::collections::BTreeMap;

/// An auto-scaling group, identified by name, with the summary fields the
/// controller needs cached for the duration of one convergence pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AsgHandle {
    pub name: String,
    pub desired_capacity: u32,
    pub launch_config_name: String,
}

/// One block-device mapping entry, keyed by device name in the maps that
/// hold these (`LaunchConfig::block_device_mappings`,
/// `InstanceSnapshot::volumes`).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockDeviceMapping {
    pub volume_type: String,
    pub volume_size: i32,
    pub delete_on_termination: bool,
}

/// The declarative target shape an auto-scaling group's instances should
/// match.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchConfig {
    pub image_id: String,
    pub instance_type: String,
    pub kernel_id: String,
    pub key_name: String,
    pub iam_instance_profile: Option<String>,
    pub security_groups: Vec<String>,
    pub user_data: Vec<u8>,
    pub block_device_mappings: BTreeMap<String, BlockDeviceMapping>,
}

/// Observed state of one running instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstanceSnapshot {
    pub id: String,
    pub private_address: String,
    pub launch_time: DateTime<Utc>,
    pub image_id: String,
    pub instance_type: String,
    pub kernel_id: String,
    pub key_name: String,
    pub iam_instance_profile: Option<String>,
    pub security_groups: Vec<String>,
    pub volumes: BTreeMap<String, BlockDeviceMapping>,
}
