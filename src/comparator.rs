//! Config comparator.
//!
//! Pure, deterministic structural diff between one [`InstanceSnapshot`] and
//! the [`LaunchConfig`] it should match. Makes zero I/O calls — the caller
//! fetches `user_data` separately (it's a distinct, lazily-fetched API call)
//! and passes it in.
//!
//! Translated from `original_source/script.py`'s `InstanceConfigComparator`,
//! tag-for-tag.

use crate::cloud::types::{BlockDeviceMapping, InstanceSnapshot, LaunchConfig};
use std::collections::BTreeMap;

/// Compare one instance against the launch configuration it belongs to.
///
/// Returns the ordered list of field tags in which they differ. An empty
/// result means the instance matches the configuration.
pub fn diff(instance: &InstanceSnapshot, config: &LaunchConfig, user_data: &[u8]) -> Vec<String> {
    let mut changes = Vec::new();

    if user_data != config.user_data.as_slice() {
        changes.push("UserData".to_string());
    }

    let mut instance_sg: Vec<&str> = instance.security_groups.iter().map(String::as_str).collect();
    let mut config_sg: Vec<&str> = config.security_groups.iter().map(String::as_str).collect();
    instance_sg.sort_unstable();
    config_sg.sort_unstable();
    if instance_sg != config_sg {
        changes.push("SecurityGroups".to_string());
    }

    for (instance_attr, config_attr, tag) in [
        (
            instance.image_id.as_str(),
            config.image_id.as_str(),
            "ImageId",
        ),
        (
            instance.instance_type.as_str(),
            config.instance_type.as_str(),
            "InstanceType",
        ),
        (
            instance.kernel_id.as_str(),
            config.kernel_id.as_str(),
            "KernelId",
        ),
        (
            instance.key_name.as_str(),
            config.key_name.as_str(),
            "KeyName",
        ),
    ] {
        // An empty config value means "don't care" and suppresses the diff,
        // even if the instance value is non-empty.
        if !config_attr.is_empty() && config_attr != instance_attr {
            changes.push(tag.to_string());
        }
    }

    let instance_profile = instance.iam_instance_profile.as_deref().unwrap_or("");
    let config_profile = config.iam_instance_profile.as_deref().unwrap_or("");
    if instance_profile != config_profile {
        changes.push("IamInstanceProfile".to_string());
    }

    changes.extend(diff_volumes(&instance.volumes, &config.block_device_mappings));

    changes
}

/// Volume diff sub-algorithm.
fn diff_volumes(
    instance_volumes: &BTreeMap<String, BlockDeviceMapping>,
    config_volumes: &BTreeMap<String, BlockDeviceMapping>,
) -> Vec<String> {
    if config_volumes.is_empty() && instance_volumes.len() == 1 {
        return Vec::new();
    }

    let instance_keys: std::collections::BTreeSet<&String> = instance_volumes.keys().collect();
    let config_keys: std::collections::BTreeSet<&String> = config_volumes.keys().collect();

    let mut symmetric_diff: Vec<&&String> = instance_keys.symmetric_difference(&config_keys).collect();
    if !symmetric_diff.is_empty() {
        symmetric_diff.sort();
        return symmetric_diff
            .into_iter()
            .map(|device| format!("DeviceName:{device}"))
            .collect();
    }

    let mut changes = Vec::new();
    for (device, instance_volume) in instance_volumes {
        // Symmetric difference above was empty, so this key exists in both.
        let config_volume = &config_volumes[device];

        if instance_volume.volume_type != config_volume.volume_type {
            changes.push(format!("{device}.BlockDeviceMappings.Ebs.VolumeType"));
        }
        if instance_volume.volume_size != config_volume.volume_size {
            changes.push(format!("{device}.BlockDeviceMappings.Ebs.Size"));
        }
        if instance_volume.delete_on_termination != config_volume.delete_on_termination {
            changes.push(format!(
                "{device}.BlockDeviceMappings.Ebs.DeleteOnTermination"
            ));
        }
    }
    changes
}
