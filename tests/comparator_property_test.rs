//! Property-based tests for the config comparator.
//!
//! These check the comparator's algebraic properties across many generated
//! instance/config pairs, rather than any single worked example (the
//! worked examples already live in `src/comparator.rs`'s own unit tests).

use asg_roller::cloud::{BlockDeviceMapping, InstanceSnapshot, LaunchConfig};
use asg_roller::comparator::diff;
use chrono::{TimeZone, Utc};
use proptest::prelude::*;
use std::collections::BTreeMap;

fn arb_device_name() -> impl Strategy<Value = String> {
    "sd[a-c][1-3]"
}

fn arb_volume() -> impl Strategy<Value = BlockDeviceMapping> {
    ("gp2|gp3|standard|io1", 1i32..500, any::<bool>()).prop_map(
        |(volume_type, volume_size, delete_on_termination)| BlockDeviceMapping {
            volume_type: volume_type.to_string(),
            volume_size,
            delete_on_termination,
        },
    )
}

fn arb_volumes() -> impl Strategy<Value = BTreeMap<String, BlockDeviceMapping>> {
    prop::collection::btree_map(arb_device_name(), arb_volume(), 0..4)
}

fn arb_security_groups() -> impl Strategy<Value = Vec<String>> {
    prop::collection::vec("sg-[1-5]", 0..4)
}

fn instance_from(
    image_id: String,
    instance_type: String,
    kernel_id: String,
    key_name: String,
    security_groups: Vec<String>,
    volumes: BTreeMap<String, BlockDeviceMapping>,
) -> InstanceSnapshot {
    InstanceSnapshot {
        id: "i-test".to_string(),
        private_address: "10.0.0.1".to_string(),
        launch_time: Utc.with_ymd_and_hms(2016, 1, 1, 0, 0, 0).unwrap(),
        image_id,
        instance_type,
        kernel_id,
        key_name,
        iam_instance_profile: None,
        security_groups,
        volumes,
    }
}

fn config_matching(instance: &InstanceSnapshot, user_data: Vec<u8>) -> LaunchConfig {
    LaunchConfig {
        image_id: instance.image_id.clone(),
        instance_type: instance.instance_type.clone(),
        kernel_id: instance.kernel_id.clone(),
        key_name: instance.key_name.clone(),
        iam_instance_profile: instance.iam_instance_profile.clone(),
        security_groups: instance.security_groups.clone(),
        user_data,
        block_device_mappings: instance.volumes.clone(),
    }
}

proptest! {
    /// `diff(x, config_from(x), ud_from(x)) = []` for any generated
    /// instance, as long as the required fields are non-empty (an empty
    /// required field would suppress the diff instead of round-tripping,
    /// which is covered separately in `src/comparator.rs`'s own tests).
    #[test]
    fn matching_instance_and_config_always_round_trip_to_empty_diff(
        image_id in "ami-[a-z0-9]{4,8}",
        instance_type in "t3\\.(micro|small|medium|large)",
        kernel_id in "aki-[a-z0-9]{4,8}",
        key_name in "[a-z-]{3,10}",
        security_groups in arb_security_groups(),
        volumes in arb_volumes(),
        user_data in prop::collection::vec(any::<u8>(), 0..32),
    ) {
        let instance = instance_from(image_id, instance_type, kernel_id, key_name, security_groups, volumes);
        let config = config_matching(&instance, user_data.clone());
        prop_assert_eq!(diff(&instance, &config, &user_data), Vec::<String>::new());
    }

    /// Permuting either security-group list never changes the result of
    /// `diff`.
    #[test]
    fn security_group_diff_is_insensitive_to_permutation(
        image_id in "ami-[a-z0-9]{4,8}",
        instance_type in "t3\\.(micro|small|medium|large)",
        kernel_id in "aki-[a-z0-9]{4,8}",
        key_name in "[a-z-]{3,10}",
        mut instance_sg in prop::collection::vec("sg-[1-9]", 0..5),
        mut config_sg in prop::collection::vec("sg-[1-9]", 0..5),
        user_data in prop::collection::vec(any::<u8>(), 0..16),
    ) {
        let instance = instance_from(
            image_id.clone(), instance_type.clone(), kernel_id.clone(), key_name.clone(),
            instance_sg.clone(), BTreeMap::new(),
        );
        let config = LaunchConfig {
            image_id, instance_type, kernel_id, key_name,
            iam_instance_profile: None,
            security_groups: config_sg.clone(),
            user_data: user_data.clone(),
            block_device_mappings: BTreeMap::new(),
        };
        let baseline = diff(&instance, &config, &user_data);

        // Shuffle both lists by reversing and rotating; the diff must be
        // identical regardless of order.
        instance_sg.reverse();
        config_sg.rotate_left(config_sg.len().min(1));
        let reordered_instance = instance_from(
            instance.image_id.clone(), instance.instance_type.clone(),
            instance.kernel_id.clone(), instance.key_name.clone(),
            instance_sg, BTreeMap::new(),
        );
        let reordered_config = LaunchConfig { security_groups: config_sg, ..config };
        let reordered = diff(&reordered_instance, &reordered_config, &user_data);

        prop_assert_eq!(baseline, reordered);
    }

    /// Whenever the config carries no block-device mappings and the
    /// instance carries exactly one, the volume diff is empty regardless
    /// of its contents.
    #[test]
    fn single_instance_volume_with_empty_config_always_suppresses_volume_diff(
        device in arb_device_name(),
        volume in arb_volume(),
    ) {
        let mut volumes = BTreeMap::new();
        volumes.insert(device, volume);
        let instance = instance_from(
            "ami-1".to_string(), "t3.medium".to_string(), "aki-1".to_string(), "key".to_string(),
            vec![], volumes,
        );
        let config = LaunchConfig {
            image_id: "ami-1".to_string(),
            instance_type: "t3.medium".to_string(),
            kernel_id: "aki-1".to_string(),
            key_name: "key".to_string(),
            iam_instance_profile: None,
            security_groups: vec![],
            user_data: b"x".to_vec(),
            block_device_mappings: BTreeMap::new(),
        };
        let result = diff(&instance, &config, b"x");
        prop_assert!(!result.iter().any(|tag| tag.starts_with("DeviceName:") || tag.contains("BlockDeviceMappings")));
    }
}
