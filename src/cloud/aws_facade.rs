//! Live `CloudFacade` implementation against `aws-sdk-autoscaling` and
//! `aws-sdk-ec2`.
//!
//! Every public method goes through [`retry`] so throttling is retried
//! without the caller having to think about it; every other error is
//! classified once (via [`super::is_throttling_error`]) and propagated
//! immediately.

use super::is_throttling_error;
use super::types::{AsgHandle, BlockDeviceMapping, InstanceSnapshot, LaunchConfig};
use super::CloudFacade;
use crate::error::{ConfigError, Result, RollerError};
use crate::retry::{ExponentialBackoffPolicy, RetryPolicy};
use async_trait::async_trait;
use aws_sdk_ec2::error::ProvideErrorMetadata;
use aws_sdk_ec2::primitives::DateTime as SmithyDateTime;
use aws_sdk_ec2::types::InstanceAttributeName;
use chrono::{DateTime, Utc};
use futures::stream::StreamExt;
use std::collections::BTreeMap;

/// Live façade backed by real AWS clients.
pub struct AwsFacade {
    autoscaling: aws_sdk_autoscaling::Client,
    ec2: aws_sdk_ec2::Client,
    retry: ExponentialBackoffPolicy,
}

impl AwsFacade {
    /// Build a façade from a loaded SDK config (typically
    /// `aws_config::load_defaults(BehaviorVersion::latest())`).
    pub fn new(sdk_config: &aws_config::SdkConfig) -> Self {
        Self {
            autoscaling: aws_sdk_autoscaling::Client::new(sdk_config),
            ec2: aws_sdk_ec2::Client::new(sdk_config),
            retry: ExponentialBackoffPolicy::for_throttling(),
        }
    }
}

/// Classify a raw SDK error message into the one retryable and one
/// non-retryable façade error variant.
fn classify(operation: &str, message: impl Into<String>) -> RollerError {
    let message = message.into();
    if is_throttling_error(&message) {
        RollerError::CloudProvider {
            provider: "aws".to_string(),
            message: format!("{operation}: {message}"),
            source: None,
        }
    } else {
        RollerError::Aws(format!("{operation}: {message}"))
    }
}

fn smithy_to_chrono(dt: &SmithyDateTime) -> DateTime<Utc> {
    DateTime::from_timestamp(dt.secs(), dt.subsec_nanos())
        .unwrap_or_else(|| DateTime::from_timestamp(0, 0).expect("epoch is valid"))
}

#[async_trait]
impl CloudFacade for AwsFacade {
    async fn list_groups(&self) -> Result<Vec<AsgHandle>> {
        self.retry
            .execute_with_retry(|| async {
                let mut stream = self
                    .autoscaling
                    .describe_auto_scaling_groups()
                    .into_paginator()
                    .items()
                    .send();

                let mut groups = Vec::new();
                while let Some(group) = stream.next().await {
                    let group = group.map_err(|e| classify("describe_auto_scaling_groups", e.to_string()))?;
                    groups.push(AsgHandle {
                        name: group.auto_scaling_group_name().unwrap_or_default().to_string(),
                        desired_capacity: group.desired_capacity().unwrap_or(0).max(0) as u32,
                        launch_config_name: group
                            .launch_configuration_name()
                            .unwrap_or_default()
                            .to_string(),
                    });
                }
                Ok(groups)
            })
            .await
    }

    async fn find_groups(&self, pattern: &str) -> Result<Vec<AsgHandle>> {
        // Not anchored here — the controller is the one that anchors.
        let re = regex::Regex::new(pattern)
            .map_err(|e| RollerError::Aws(format!("invalid group selector pattern: {e}")))?;

        let groups = self.list_groups().await?;
        Ok(groups
            .into_iter()
            .filter(|g| re.is_match(&g.name))
            .collect())
    }

    async fn describe_launch_config(&self, name: &str) -> Result<LaunchConfig> {
        self.retry
            .execute_with_retry(|| async {
                let output = self
                    .autoscaling
                    .describe_launch_configurations()
                    .launch_configuration_names(name)
                    .send()
                    .await
                    .map_err(|e| classify("describe_launch_configurations", e.to_string()))?;

                let config = output
                    .launch_configurations()
                    .first()
                    .ok_or_else(|| RollerError::Aws(format!("no launch configuration named {name}")))?;

                let image_id = config
                    .image_id()
                    .ok_or_else(|| ConfigError::MissingField("ImageId".to_string()))?;
                let instance_type = config
                    .instance_type()
                    .ok_or_else(|| ConfigError::MissingField("InstanceType".to_string()))?;
                let kernel_id = config
                    .kernel_id()
                    .ok_or_else(|| ConfigError::MissingField("KernelId".to_string()))?;
                let key_name = config
                    .key_name()
                    .ok_or_else(|| ConfigError::MissingField("KeyName".to_string()))?;

                let mut block_device_mappings = BTreeMap::new();
                for mapping in config.block_device_mappings() {
                    let Some(device_name) = mapping.device_name() else {
                        continue;
                    };
                    if let Some(ebs) = mapping.ebs() {
                        block_device_mappings.insert(
                            device_name.to_string(),
                            BlockDeviceMapping {
                                volume_type: ebs.volume_type().unwrap_or_default().to_string(),
                                volume_size: ebs.volume_size().unwrap_or(0),
                                delete_on_termination: ebs.delete_on_termination().unwrap_or(false),
                            },
                        );
                    }
                }

                let user_data = config
                    .user_data()
                    .map(|encoded| {
                        base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
                            .unwrap_or_else(|_| encoded.as_bytes().to_vec())
                    })
                    .unwrap_or_default();

                Ok(LaunchConfig {
                    image_id: image_id.to_string(),
                    instance_type: instance_type.to_string(),
                    kernel_id: kernel_id.to_string(),
                    key_name: key_name.to_string(),
                    iam_instance_profile: config.iam_instance_profile().map(str::to_string),
                    security_groups: config.security_groups().to_vec(),
                    user_data,
                    block_device_mappings,
                })
            })
            .await
    }

    async fn list_instances(&self, group_name: &str) -> Result<Vec<InstanceSnapshot>> {
        self.retry
            .execute_with_retry(|| async {
                let filters = vec![
                    aws_sdk_ec2::types::Filter::builder()
                        .name("instance-state-name")
                        .values("running")
                        .build(),
                    aws_sdk_ec2::types::Filter::builder()
                        .name("tag:aws:autoscaling:groupName")
                        .values(group_name)
                        .build(),
                ];

                let mut stream = self
                    .ec2
                    .describe_instances()
                    .set_filters(Some(filters))
                    .into_paginator()
                    .send();

                let mut snapshots = Vec::new();
                while let Some(page) = stream.next().await {
                    let page = page.map_err(|e| classify("describe_instances", e.to_string()))?;
                    for reservation in page.reservations() {
                        for instance in reservation.instances() {
                            let Some(id) = instance.instance_id() else {
                                continue;
                            };

                            let security_groups = instance
                                .security_groups()
                                .iter()
                                .filter_map(|sg| sg.group_id())
                                .map(str::to_string)
                                .collect();

                            let mut volumes = BTreeMap::new();
                            for mapping in instance.block_device_mappings() {
                                let (Some(device_name), Some(ebs)) =
                                    (mapping.device_name(), mapping.ebs())
                                else {
                                    continue;
                                };
                                volumes.insert(
                                    device_name.to_string(),
                                    BlockDeviceMapping {
                                        // Volume type and size live on the Volume
                                        // record, not the instance's mapping;
                                        // describe_volumes fills these in.
                                        volume_type: String::new(),
                                        volume_size: 0,
                                        delete_on_termination: ebs.delete_on_termination().unwrap_or(false),
                                    },
                                );
                            }

                            snapshots.push(InstanceSnapshot {
                                id: id.to_string(),
                                private_address: instance
                                    .private_ip_address()
                                    .unwrap_or_default()
                                    .to_string(),
                                launch_time: instance
                                    .launch_time()
                                    .map(smithy_to_chrono)
                                    .unwrap_or_else(|| DateTime::from_timestamp(0, 0).unwrap()),
                                image_id: instance.image_id().unwrap_or_default().to_string(),
                                instance_type: instance
                                    .instance_type()
                                    .map(|t| t.as_str().to_string())
                                    .unwrap_or_default(),
                                kernel_id: instance.kernel_id().unwrap_or_default().to_string(),
                                key_name: instance.key_name().unwrap_or_default().to_string(),
                                iam_instance_profile: instance
                                    .iam_instance_profile()
                                    .and_then(|p| p.arn())
                                    .map(str::to_string),
                                security_groups,
                                volumes,
                            });
                        }
                    }
                }
                Ok(snapshots)
            })
            .await
    }

    async fn describe_volumes(
        &self,
        instance: &InstanceSnapshot,
    ) -> Result<BTreeMap<String, BlockDeviceMapping>> {
        // Re-fetch the raw instance to get EBS volume ids; the cached
        // InstanceSnapshot doesn't retain them once device names are
        // resolved. A single describe_instances call by id is cheap and
        // keeps this method self-contained.
        let volume_ids: Vec<String> = self
            .retry
            .execute_with_retry(|| async {
                let output = self
                    .ec2
                    .describe_instances()
                    .instance_ids(instance.id.clone())
                    .send()
                    .await
                    .map_err(|e| classify("describe_instances", e.to_string()))?;

                Ok(output
                    .reservations()
                    .iter()
                    .flat_map(|r| r.instances())
                    .flat_map(|i| i.block_device_mappings())
                    .filter_map(|m| m.ebs())
                    .filter_map(|ebs| ebs.volume_id())
                    .map(str::to_string)
                    .collect())
            })
            .await?;

        if volume_ids.is_empty() {
            return Ok(BTreeMap::new());
        }

        self.retry
            .execute_with_retry(|| async {
                let output = self
                    .ec2
                    .describe_volumes()
                    .set_volume_ids(Some(volume_ids.clone()))
                    .send()
                    .await
                    .map_err(|e| classify("describe_volumes", e.to_string()))?;

                let mut volumes = BTreeMap::new();
                for volume in output.volumes() {
                    let Some(attachment) = volume.attachments().first() else {
                        continue;
                    };
                    let Some(device) = attachment.device() else {
                        continue;
                    };
                    volumes.insert(
                        device.to_string(),
                        BlockDeviceMapping {
                            volume_type: volume
                                .volume_type()
                                .map(|t| t.as_str().to_string())
                                .unwrap_or_default(),
                            volume_size: volume.size().unwrap_or(0),
                            delete_on_termination: attachment.delete_on_termination().unwrap_or(false),
                        },
                    );
                }
                Ok(volumes)
            })
            .await
    }

    async fn get_user_data(&self, instance_id: &str) -> Result<Vec<u8>> {
        self.retry
            .execute_with_retry(|| async {
                let output = self
                    .ec2
                    .describe_instance_attribute()
                    .instance_id(instance_id)
                    .attribute(InstanceAttributeName::UserData)
                    .send()
                    .await
                    .map_err(|e| classify("describe_instance_attribute", e.to_string()))?;

                let encoded = output
                    .user_data()
                    .and_then(|v| v.value())
                    .unwrap_or_default();

                Ok(base64::Engine::decode(&base64::engine::general_purpose::STANDARD, encoded)
                    .unwrap_or_else(|_| encoded.as_bytes().to_vec()))
            })
            .await
    }

    async fn terminate(&self, instance_id: &str, dry_run: bool) -> Result<()> {
        self.retry
            .execute_with_retry(|| async {
                let result = self
                    .ec2
                    .terminate_instances()
                    .instance_ids(instance_id)
                    .dry_run(dry_run)
                    .send()
                    .await;

                match result {
                    Ok(_) => Ok(()),
                    Err(e) if dry_run && e.code() == Some("DryRunOperation") => Ok(()),
                    Err(e) => Err(classify("terminate_instances", e.to_string())),
                }
            })
            .await
    }
}
