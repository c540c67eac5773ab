//! Convergence controller.
//!
//! The core control loop: wait for the group to reach full, ready capacity,
//! diff every running instance against the launch configuration, terminate
//! the single oldest drifted instance, repeat until no drift remains.
//!
//! Exhausting the wait phase returns a `RollerError::WaitTimeout` rather
//! than exiting the process directly, leaving that decision to the
//! binary's `main`.

use crate::cloud::CloudFacade;
use crate::comparator;
use crate::error::{Result, RollerError};
use crate::prober::ReadinessProber;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Parameters for one convergence run (CLI surface, minus the selector
/// which is resolved separately).
#[derive(Debug, Clone)]
pub struct ConvergeOptions {
    pub dry_run: bool,
    pub max_wait_attempts: u32,
    pub poll_interval: Duration,
}

impl Default for ConvergeOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            max_wait_attempts: 40,
            poll_interval: Duration::from_secs(30),
        }
    }
}

/// States of the `wait_for_full_group` machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WaitState {
    Counting,
    ReadinessProbing,
    Ready,
    Failed,
}

pub struct Controller<C: CloudFacade, P: ReadinessProber> {
    cloud: C,
    prober: P,
    options: ConvergeOptions,
}

impl<C: CloudFacade, P: ReadinessProber> Controller<C, P> {
    pub fn new(cloud: C, prober: P, options: ConvergeOptions) -> Self {
        Self { cloud, prober, options }
    }

    /// Resolve a group-name selector to exactly one group. Anchors the
    /// pattern at the start.
    async fn resolve_group(&self, selector: &str) -> Result<crate::cloud::AsgHandle> {
        let pattern = format!("^{selector}");
        let mut matches = self.cloud.find_groups(&pattern).await?;
        if matches.len() != 1 {
            return Err(RollerError::GroupSelector {
                pattern,
                matches: matches.len(),
            });
        }
        Ok(matches.remove(0))
    }

    /// Run one full convergence pass for the group matching `selector`.
    pub async fn converge(&self, selector: &str) -> Result<()> {
        let group = self.resolve_group(selector).await?;
        info!(group = %group.name, "resolved auto-scaling group");

        let config = self.cloud.describe_launch_config(&group.launch_config_name).await?;
        let desired = group.desired_capacity;

        loop {
            self.wait_for_full_group(&group.name, desired).await?;

            let candidates = self.candidates(&group.name, &config).await?;
            if candidates.is_empty() {
                info!(group = %group.name, "no drift found, convergence complete");
                return Ok(());
            }

            info!(
                group = %group.name,
                count = candidates.len(),
                "found instances that do not match the configuration"
            );

            let victim = get_oldest_instance(&candidates)
                .expect("candidates is non-empty, checked above");
            info!(instance = %victim.id, "terminating drifted instance");
            self.cloud.terminate(&victim.id, self.options.dry_run).await?;
        }
    }

    /// Block until `desired` running instances exist and every one of them
    /// reports ready.
    async fn wait_for_full_group(&self, group_name: &str, desired: u32) -> Result<()> {
        let mut attempt: u32 = 0;
        let mut state = WaitState::Counting;
        let mut instances = self.cloud.list_instances(group_name).await?;

        loop {
            if attempt >= self.options.max_wait_attempts {
                state = WaitState::Failed;
            }

            match state {
                WaitState::Counting => {
                    if (instances.len() as u32) < desired {
                        debug!(
                            got = instances.len(),
                            desired, attempt, max = self.options.max_wait_attempts,
                            "waiting for instances to boot"
                        );
                    } else {
                        state = WaitState::ReadinessProbing;
                        continue;
                    }
                }
                WaitState::ReadinessProbing => {
                    let mut all_ready = true;
                    for instance in &instances {
                        if !self.prober.is_ready(&instance.private_address).await {
                            all_ready = false;
                            break;
                        }
                    }
                    if all_ready {
                        state = WaitState::Ready;
                        continue;
                    }
                    debug!(attempt, max = self.options.max_wait_attempts, "waiting for cloud-init to finish");
                }
                WaitState::Ready => {
                    info!(group = group_name, "all instances booted and ready");
                    return Ok(());
                }
                WaitState::Failed => {
                    warn!(attempts = attempt, "wait phase exhausted attempts");
                    return Err(RollerError::WaitTimeout { attempts: attempt });
                }
            }

            tokio::time::sleep(self.options.poll_interval).await;
            attempt += 1;
            instances = self.cloud.list_instances(group_name).await?;
            state = WaitState::Counting;
        }
    }

    /// Build the candidate set: instances whose diff against `config` is
    /// non-empty.
    async fn candidates(
        &self,
        group_name: &str,
        config: &crate::cloud::LaunchConfig,
    ) -> Result<Vec<crate::cloud::InstanceSnapshot>> {
        let mut instances = self.cloud.list_instances(group_name).await?;
        for instance in &mut instances {
            instance.volumes = self.cloud.describe_volumes(instance).await?;
        }

        let mut out = Vec::new();
        for instance in instances {
            let user_data = self.cloud.get_user_data(&instance.id).await?;
            let diff = comparator::diff(&instance, config, &user_data);
            if !diff.is_empty() {
                debug!(instance = %instance.id, ?diff, "instance drifted from configuration");
                out.push(instance);
            }
        }
        Ok(out)
    }
}

/// Oldest instance by `launch_time`, ties broken on `id`.
fn get_oldest_instance(
    instances: &[crate::cloud::InstanceSnapshot],
) -> Option<&crate::cloud::InstanceSnapshot> {
    instances.iter().min_by(|a, b| (a.launch_time, &a.id).cmp(&(b.launch_time, &b.id)))
}
