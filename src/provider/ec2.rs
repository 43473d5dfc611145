//! [`ComputeApi`] backed by `aws ec2`.

use std::collections::HashMap;

use futures_util::future::BoxFuture;
use serde::Deserialize;
use tracing::info;

use crate::models::compute::{ComputeInstance, InstanceStatus, LaunchSpec};
use crate::provider::aws_cli::{arg, AwsCli, KEYPAIR_NOT_FOUND};
use crate::provider::ComputeApi;
use crate::{AppError, Result};

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CreateKeyPairOutput {
    key_material: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeKeyPairsOutput {
    #[serde(default)]
    key_pairs: Vec<KeyPairEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct KeyPairEntry {
    key_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeInstancesOutput {
    #[serde(default)]
    reservations: Vec<Reservation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Reservation {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RunInstancesOutput {
    #[serde(default)]
    instances: Vec<Ec2Instance>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Ec2Instance {
    instance_id: String,
    key_name: Option<String>,
    private_ip_address: Option<String>,
    #[serde(default)]
    tags: Vec<Tag>,
    state: Option<InstanceState>,
    image_id: Option<String>,
    subnet_id: Option<String>,
    #[serde(default)]
    security_groups: Vec<GroupRef>,
    iam_instance_profile: Option<ProfileRef>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Tag {
    key: String,
    value: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct InstanceState {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct GroupRef {
    group_id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ProfileRef {
    arn: String,
}

impl From<Ec2Instance> for ComputeInstance {
    fn from(raw: Ec2Instance) -> Self {
        Self {
            id: raw.instance_id,
            key_name: raw.key_name,
            private_address: raw.private_ip_address,
            tags: raw
                .tags
                .into_iter()
                .map(|tag| (tag.key, tag.value))
                .collect::<HashMap<_, _>>(),
            status: raw
                .state
                .map_or(InstanceStatus::Unknown, |state| {
                    InstanceStatus::from_provider(&state.name)
                }),
            image_id: raw.image_id,
            subnet_id: raw.subnet_id,
            security_group_ids: raw
                .security_groups
                .into_iter()
                .map(|group| group.group_id)
                .collect(),
            iam_instance_profile: raw.iam_instance_profile.map(|profile| profile.arn),
        }
    }
}

/// Compute adapter driving `aws ec2`.
#[derive(Debug, Clone)]
pub struct AwsCompute {
    cli: AwsCli,
}

impl AwsCompute {
    /// Wrap a CLI runner.
    #[must_use]
    pub fn new(cli: AwsCli) -> Self {
        Self { cli }
    }

    async fn describe(&self, instance_id: &str) -> Result<ComputeInstance> {
        let out: DescribeInstancesOutput = self
            .cli
            .call(
                "ec2",
                "describe-instances",
                &arg("--instance-ids", instance_id),
            )
            .await?;

        let mut instances: Vec<Ec2Instance> = out
            .reservations
            .into_iter()
            .flat_map(|reservation| reservation.instances)
            .collect();

        if instances.len() != 1 {
            return Err(AppError::Provider(format!(
                "expected one instance for {instance_id}, found {}",
                instances.len()
            )));
        }
        Ok(instances.remove(0).into())
    }
}

impl ComputeApi for AwsCompute {
    fn create_keypair<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let out: CreateKeyPairOutput = self
                .cli
                .call("ec2", "create-key-pair", &arg("--key-name", name))
                .await?;
            Ok(out.key_material)
        })
    }

    fn keypair_exists<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<bool>> {
        Box::pin(async move {
            let result: Result<DescribeKeyPairsOutput> = self
                .cli
                .call("ec2", "describe-key-pairs", &arg("--key-names", name))
                .await;
            match result {
                Ok(out) => Ok(out.key_pairs.iter().any(|pair| pair.key_name == name)),
                Err(AppError::Provider(msg)) if msg.contains(KEYPAIR_NOT_FOUND) => Ok(false),
                Err(err) => Err(err),
            }
        })
    }

    fn delete_keypair<'a>(&'a self, name: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.cli
                .call_unit("ec2", "delete-key-pair", &arg("--key-name", name))
                .await
        })
    }

    fn launch_instance<'a>(
        &'a self,
        spec: &'a LaunchSpec,
    ) -> BoxFuture<'a, Result<String>> {
        Box::pin(async move {
            let tags = serde_json::json!([{
                "ResourceType": "instance",
                "Tags": [{ "Key": "Name", "Value": spec.name_tag }],
            }]);

            let mut args: Vec<String> = Vec::new();
            args.extend(arg("--image-id", spec.image_id.as_str()));
            args.extend(arg("--instance-type", spec.instance_type.as_str()));
            args.extend(arg("--key-name", spec.key_name.as_str()));
            args.extend(arg("--subnet-id", spec.subnet_id.as_str()));
            args.extend(arg(
                "--iam-instance-profile",
                format!("Arn={}", spec.iam_instance_profile),
            ));
            args.extend(arg("--user-data", spec.user_data.as_str()));
            args.extend(arg("--min-count", "1"));
            args.extend(arg("--max-count", "1"));
            args.extend(arg("--tag-specifications", tags.to_string()));
            if !spec.security_group_ids.is_empty() {
                args.push("--security-group-ids".into());
                args.extend(spec.security_group_ids.iter().cloned());
            }

            let out: RunInstancesOutput = self.cli.call("ec2", "run-instances", &args).await?;
            let instance_id = out
                .instances
                .into_iter()
                .next()
                .map(|instance| instance.instance_id)
                .ok_or_else(|| AppError::Provider("run-instances returned no instance".into()))?;
            info!(instance_id, name = spec.name_tag, "created instance");
            Ok(instance_id)
        })
    }

    fn wait_instance_running<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<ComputeInstance>> {
        Box::pin(async move {
            info!(instance_id, "waiting until the instance is running");
            self.cli
                .call_unit(
                    "ec2",
                    "wait instance-running",
                    &arg("--instance-ids", instance_id),
                )
                .await?;
            self.describe(instance_id).await
        })
    }

    fn terminate_instance<'a>(&'a self, instance_id: &'a str) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            self.cli
                .call_unit(
                    "ec2",
                    "terminate-instances",
                    &arg("--instance-ids", instance_id),
                )
                .await
        })
    }

    fn describe_instance<'a>(
        &'a self,
        instance_id: &'a str,
    ) -> BoxFuture<'a, Result<ComputeInstance>> {
        Box::pin(self.describe(instance_id))
    }
}
