//! Compute instance and keypair models.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Provider-reported lifecycle of an instance.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum InstanceStatus {
    /// Launched but not yet running.
    Pending,
    /// Running and reachable.
    Running,
    /// Shutting down or stopped.
    Stopping,
    /// Terminated; no longer billable.
    Terminated,
    /// Any state not modelled above.
    Unknown,
}

impl InstanceStatus {
    /// Map a provider state name onto the model.
    #[must_use]
    pub fn from_provider(state: &str) -> Self {
        match state {
            "pending" => Self::Pending,
            "running" => Self::Running,
            "shutting-down" | "stopping" | "stopped" => Self::Stopping,
            "terminated" => Self::Terminated,
            _ => Self::Unknown,
        }
    }
}

/// An ephemeral compute node, or the live host a debug copy is cloned from.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ComputeInstance {
    /// Provider instance identifier.
    pub id: String,
    /// Keypair the instance was launched with.
    pub key_name: Option<String>,
    /// Private network address used by the tunnel.
    pub private_address: Option<String>,
    /// Provider tags, including `Name`.
    pub tags: HashMap<String, String>,
    /// Current status.
    pub status: InstanceStatus,
    /// Image the instance was launched from.
    pub image_id: Option<String>,
    /// Subnet the instance lives in.
    pub subnet_id: Option<String>,
    /// Attached security groups.
    pub security_group_ids: Vec<String>,
    /// Attached instance profile ARN.
    pub iam_instance_profile: Option<String>,
}

impl ComputeInstance {
    /// Value of the `Name` tag, if any.
    #[must_use]
    pub fn name_tag(&self) -> Option<&str> {
        self.tags.get("Name").map(String::as_str)
    }
}

/// Everything needed to launch one debug instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    /// Image to boot.
    pub image_id: String,
    /// Instance size.
    pub instance_type: String,
    /// Keypair installed on the instance.
    pub key_name: String,
    /// Subnet to place the instance in.
    pub subnet_id: String,
    /// Security groups to attach.
    pub security_group_ids: Vec<String>,
    /// Instance profile ARN to attach.
    pub iam_instance_profile: String,
    /// Bootstrap script executed on first boot.
    pub user_data: String,
    /// Value of the `Name` tag.
    pub name_tag: String,
}

/// Where a keypair is known to exist.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeypairPresence {
    /// Known to the cloud provider.
    pub remote: bool,
    /// Private key material present on local storage.
    pub local: bool,
}

impl KeypairPresence {
    /// Both sides agree.
    #[must_use]
    pub fn is_consistent(self) -> bool {
        self.remote == self.local
    }
}
