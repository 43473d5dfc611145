//! Remote container model as seen through the control socket.

use std::collections::HashMap;

/// A running container on the debug host.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerSummary {
    /// Runtime container id.
    pub id: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
}

/// Pick the container whose `label` equals `task_arn`.
#[must_use]
pub fn find_task_container<'a>(
    containers: &'a [ContainerSummary],
    label: &str,
    task_arn: &str,
) -> Option<&'a ContainerSummary> {
    containers
        .iter()
        .find(|container| container.labels.get(label).map(String::as_str) == Some(task_arn))
}
