//! Unit tests for matching a task to its container by label.

use std::collections::HashMap;

use skipper::models::container::{find_task_container, ContainerSummary};

const LABEL: &str = "com.amazonaws.ecs.task-arn";

fn container(id: &str, task_arn: Option<&str>) -> ContainerSummary {
    let mut labels = HashMap::from([("other".to_owned(), "value".to_owned())]);
    if let Some(arn) = task_arn {
        labels.insert(LABEL.to_owned(), arn.to_owned());
    }
    ContainerSummary {
        id: id.to_owned(),
        labels,
    }
}

#[test]
fn finds_container_with_matching_label() {
    let containers = vec![
        container("agent", None),
        container("c1", Some("arn:task/1")),
        container("c2", Some("arn:task/2")),
    ];
    let found = find_task_container(&containers, LABEL, "arn:task/2").expect("match");
    assert_eq!(found.id, "c2");
}

#[test]
fn returns_none_without_a_match() {
    let containers = vec![container("agent", None), container("c1", Some("arn:task/1"))];
    assert!(find_task_container(&containers, LABEL, "arn:task/9").is_none());
}

#[test]
fn label_value_must_match_exactly() {
    let containers = vec![container("c1", Some("arn:task/10"))];
    assert!(find_task_container(&containers, LABEL, "arn:task/1").is_none());
}

#[test]
fn uses_the_configured_label_key() {
    let containers = vec![container("c1", Some("arn:task/1"))];
    assert!(find_task_container(&containers, "task", "arn:task/1").is_none());
}
