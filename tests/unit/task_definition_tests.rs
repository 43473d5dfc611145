//! Unit tests for environment change parsing and task definition rewriting.

use serde_json::json;
use skipper::provider::task_definition::{
    apply_to_container, container_resources, registration_input, EnvChanges,
};
use skipper::AppError;

fn strings(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| (*s).to_owned()).collect()
}

// ── Parsing ──────────────────────────────────────────────────

#[test]
fn parses_assignments_and_removals() {
    let changes =
        EnvChanges::parse(&strings(&["A=1", "B=x=y", "EMPTY"]), &strings(&["OLD"])).unwrap();
    assert_eq!(changes.set.get("A").map(String::as_str), Some("1"));
    assert_eq!(changes.set.get("B").map(String::as_str), Some("x=y"));
    assert_eq!(changes.set.get("EMPTY").map(String::as_str), Some(""));
    assert!(changes.unset.contains("OLD"));
    assert!(!changes.is_empty());
}

#[test]
fn rejects_duplicate_assignment() {
    let err = EnvChanges::parse(&strings(&["A=1", "A=2"]), &[]).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("more than once")));
}

#[test]
fn rejects_key_both_set_and_unset() {
    let err = EnvChanges::parse(&strings(&["A=1"]), &strings(&["A"])).unwrap_err();
    assert!(matches!(err, AppError::Config(ref msg) if msg.contains("both set and unset")));
}

#[test]
fn rejects_empty_keys() {
    assert!(EnvChanges::parse(&strings(&["=1"]), &[]).is_err());
    assert!(EnvChanges::parse(&[], &strings(&[" "])).is_err());
}

#[test]
fn empty_input_is_empty() {
    assert!(EnvChanges::parse(&[], &[]).unwrap().is_empty());
}

// ── Container rewriting ──────────────────────────────────────

#[test]
fn apply_overwrites_adds_and_removes() {
    let mut container = json!({
        "name": "api",
        "environment": [
            {"name": "KEEP", "value": "k"},
            {"name": "CHANGE", "value": "old"},
            {"name": "DROP", "value": "d"}
        ]
    });
    let changes = EnvChanges::parse(&strings(&["CHANGE=new", "ADD=a"]), &strings(&["DROP"])).unwrap();

    assert!(apply_to_container(&mut container, &changes));
    assert_eq!(
        container["environment"],
        json!([
            {"name": "KEEP", "value": "k"},
            {"name": "CHANGE", "value": "new"},
            {"name": "ADD", "value": "a"}
        ])
    );
}

#[test]
fn apply_reports_no_change_for_identical_values() {
    let mut container = json!({"environment": [{"name": "A", "value": "1"}]});
    let changes = EnvChanges::parse(&strings(&["A=1"]), &strings(&["MISSING"])).unwrap();
    assert!(!apply_to_container(&mut container, &changes));
}

#[test]
fn apply_creates_environment_when_absent() {
    let mut container = json!({"name": "api"});
    let changes = EnvChanges::parse(&strings(&["A=1"]), &[]).unwrap();
    assert!(apply_to_container(&mut container, &changes));
    assert_eq!(container["environment"], json!([{"name": "A", "value": "1"}]));
}

// ── Registration input ───────────────────────────────────────

#[test]
fn registration_input_drops_read_only_fields() {
    let described = json!({
        "taskDefinitionArn": "arn:aws:ecs:eu-west-1:1:task-definition/api:7",
        "family": "api",
        "revision": 7,
        "status": "ACTIVE",
        "registeredAt": 1_700_000_000,
        "requiresAttributes": [],
        "compatibilities": ["EC2"],
        "taskRoleArn": "arn:aws:iam::1:role/api",
        "cpu": null,
        "containerDefinitions": [
            {"name": "api", "environment": []},
            {"name": "sidecar"}
        ]
    });
    let changes = EnvChanges::parse(&strings(&["A=1"]), &[]).unwrap();

    let (input, changed) = registration_input(&described, &changes).unwrap();
    assert!(changed);
    let obj = input.as_object().unwrap();
    assert!(obj.contains_key("family"));
    assert!(obj.contains_key("taskRoleArn"));
    for field in ["taskDefinitionArn", "revision", "status", "registeredAt", "compatibilities", "cpu"] {
        assert!(!obj.contains_key(field), "{field} must not be registered");
    }
    for container in input["containerDefinitions"].as_array().unwrap() {
        assert_eq!(container["environment"], json!([{"name": "A", "value": "1"}]));
    }
}

#[test]
fn registration_input_requires_containers() {
    let err = registration_input(&json!({"family": "api"}), &EnvChanges::default()).unwrap_err();
    assert!(matches!(err, AppError::Provider(_)));
}

// ── Container resources ──────────────────────────────────────

#[test]
fn reads_cpu_and_both_memory_limits_per_container() {
    let definition = json!({
        "family": "api",
        "containerDefinitions": [
            { "name": "web", "cpu": 256, "memory": 1024, "memoryReservation": 512 },
            { "name": "sidecar", "memory": 128 }
        ]
    });

    let resources = container_resources(&definition);

    assert_eq!(resources.len(), 2);
    assert_eq!(resources[0].name, "web");
    assert_eq!(resources[0].cpu, 256);
    assert_eq!(resources[0].memory_reservation, Some(512));
    assert_eq!(resources[0].memory, Some(1024));
    assert_eq!(resources[1].cpu, 0);
    assert_eq!(resources[1].memory_reservation, None);
    assert_eq!(resources[1].memory, Some(128));
}

#[test]
fn definition_without_containers_has_no_resources() {
    assert!(container_resources(&json!({ "family": "api" })).is_empty());
}
