//! Container environment edits for task definition revisions.
//!
//! Assignments are parsed strictly: a key may appear once across all
//! `--set` flags and may not be both set and unset. Conflicting input is an
//! error rather than "last one wins".

use std::collections::{BTreeMap, BTreeSet};

use serde_json::{Map, Value};

use crate::models::cluster::ContainerResources;
use crate::{AppError, Result};

/// Task definition fields accepted back by `register-task-definition`.
const REGISTRABLE_FIELDS: &[&str] = &[
    "family",
    "taskRoleArn",
    "executionRoleArn",
    "networkMode",
    "containerDefinitions",
    "volumes",
    "placementConstraints",
    "requiresCompatibilities",
    "cpu",
    "memory",
    "pidMode",
    "ipcMode",
    "proxyConfiguration",
    "inferenceAccelerators",
    "ephemeralStorage",
    "runtimePlatform",
];

/// Environment variables to set or remove in every container.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvChanges {
    /// Variables to add or overwrite.
    pub set: BTreeMap<String, String>,
    /// Variables to remove.
    pub unset: BTreeSet<String>,
}

impl EnvChanges {
    /// Parse `KEY=VALUE` assignments and bare keys to unset.
    ///
    /// A `KEY` without `=` sets the variable to the empty string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` for empty keys, keys assigned twice, or
    /// keys that are both set and unset.
    pub fn parse(assignments: &[String], removals: &[String]) -> Result<Self> {
        let mut set = BTreeMap::new();
        for assignment in assignments {
            let (key, value) = assignment
                .split_once('=')
                .unwrap_or((assignment.as_str(), ""));
            let key = key.trim();
            if key.is_empty() {
                return Err(AppError::Config(format!(
                    "invalid assignment '{assignment}': empty key"
                )));
            }
            if set.insert(key.to_owned(), value.to_owned()).is_some() {
                return Err(AppError::Config(format!(
                    "environment key '{key}' assigned more than once"
                )));
            }
        }

        let mut unset = BTreeSet::new();
        for key in removals {
            let key = key.trim();
            if key.is_empty() {
                return Err(AppError::Config("cannot unset an empty key".into()));
            }
            if set.contains_key(key) {
                return Err(AppError::Config(format!(
                    "environment key '{key}' is both set and unset"
                )));
            }
            unset.insert(key.to_owned());
        }

        Ok(Self { set, unset })
    }

    /// Nothing to change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.set.is_empty() && self.unset.is_empty()
    }
}

/// Apply `changes` to one container definition's `environment` array.
///
/// Returns whether anything changed.
pub fn apply_to_container(container: &mut Value, changes: &EnvChanges) -> bool {
    let Some(obj) = container.as_object_mut() else {
        return false;
    };

    let current: Vec<Value> = obj
        .get("environment")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let mut pending = changes.set.clone();
    let mut changed = false;
    let mut next = Vec::with_capacity(current.len() + pending.len());

    for entry in current {
        let name = entry.get("name").and_then(Value::as_str).map(str::to_owned);
        let Some(name) = name else {
            next.push(entry);
            continue;
        };

        if changes.unset.contains(&name) {
            changed = true;
            continue;
        }

        if let Some(value) = pending.remove(&name) {
            let old = entry.get("value").and_then(Value::as_str);
            if old != Some(value.as_str()) {
                changed = true;
            }
            next.push(env_entry(&name, &value));
        } else {
            next.push(entry);
        }
    }

    for (name, value) in pending {
        changed = true;
        next.push(env_entry(&name, &value));
    }

    obj.insert("environment".into(), Value::Array(next));
    changed
}

/// Build a `register-task-definition` input from a described definition.
///
/// Returns the input and whether any container changed.
///
/// # Errors
///
/// Returns `AppError::Provider` if the definition has no container list.
pub fn registration_input(task_definition: &Value, changes: &EnvChanges) -> Result<(Value, bool)> {
    let source = task_definition
        .as_object()
        .ok_or_else(|| AppError::Provider("task definition is not an object".into()))?;

    let mut input = Map::new();
    for field in REGISTRABLE_FIELDS {
        if let Some(value) = source.get(*field) {
            if !value.is_null() {
                input.insert((*field).to_owned(), value.clone());
            }
        }
    }

    let containers = input
        .get_mut("containerDefinitions")
        .and_then(Value::as_array_mut)
        .ok_or_else(|| AppError::Provider("task definition has no containerDefinitions".into()))?;

    let mut changed = false;
    for container in containers.iter_mut() {
        changed |= apply_to_container(container, changes);
    }

    Ok((Value::Object(input), changed))
}

/// CPU and memory settings of every container in a described definition.
#[must_use]
pub fn container_resources(task_definition: &Value) -> Vec<ContainerResources> {
    task_definition
        .get("containerDefinitions")
        .and_then(Value::as_array)
        .map(|containers| {
            containers
                .iter()
                .map(|container| ContainerResources {
                    name: container
                        .get("name")
                        .and_then(Value::as_str)
                        .unwrap_or_default()
                        .to_owned(),
                    cpu: container.get("cpu").and_then(Value::as_i64).unwrap_or(0),
                    memory_reservation: container
                        .get("memoryReservation")
                        .and_then(Value::as_i64),
                    memory: container.get("memory").and_then(Value::as_i64),
                })
                .collect()
        })
        .unwrap_or_default()
}

fn env_entry(name: &str, value: &str) -> Value {
    serde_json::json!({ "name": name, "value": value })
}
