//! Invoking-user identity and the names derived from it.
//!
//! The keypair name doubles as the ownership tag: debug tasks are started
//! with it as `startedBy`, debug instances are launched with it as their key
//! name, and teardown compares against it before terminating anything.

use std::env;

use crate::{AppError, Result};

/// Prefix shared by every derived name.
const NAME_PREFIX: &str = "skipper";

/// The identity on whose behalf resources are created and destroyed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    user: String,
}

impl Identity {
    /// Build an identity for an explicit user name.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the name is empty or contains
    /// whitespace or path separators.
    pub fn new(user: impl Into<String>) -> Result<Self> {
        let user = user.into();
        if user.is_empty() || user.chars().any(|c| c.is_whitespace() || c == '/') {
            return Err(AppError::Config(format!("invalid user name '{user}'")));
        }
        Ok(Self { user })
    }

    /// Resolve the identity from the `USER` environment variable.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if `USER` is unset or invalid.
    pub fn from_env() -> Result<Self> {
        let user = env::var("USER")
            .map_err(|_| AppError::Config("USER environment variable is not set".into()))?;
        Self::new(user)
    }

    /// User name this identity was built from.
    #[must_use]
    pub fn user(&self) -> &str {
        &self.user
    }

    /// Keypair name owned by this identity; also the ownership tag.
    #[must_use]
    pub fn keypair_name(&self) -> String {
        format!("{NAME_PREFIX}-{}", self.user)
    }

    /// Identifier for a debug copy of `task_definition`.
    ///
    /// Only the `family:revision` part of a definition ARN is used so the
    /// result stays readable as an instance `Name` tag.
    #[must_use]
    pub fn session_identifier(&self, task_definition: &str) -> String {
        format!(
            "{NAME_PREFIX}-{}-{}",
            self.user,
            short_name(task_definition)
        )
    }

    /// Whether a resource carrying `key_name` belongs to this identity.
    #[must_use]
    pub fn owns_key(&self, key_name: Option<&str>) -> bool {
        key_name == Some(self.keypair_name().as_str())
    }
}

/// Last path segment of an ARN-like identifier.
#[must_use]
pub fn short_name(arn: &str) -> &str {
    arn.rsplit('/').next().unwrap_or(arn)
}
