//! Thin runner for the `aws` command line.
//!
//! Every call runs `aws <service> <operation> <args> --output json` as a
//! child process, parses stdout as JSON, and turns a non-zero exit into an
//! [`AppError::Provider`] carrying the trimmed stderr.

use std::process::Stdio;

use serde::de::DeserializeOwned;
use tokio::process::Command;
use tracing::{debug, info_span, Instrument};

use crate::config::AwsConfig;
use crate::{AppError, Result};

/// Error code the CLI reports for an unknown keypair.
pub const KEYPAIR_NOT_FOUND: &str = "InvalidKeyPair.NotFound";

/// Shared invocation settings for all provider adapters.
#[derive(Debug, Clone)]
pub struct AwsCli {
    program: String,
    profile: Option<String>,
    region: Option<String>,
}

impl AwsCli {
    /// Build a runner from configuration.
    #[must_use]
    pub fn new(config: &AwsConfig) -> Self {
        Self {
            program: config.cli.clone(),
            profile: config.profile.clone(),
            region: config.region.clone(),
        }
    }

    /// Run an operation and deserialize its JSON output.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` if the process cannot be started, exits
    /// non-zero, or prints something that is not the expected JSON.
    pub async fn call<T: DeserializeOwned>(
        &self,
        service: &str,
        operation: &str,
        args: &[String],
    ) -> Result<T> {
        let stdout = self.run(service, operation, args).await?;
        let text = if stdout.trim().is_empty() { "{}" } else { stdout.as_str() };
        serde_json::from_str(text).map_err(|err| {
            AppError::Provider(format!("{service} {operation}: unexpected output: {err}"))
        })
    }

    /// Run an operation whose output is not needed (waiters, deletes).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Provider` if the process fails.
    pub async fn call_unit(&self, service: &str, operation: &str, args: &[String]) -> Result<()> {
        self.run(service, operation, args).await.map(|_| ())
    }

    /// Argument vector for an invocation, without the program name.
    #[must_use]
    pub fn command_args(&self, service: &str, operation: &str, args: &[String]) -> Vec<String> {
        let mut out = Vec::with_capacity(args.len() + 8);
        out.push(service.to_owned());
        out.extend(operation.split_whitespace().map(str::to_owned));
        out.extend(args.iter().cloned());
        out.push("--output".into());
        out.push("json".into());
        if let Some(ref profile) = self.profile {
            out.push("--profile".into());
            out.push(profile.clone());
        }
        if let Some(ref region) = self.region {
            out.push("--region".into());
            out.push(region.clone());
        }
        out
    }

    async fn run(&self, service: &str, operation: &str, args: &[String]) -> Result<String> {
        let span = info_span!("aws", service, operation);
        async move {
            let argv = self.command_args(service, operation, args);
            debug!(?argv, "invoking aws cli");

            let output = Command::new(&self.program)
                .args(&argv)
                .stdin(Stdio::null())
                .stdout(Stdio::piped())
                .stderr(Stdio::piped())
                .kill_on_drop(true)
                .output()
                .await
                .map_err(|err| {
                    AppError::Provider(format!("failed to run {}: {err}", self.program))
                })?;

            if !output.status.success() {
                let stderr = String::from_utf8_lossy(&output.stderr);
                return Err(AppError::Provider(format!(
                    "{service} {operation}: {}",
                    stderr.trim()
                )));
            }

            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        .instrument(span)
        .await
    }
}

/// Helper for `--flag value` pairs.
pub(crate) fn arg(flag: &str, value: impl Into<String>) -> [String; 2] {
    [flag.to_owned(), value.into()]
}
