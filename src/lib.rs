#![forbid(unsafe_code)]

pub mod config;
pub mod errors;
pub mod exec;
pub mod identity;
pub mod keystore;
pub mod models;
pub mod orchestrator;
pub mod prompt;
pub mod provider;
pub mod provision;
pub mod terminal;
pub mod tunnel;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
