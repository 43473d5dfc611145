//! Session and service orchestration.
//!
//! Covers the interactive debug session state machine, the remote shell
//! seam it drives, restart strategies, and service environment updates.

pub mod restart;
pub mod services;
pub mod session;
pub mod shell;
