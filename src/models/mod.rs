//! Domain model module declarations.

pub mod cluster;
pub mod compute;
pub mod container;
pub mod session;
