//! Infrastructure adapters and runtime bootstrap.

pub mod db;
pub mod error;
pub mod files;
pub(crate) mod lock;
pub mod memory;
pub mod telemetry;
