//! Content pipeline core.
//!
//! Keyed TTL caches with hit accounting, a persisted per-service rate limiter, exact and
//! near-duplicate screening, and a bounded generation cycle that isolates per-item
//! failures. External services are reached through the traits in
//! [`application::collaborators`]; state lives in SQLite or in memory.

pub mod application;
pub mod cache;
pub mod config;
pub mod domain;
pub mod infra;
