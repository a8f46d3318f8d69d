//! Domain layer types and invariants.

pub mod article;
pub mod entities;
pub mod error;
pub mod types;
