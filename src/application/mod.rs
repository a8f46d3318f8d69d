//! Application services layer.

pub mod clock;
pub mod collaborators;
pub mod decode;
pub mod dedup;
pub mod error;
pub mod jobs;
pub mod originality;
pub mod pipeline;
pub mod rate_limit;
pub mod repos;
pub mod retention;
pub mod retry;
pub mod settings;
