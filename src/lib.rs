//! Streaming component generation with completeness checks and
//! continuation/rewrite retries.

pub mod cli;
pub mod config;
pub mod controller;
pub mod errors;
pub mod log;
pub mod prompt;
pub mod provider;
pub mod stream;
pub mod ux;
pub mod validate;
pub mod wire;
