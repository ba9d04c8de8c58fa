//! Batch worker: configuration and job loading for the `genbatch-worker`
//! binary.

pub mod config;
pub mod library;

pub use config::{ConfigError, WorkerConfig};
