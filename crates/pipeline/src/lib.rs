//! Concurrent execution of generation jobs.
//!
//! [`BatchDispatcher`] fans a batch of jobs out over a bounded pool of
//! [`GenerationWorker`]s and reports progress through a [`BatchHandle`].

pub mod dispatcher;
pub mod handle;
pub mod worker;

pub use dispatcher::{BatchDispatcher, DEFAULT_CONCURRENCY, MAX_CONCURRENCY};
pub use handle::{BatchHandle, EventStream};
pub use worker::GenerationWorker;
