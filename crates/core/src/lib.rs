//! Domain types and pure logic for batch image generation.
//!
//! Everything here is free of concurrency: jobs and their state machine,
//! the platform × model table, request construction, response
//! extraction, retry timing and the transport/sink traits the pipeline
//! is built against.

pub mod error;
pub mod extract;
pub mod job;
pub mod platform;
pub mod prompt;
pub mod request;
pub mod response;
pub mod retry;
pub mod transport;
pub mod types;

pub use error::{CoreError, ErrorClass, GenerationError};
pub use job::{ImageReference, Job, JobState, JobStatus};
pub use platform::{Endpoints, ImageModel, ModelTable, Platform};
pub use request::{GenerationParams, GenerationRequest, RequestBuilder};
pub use response::RawResponse;
pub use retry::RetryPolicy;
pub use transport::{ResultSink, SinkError, Transport};
pub use types::{Credential, JobId, Ticket};
