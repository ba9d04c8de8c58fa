//! Job events, their delivery and progress accounting.
//!
//! Every status change of a job submission is reported as a [`JobEvent`].
//! Events reach observers through the batch's own stream and, optionally,
//! an [`EventSink`] such as the broadcast [`EventBus`] or [`TracingSink`].

pub mod bus;
pub mod event;
pub mod progress;
pub mod sink;

pub use bus::EventBus;
pub use event::{JobEvent, JobEventKind};
pub use progress::{BatchProgress, ProgressTracker};
pub use sink::{EventSink, TracingSink};
