//! reqwest-backed implementations of the generation transport and the
//! result sink.

pub mod client;
pub mod download;

pub use client::{UpstreamClient, UpstreamError};
pub use download::ImageDownloader;
