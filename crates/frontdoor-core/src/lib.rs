//! Shared plumbing: tracing setup and condition polling.

pub mod tracing;
pub mod wait;

pub use tracing::{TracingConfig, TracingError, TracingOutputFormat, init_tracing};
pub use wait::{WaitOptions, wait_for};
