//! Job execution engine.
//!
//! The task registry and intake queue, the facade that keeps them
//! consistent, the dispatcher that pulls queued jobs onto workers under a
//! concurrency limit, and the workers that drive the frame pipeline and
//! translate its progress into registry updates and WebSocket events.

pub mod dispatcher;
pub mod events;
pub mod jobs;
pub mod progress;
pub mod queue;
pub mod registry;
pub mod worker;

#[cfg(test)]
pub(crate) mod testing;

pub use dispatcher::JobDispatcher;
pub use jobs::{Admission, JobCounts, JobEngine, JobView, QueueOverview};
pub use registry::{InMemoryRegistry, TaskRegistry};
pub use worker::Worker;
