//! Event publishing adapters.
//!
//! - `TracingEventPublisher` - emits lifecycle events into the structured
//!   log pipeline consumed by downstream workers

mod tracing_publisher;

pub use tracing_publisher::TracingEventPublisher;
