//! Error types shared by the clock, queue and scheduler.
//!
//! Everything here is `Copy` so errors can travel back from the audio thread
//! through the fault ring without allocating.

use thiserror::Error;

use crate::SampleTime;

/// Why an event was refused before it reached the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum InvalidEvent {
    /// More arguments than fit in the inline argument list
    #[error("too many arguments (max {max})")]
    TooManyArgs { max: usize },
    /// A cascaded event must land strictly after the event that scheduled it
    #[error("cascaded event at {due_time} does not come after its parent at {parent}")]
    NotAfterParent {
        due_time: SampleTime,
        parent: SampleTime,
    },
}

/// Errors reported synchronously to callers of the scheduling API
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum SchedulerError {
    #[error("tempo must be a positive, finite bpm value (got {0})")]
    InvalidTempo(f64),
    #[error("invalid event: {0}")]
    InvalidEvent(#[from] InvalidEvent),
    /// A bounded structure is at capacity; the event was not taken
    #[error("event queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },
}

/// Errors building an engine from its configuration
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ConfigError {
    #[error("sample rate must be non-zero")]
    ZeroSampleRate,
    #[error("block size must be between 1 and {max} frames (got {got})")]
    BlockSize { got: usize, max: usize },
    #[error("queue and fault capacities must be non-zero")]
    ZeroCapacity,
    #[error("tempo must be a positive, finite bpm value (got {0})")]
    InvalidTempo(f64),
}

/// Failure returned by a scheduled action
#[derive(Debug, Clone, Copy, PartialEq, Error)]
pub enum ActionError {
    #[error("action failed: {0}")]
    Failed(&'static str),
    #[error(transparent)]
    Schedule(#[from] SchedulerError),
}
