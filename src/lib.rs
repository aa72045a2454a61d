pub mod clock; // Musical time -> sample time
pub mod driver;
pub mod duration;
pub mod engine; // Clock + scheduler attachment point
pub mod error;
pub mod event;
pub mod queue;
pub mod scheduler; // Block-accurate event dispatch

pub use clock::Clock;
pub use driver::OfflineDriver;
pub use duration::Duration;
pub use engine::{Engine, EngineConfig, EngineHandle};
pub use error::{ActionError, ConfigError, InvalidEvent, SchedulerError};
pub use event::{capture, Action, Args, CancelToken, Event, Value, MAX_ARGS};
pub use queue::EventQueue;
pub use scheduler::{
    BlockReport, Cascade, Fault, FaultKind, Scheduler, SchedulerHandle, SchedulerStats,
};

/// Sample offset on the absolute stream timeline.
pub type SampleTime = u64;

/// Upper bound on frames handed to a single render callback.
pub const MAX_BLOCK_SIZE: usize = 2048;
