//! Engine - the attachment point between a render driver and the scheduler
//!
//! `Engine::new` splits one configuration into two halves:
//!
//! - [`Engine`] moves into the audio callback and is advanced once per block
//! - [`EngineHandle`] stays with control code, which reads the clock and
//!   schedules events
//!
//! Both halves share the same [`Clock`]; nothing is global.
//!
//! # Example
//!
//! ```ignore
//! use saavy_sched::{Engine, EngineConfig, Value};
//!
//! let (mut engine, mut handle) = Engine::<Synth>::new(&EngineConfig::default().bpm(120.0))?;
//! let now = handle.now();
//! handle.schedule(now + handle.clock().beats(1.0), play_note, &[Value::Note(60)])?;
//!
//! // in the audio callback
//! engine.render_block(frames, &mut synth);
//! ```

use std::num::NonZeroU32;
use std::sync::Arc;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::{
    clock::{Clock, DEFAULT_TEMPO},
    error::{ConfigError, SchedulerError},
    event::{Action, CancelToken, Value},
    scheduler::{BlockReport, Fault, FaultKind, Scheduler, SchedulerHandle},
    SampleTime, MAX_BLOCK_SIZE,
};

/// Session settings, fixed once the engine is built
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    pub sample_rate: u32,
    /// Frames per render callback
    pub block_size: usize,
    /// Starting tempo in bpm
    pub tempo: f64,
    /// Pending events the scheduler can hold
    pub queue_capacity: usize,
    /// Render-thread faults buffered until control code drains them
    pub fault_capacity: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48_000,
            block_size: 256,
            tempo: DEFAULT_TEMPO,
            queue_capacity: 1024,
            fault_capacity: 64,
        }
    }
}

impl EngineConfig {
    pub fn sample_rate(mut self, sample_rate: u32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn block_size(mut self, block_size: usize) -> Self {
        self.block_size = block_size;
        self
    }

    /// Set the starting tempo in beats per minute
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.tempo = bpm;
        self
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    pub fn fault_capacity(mut self, capacity: usize) -> Self {
        self.fault_capacity = capacity;
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.sample_rate == 0 {
            return Err(ConfigError::ZeroSampleRate);
        }
        if self.block_size == 0 || self.block_size > MAX_BLOCK_SIZE {
            return Err(ConfigError::BlockSize {
                got: self.block_size,
                max: MAX_BLOCK_SIZE,
            });
        }
        if self.queue_capacity == 0 || self.fault_capacity == 0 {
            return Err(ConfigError::ZeroCapacity);
        }
        if !self.tempo.is_finite() || self.tempo <= 0.0 {
            return Err(ConfigError::InvalidTempo(self.tempo));
        }
        Ok(())
    }
}

/// Render-thread half: advances the clock and dispatches due events
pub struct Engine<T> {
    clock: Arc<Clock>,
    scheduler: Scheduler<T>,
    /// clock minus scheduler sample time at the end of the last block
    drift: i128,
    misuse: u64,
}

/// Control-thread half: reads the clock and submits events
pub struct EngineHandle<T> {
    clock: Arc<Clock>,
    scheduler: SchedulerHandle<T>,
}

impl<T> Engine<T> {
    pub fn new(config: &EngineConfig) -> Result<(Self, EngineHandle<T>), ConfigError> {
        config.validate()?;

        let sample_rate =
            NonZeroU32::new(config.sample_rate).ok_or(ConfigError::ZeroSampleRate)?;
        let clock = Clock::new(sample_rate)
            .with_tempo(config.tempo)
            .map_err(|_| ConfigError::InvalidTempo(config.tempo))?;
        let clock = Arc::new(clock);

        let (scheduler, handle) = Scheduler::with_handle(
            config.block_size,
            config.queue_capacity,
            config.fault_capacity,
        );

        tracing::debug!(
            sample_rate = config.sample_rate,
            block_size = config.block_size,
            tempo = config.tempo,
            queue_capacity = config.queue_capacity,
            "engine created"
        );

        let engine = Self {
            clock: Arc::clone(&clock),
            scheduler,
            drift: 0,
            misuse: 0,
        };
        let handle = EngineHandle {
            clock,
            scheduler: handle,
        };
        Ok((engine, handle))
    }

    /// Per-block entry point for the render driver.
    ///
    /// Advances the clock by `frames`, then runs every event due inside the
    /// new window. Call it with the true frame count, including short blocks
    /// at the start or end of a stream. Oversized blocks and any disagreement
    /// between clock and scheduler are reported as faults.
    pub fn render_block(&mut self, frames: usize, target: &mut T) -> BlockReport {
        let block_size = self.scheduler.block_size();
        if frames > block_size {
            self.misuse += 1;
            self.scheduler.report_fault(Fault {
                at: self.scheduler.sample_time(),
                kind: FaultKind::OversizedBlock { frames, block_size },
            });
        }

        self.clock.advance(frames as u64);
        let report = self.scheduler.process_frames(frames, target);
        self.check_sync();
        report
    }

    // Only report when the drift changes, or one bad call would flood the ring
    fn check_sync(&mut self) {
        let clock = self.clock.now();
        let scheduler = self.scheduler.sample_time();
        let drift = clock as i128 - scheduler as i128;
        if drift != self.drift {
            self.drift = drift;
            if drift != 0 {
                self.misuse += 1;
                self.scheduler.report_fault(Fault {
                    at: scheduler,
                    kind: FaultKind::DriverMisuse { clock, scheduler },
                });
            }
        }
    }

    pub fn clock(&self) -> &Arc<Clock> {
        &self.clock
    }

    /// Direct access for drivers that split clock and scheduler calls
    pub fn scheduler_mut(&mut self) -> &mut Scheduler<T> {
        &mut self.scheduler
    }

    pub fn scheduler(&self) -> &Scheduler<T> {
        &self.scheduler
    }

    /// Times the driver has broken the per-block contract
    pub fn misuse_count(&self) -> u64 {
        self.misuse
    }
}

impl<T> EngineHandle<T> {
    pub fn clock(&self) -> &Clock {
        &self.clock
    }

    /// Shared clock, for handing to other control threads
    pub fn clock_arc(&self) -> Arc<Clock> {
        Arc::clone(&self.clock)
    }

    pub fn now(&self) -> SampleTime {
        self.clock.now()
    }

    pub fn set_tempo(&self, bpm: f64) -> Result<(), SchedulerError> {
        let previous = self.clock.tempo();
        self.clock.set_tempo(bpm).inspect_err(|_| {
            tracing::warn!(bpm, previous, "rejected tempo change");
        })?;
        tracing::info!(bpm, previous, "tempo changed");
        Ok(())
    }

    /// Schedule at an absolute sample time
    pub fn schedule(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<(), SchedulerError> {
        self.scheduler.schedule(due_time, action, args)
    }

    /// Schedule `delay` samples after the clock's current time
    pub fn schedule_in(
        &mut self,
        delay: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<(), SchedulerError> {
        let due_time = self.clock.now().saturating_add(delay);
        self.scheduler.schedule(due_time, action, args)
    }

    pub fn schedule_cancellable(
        &mut self,
        due_time: SampleTime,
        action: Action<T>,
        args: &[Value],
    ) -> Result<CancelToken, SchedulerError> {
        self.scheduler.schedule_cancellable(due_time, action, args)
    }

    /// Collect and log faults reported by the render thread
    pub fn drain_faults(&mut self) -> Vec<Fault> {
        self.scheduler.drain_faults()
    }

    pub fn scheduler(&mut self) -> &mut SchedulerHandle<T> {
        &mut self.scheduler
    }
}
