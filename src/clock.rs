//! Clock - musical time to sample time
//!
//! The clock is shared between the render thread, which advances it once per
//! block, and control code, which reads it and converts musical durations into
//! absolute sample offsets for scheduling. All state is atomic so neither side
//! ever waits on the other.

use std::num::NonZeroU32;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::{duration::Duration, error::SchedulerError, SampleTime};

/// Tempo a fresh clock starts at
pub const DEFAULT_TEMPO: f64 = 60.0;

/// Ticks (sixteenth notes) per beat (quarter note)
pub const TICKS_PER_BEAT: f64 = 4.0;

/// Ticks per 4/4 measure
pub const TICKS_PER_MEASURE: f64 = 16.0;

pub struct Clock {
    /// Samples rendered since the stream started
    sample_time: AtomicU64,
    /// Tempo in bpm, stored as `f64::to_bits`
    tempo_bits: AtomicU64,
    sample_rate: NonZeroU32,
}

impl Clock {
    /// Create a clock at [`DEFAULT_TEMPO`] for a stream running at `sample_rate`
    pub fn new(sample_rate: NonZeroU32) -> Self {
        Self {
            sample_time: AtomicU64::new(0),
            tempo_bits: AtomicU64::new(DEFAULT_TEMPO.to_bits()),
            sample_rate,
        }
    }

    pub fn with_tempo(self, bpm: f64) -> Result<Self, SchedulerError> {
        self.set_tempo(bpm)?;
        Ok(self)
    }

    /// Current sample time
    pub fn now(&self) -> SampleTime {
        self.sample_time.load(Ordering::Acquire)
    }

    /// Move the clock forward by the number of frames actually rendered.
    ///
    /// Only the render driver should call this, once per block.
    pub fn advance(&self, frames: u64) {
        self.sample_time.fetch_add(frames, Ordering::AcqRel);
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate.get()
    }

    pub fn tempo(&self) -> f64 {
        f64::from_bits(self.tempo_bits.load(Ordering::Acquire))
    }

    /// Change the tempo for all conversions made from now on.
    ///
    /// Events already scheduled keep their absolute sample time. Non-positive
    /// or non-finite values are rejected and the previous tempo stays.
    pub fn set_tempo(&self, bpm: f64) -> Result<(), SchedulerError> {
        if !bpm.is_finite() || bpm <= 0.0 {
            return Err(SchedulerError::InvalidTempo(bpm));
        }
        self.tempo_bits.store(bpm.to_bits(), Ordering::Release);
        Ok(())
    }

    /// Exact (fractional) length of one tick at the current tempo
    pub fn samples_per_tick(&self) -> f64 {
        // ticks per second = (bpm / 60) * 4
        self.sample_rate.get() as f64 / ((self.tempo() / 60.0) * TICKS_PER_BEAT)
    }

    /// Length of `n` ticks (sixteenth notes) in samples.
    ///
    /// Rounded to the nearest sample. Negative or NaN input gives 0.
    pub fn ticks(&self, n: f64) -> SampleTime {
        to_samples(self.samples_per_tick() * n)
    }

    /// Length of `n` beats (quarter notes) in samples
    pub fn beats(&self, n: f64) -> SampleTime {
        self.ticks(n * TICKS_PER_BEAT)
    }

    /// Length of `n` 4/4 measures in samples
    pub fn measures(&self, n: f64) -> SampleTime {
        self.ticks(n * TICKS_PER_MEASURE)
    }

    /// Length of a note value in samples
    pub fn duration(&self, duration: Duration) -> SampleTime {
        self.ticks(duration.as_ticks())
    }

    /// Tempo-independent conversion from seconds
    pub fn seconds(&self, secs: f64) -> SampleTime {
        to_samples(secs * self.sample_rate.get() as f64)
    }
}

// `as` saturates: NaN and negatives become 0, overflow becomes u64::MAX
fn to_samples(exact: f64) -> SampleTime {
    exact.round() as SampleTime
}

#[cfg(test)]
mod tests {
    use super::*;

    fn clock(sample_rate: u32, bpm: f64) -> Clock {
        Clock::new(NonZeroU32::new(sample_rate).unwrap())
            .with_tempo(bpm)
            .unwrap()
    }

    #[test]
    fn test_tick_formula_at_sixty_bpm() {
        let c = clock(44_100, 60.0);
        // one beat per second, four ticks per beat
        assert_eq!(c.ticks(1.0), 11_025);
        assert_eq!(c.beats(1.0), 44_100);
        assert_eq!(c.measures(1.0), 176_400);
    }

    #[test]
    fn test_tick_formula_at_nine_hundred_bpm() {
        let c = clock(44_100, 900.0);
        assert_eq!(c.ticks(1.0), 735);
        assert_eq!(c.beats(1.0), 2_940);
        assert_eq!(c.measures(1.0), 11_760);
    }

    #[test]
    fn test_units_are_consistent_across_tempos() {
        for &rate in &[22_050u32, 44_100, 48_000, 96_000] {
            for &bpm in &[40.0, 60.0, 90.0, 120.0, 133.0, 174.0] {
                let c = clock(rate, bpm);
                let exact = rate as f64 / ((bpm / 60.0) * 4.0);
                assert_eq!(c.ticks(1.0), exact.round() as u64);
                assert_eq!(c.beats(1.0), c.ticks(4.0));
                assert_eq!(c.measures(1.0), c.ticks(16.0));
            }
        }
    }

    #[test]
    fn test_rounds_to_nearest_sample() {
        // 48000 / (120/60 * 4) = 6000 per tick; a third of a tick is 2000
        let c = clock(48_000, 120.0);
        assert_eq!(c.ticks(1.0 / 3.0), 2_000);
        // 11025 per tick, half a tick is 5512.5 -> rounds away from zero
        let c = clock(44_100, 60.0);
        assert_eq!(c.ticks(0.5), 5_513);
    }

    #[test]
    fn test_negative_and_nan_durations_clamp_to_zero() {
        let c = clock(48_000, 120.0);
        assert_eq!(c.ticks(-2.0), 0);
        assert_eq!(c.ticks(f64::NAN), 0);
    }

    #[test]
    fn test_set_tempo_rejects_non_positive() {
        let c = clock(48_000, 120.0);
        assert_eq!(c.set_tempo(0.0), Err(SchedulerError::InvalidTempo(0.0)));
        assert_eq!(c.set_tempo(-10.0), Err(SchedulerError::InvalidTempo(-10.0)));
        assert!(c.set_tempo(f64::INFINITY).is_err());
        assert!(c.set_tempo(f64::NAN).is_err());
        assert_eq!(c.tempo(), 120.0);
    }

    #[test]
    fn test_tempo_change_affects_only_future_conversions() {
        let c = clock(48_000, 60.0);
        let before = c.beats(1.0);
        c.set_tempo(120.0).unwrap();
        assert_eq!(before, 48_000);
        assert_eq!(c.beats(1.0), 24_000);
    }

    #[test]
    fn test_advance_accumulates_partial_blocks() {
        let c = clock(48_000, 60.0);
        assert_eq!(c.now(), 0);
        c.advance(256);
        c.advance(256);
        c.advance(17);
        assert_eq!(c.now(), 529);
    }

    #[test]
    fn test_note_values_and_seconds() {
        let c = clock(48_000, 120.0);
        assert_eq!(c.duration(Duration::QUARTER), c.beats(1.0));
        assert_eq!(c.duration(Duration::DOTTED_QUARTER), 36_000);
        assert_eq!(c.seconds(0.5), 24_000);
    }
}
