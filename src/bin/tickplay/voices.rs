//! Minimal saw voices for the demo - just enough to hear the timing.

use saavy_sched::{ActionError, Cascade, Value};

/// Convert MIDI note number to frequency in Hz (A4 = 69 = 440 Hz)
pub fn hertz(note: u8) -> f64 {
    440.0 * 2.0_f64.powf((note as f64 - 69.0) / 12.0)
}

#[derive(Default, Clone, Copy)]
struct Voice {
    phase: f32,
    step: f32,
    amplitude: f32,
    /// Samples left before the voice goes quiet
    remaining: u32,
    length: u32,
    /// One-pole lowpass state
    lp: f32,
}

impl Voice {
    fn is_free(&self) -> bool {
        self.remaining == 0
    }

    fn next_sample(&mut self) -> f32 {
        let saw = 2.0 * self.phase - 1.0;
        self.phase = (self.phase + self.step).fract();

        // cutoff and level both fall away over the note's length
        let progress = 1.0 - self.remaining as f32 / self.length as f32;
        let coeff = 0.3 * (1.0 - progress).powi(3);
        self.lp += coeff * (saw - self.lp);

        self.remaining -= 1;
        self.lp * self.amplitude * (1.0 - progress)
    }
}

/// Fixed pool of voices; the scheduler's render target
pub struct Voices {
    sample_rate: f32,
    voices: Vec<Voice>,
}

impl Voices {
    pub fn new(sample_rate: f32, polyphony: usize) -> Self {
        Self {
            sample_rate,
            voices: vec![Voice::default(); polyphony],
        }
    }

    pub fn note_on(&mut self, seconds: f64, frequency: f64, amplitude: f64) {
        let length = (seconds * self.sample_rate as f64).max(1.0) as u32;
        // steal the voice closest to finishing when none is free
        let Some(voice) = self.voices.iter_mut().min_by_key(|v| v.remaining) else {
            return;
        };
        *voice = Voice {
            phase: 0.0,
            step: frequency as f32 / self.sample_rate,
            amplitude: amplitude as f32,
            remaining: length,
            length,
            lp: 0.0,
        };
    }

    pub fn render(&mut self, out: &mut [f32]) {
        out.fill(0.0);
        for voice in self.voices.iter_mut().filter(|v| !v.is_free()) {
            for sample in out.iter_mut() {
                if voice.is_free() {
                    break;
                }
                *sample += voice.next_sample();
            }
        }
        for sample in out.iter_mut() {
            *sample = sample.tanh();
        }
    }
}

/// Scheduled action: `[duration_seconds, frequency_hz, amplitude]`
pub fn play_note(
    voices: &mut Voices,
    args: &[Value],
    _: &mut Cascade<'_, Voices>,
) -> Result<(), ActionError> {
    let [duration, frequency, amplitude] = args else {
        return Err(ActionError::Failed("play_note takes duration, frequency, amplitude"));
    };
    let (Some(duration), Some(frequency), Some(amplitude)) =
        (duration.as_float(), frequency.as_float(), amplitude.as_float())
    else {
        return Err(ActionError::Failed("play_note arguments must be numeric"));
    };
    voices.note_on(duration, frequency, amplitude);
    Ok(())
}
