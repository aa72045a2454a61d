//! Tickplay - audio setup and the control loop

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use color_eyre::eyre::{eyre, Result as EyreResult, WrapErr};
use saavy_sched::{Engine, EngineConfig, EngineHandle, SchedulerError, Value, MAX_BLOCK_SIZE};

use super::voices::{hertz, play_note, Voices};

/// Notes in the rising run, one per tick
const RUN_LENGTH: u8 = 60;

pub struct Tickplay {
    bpm: f64,
    block_size: usize,
    polyphony: usize,
}

impl Tickplay {
    pub fn new() -> Self {
        Self {
            bpm: 60.0,
            block_size: 256,
            polyphony: 24,
        }
    }

    /// Set the starting tempo in beats per minute
    pub fn bpm(mut self, bpm: f64) -> Self {
        self.bpm = bpm;
        self
    }

    /// Open the default output device and play until the user quits
    pub fn run(self) -> EyreResult<()> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| eyre!("no default output device available"))?;
        let config = device
            .default_output_config()
            .wrap_err("failed to fetch default output config")?;

        let sample_rate = config.sample_rate().0;
        let channels = config.channels() as usize;

        let engine_config = EngineConfig::default()
            .sample_rate(sample_rate)
            .block_size(self.block_size)
            .bpm(self.bpm);
        let (mut engine, mut handle) =
            Engine::<Voices>::new(&engine_config).wrap_err("invalid engine configuration")?;

        tracing::info!(sample_rate, channels, bpm = self.bpm, "starting playback");

        let mut voices = Voices::new(sample_rate as f32, self.polyphony);
        let mut block = vec![0.0f32; MAX_BLOCK_SIZE];
        let block_size = self.block_size;

        let stream = device.build_output_stream(
            &config.into(),
            move |data: &mut [f32], _| {
                let total_frames = data.len() / channels;
                let mut frames_written = 0;

                while frames_written < total_frames {
                    let frames = (total_frames - frames_written).min(block_size);

                    // events first, so notes due in this block start in it
                    engine.render_block(frames, &mut voices);

                    let buf = &mut block[..frames];
                    voices.render(buf);

                    // mono to all channels
                    let out_off = frames_written * channels;
                    for (i, &s) in buf.iter().enumerate() {
                        for ch in 0..channels {
                            data[out_off + i * channels + ch] = s;
                        }
                    }

                    frames_written += frames;
                }
            },
            |err| tracing::error!(%err, "audio stream error"),
            None,
        )?;
        stream.play()?;

        schedule_run(&mut handle)?;
        println!("type a tempo and press enter, `p` to replay, `q` to quit");

        for line in std::io::stdin().lines() {
            let line = line.wrap_err("failed to read stdin")?;
            match line.trim() {
                "q" => break,
                "p" | "" => schedule_run(&mut handle)?,
                other => match other.parse::<f64>() {
                    // rejected values are logged by the handle
                    Ok(bpm) => {
                        let _ = handle.set_tempo(bpm);
                    }
                    Err(_) => tracing::warn!(input = other, "unrecognized command"),
                },
            }
            handle.drain_faults();
        }

        Ok(())
    }
}

impl Default for Tickplay {
    fn default() -> Self {
        Self::new()
    }
}

/// Schedule a rising run from middle C, one note per tick from now
fn schedule_run(handle: &mut EngineHandle<Voices>) -> Result<(), SchedulerError> {
    let now = handle.now();
    for i in 0..RUN_LENGTH {
        let due = now + handle.clock().ticks(i as f64);
        let args = [
            Value::Float(4.0),
            Value::Float(hertz(60 + i)),
            Value::Float(0.25),
        ];
        handle.schedule(due, play_note, &args)?;
    }
    tracing::debug!(notes = RUN_LENGTH, start = now, "scheduled run");
    Ok(())
}
