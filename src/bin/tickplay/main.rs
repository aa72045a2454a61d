//! tickplay - clock-scheduled playback through the default output device
//!
//! Run with: cargo run --bin tickplay -- [bpm]
//!
//! While it plays, type a number and press enter to change the tempo, `p` to
//! schedule the run again, or `q` to quit.

mod app;
mod voices;

use app::Tickplay;
use color_eyre::eyre::WrapErr;
use tracing_subscriber::EnvFilter;

fn main() -> color_eyre::Result<()> {
    color_eyre::install()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let bpm = std::env::args()
        .nth(1)
        .map(|arg| arg.parse::<f64>())
        .transpose()
        .wrap_err("tempo argument must be a number")?
        .unwrap_or(60.0);

    Tickplay::new().bpm(bpm).run()
}
