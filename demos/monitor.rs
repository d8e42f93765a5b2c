//! Print live gaze and eye data from a Neon device
//!
//! ```text
//! cargo run --example monitor -- [config.json] [seconds]
//! ```
//!
//! Without a config file the device is discovered on the local network. Set
//! `RUST_LOG=neon_link=debug` to follow the connection lifecycle.

use anyhow::{Context, Result};
use futures::StreamExt;
use neon_link::{LinkConfig, NeonLink, SessionState, UpdateRate};
use std::time::Duration;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive("neon_link=info".parse()?),
        )
        .init();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let config = match args.first() {
        Some(path) => LinkConfig::load(path).with_context(|| format!("loading {path}"))?,
        None => LinkConfig::default(),
    };
    let seconds: u64 = match args.get(1) {
        Some(value) => value.parse().with_context(|| format!("invalid duration {value}"))?,
        None => 30,
    };

    let mut link = NeonLink::spawn(config)?;
    let mut samples = link.samples(UpdateRate::Max(10)).context("sample stream already taken")?;

    let mut states = Box::pin(link.state_updates());
    tokio::spawn(async move {
        while let Some(state) = states.next().await {
            println!("-- {state}");
        }
    });

    let deadline = tokio::time::sleep(Duration::from_secs(seconds));
    tokio::pin!(deadline);

    loop {
        tokio::select! {
            _ = &mut deadline => break,
            frame = samples.next() => {
                let Some(frame) = frame else { break };
                let smooth = link.smooth_gaze_point();
                print!(
                    "gaze ({:7.1}, {:7.1})  smoothed ({:7.1}, {:7.1})",
                    frame.gaze.point.x, frame.gaze.point.y, smooth.point.x, smooth.point.y
                );
                if let Some(eye_state) = frame.eye_state {
                    print!(
                        "  pupil L {:.2}mm R {:.2}mm",
                        eye_state.left.pupil_diameter * 1000.0,
                        eye_state.right.pupil_diameter * 1000.0
                    );
                }
                if let Some(eyelid) = frame.eyelid {
                    print!(
                        "  aperture L {:.2}mm R {:.2}mm",
                        eyelid.left.aperture * 1000.0,
                        eyelid.right.aperture * 1000.0
                    );
                }
                println!();
            }
        }
    }

    if link.state() != SessionState::Disconnected {
        println!("-- stopping");
    }
    link.stop();
    link.join().await?;
    Ok(())
}
