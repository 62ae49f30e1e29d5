//! v4l-snap binary for testing camera capture.

use anyhow::{Context, Result};
use tracing::info;
use v4l_snap::{CaptureConfig, Session};

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("v4l_snap=info".parse()?),
        )
        .init();

    let config = CaptureConfig::from_env()?;
    info!(
        device = %config.device.display(),
        width = config.width,
        height = config.height,
        frames = config.frames,
        "Starting capture"
    );

    let mut session = Session::open(&config.device, config.width, config.height)?;

    let mut last = None;
    for _ in 0..config.frames {
        let frame = session.capture_frame()?;
        info!(
            sequence = frame.metadata.sequence,
            bytes_used = frame.metadata.bytes_used,
            timestamp = ?frame.metadata.timestamp,
            "Captured frame"
        );
        last = Some(frame);
    }
    session.close();

    if let (Some(path), Some(frame)) = (config.output.as_ref(), last) {
        let image = frame
            .image
            .into_rgba_image()
            .context("frame buffer does not match its dimensions")?;
        image
            .save(path)
            .with_context(|| format!("Failed to write {}", path.display()))?;
        info!(path = %path.display(), "Wrote frame");
    }

    Ok(())
}
