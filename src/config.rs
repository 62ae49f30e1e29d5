//! Capture configuration read from the environment.

use std::path::PathBuf;
use std::str::FromStr;

use thiserror::Error;

/// Default device node.
pub const DEFAULT_DEVICE: &str = "/dev/video0";
/// Default capture width.
pub const DEFAULT_WIDTH: u32 = 640;
/// Default capture height.
pub const DEFAULT_HEIGHT: u32 = 480;

/// Environment variable naming the device node.
pub const ENV_DEVICE: &str = "V4L_SNAP_DEVICE";
/// Environment variable for the capture width.
pub const ENV_WIDTH: &str = "V4L_SNAP_WIDTH";
/// Environment variable for the capture height.
pub const ENV_HEIGHT: &str = "V4L_SNAP_HEIGHT";
/// Environment variable for the number of frames to capture.
pub const ENV_FRAMES: &str = "V4L_SNAP_FRAMES";
/// Environment variable for the PNG output path.
pub const ENV_OUTPUT: &str = "V4L_SNAP_OUTPUT";

/// An environment variable held a value that does not parse.
#[derive(Debug, Error)]
#[error("{name}={value:?} is not a valid {expected}")]
pub struct ConfigError {
    name: &'static str,
    value: String,
    expected: &'static str,
}

/// Settings for a capture run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureConfig {
    /// Device node to open.
    pub device: PathBuf,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Frames to capture.
    pub frames: u32,
    /// Where to write the last frame as PNG, if anywhere.
    pub output: Option<PathBuf>,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            device: PathBuf::from(DEFAULT_DEVICE),
            width: DEFAULT_WIDTH,
            height: DEFAULT_HEIGHT,
            frames: 1,
            output: None,
        }
    }
}

impl CaptureConfig {
    /// Build from `V4L_SNAP_*` variables, falling back to defaults for
    /// anything unset.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();

        Ok(Self {
            device: lookup(ENV_DEVICE).map_or(defaults.device, PathBuf::from),
            width: parse(&lookup, ENV_WIDTH, "width")?.unwrap_or(defaults.width),
            height: parse(&lookup, ENV_HEIGHT, "height")?.unwrap_or(defaults.height),
            frames: parse(&lookup, ENV_FRAMES, "frame count")?.unwrap_or(defaults.frames),
            output: lookup(ENV_OUTPUT)
                .filter(|path| !path.is_empty())
                .map(PathBuf::from),
        })
    }
}

fn parse<T, F>(lookup: &F, name: &'static str, expected: &'static str) -> Result<Option<T>, ConfigError>
where
    T: FromStr,
    F: Fn(&str) -> Option<String>,
{
    lookup(name)
        .map(|value| {
            value.trim().parse().map_err(|_| ConfigError {
                name,
                value,
                expected,
            })
        })
        .transpose()
}
