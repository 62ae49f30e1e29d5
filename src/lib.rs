//! V4L2-Snap: single-frame YUYV capture from Video4Linux2 devices
//!
//! This library drives a capture device through a fixed control sequence with
//! one user-pointer buffer and decodes each captured YUYV frame to RGBA. The
//! driver sits behind the [`ControlChannel`] trait, enabling both production
//! use with real hardware and testing with a mock driver.

pub mod buffer;
pub mod config;
pub mod convert;
pub mod device;
pub mod layout;
pub mod session;
pub mod traits;
pub mod validation;

#[cfg(test)]
pub mod mock;

pub use config::CaptureConfig;
pub use convert::Image;
pub use device::DeviceChannel;
pub use session::Session;
pub use traits::{
    CaptureError, ControlChannel, FourCC, Frame, FrameMetadata, Request, Result, SetupStage,
};
