//! Core traits and types for single-buffer V4L2 capture.

use std::io;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::convert::Image;

/// Pixel format code (four-character code, little-endian packed).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FourCC(pub [u8; 4]);

impl FourCC {
    /// Create a new `FourCC` from a 4-byte array.
    #[must_use]
    pub const fn new(code: &[u8; 4]) -> Self {
        Self(*code)
    }

    /// YUYV pixel format (4:2:2 packed). The only encoding captured.
    pub const YUYV: Self = Self::new(b"YUYV");
    /// UYVY pixel format (4:2:2 packed, chroma first). Never negotiated.
    pub const UYVY: Self = Self::new(b"UYVY");

    /// Numeric code as sent to the driver.
    #[must_use]
    pub const fn code(self) -> u32 {
        u32::from_le_bytes(self.0)
    }

    /// Rebuild a `FourCC` from the driver's numeric code.
    #[must_use]
    pub const fn from_code(code: u32) -> Self {
        Self(code.to_le_bytes())
    }
}

impl From<v4l::FourCC> for FourCC {
    fn from(fourcc: v4l::FourCC) -> Self {
        Self(fourcc.repr)
    }
}

impl From<FourCC> for v4l::FourCC {
    fn from(fourcc: FourCC) -> Self {
        Self::new(&fourcc.0)
    }
}

impl std::fmt::Display for FourCC {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&String::from_utf8_lossy(&self.0))
    }
}

/// A control request understood by the capture driver.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Request {
    /// `VIDIOC_S_FMT`: negotiate capture geometry and encoding.
    SetFormat,
    /// `VIDIOC_REQBUFS`: register capture slots.
    RequestBuffers,
    /// `VIDIOC_STREAMON`: start streaming.
    StreamOn,
    /// `VIDIOC_QBUF`: hand a buffer to the driver.
    QueueBuffer,
    /// `VIDIOC_DQBUF`: wait for a filled buffer.
    DequeueBuffer,
}

impl Request {
    /// Numeric request code (64-bit Linux ABI).
    #[must_use]
    pub const fn code(self) -> u32 {
        match self {
            Self::SetFormat => 0xC0D0_5605,
            Self::RequestBuffers => 0xC014_5608,
            Self::StreamOn => 0x4004_5612,
            Self::QueueBuffer => 0xC058_560F,
            Self::DequeueBuffer => 0xC058_5611,
        }
    }

    /// Exact payload size the driver reads for this request.
    ///
    /// This is the size field encoded in bits 16..30 of [`Request::code`].
    #[must_use]
    pub const fn payload_len(self) -> usize {
        ((self.code() >> 16) & 0x3fff) as usize
    }
}

/// Which stream setup step a [`CaptureError::StreamSetup`] came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SetupStage {
    /// Buffer registration was rejected.
    RequestBuffers,
    /// Stream activation was rejected.
    StreamOn,
}

impl std::fmt::Display for SetupStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::RequestBuffers => f.write_str("request buffers"),
            Self::StreamOn => f.write_str("stream on"),
        }
    }
}

/// Error type for capture operations.
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Width or height is zero, or the frame size does not fit the driver's fields.
    #[error("Invalid capture geometry {width}x{height}")]
    InvalidGeometry {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
    },
    /// Device path unavailable or inaccessible.
    #[error("Failed to open device {}: {source}", path.display())]
    Open {
        /// Device path that was opened.
        path: PathBuf,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Driver rejected the requested geometry or encoding.
    #[error("Failed to set format {width}x{height} {fourcc}: {source}")]
    Format {
        /// Requested width.
        width: u32,
        /// Requested height.
        height: u32,
        /// Requested pixel format.
        fourcc: FourCC,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Buffer registration or stream activation rejected.
    #[error("Failed to {stage}: {source}")]
    StreamSetup {
        /// Step that failed.
        stage: SetupStage,
        /// Underlying OS error.
        #[source]
        source: io::Error,
    },
    /// Driver rejected the queue-buffer request.
    #[error("Failed to queue buffer: {0}")]
    Queue(#[source] io::Error),
    /// Driver rejected the dequeue-buffer request, or the wait was interrupted.
    #[error("Failed to dequeue buffer: {0}")]
    Dequeue(#[source] io::Error),
}

impl CaptureError {
    /// Raw OS error code carried by this error, if any.
    #[must_use]
    pub fn raw_os_error(&self) -> Option<i32> {
        match self {
            Self::InvalidGeometry { .. } => None,
            Self::Open { source, .. }
            | Self::Format { source, .. }
            | Self::StreamSetup { source, .. }
            | Self::Queue(source)
            | Self::Dequeue(source) => source.raw_os_error(),
        }
    }
}

/// Result type for capture operations.
pub type Result<T> = std::result::Result<T, CaptureError>;

/// Metadata reported by the driver for a dequeued frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FrameMetadata {
    /// Driver slot the frame was written into.
    pub index: u32,
    /// Frame sequence number.
    pub sequence: u32,
    /// Capture timestamp.
    pub timestamp: Duration,
    /// Bytes the driver wrote into the buffer.
    pub bytes_used: u32,
}

/// A captured and decoded video frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// RGBA image.
    pub image: Image,
    /// Frame metadata.
    pub metadata: FrameMetadata,
}

/// Control-channel primitive of an open capture device.
///
/// Implementations issue one request synchronously. For read/write requests
/// the driver may rewrite `payload` in place; callers decode it afterwards.
/// A [`Request::DequeueBuffer`] blocks until the driver has filled the queued
/// buffer.
///
/// Issuing a request is unsafe because a queued buffer payload carries a raw
/// address the driver writes through. [`crate::Session`] is the safe entry
/// point: it only queues descriptors built from a live
/// [`crate::buffer::PinnedFrame`].
///
/// ```compile_fail
/// use v4l_snap::{ControlChannel, DeviceChannel, Request};
///
/// fn queue_anything(channel: &mut DeviceChannel, payload: &mut [u8; 88]) {
///     let _ = channel.request(Request::QueueBuffer, payload);
/// }
/// ```
pub trait ControlChannel {
    /// Issue `request` with its encoded payload.
    ///
    /// # Safety
    ///
    /// `payload` must be a payload for `request` as encoded by
    /// [`crate::layout`]. For [`Request::QueueBuffer`] its user pointer and
    /// length must describe memory that is valid for writes and that nothing
    /// else accesses until the matching [`Request::DequeueBuffer`] succeeds or
    /// the channel is dropped.
    #[allow(unsafe_code)]
    unsafe fn request(&mut self, request: Request, payload: &mut [u8]) -> io::Result<()>;
}
