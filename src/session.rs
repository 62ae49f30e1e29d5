//! Device session setup and the per-frame submit/wait cycle.
//!
//! A session walks the driver from unconfigured to streaming with three
//! requests (set-format, request-buffers, stream-on) and then captures one
//! frame per call by queueing a fresh pinned buffer and blocking on its
//! dequeue. Only one buffer slot is registered, so captures on a session are
//! strictly sequential; `&mut self` enforces that.
#![allow(unsafe_code)]

use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::buffer::{yuyv_frame_len, PinnedFrame};
use crate::convert::{rgba_len, Image};
use crate::device::DeviceChannel;
use crate::layout::{
    encode_stream_type, BufferDescriptor, PixFormat, RequestBuffers, BUFFER_LEN,
    BUF_TYPE_VIDEO_CAPTURE,
};
use crate::traits::{
    CaptureError, ControlChannel, FourCC, Frame, FrameMetadata, Request, Result, SetupStage,
};

/// A buffer handed to the driver and not yet returned.
struct InFlight {
    frame: PinnedFrame,
    payload: [u8; BUFFER_LEN],
}

/// An open capture device, configured and streaming.
pub struct Session<C: ControlChannel = DeviceChannel> {
    // Declared first so the handle is released before any in-flight frame
    // is freed.
    channel: C,
    in_flight: Option<InFlight>,
    path: PathBuf,
    width: u32,
    height: u32,
    frame_len: u32,
}

impl Session<DeviceChannel> {
    /// Open the device at `path` and start streaming `width` x `height` YUYV.
    pub fn open<P: AsRef<Path>>(path: P, width: u32, height: u32) -> Result<Self> {
        let path = path.as_ref();
        checked_frame_len(width, height)?;

        let channel = DeviceChannel::open(path).map_err(|source| CaptureError::Open {
            path: path.to_path_buf(),
            source,
        })?;

        Self::with_channel(path, channel, width, height)
    }
}

impl<C: ControlChannel> Session<C> {
    /// Run the setup sequence on an already-open channel.
    ///
    /// The channel is consumed: if any step fails it is dropped, releasing
    /// the handle, before the error is returned.
    pub fn with_channel<P: AsRef<Path>>(
        path: P,
        mut channel: C,
        width: u32,
        height: u32,
    ) -> Result<Self> {
        let frame_len = checked_frame_len(width, height)?;

        set_format(&mut channel, width, height)?;
        register_buffer(&mut channel)?;
        stream_on(&mut channel)?;

        let path = path.as_ref().to_path_buf();
        info!(path = %path.display(), width, height, frame_len, "Capture session streaming");

        Ok(Self {
            channel,
            in_flight: None,
            path,
            width,
            height,
            frame_len,
        })
    }

    /// Device path the session was opened on.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Frame width in pixels.
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Frame height in pixels.
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Raw YUYV bytes per frame.
    pub const fn frame_len(&self) -> u32 {
        self.frame_len
    }

    /// Release the device handle. Best-effort; nothing is reported.
    pub fn close(self) {
        info!(path = %self.path.display(), "Closing capture session");
    }

    /// Capture one frame and decode it to RGBA.
    pub fn capture(&mut self) -> Result<Image> {
        self.capture_frame().map(|frame| frame.image)
    }

    /// Capture one frame, keeping the driver's metadata.
    ///
    /// Blocks until the driver has filled the buffer; there is no timeout.
    /// If the wait fails the buffer stays with the driver, and the next call
    /// resumes waiting on it instead of queueing another.
    pub fn capture_frame(&mut self) -> Result<Frame> {
        let mut cycle = match self.in_flight.take() {
            Some(cycle) => {
                debug!("Resuming wait on previously queued buffer");
                cycle
            }
            None => self.queue()?,
        };

        // SAFETY: `cycle.frame` is the region queued with this payload and
        // stays owned by the session until the dequeue succeeds.
        let dequeued = unsafe { self.channel.request(Request::DequeueBuffer, &mut cycle.payload) };
        if let Err(source) = dequeued {
            // The driver still holds the address.
            self.in_flight = Some(cycle);
            return Err(CaptureError::Dequeue(source));
        }

        let metadata = BufferDescriptor::decode(&cycle.payload)
            .map(|desc| desc.metadata())
            .unwrap_or_default();
        self.check_fill(&metadata);

        let image = Image::from_yuyv(self.width, self.height, cycle.frame.as_slice()).ok_or(
            CaptureError::InvalidGeometry {
                width: self.width,
                height: self.height,
            },
        )?;
        Ok(Frame { image, metadata })
    }

    fn queue(&mut self) -> Result<InFlight> {
        let mut frame = PinnedFrame::zeroed(self.frame_len);
        let mut payload = BufferDescriptor::user_pointer(frame.region()).encode();

        // SAFETY: the descriptor comes from `frame.region()`. The frame moves
        // into the returned `InFlight` without reallocating and is kept there
        // until dequeued; on failure the driver never took the address.
        let queued = unsafe { self.channel.request(Request::QueueBuffer, &mut payload) };
        queued.map_err(CaptureError::Queue)?;

        Ok(InFlight { frame, payload })
    }

    fn check_fill(&self, metadata: &FrameMetadata) {
        if metadata.bytes_used != 0 && metadata.bytes_used < self.frame_len {
            warn!(
                sequence = metadata.sequence,
                bytes_used = metadata.bytes_used,
                expected = self.frame_len,
                "Driver returned a short frame"
            );
        }
    }
}

/// YUYV frame length, provided both the raw frame and its RGBA decode fit.
fn checked_frame_len(width: u32, height: u32) -> Result<u32> {
    yuyv_frame_len(width, height)
        .filter(|_| rgba_len(width, height).is_some())
        .ok_or(CaptureError::InvalidGeometry { width, height })
}

fn set_format<C: ControlChannel>(channel: &mut C, width: u32, height: u32) -> Result<()> {
    let requested = PixFormat::capture(width, height, FourCC::YUYV);
    let mut payload = requested.encode();

    // SAFETY: set-format carries no user pointer.
    let result = unsafe { channel.request(Request::SetFormat, &mut payload) };
    result.map_err(|source| CaptureError::Format {
        width,
        height,
        fourcc: requested.fourcc,
        source,
    })?;

    // The driver may have adjusted the format. Frames are still decoded at
    // the requested geometry.
    if let Some(accepted) = PixFormat::decode(&payload) {
        if (accepted.width, accepted.height, accepted.fourcc)
            != (requested.width, requested.height, requested.fourcc)
        {
            warn!(
                requested = %format!("{width}x{height} {}", requested.fourcc),
                accepted = %format!(
                    "{}x{} {}",
                    accepted.width, accepted.height, accepted.fourcc
                ),
                "Driver did not accept the requested format"
            );
        }
    }
    Ok(())
}

fn register_buffer<C: ControlChannel>(channel: &mut C) -> Result<()> {
    let mut payload = RequestBuffers::SINGLE_USER_POINTER.encode();

    // SAFETY: buffer registration carries no user pointer.
    let result = unsafe { channel.request(Request::RequestBuffers, &mut payload) };
    result.map_err(|source| CaptureError::StreamSetup {
        stage: SetupStage::RequestBuffers,
        source,
    })?;

    if let Some(granted) = RequestBuffers::decode(&payload) {
        debug!(count = granted.count, "Registered user-pointer buffer");
    }
    Ok(())
}

fn stream_on<C: ControlChannel>(channel: &mut C) -> Result<()> {
    let mut payload = encode_stream_type(BUF_TYPE_VIDEO_CAPTURE);

    // SAFETY: stream-on carries no user pointer.
    let result = unsafe { channel.request(Request::StreamOn, &mut payload) };
    result.map_err(|source| CaptureError::StreamSetup {
        stage: SetupStage::StreamOn,
        source,
    })
}
