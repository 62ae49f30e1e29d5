//! Byte-exact encoding of the control-request payloads.
//!
//! Every payload is packed field by field in little-endian order at the
//! offsets the driver reads on 64-bit Linux. Reserved and padding bytes are
//! always zero; the driver reads fixed offsets, so the total length of each
//! payload must equal [`Request::payload_len`].

use std::time::Duration;

use bytes::{Buf, BufMut};

use crate::buffer::UserRegion;
use crate::traits::{FourCC, FrameMetadata, Request};

/// `V4L2_BUF_TYPE_VIDEO_CAPTURE`.
pub const BUF_TYPE_VIDEO_CAPTURE: u32 = 1;
/// `V4L2_MEMORY_USERPTR`.
pub const MEMORY_USERPTR: u32 = 2;
/// `V4L2_FIELD_ANY`.
pub const FIELD_ANY: u32 = 0;

/// Size of `struct v4l2_format`.
pub const FORMAT_LEN: usize = Request::SetFormat.payload_len();
/// Size of `struct v4l2_requestbuffers`.
pub const REQUEST_BUFFERS_LEN: usize = Request::RequestBuffers.payload_len();
/// Size of the stream-on buffer type argument.
pub const STREAM_TYPE_LEN: usize = Request::StreamOn.payload_len();
/// Size of `struct v4l2_buffer`.
pub const BUFFER_LEN: usize = Request::QueueBuffer.payload_len();

// The format union is 8-byte aligned behind the 4-byte type tag.
const FORMAT_UNION_OFFSET: usize = 8;
// `struct v4l2_pix_format`; the rest of the 200-byte union is unused.
const PIX_FORMAT_LEN: usize = 48;
const _: () = assert!(FORMAT_UNION_OFFSET + PIX_FORMAT_LEN <= FORMAT_LEN);

/// Pixel Format Descriptor (`struct v4l2_format` carrying `v4l2_pix_format`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixFormat {
    /// Buffer type tag.
    pub buf_type: u32,
    /// Frame width in pixels.
    pub width: u32,
    /// Frame height in pixels.
    pub height: u32,
    /// Pixel encoding.
    pub fourcc: FourCC,
    /// Field order.
    pub field: u32,
    /// Bytes per line; zero lets the driver choose.
    pub bytes_per_line: u32,
    /// Image size in bytes; zero lets the driver choose.
    pub size_image: u32,
}

impl PixFormat {
    /// Capture request for `width` x `height` in `fourcc`.
    #[must_use]
    pub const fn capture(width: u32, height: u32, fourcc: FourCC) -> Self {
        Self {
            buf_type: BUF_TYPE_VIDEO_CAPTURE,
            width,
            height,
            fourcc,
            field: FIELD_ANY,
            bytes_per_line: 0,
            size_image: 0,
        }
    }

    /// Encode into a `v4l2_format` payload.
    #[must_use]
    pub fn encode(&self) -> [u8; FORMAT_LEN] {
        let mut out = [0u8; FORMAT_LEN];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.buf_type);
        buf.put_bytes(0, FORMAT_UNION_OFFSET - 4);
        buf.put_u32_le(self.width);
        buf.put_u32_le(self.height);
        buf.put_u32_le(self.fourcc.code());
        buf.put_u32_le(self.field);
        buf.put_u32_le(self.bytes_per_line);
        buf.put_u32_le(self.size_image);
        // colorspace, priv, flags, ycbcr_enc, quantization, xfer_func and
        // the rest of the union stay zero.
        out
    }

    /// Decode a `v4l2_format` payload, e.g. after the driver echoed it back.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != FORMAT_LEN {
            return None;
        }
        let mut buf = payload;
        let buf_type = buf.get_u32_le();
        buf.advance(FORMAT_UNION_OFFSET - 4);
        Some(Self {
            buf_type,
            width: buf.get_u32_le(),
            height: buf.get_u32_le(),
            fourcc: FourCC::from_code(buf.get_u32_le()),
            field: buf.get_u32_le(),
            bytes_per_line: buf.get_u32_le(),
            size_image: buf.get_u32_le(),
        })
    }
}

/// Buffer Registration Descriptor (`struct v4l2_requestbuffers`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestBuffers {
    /// Number of slots requested (or granted, after the call).
    pub count: u32,
    /// Buffer type tag.
    pub buf_type: u32,
    /// Memory kind backing the slots.
    pub memory: u32,
}

impl RequestBuffers {
    /// One capture slot backed by user memory.
    pub const SINGLE_USER_POINTER: Self = Self {
        count: 1,
        buf_type: BUF_TYPE_VIDEO_CAPTURE,
        memory: MEMORY_USERPTR,
    };

    /// Encode into a `v4l2_requestbuffers` payload.
    #[must_use]
    pub fn encode(&self) -> [u8; REQUEST_BUFFERS_LEN] {
        let mut out = [0u8; REQUEST_BUFFERS_LEN];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.count);
        buf.put_u32_le(self.buf_type);
        buf.put_u32_le(self.memory);
        // capabilities, flags and reserved[3] stay zero.
        out
    }

    /// Decode a `v4l2_requestbuffers` payload.
    #[must_use]
    pub fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != REQUEST_BUFFERS_LEN {
            return None;
        }
        let mut buf = payload;
        Some(Self {
            count: buf.get_u32_le(),
            buf_type: buf.get_u32_le(),
            memory: buf.get_u32_le(),
        })
    }
}

/// Encode the buffer type argument of stream-on.
#[must_use]
pub const fn encode_stream_type(buf_type: u32) -> [u8; STREAM_TYPE_LEN] {
    buf_type.to_le_bytes()
}

/// Decode the buffer type argument of stream-on.
#[must_use]
pub fn decode_stream_type(payload: &[u8]) -> Option<u32> {
    <[u8; STREAM_TYPE_LEN]>::try_from(payload)
        .ok()
        .map(u32::from_le_bytes)
}

/// Frame Buffer Descriptor (`struct v4l2_buffer`, user-pointer memory).
///
/// Timecode and reserved fields are not modelled; they encode as zero.
///
/// The user pointer always comes from a [`UserRegion`], so outside this
/// crate a descriptor can only be built with
/// [`BufferDescriptor::user_pointer`]:
///
/// ```compile_fail
/// use v4l_snap::layout::BufferDescriptor;
///
/// let mut plain = vec![0u8; 8];
/// let desc = BufferDescriptor {
///     user_ptr: plain.as_mut_ptr() as u64,
///     length: 8,
/// };
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferDescriptor {
    index: u32,
    buf_type: u32,
    bytes_used: u32,
    flags: u32,
    field: u32,
    timestamp: Duration,
    sequence: u32,
    memory: u32,
    user_ptr: u64,
    length: u32,
}

impl BufferDescriptor {
    /// Descriptor binding slot 0 to `region`. Everything else is left for
    /// the driver to fill.
    #[must_use]
    pub const fn user_pointer(region: UserRegion) -> Self {
        Self {
            index: 0,
            buf_type: BUF_TYPE_VIDEO_CAPTURE,
            bytes_used: 0,
            flags: 0,
            field: 0,
            timestamp: Duration::ZERO,
            sequence: 0,
            memory: MEMORY_USERPTR,
            user_ptr: region.address(),
            length: region.length(),
        }
    }

    /// Driver slot index.
    #[must_use]
    pub const fn index(&self) -> u32 {
        self.index
    }

    /// Buffer type tag.
    #[must_use]
    pub const fn buf_type(&self) -> u32 {
        self.buf_type
    }

    /// Memory kind.
    #[must_use]
    pub const fn memory(&self) -> u32 {
        self.memory
    }

    /// User buffer address.
    #[must_use]
    pub const fn user_ptr(&self) -> u64 {
        self.user_ptr
    }

    /// User buffer length.
    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }

    /// The same descriptor as a driver returns it after filling the buffer.
    #[cfg(test)]
    pub(crate) const fn filled(self, bytes_used: u32, sequence: u32, timestamp: Duration) -> Self {
        Self {
            index: 0,
            bytes_used,
            sequence,
            timestamp,
            ..self
        }
    }

    /// Encode into a `v4l2_buffer` payload.
    #[must_use]
    pub fn encode(&self) -> [u8; BUFFER_LEN] {
        let mut out = [0u8; BUFFER_LEN];
        let mut buf = &mut out[..];
        buf.put_u32_le(self.index);
        buf.put_u32_le(self.buf_type);
        buf.put_u32_le(self.bytes_used);
        buf.put_u32_le(self.flags);
        buf.put_u32_le(self.field);
        buf.put_bytes(0, 4);
        let secs = i64::try_from(self.timestamp.as_secs()).unwrap_or(i64::MAX);
        buf.put_i64_le(secs);
        buf.put_i64_le(i64::from(self.timestamp.subsec_micros()));
        // struct v4l2_timecode
        buf.put_bytes(0, 16);
        buf.put_u32_le(self.sequence);
        buf.put_u32_le(self.memory);
        buf.put_u64_le(self.user_ptr);
        buf.put_u32_le(self.length);
        // reserved2, request_fd and tail padding stay zero.
        out
    }

    /// Decode a `v4l2_buffer` payload.
    #[must_use]
    pub(crate) fn decode(payload: &[u8]) -> Option<Self> {
        if payload.len() != BUFFER_LEN {
            return None;
        }
        let mut buf = payload;
        let index = buf.get_u32_le();
        let buf_type = buf.get_u32_le();
        let bytes_used = buf.get_u32_le();
        let flags = buf.get_u32_le();
        let field = buf.get_u32_le();
        buf.advance(4);
        let secs = buf.get_i64_le();
        let usecs = buf.get_i64_le();
        buf.advance(16);

        // Timestamps are never negative in practice
        #[allow(clippy::cast_sign_loss)]
        let timestamp = Duration::from_secs(secs.max(0) as u64)
            + Duration::from_micros(usecs.clamp(0, 999_999) as u64);

        Some(Self {
            index,
            buf_type,
            bytes_used,
            flags,
            field,
            timestamp,
            sequence: buf.get_u32_le(),
            memory: buf.get_u32_le(),
            user_ptr: buf.get_u64_le(),
            length: buf.get_u32_le(),
        })
    }

    /// Metadata reported for a dequeued frame.
    #[must_use]
    pub const fn metadata(&self) -> FrameMetadata {
        FrameMetadata {
            index: self.index,
            sequence: self.sequence,
            timestamp: self.timestamp,
            bytes_used: self.bytes_used,
        }
    }
}
