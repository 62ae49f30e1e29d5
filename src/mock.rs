//! Mock driver for testing without hardware.
//!
//! `MockDriver` implements [`ControlChannel`] with the state machine of a
//! single-slot user-pointer capture driver: requests out of order are
//! rejected with `EINVAL`, payloads are decoded and checked, and a dequeue
//! writes a generated YUYV frame through the queued user pointer.
#![allow(unsafe_code)]

use std::cell::RefCell;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use nix::libc;

use crate::buffer::yuyv_frame_len;
use crate::layout::{
    decode_stream_type, BufferDescriptor, PixFormat, RequestBuffers, BUF_TYPE_VIDEO_CAPTURE,
    MEMORY_USERPTR,
};
use crate::traits::{ControlChannel, FourCC, Request};

/// Test pattern types for mock frame generation.
#[derive(Debug, Clone, Copy)]
pub enum TestPattern {
    /// SMPTE color bars pattern.
    ColorBars,
    /// Horizontal gradient from dark to light.
    Gradient,
    /// Solid color with specified Y, U, V values.
    Solid(u8, u8, u8),
}

#[derive(Debug, Default)]
struct Shared {
    requests: Vec<Request>,
    live_handles: usize,
}

/// Read-only view of a [`MockDriver`] that outlives it.
#[derive(Debug, Clone)]
pub struct Probe {
    shared: Rc<RefCell<Shared>>,
}

impl Probe {
    /// Every request issued so far, in order, including failed ones.
    pub fn requests(&self) -> Vec<Request> {
        self.shared.borrow().requests.clone()
    }

    /// Mock handles not yet dropped.
    pub fn live_handles(&self) -> usize {
        self.shared.borrow().live_handles
    }
}

#[derive(Debug, Clone, Copy)]
struct Queued {
    address: u64,
    length: u32,
}

/// Mock capture driver.
#[derive(Debug)]
pub struct MockDriver {
    shared: Rc<RefCell<Shared>>,
    pattern: TestPattern,
    failures: Vec<(Request, i32)>,
    accepted_geometry: Option<(u32, u32)>,
    format: Option<(u32, u32)>,
    registered: bool,
    streaming: bool,
    queued: Option<Queued>,
    sequence: u32,
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

impl MockDriver {
    /// Create a new mock driver producing color bars.
    #[must_use]
    pub fn new() -> Self {
        let shared = Rc::new(RefCell::new(Shared {
            live_handles: 1,
            ..Shared::default()
        }));
        Self {
            shared,
            pattern: TestPattern::ColorBars,
            failures: Vec::new(),
            accepted_geometry: None,
            format: None,
            registered: false,
            streaming: false,
            queued: None,
            sequence: 0,
        }
    }

    /// Set the test pattern for frame generation.
    #[must_use]
    pub fn with_pattern(mut self, pattern: TestPattern) -> Self {
        self.pattern = pattern;
        self
    }

    /// Echo `width` x `height` from set-format instead of the request.
    #[must_use]
    pub fn with_accepted_geometry(mut self, width: u32, height: u32) -> Self {
        self.accepted_geometry = Some((width, height));
        self
    }

    /// Fail the next `request` with `errno`, leaving driver state unchanged.
    #[must_use]
    pub fn fail_once(mut self, request: Request, errno: i32) -> Self {
        self.failures.push((request, errno));
        self
    }

    /// Handle for inspecting the driver after it is moved into a session.
    pub fn probe(&self) -> Probe {
        Probe {
            shared: Rc::clone(&self.shared),
        }
    }

    fn injected_failure(&mut self, request: Request) -> Option<io::Error> {
        let pos = self.failures.iter().position(|(r, _)| *r == request)?;
        let (_, errno) = self.failures.remove(pos);
        Some(io::Error::from_raw_os_error(errno))
    }

    fn set_format(&mut self, payload: &mut [u8]) -> io::Result<()> {
        let mut format = PixFormat::decode(payload).ok_or_else(invalid)?;
        if format.buf_type != BUF_TYPE_VIDEO_CAPTURE || format.fourcc != FourCC::YUYV {
            return Err(invalid());
        }
        if let Some((width, height)) = self.accepted_geometry {
            format.width = width;
            format.height = height;
        }
        format.bytes_per_line = format.width * 2;
        format.size_image = yuyv_frame_len(format.width, format.height).ok_or_else(invalid)?;
        payload.copy_from_slice(&format.encode());

        self.format = Some((format.width, format.height));
        Ok(())
    }

    fn request_buffers(&mut self, payload: &[u8]) -> io::Result<()> {
        if self.format.is_none() {
            return Err(invalid());
        }
        if RequestBuffers::decode(payload) != Some(RequestBuffers::SINGLE_USER_POINTER) {
            return Err(invalid());
        }
        self.registered = true;
        Ok(())
    }

    fn stream_on(&mut self, payload: &[u8]) -> io::Result<()> {
        if !self.registered || decode_stream_type(payload) != Some(BUF_TYPE_VIDEO_CAPTURE) {
            return Err(invalid());
        }
        self.streaming = true;
        Ok(())
    }

    fn queue_buffer(&mut self, payload: &[u8]) -> io::Result<()> {
        let desc = BufferDescriptor::decode(payload).ok_or_else(invalid)?;
        if !self.streaming
            || self.queued.is_some()
            || desc.index() != 0
            || desc.buf_type() != BUF_TYPE_VIDEO_CAPTURE
            || desc.memory() != MEMORY_USERPTR
            || desc.user_ptr() == 0
        {
            return Err(invalid());
        }
        self.queued = Some(Queued {
            address: desc.user_ptr(),
            length: desc.length(),
        });
        Ok(())
    }

    /// # Safety
    ///
    /// The queued region must still be valid for writes.
    unsafe fn dequeue_buffer(&mut self, payload: &mut [u8]) -> io::Result<()> {
        let desc = BufferDescriptor::decode(payload).ok_or_else(invalid)?;
        let queued = self.queued.take().ok_or_else(invalid)?;
        let (width, height) = self.format.ok_or_else(invalid)?;

        let mut data = generate_test_frame(width, height, self.pattern);
        data.truncate(queued.length as usize);
        // SAFETY: forwarded from the caller of `request`.
        unsafe { write_user_region(queued, &data) };

        let seq = self.sequence;
        self.sequence += 1;

        let filled = desc.filled(
            u32::try_from(data.len()).unwrap_or(u32::MAX),
            seq,
            Duration::from_millis(u64::from(seq + 1) * 33), // ~30fps
        );
        payload.copy_from_slice(&filled.encode());
        Ok(())
    }
}

impl Drop for MockDriver {
    fn drop(&mut self) {
        self.shared.borrow_mut().live_handles -= 1;
    }
}

impl ControlChannel for MockDriver {
    unsafe fn request(&mut self, request: Request, payload: &mut [u8]) -> io::Result<()> {
        self.shared.borrow_mut().requests.push(request);

        if payload.len() != request.payload_len() {
            return Err(invalid());
        }
        if let Some(err) = self.injected_failure(request) {
            return Err(err);
        }

        match request {
            Request::SetFormat => self.set_format(payload),
            Request::RequestBuffers => self.request_buffers(payload),
            Request::StreamOn => self.stream_on(payload),
            Request::QueueBuffer => self.queue_buffer(payload),
            // SAFETY: the caller keeps the queued region valid until dequeued.
            Request::DequeueBuffer => unsafe { self.dequeue_buffer(payload) },
        }
    }
}

fn invalid() -> io::Error {
    io::Error::from_raw_os_error(libc::EINVAL)
}

/// Write `data` through a queued user pointer, as the driver would.
///
/// # Safety
///
/// `queued` must describe memory valid for writes of `queued.length` bytes.
unsafe fn write_user_region(queued: Queued, data: &[u8]) {
    let len = data.len().min(queued.length as usize);
    // SAFETY: `len` never exceeds the queued length.
    unsafe {
        std::ptr::copy_nonoverlapping(data.as_ptr(), queued.address as usize as *mut u8, len);
    }
}

/// Generate test frame data based on pattern.
pub fn generate_test_frame(width: u32, height: u32, pattern: TestPattern) -> Vec<u8> {
    let size = yuyv_frame_len(width, height).unwrap_or(0) as usize;
    let mut data = vec![0u8; size];

    match pattern {
        TestPattern::ColorBars => generate_color_bars(&mut data, width, height),
        TestPattern::Gradient => generate_gradient(&mut data, width, height),
        TestPattern::Solid(y, u, v) => generate_solid(&mut data, y, u, v),
    }

    data
}

/// Generate YUYV color bars pattern.
fn generate_color_bars(data: &mut [u8], width: u32, height: u32) {
    // 8 color bars: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
    let bars: [(u8, u8, u8); 8] = [
        (235, 128, 128), // White
        (210, 16, 146),  // Yellow
        (170, 166, 16),  // Cyan
        (145, 54, 34),   // Green
        (106, 202, 222), // Magenta
        (81, 90, 240),   // Red
        (41, 240, 110),  // Blue
        (16, 128, 128),  // Black
    ];

    let bar_width = (width / 8).max(1);

    for y in 0..height {
        for x in (0..width).step_by(2) {
            let bar_idx = (x / bar_width).min(7) as usize;
            let (y_val, u_val, v_val) = bars[bar_idx];

            let offset = ((y * width + x) * 2) as usize;
            if let Some(group) = data.get_mut(offset..offset + 4) {
                group.copy_from_slice(&[y_val, u_val, y_val, v_val]);
            }
        }
    }
}

/// Generate YUYV horizontal gradient pattern.
fn generate_gradient(data: &mut [u8], width: u32, height: u32) {
    for y in 0..height {
        for x in (0..width).step_by(2) {
            #[allow(clippy::cast_possible_truncation)]
            let y_val = ((x * 255) / width) as u8;
            let offset = ((y * width + x) * 2) as usize;

            if let Some(group) = data.get_mut(offset..offset + 4) {
                group.copy_from_slice(&[y_val, 128, y_val, 128]);
            }
        }
    }
}

/// Generate solid color YUYV frame.
fn generate_solid(data: &mut [u8], y: u8, u: u8, v: u8) {
    for group in data.chunks_exact_mut(4) {
        group.copy_from_slice(&[y, u, y, v]);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::PinnedFrame;
    use crate::layout::encode_stream_type;

    // The mock only writes through a queued pointer on dequeue, and every
    // queued region in these tests is a `PinnedFrame` alive until then.
    fn send(driver: &mut MockDriver, request: Request, payload: &mut [u8]) -> io::Result<()> {
        // SAFETY: see above.
        unsafe { driver.request(request, payload) }
    }

    fn streaming_driver(width: u32, height: u32) -> MockDriver {
        let mut driver = MockDriver::new();
        let mut format = PixFormat::capture(width, height, FourCC::YUYV).encode();
        let mut reqbufs = RequestBuffers::SINGLE_USER_POINTER.encode();
        let mut stream = encode_stream_type(BUF_TYPE_VIDEO_CAPTURE);
        send(&mut driver, Request::SetFormat, &mut format).expect("set format should succeed");
        send(&mut driver, Request::RequestBuffers, &mut reqbufs)
            .expect("request buffers should succeed");
        send(&mut driver, Request::StreamOn, &mut stream).expect("stream on should succeed");
        driver
    }

    #[test]
    fn test_mock_driver_handle_count() {
        let driver = MockDriver::new();
        let probe = driver.probe();
        assert_eq!(probe.live_handles(), 1);
        drop(driver);
        assert_eq!(probe.live_handles(), 0);
    }

    #[test]
    fn test_mock_rejects_out_of_order_setup() {
        let mut driver = MockDriver::new();
        let mut stream = encode_stream_type(BUF_TYPE_VIDEO_CAPTURE);
        let err = send(&mut driver, Request::StreamOn, &mut stream)
            .expect_err("stream on before setup should fail");
        assert_eq!(err.raw_os_error(), Some(libc::EINVAL));
    }

    #[test]
    fn test_mock_rejects_multi_buffer_request() {
        let mut driver = MockDriver::new();
        let mut format = PixFormat::capture(64, 64, FourCC::YUYV).encode();
        send(&mut driver, Request::SetFormat, &mut format).expect("set format should succeed");

        let mut reqbufs = RequestBuffers {
            count: 4,
            ..RequestBuffers::SINGLE_USER_POINTER
        }
        .encode();
        assert!(send(&mut driver, Request::RequestBuffers, &mut reqbufs).is_err());
    }

    #[test]
    fn test_mock_echoes_driver_format() {
        let mut driver = MockDriver::new().with_accepted_geometry(320, 240);
        let mut format = PixFormat::capture(640, 480, FourCC::YUYV).encode();
        send(&mut driver, Request::SetFormat, &mut format).expect("set format should succeed");

        let echoed = PixFormat::decode(&format).expect("decode should succeed");
        assert_eq!((echoed.width, echoed.height), (320, 240));
        assert_eq!(echoed.bytes_per_line, 640);
        assert_eq!(echoed.size_image, 320 * 240 * 2);
    }

    #[test]
    fn test_mock_fills_queued_buffer() {
        let mut driver = streaming_driver(64, 64).with_pattern(TestPattern::Solid(128, 64, 192));
        let mut frame = PinnedFrame::zeroed(64 * 64 * 2);
        let mut payload = BufferDescriptor::user_pointer(frame.region()).encode();

        send(&mut driver, Request::QueueBuffer, &mut payload).expect("queue should succeed");
        assert!(send(&mut driver, Request::QueueBuffer, &mut payload).is_err());
        send(&mut driver, Request::DequeueBuffer, &mut payload).expect("dequeue should succeed");

        let data = frame.as_slice();
        assert_eq!(&data[..4], &[128, 64, 128, 192]);
        assert!(data.chunks(4).all(|g| g == [128, 64, 128, 192]));

        let meta = BufferDescriptor::decode(&payload)
            .expect("decode should succeed")
            .metadata();
        assert_eq!(meta.bytes_used, 64 * 64 * 2);
        assert_eq!(meta.sequence, 0);
    }

    #[test]
    fn test_mock_dequeue_without_queue() {
        let mut driver = streaming_driver(64, 64);
        let mut payload = [0u8; crate::layout::BUFFER_LEN];
        assert!(send(&mut driver, Request::DequeueBuffer, &mut payload).is_err());
    }

    #[test]
    fn test_color_bars_pattern() {
        let data = generate_test_frame(640, 480, TestPattern::ColorBars);

        assert_eq!(data.len(), 640 * 480 * 2);
        // First bar should be white (Y=235)
        assert_eq!(data[0], 235);
    }

    #[test]
    fn test_gradient_pattern() {
        let data = generate_test_frame(640, 480, TestPattern::Gradient);

        // Left edge should be dark
        assert!(data[0] < 10);

        // Right edge should be bright (check last row, last pixel)
        let last_row_start = 479 * 640 * 2;
        let last_pixel_y = data[last_row_start + 638 * 2];
        assert!(last_pixel_y > 200);
    }

    #[test]
    fn test_solid_pattern() {
        let data = generate_test_frame(64, 64, TestPattern::Solid(128, 64, 192));

        assert_eq!(&data[..4], &[128, 64, 128, 192]);
    }
}
