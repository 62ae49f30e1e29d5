//! Control channel backed by a real V4L2 device node.
#![allow(unsafe_code)]

use std::fs::{File, OpenOptions};
use std::io;
use std::os::fd::{AsFd, AsRawFd, BorrowedFd};
use std::os::unix::fs::OpenOptionsExt;
use std::path::Path;

use nix::fcntl::OFlag;
use tracing::debug;

use crate::layout::{BUFFER_LEN, FORMAT_LEN, REQUEST_BUFFERS_LEN, STREAM_TYPE_LEN};
use crate::traits::{ControlChannel, Request};

mod raw {
    use crate::layout::{BUFFER_LEN, FORMAT_LEN, REQUEST_BUFFERS_LEN, STREAM_TYPE_LEN};
    use crate::traits::Request;

    nix::ioctl_readwrite_bad!(set_format, Request::SetFormat.code(), [u8; FORMAT_LEN]);
    nix::ioctl_readwrite_bad!(
        request_buffers,
        Request::RequestBuffers.code(),
        [u8; REQUEST_BUFFERS_LEN]
    );
    nix::ioctl_write_ptr_bad!(stream_on, Request::StreamOn.code(), [u8; STREAM_TYPE_LEN]);
    nix::ioctl_readwrite_bad!(queue_buffer, Request::QueueBuffer.code(), [u8; BUFFER_LEN]);
    nix::ioctl_readwrite_bad!(dequeue_buffer, Request::DequeueBuffer.code(), [u8; BUFFER_LEN]);
}

/// An open V4L2 device node.
///
/// Requests are issued as blocking ioctls. The handle is released when the
/// value is dropped.
#[derive(Debug)]
pub struct DeviceChannel {
    file: File,
}

impl DeviceChannel {
    /// Open `path` for read/write with close-on-exec.
    ///
    /// The node is opened in blocking mode, so a dequeue waits for the driver.
    pub fn open<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .custom_flags(OFlag::O_CLOEXEC.bits())
            .open(path.as_ref())?;

        debug!(path = %path.as_ref().display(), fd = file.as_raw_fd(), "Opened device");
        Ok(Self { file })
    }
}

impl AsFd for DeviceChannel {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.file.as_fd()
    }
}

/// View `payload` as the fixed-size array the request's ioctl expects.
fn fixed<const N: usize>(request: Request, payload: &mut [u8]) -> io::Result<&mut [u8; N]> {
    let len = payload.len();
    <&mut [u8; N]>::try_from(payload).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{request:?} payload is {len} bytes, driver expects {N}"),
        )
    })
}

impl ControlChannel for DeviceChannel {
    unsafe fn request(&mut self, request: Request, payload: &mut [u8]) -> io::Result<()> {
        let fd = self.file.as_raw_fd();

        // SAFETY: each payload has exactly the size encoded in its request
        // code, so the driver never reads or writes past it. The caller
        // guarantees any queued user pointer stays valid until dequeued.
        let result = unsafe {
            match request {
                Request::SetFormat => raw::set_format(fd, fixed::<FORMAT_LEN>(request, payload)?),
                Request::RequestBuffers => raw::request_buffers(
                    fd,
                    fixed::<REQUEST_BUFFERS_LEN>(request, payload)?,
                ),
                Request::StreamOn => {
                    raw::stream_on(fd, fixed::<STREAM_TYPE_LEN>(request, payload)?)
                }
                Request::QueueBuffer => {
                    raw::queue_buffer(fd, fixed::<BUFFER_LEN>(request, payload)?)
                }
                Request::DequeueBuffer => {
                    raw::dequeue_buffer(fd, fixed::<BUFFER_LEN>(request, payload)?)
                }
            }
        };

        match result {
            Ok(_) => {
                debug!(fd, ?request, "ioctl ok");
                Ok(())
            }
            Err(errno) => {
                debug!(fd, ?request, %errno, "ioctl failed");
                Err(errno.into())
            }
        }
    }
}
