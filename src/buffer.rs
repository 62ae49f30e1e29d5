//! User-space frame memory handed to the driver by address.

/// Bytes per YUYV macropixel (`[Y0, U, Y1, V]`, two pixels).
pub const MACROPIXEL_LEN: u32 = 4;

/// Raw YUYV byte count for a `width` x `height` frame.
///
/// Two bytes per pixel, rounded up to whole macropixels so an odd pixel
/// count still gets its chroma pair. Returns `None` if either side is zero
/// or the size does not fit the driver's 32-bit length field.
#[must_use]
pub const fn yuyv_frame_len(width: u32, height: u32) -> Option<u32> {
    if width == 0 || height == 0 {
        return None;
    }
    let Some(pixels) = width.checked_mul(height) else {
        return None;
    };
    let Some(macropixels) = pixels.checked_add(1) else {
        return None;
    };
    (macropixels / 2).checked_mul(MACROPIXEL_LEN)
}

/// A fixed-size heap allocation the driver writes a frame into.
///
/// A boxed slice cannot be resized, so its address is stable for the
/// lifetime of the value, including across moves of the owner. The only way
/// to describe it to the driver is [`PinnedFrame::region`].
#[derive(Debug)]
pub struct PinnedFrame {
    bytes: Box<[u8]>,
}

impl PinnedFrame {
    /// Allocate a zero-filled frame of `len` bytes.
    #[must_use]
    pub fn zeroed(len: u32) -> Self {
        Self {
            bytes: vec![0u8; len as usize].into_boxed_slice(),
        }
    }

    /// Address and length of the allocation, for a user-pointer descriptor.
    ///
    /// The caller must keep `self` alive until the driver has returned the
    /// buffer, since the driver holds the raw address.
    pub fn region(&mut self) -> UserRegion {
        UserRegion {
            address: self.bytes.as_mut_ptr() as u64,
            // Allocated from a u32 length
            length: u32::try_from(self.bytes.len()).unwrap_or(u32::MAX),
        }
    }

    /// Frame bytes as last written by the driver.
    #[must_use]
    pub fn as_slice(&self) -> &[u8] {
        &self.bytes
    }

    /// Allocation size in bytes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    /// Whether the allocation is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Address and length of a [`PinnedFrame`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserRegion {
    address: u64,
    length: u32,
}

impl UserRegion {
    /// Raw memory address.
    #[must_use]
    pub const fn address(&self) -> u64 {
        self.address
    }

    /// Length in bytes.
    #[must_use]
    pub const fn length(&self) -> u32 {
        self.length
    }
}
