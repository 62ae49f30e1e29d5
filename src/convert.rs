//! YUYV 4:2:2 to RGBA conversion.

/// Bytes per RGBA pixel.
pub const RGBA_PIXEL_LEN: usize = 4;

/// Convert one YCbCr sample to RGB.
///
/// ITU-R BT.601, full range, rounded to nearest and clamped to 0-255.
#[must_use]
#[allow(clippy::many_single_char_names)]
pub fn ycbcr_to_rgb(y: u8, cb: u8, cr: u8) -> [u8; 3] {
    let y_f = f32::from(y);
    let cb_f = f32::from(cb) - 128.0;
    let cr_f = f32::from(cr) - 128.0;

    let r = 1.402f32.mul_add(cr_f, y_f);
    let g = 0.714_136f32.mul_add(-cr_f, 0.344_136f32.mul_add(-cb_f, y_f));
    let b = 1.772f32.mul_add(cb_f, y_f);

    [clamp(r), clamp(g), clamp(b)]
}

fn clamp(val: f32) -> u8 {
    #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
    let byte = val.round().clamp(0.0, 255.0) as u8;
    byte
}

/// Decode packed YUYV into RGBA.
///
/// Each `[Y0, U, Y1, V]` group yields two pixels sharing the chroma pair.
/// Conversion stops at whichever of `yuyv` or `rgba` runs out first; a
/// trailing half group in `rgba` takes only the first pixel of the group.
/// Alpha is always 255.
pub fn yuyv_to_rgba(yuyv: &[u8], rgba: &mut [u8]) {
    for (group, out) in yuyv.chunks_exact(4).zip(rgba.chunks_mut(2 * RGBA_PIXEL_LEN)) {
        let &[y0, u, y1, v] = group else {
            continue;
        };
        for (pixel, luma) in out.chunks_exact_mut(RGBA_PIXEL_LEN).zip([y0, y1]) {
            let [r, g, b] = ycbcr_to_rgb(luma, u, v);
            pixel.copy_from_slice(&[r, g, b, u8::MAX]);
        }
    }
}

/// RGBA byte count for a `width` x `height` image, or `None` if it does not
/// fit in memory addresses.
#[must_use]
pub fn rgba_len(width: u32, height: u32) -> Option<usize> {
    usize::try_from(width)
        .ok()?
        .checked_mul(usize::try_from(height).ok()?)?
        .checked_mul(RGBA_PIXEL_LEN)
}

/// An RGBA bitmap, 4 bytes per pixel, row-major with no padding.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Image {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl Image {
    /// Decode a `width` x `height` YUYV frame.
    ///
    /// Returns `None` if the RGBA size overflows [`rgba_len`].
    #[must_use]
    pub fn from_yuyv(width: u32, height: u32, yuyv: &[u8]) -> Option<Self> {
        let mut pixels = vec![0u8; rgba_len(width, height)?];
        yuyv_to_rgba(yuyv, &mut pixels);
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Width in pixels.
    #[must_use]
    pub const fn width(&self) -> u32 {
        self.width
    }

    /// Height in pixels.
    #[must_use]
    pub const fn height(&self) -> u32 {
        self.height
    }

    /// Number of pixels.
    #[must_use]
    pub const fn pixel_count(&self) -> usize {
        self.pixels.len() / RGBA_PIXEL_LEN
    }

    /// Raw RGBA bytes.
    #[must_use]
    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    /// RGBA value at (`x`, `y`), or `None` outside the image.
    #[must_use]
    pub fn pixel_at(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * RGBA_PIXEL_LEN;
        let px = self.pixels.get(offset..offset + RGBA_PIXEL_LEN)?;
        <[u8; 4]>::try_from(px).ok()
    }

    /// Take the raw RGBA bytes.
    #[must_use]
    pub fn into_raw(self) -> Vec<u8> {
        self.pixels
    }

    /// Hand the bitmap to the `image` crate.
    #[must_use]
    pub fn into_rgba_image(self) -> Option<image::RgbaImage> {
        image::RgbaImage::from_raw(self.width, self.height, self.pixels)
    }
}
