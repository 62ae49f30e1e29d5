//! Frame validation utilities for test pattern verification.
//!
//! This module provides functions to validate that captured images contain
//! expected test patterns. Useful for integration testing with virtual cameras.

use crate::convert::Image;
use crate::traits::Frame;

/// Expected RGB values for SMPTE color bars (8 bars).
///
/// These are the RGB values resulting from converting the studio-range YUV
/// values the vivid driver and the mock driver emit for their color bars.
///
/// Colors in order: White, Yellow, Cyan, Green, Magenta, Red, Blue, Black
const SMPTE_COLOR_BARS: [(u8, u8, u8); 8] = [
    (235, 235, 235), // White
    (235, 236, 12),  // Yellow
    (13, 237, 237),  // Cyan
    (13, 238, 14),   // Green
    (238, 13, 237),  // Magenta
    (238, 14, 14),   // Red
    (16, 15, 239),   // Blue
    (16, 16, 16),    // Black
];

/// Tolerance for RGB color matching (accounts for driver chroma rounding).
const COLOR_TOLERANCE: u32 = 15;

/// A test pattern mismatch.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct ValidationError(String);

/// Result type for validation.
pub type Result<T> = std::result::Result<T, ValidationError>;

fn rgb_at(image: &Image, x: u32, y: u32) -> Result<(u8, u8, u8)> {
    image
        .pixel_at(x, y)
        .map(|[r, g, b, _]| (r, g, b))
        .ok_or_else(|| ValidationError(format!("Failed to get pixel at ({x}, {y})")))
}

/// Validates that an image contains the SMPTE color bar pattern.
///
/// This function checks 8 vertical stripes at their center positions,
/// verifying that each stripe contains the expected color with a tolerance
/// for YUV-to-RGB conversion inaccuracies.
///
/// # Errors
///
/// Returns `ValidationError` if:
/// - A sampled pixel lies outside the image
/// - Any color bar doesn't match the expected color within tolerance
pub fn validate_color_bars(image: &Image) -> Result<()> {
    let bar_width = image.width() / 8;
    let center_y = image.height() / 2;

    for (bar_idx, expected_rgb) in SMPTE_COLOR_BARS.iter().enumerate() {
        // Sample the center of each bar
        #[allow(clippy::cast_possible_truncation)]
        let sample_x = (bar_idx as u32 * bar_width) + (bar_width / 2);

        let actual_rgb = rgb_at(image, sample_x, center_y)?;

        if !colors_match(actual_rgb, *expected_rgb, COLOR_TOLERANCE) {
            return Err(ValidationError(format!(
                "Color bar {bar_idx} mismatch at ({sample_x}, {center_y}): \
                 expected RGB{expected_rgb:?}, got RGB{actual_rgb:?}"
            )));
        }
    }

    Ok(())
}

/// Validates that an image contains a horizontal gradient pattern.
///
/// This function samples a horizontal line at the center of the image and
/// verifies that the luminance increases monotonically from left to right.
/// It also checks that there is a significant overall luminance change
/// across the image (not a solid color).
///
/// # Errors
///
/// Returns `ValidationError` if:
/// - The luminance doesn't increase monotonically
/// - The total luminance change is too small (solid color)
pub fn validate_gradient(image: &Image) -> Result<()> {
    let center_y = image.height() / 2;

    // Sample every 10 pixels to check for monotonic increase
    let sample_step = 10;
    let mut first_luminance: Option<f32> = None;
    let mut prev_luminance: Option<f32> = None;

    for x in (0..image.width()).step_by(sample_step) {
        let (r, g, b) = rgb_at(image, x, center_y)?;

        // Calculate luminance (Y' in Rec. 601)
        let luminance = 0.114f32.mul_add(
            f32::from(b),
            0.587f32.mul_add(f32::from(g), 0.299 * f32::from(r)),
        );

        first_luminance.get_or_insert(luminance);

        if let Some(prev) = prev_luminance {
            if luminance < prev - 1.0 {
                // Allow small decreases due to rounding
                return Err(ValidationError(format!(
                    "Gradient not monotonically increasing at x={x}: \
                     luminance {luminance} < previous {prev}"
                )));
            }
        }

        prev_luminance = Some(luminance);
    }

    if let (Some(first), Some(last)) = (first_luminance, prev_luminance) {
        let luminance_change = last - first;
        if luminance_change < 50.0 {
            return Err(ValidationError(format!(
                "Insufficient luminance change for gradient: {luminance_change} \
                 (expected at least 50.0)"
            )));
        }
    }

    Ok(())
}

/// Validates that a sequence of frames has incrementing sequence numbers.
///
/// # Errors
///
/// Returns `ValidationError` if:
/// - The frames slice is empty
/// - Any sequence number doesn't increment by exactly 1 from the previous
pub fn validate_frame_sequence(frames: &[Frame]) -> Result<()> {
    if frames.is_empty() {
        return Err(ValidationError(
            "Cannot validate empty frame sequence".to_owned(),
        ));
    }

    for (i, pair) in frames.windows(2).enumerate() {
        let [prev, curr] = pair else {
            continue;
        };
        let prev_seq = prev.metadata.sequence;
        let curr_seq = curr.metadata.sequence;

        if curr_seq != prev_seq.wrapping_add(1) {
            return Err(ValidationError(format!(
                "Frame sequence gap at index {}: expected {}, got {curr_seq}",
                i + 1,
                prev_seq.wrapping_add(1)
            )));
        }
    }

    Ok(())
}

/// Helper function to check if two RGB colors match within a tolerance.
fn colors_match(actual: (u8, u8, u8), expected: (u8, u8, u8), tolerance: u32) -> bool {
    let (ar, ag, ab) = actual;
    let (er, eg, eb) = expected;

    u32::from(ar.abs_diff(er)) <= tolerance
        && u32::from(ag.abs_diff(eg)) <= tolerance
        && u32::from(ab.abs_diff(eb)) <= tolerance
}
