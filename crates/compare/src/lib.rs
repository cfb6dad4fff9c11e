//! Image comparators for checking rendered buffers against a reference
//!
//! Every comparator walks two equally sized pixel buffers, computes a
//! per-channel difference and checks it against a per-channel threshold.
//! The outcome carries the largest difference seen and an RGBA8 error mask:
//! green for passing pixels, red for failing ones, brighter the further the
//! pixel is past its threshold.

pub mod threshold;

use refrast_core::texture::TextureLevel;
use refrast_core::CoreError;
use thiserror::Error;

pub use threshold::{
    float_threshold_compare, float_ulp_threshold_compare, int_threshold_compare, pixel_threshold_compare,
};

#[derive(Error, Debug)]
pub enum CompareError {
    #[error("Reference is {reference:?} but result is {result:?}")]
    SizeMismatch {
        reference: [usize; 3],
        result: [usize; 3],
    },

    #[error(transparent)]
    Core(#[from] CoreError),
}

pub type Result<T> = std::result::Result<T, CompareError>;

pub const MASK_PASS: [u8; 4] = [0, 255, 0, 255];

/// Red level of a failing pixel that only just exceeds its threshold.
pub const MASK_FAIL_MIN_RED: u8 = 96;

/// Outcome of one image comparison.
#[derive(Debug)]
pub struct CompareResult<T> {
    pub passed: bool,
    /// Largest per-channel difference over the whole image.
    pub max_diff: [T; 4],
    pub num_failed: usize,
    /// RGBA8 mask of the same size as the compared images.
    pub error_mask: TextureLevel,
}

impl<T> CompareResult<T> {
    /// Mask color of pixel `(x, y, z)`.
    pub fn mask_pixel(&self, x: usize, y: usize, z: usize) -> [u8; 4] {
        let [r, g, b, a] = self.error_mask.access().get_pixel_int(x, y, z);
        [r as u8, g as u8, b as u8, a as u8]
    }
}

/// Red tint for a failing pixel; `severity` is in `[0, 1]`.
pub(crate) fn fail_color(severity: f32) -> [u8; 4] {
    let span = f32::from(u8::MAX - MASK_FAIL_MIN_RED);
    let severity = if severity.is_nan() { 1.0 } else { severity.clamp(0.0, 1.0) };
    let red = MASK_FAIL_MIN_RED + (severity * span).round() as u8;
    [red, 0, 0, 255]
}
