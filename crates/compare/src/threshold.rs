//! Per-pixel threshold comparators.

use std::fmt::Debug;

use refrast_core::logging::{log, LogCategory, LogLevel};
use refrast_core::texture::{ConstPixelBufferAccess, TextureFormat, TextureLevel};
use refrast_core::CoreError;

use crate::{fail_color, CompareError, CompareResult, Result, MASK_PASS};

/// A per-channel difference that can be checked against a threshold.
trait ChannelDiff: Copy + Default + PartialOrd + Debug {
    fn max(self, other: Self) -> Self;

    /// How far past `threshold` the difference is, mapped into `[0, 1]`.
    fn severity(self, threshold: Self) -> f32;
}

impl ChannelDiff for u32 {
    fn max(self, other: Self) -> Self {
        Ord::max(self, other)
    }

    fn severity(self, threshold: Self) -> f32 {
        if self == 0 {
            return 0.0;
        }
        1.0 - threshold as f32 / self as f32
    }
}

impl ChannelDiff for f32 {
    fn max(self, other: Self) -> Self {
        if self.is_nan() || other.is_nan() {
            f32::NAN
        } else {
            f32::max(self, other)
        }
    }

    fn severity(self, threshold: Self) -> f32 {
        if self.is_nan() || self.is_infinite() {
            return 1.0;
        }
        if self == 0.0 {
            return 0.0;
        }
        1.0 - threshold / self
    }
}

fn threshold_compare<T, F>(
    name: &str,
    reference: &ConstPixelBufferAccess<'_>,
    result: &ConstPixelBufferAccess<'_>,
    threshold: [T; 4],
    diff: F,
) -> Result<CompareResult<T>>
where
    T: ChannelDiff,
    F: Fn(&ConstPixelBufferAccess<'_>, &ConstPixelBufferAccess<'_>, usize, usize, usize) -> [T; 4],
{
    let size = reference.size();
    if result.size() != size {
        return Err(CompareError::SizeMismatch {
            reference: size,
            result: result.size(),
        });
    }
    let [width, height, depth] = size;

    let mut error_mask = TextureLevel::new(TextureFormat::rgba8(), width, height, depth)?;
    let mut max_diff = [T::default(); 4];
    let mut num_failed = 0;
    {
        let mut mask = error_mask.access_mut();
        for z in 0..depth {
            for y in 0..height {
                for x in 0..width {
                    let d = diff(reference, result, x, y, z);
                    let ok = (0..4).all(|c| d[c] <= threshold[c]);
                    for c in 0..4 {
                        max_diff[c] = max_diff[c].max(d[c]);
                    }

                    let color = if ok {
                        MASK_PASS
                    } else {
                        num_failed += 1;
                        let severity = (0..4)
                            .filter(|&c| !(d[c] <= threshold[c]))
                            .map(|c| d[c].severity(threshold[c]))
                            .fold(0.0f32, |a, b| if b.is_nan() { 1.0 } else { a.max(b) });
                        fail_color(severity)
                    };
                    mask.set_pixel_int(color.map(i32::from), x, y, z);
                }
            }
        }
    }

    let passed = num_failed == 0;
    if passed {
        log(LogCategory::Compare, LogLevel::Debug, || {
            format!("{}: passed, max difference {:?}", name, max_diff)
        });
    } else {
        log(LogCategory::Compare, LogLevel::Info, || {
            format!(
                "{}: {} of {} pixels failed, max difference {:?}, threshold {:?}",
                name,
                num_failed,
                width * height * depth,
                max_diff,
                threshold
            )
        });
    }

    Ok(CompareResult {
        passed,
        max_diff,
        num_failed,
        error_mask,
    })
}

/// Compare integer channel values; normalized formats are compared in
/// their stored integer representation.
pub fn int_threshold_compare(
    reference: &ConstPixelBufferAccess<'_>,
    result: &ConstPixelBufferAccess<'_>,
    threshold: [u32; 4],
) -> Result<CompareResult<u32>> {
    threshold_compare("int threshold compare", reference, result, threshold, |a, b, x, y, z| {
        let (p, q) = (a.get_pixel_int(x, y, z), b.get_pixel_int(x, y, z));
        std::array::from_fn(|c| (i64::from(p[c]) - i64::from(q[c])).unsigned_abs() as u32)
    })
}

/// Compare float channel values by the distance between their bit patterns.
pub fn float_ulp_threshold_compare(
    reference: &ConstPixelBufferAccess<'_>,
    result: &ConstPixelBufferAccess<'_>,
    threshold: [u32; 4],
) -> Result<CompareResult<u32>> {
    threshold_compare("float ulp threshold compare", reference, result, threshold, |a, b, x, y, z| {
        let (p, q) = (a.get_pixel(x, y, z), b.get_pixel(x, y, z));
        std::array::from_fn(|c| p[c].to_bits().abs_diff(q[c].to_bits()))
    })
}

/// Compare float channel values by absolute difference.
pub fn float_threshold_compare(
    reference: &ConstPixelBufferAccess<'_>,
    result: &ConstPixelBufferAccess<'_>,
    threshold: [f32; 4],
) -> Result<CompareResult<f32>> {
    threshold_compare("float threshold compare", reference, result, threshold, |a, b, x, y, z| {
        let (p, q) = (a.get_pixel(x, y, z), b.get_pixel(x, y, z));
        std::array::from_fn(|c| (p[c] - q[c]).abs())
    })
}

/// Integer compare restricted to RGBA8 surfaces.
pub fn pixel_threshold_compare(
    reference: &ConstPixelBufferAccess<'_>,
    result: &ConstPixelBufferAccess<'_>,
    threshold: [u8; 4],
) -> Result<CompareResult<u32>> {
    for format in [reference.format(), result.format()] {
        if format != TextureFormat::rgba8() {
            return Err(CoreError::UnsupportedFormat {
                order: format.order,
                channel_type: format.channel_type,
                operation: "pixel threshold compare",
            }
            .into());
        }
    }
    int_threshold_compare(reference, result, threshold.map(u32::from))
}
