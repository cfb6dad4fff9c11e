//! Multisample views: a 3D pixel buffer addressed `(sample, x, y)`.
//!
//! A multisample buffer is stored as a `TextureLevel` of size
//! `samples x width x height`, so the first dimension walks the samples of
//! one pixel. Single-sample images are wrapped by treating their rows as
//! the second and third dimension.

use crate::error::CoreError;
use crate::types::Vec4;
use crate::Result;

use super::access::{ConstPixelBufferAccess, PixelBufferAccess};

/// Read-only multisample view.
#[derive(Debug, Clone, Copy)]
pub struct MultisampleConstPixelBufferAccess<'a> {
    access: ConstPixelBufferAccess<'a>,
}

/// Read-write multisample view.
#[derive(Debug)]
pub struct MultisamplePixelBufferAccess<'a> {
    access: PixelBufferAccess<'a>,
}

fn single_sample_shape(size: [usize; 3], pitch: [usize; 3]) -> ([usize; 3], [usize; 3]) {
    ([1, size[0], size[1]], [pitch[0], pitch[0], pitch[1]])
}

impl<'a> MultisampleConstPixelBufferAccess<'a> {
    /// Wrap an access whose x dimension already holds samples.
    pub fn from_multisample_access(access: ConstPixelBufferAccess<'a>) -> Self {
        Self { access }
    }

    /// Wrap a plain 2D image as a one-sample buffer.
    pub fn from_single_sample_access(access: ConstPixelBufferAccess<'a>) -> Result<Self> {
        let (size, pitch) = single_sample_shape(access.size(), access.pitch());
        Ok(Self {
            access: access.reshape(size, pitch)?,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.access.width()
    }

    pub fn width(&self) -> usize {
        self.access.height()
    }

    pub fn height(&self) -> usize {
        self.access.depth()
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_empty()
    }

    pub fn raw(&self) -> ConstPixelBufferAccess<'a> {
        self.access
    }
}

impl<'a> MultisamplePixelBufferAccess<'a> {
    pub fn from_multisample_access(access: PixelBufferAccess<'a>) -> Self {
        Self { access }
    }

    pub fn from_single_sample_access(access: PixelBufferAccess<'a>) -> Result<Self> {
        let (size, pitch) = single_sample_shape(access.size(), access.pitch());
        Ok(Self {
            access: access.reshape(size, pitch)?,
        })
    }

    pub fn num_samples(&self) -> usize {
        self.access.width()
    }

    pub fn width(&self) -> usize {
        self.access.height()
    }

    pub fn height(&self) -> usize {
        self.access.depth()
    }

    pub fn is_empty(&self) -> bool {
        self.access.is_empty()
    }

    pub fn raw(&self) -> ConstPixelBufferAccess<'_> {
        self.access.as_const()
    }

    pub fn raw_mut(&mut self) -> PixelBufferAccess<'_> {
        self.access.reborrow()
    }

    pub fn as_const(&self) -> MultisampleConstPixelBufferAccess<'_> {
        MultisampleConstPixelBufferAccess {
            access: self.access.as_const(),
        }
    }

    pub fn reborrow(&mut self) -> MultisamplePixelBufferAccess<'_> {
        MultisamplePixelBufferAccess {
            access: self.access.reborrow(),
        }
    }
}

/// Average every pixel's samples into a single-sample destination.
pub fn resolve_multisample_color_buffer(
    dst: &mut PixelBufferAccess<'_>,
    src: &MultisampleConstPixelBufferAccess<'_>,
) -> Result<()> {
    if dst.width() != src.width() || dst.height() != src.height() {
        return Err(CoreError::SizeMismatch(
            [dst.width(), dst.height(), 1],
            [src.width(), src.height(), 1],
        ));
    }
    let samples = src.num_samples();
    if samples == 0 {
        return Ok(());
    }
    let raw = src.raw();
    let scale = 1.0 / samples as f32;
    for y in 0..src.height() {
        for x in 0..src.width() {
            let mut sum: Vec4 = [0.0; 4];
            for s in 0..samples {
                let value = raw.get_pixel(s, x, y);
                for c in 0..4 {
                    sum[c] += value[c];
                }
            }
            dst.set_pixel(sum.map(|c| c * scale), x, y, 0);
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::texture::access::TextureLevel;
    use crate::texture::format::TextureFormat;

    #[test]
    fn test_single_sample_wrapping() {
        let mut level = TextureLevel::new(TextureFormat::rgba8(), 3, 2, 1).unwrap();
        {
            let mut ms = MultisamplePixelBufferAccess::from_single_sample_access(level.access_mut())
                .unwrap();
            assert_eq!(ms.num_samples(), 1);
            assert_eq!((ms.width(), ms.height()), (3, 2));
            ms.raw_mut().set_pixel_int([9, 8, 7, 6], 0, 2, 1);
        }
        assert_eq!(level.access().get_pixel_int(2, 1, 0), [9, 8, 7, 6]);
    }

    #[test]
    fn test_multisample_dimensions() {
        let level = TextureLevel::new(TextureFormat::rgba8(), 4, 5, 6).unwrap();
        let ms = MultisampleConstPixelBufferAccess::from_multisample_access(level.access());
        assert_eq!(ms.num_samples(), 4);
        assert_eq!(ms.width(), 5);
        assert_eq!(ms.height(), 6);
        assert!(!ms.is_empty());
    }

    #[test]
    fn test_resolve_averages_samples() {
        let mut samples = TextureLevel::new(TextureFormat::rgba8(), 4, 2, 2).unwrap();
        {
            let mut access = samples.access_mut();
            for s in 0..4 {
                let v = if s < 2 { 1.0 } else { 0.0 };
                access.set_pixel([v, 1.0, 0.0, 1.0], s, 1, 1);
            }
        }
        let ms = MultisampleConstPixelBufferAccess::from_multisample_access(samples.access());
        let mut resolved = TextureLevel::new(TextureFormat::rgba8(), 2, 2, 1).unwrap();
        resolve_multisample_color_buffer(&mut resolved.access_mut(), &ms).unwrap();
        assert_eq!(resolved.access().get_pixel_int(1, 1, 0), [128, 255, 0, 255]);
        assert_eq!(resolved.access().get_pixel_int(0, 0, 0), [0, 0, 0, 0]);
    }

    #[test]
    fn test_resolve_size_mismatch() {
        let samples = TextureLevel::new(TextureFormat::rgba8(), 2, 2, 2).unwrap();
        let ms = MultisampleConstPixelBufferAccess::from_multisample_access(samples.access());
        let mut resolved = TextureLevel::new(TextureFormat::rgba8(), 3, 2, 1).unwrap();
        assert!(resolve_multisample_color_buffer(&mut resolved.access_mut(), &ms).is_err());
    }
}
