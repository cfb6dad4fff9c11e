//! Color, depth and stencil attachments of a draw call.

use refrast_core::texture::MultisamplePixelBufferAccess;

use crate::{RenderError, Result};

pub const MAX_COLOR_BUFFERS: usize = 4;

/// Attachments lent to the renderer for the duration of a draw.
///
/// A combined depth-stencil buffer is stored once; stencil accessors then
/// return the depth attachment.
#[derive(Debug)]
pub struct RenderTarget<'a> {
    color: Vec<MultisamplePixelBufferAccess<'a>>,
    depth: Option<MultisamplePixelBufferAccess<'a>>,
    stencil: Option<MultisamplePixelBufferAccess<'a>>,
    combined_depth_stencil: bool,
}

impl<'a> RenderTarget<'a> {
    pub fn new(color: MultisamplePixelBufferAccess<'a>) -> Self {
        Self {
            color: vec![color],
            depth: None,
            stencil: None,
            combined_depth_stencil: false,
        }
    }

    pub fn with_depth(mut self, depth: MultisamplePixelBufferAccess<'a>) -> Self {
        self.depth = Some(depth);
        self.combined_depth_stencil = false;
        self
    }

    pub fn with_stencil(mut self, stencil: MultisamplePixelBufferAccess<'a>) -> Self {
        self.stencil = Some(stencil);
        self.combined_depth_stencil = false;
        self
    }

    pub fn with_depth_stencil(mut self, depth_stencil: MultisamplePixelBufferAccess<'a>) -> Self {
        self.depth = Some(depth_stencil);
        self.stencil = None;
        self.combined_depth_stencil = true;
        self
    }

    pub fn add_color_buffer(&mut self, color: MultisamplePixelBufferAccess<'a>) -> Result<()> {
        if self.color.len() >= MAX_COLOR_BUFFERS {
            return Err(RenderError::AttachmentMismatch(format!(
                "at most {} color buffers can be bound",
                MAX_COLOR_BUFFERS
            )));
        }
        self.color.push(color);
        Ok(())
    }

    pub fn num_color_buffers(&self) -> usize {
        self.color.len()
    }

    pub fn color_buffer(&self, ndx: usize) -> Option<&MultisamplePixelBufferAccess<'a>> {
        self.color.get(ndx)
    }

    pub fn color_buffer_mut(&mut self, ndx: usize) -> Option<&mut MultisamplePixelBufferAccess<'a>> {
        self.color.get_mut(ndx)
    }

    pub fn depth_buffer(&self) -> Option<&MultisamplePixelBufferAccess<'a>> {
        self.depth.as_ref()
    }

    pub fn stencil_buffer(&self) -> Option<&MultisamplePixelBufferAccess<'a>> {
        if self.combined_depth_stencil {
            self.depth.as_ref()
        } else {
            self.stencil.as_ref()
        }
    }

    fn attachments(&self) -> impl Iterator<Item = &MultisamplePixelBufferAccess<'a>> {
        self.color
            .iter()
            .chain(self.depth.iter())
            .chain(self.stencil.iter())
            .filter(|buffer| !buffer.is_empty())
    }

    pub fn num_samples(&self) -> usize {
        self.attachments().next().map_or(1, |b| b.num_samples())
    }

    pub fn width(&self) -> usize {
        self.attachments().next().map_or(0, |b| b.width())
    }

    pub fn height(&self) -> usize {
        self.attachments().next().map_or(0, |b| b.height())
    }

    /// Non-empty attachments must agree in size and sample count, and depth
    /// or stencil attachments must carry the matching channel.
    pub fn validate(&self) -> Result<()> {
        let mut attachments = self.attachments();
        if let Some(first) = attachments.next() {
            let shape = (first.width(), first.height(), first.num_samples());
            for other in attachments {
                let other_shape = (other.width(), other.height(), other.num_samples());
                if other_shape != shape {
                    return Err(RenderError::AttachmentMismatch(format!(
                        "attachment {}x{} with {} samples does not match {}x{} with {} samples",
                        other_shape.0, other_shape.1, other_shape.2, shape.0, shape.1, shape.2
                    )));
                }
            }
        }

        if let Some(depth) = &self.depth {
            if !depth.raw().format().has_depth() {
                return Err(RenderError::AttachmentMismatch(
                    "depth attachment has no depth channel".to_string(),
                ));
            }
        }
        if let Some(stencil) = self.stencil_buffer() {
            if !stencil.raw().format().has_stencil() {
                return Err(RenderError::AttachmentMismatch(
                    "stencil attachment has no stencil channel".to_string(),
                ));
            }
        }
        Ok(())
    }

    /// Split borrow of one color buffer and the depth / stencil buffers.
    pub(crate) fn buffers(&mut self, color_ndx: usize) -> Result<TargetBuffers<'_, 'a>> {
        let num_color = self.color.len();
        let color = self.color.get_mut(color_ndx).ok_or_else(|| {
            RenderError::AttachmentMismatch(format!(
                "color buffer {} requested but {} are bound",
                color_ndx, num_color
            ))
        })?;
        Ok(TargetBuffers {
            color,
            depth: self.depth.as_mut(),
            stencil: self.stencil.as_mut(),
            combined_depth_stencil: self.combined_depth_stencil,
        })
    }
}

pub(crate) struct TargetBuffers<'t, 'a> {
    pub color: &'t mut MultisamplePixelBufferAccess<'a>,
    depth: Option<&'t mut MultisamplePixelBufferAccess<'a>>,
    stencil: Option<&'t mut MultisamplePixelBufferAccess<'a>>,
    combined_depth_stencil: bool,
}

impl<'t, 'a> TargetBuffers<'t, 'a> {
    pub fn depth(&mut self) -> Option<&mut MultisamplePixelBufferAccess<'a>> {
        self.depth.as_deref_mut().filter(|b| !b.is_empty())
    }

    pub fn stencil(&mut self) -> Option<&mut MultisamplePixelBufferAccess<'a>> {
        let stencil = if self.combined_depth_stencil {
            self.depth.as_deref_mut()
        } else {
            self.stencil.as_deref_mut()
        };
        stencil.filter(|b| !b.is_empty())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use refrast_core::texture::{ChannelOrder, ChannelType, TextureFormat, TextureLevel};

    fn single(level: &mut TextureLevel) -> MultisamplePixelBufferAccess<'_> {
        MultisamplePixelBufferAccess::from_single_sample_access(level.access_mut()).unwrap()
    }

    #[test]
    fn test_matching_attachments_validate() {
        let mut color = TextureLevel::new(TextureFormat::rgba8(), 4, 4, 1).unwrap();
        let depth_format = TextureFormat::new(ChannelOrder::D, ChannelType::Float);
        let mut depth = TextureLevel::new(depth_format, 4, 4, 1).unwrap();

        let target = RenderTarget::new(single(&mut color)).with_depth(single(&mut depth));
        assert!(target.validate().is_ok());
        assert_eq!(target.num_samples(), 1);
        assert_eq!((target.width(), target.height()), (4, 4));
        assert!(target.stencil_buffer().is_none());
    }

    #[test]
    fn test_size_mismatch_rejected() {
        let mut color = TextureLevel::new(TextureFormat::rgba8(), 4, 4, 1).unwrap();
        let depth_format = TextureFormat::new(ChannelOrder::D, ChannelType::Float);
        let mut depth = TextureLevel::new(depth_format, 4, 2, 1).unwrap();

        let target = RenderTarget::new(single(&mut color)).with_depth(single(&mut depth));
        assert!(matches!(target.validate(), Err(RenderError::AttachmentMismatch(_))));
    }

    #[test]
    fn test_combined_depth_stencil() {
        let mut color = TextureLevel::new(TextureFormat::rgba8(), 2, 2, 1).unwrap();
        let ds_format = TextureFormat::new(ChannelOrder::DS, ChannelType::UnsignedInt248);
        let mut ds = TextureLevel::new(ds_format, 2, 2, 1).unwrap();

        let mut target = RenderTarget::new(single(&mut color)).with_depth_stencil(single(&mut ds));
        assert!(target.validate().is_ok());
        assert!(target.stencil_buffer().is_some());

        let mut buffers = target.buffers(0).unwrap();
        assert!(buffers.depth().is_some());
        assert!(buffers.stencil().is_some());
    }

    #[test]
    fn test_wrong_channel_rejected() {
        let mut color = TextureLevel::new(TextureFormat::rgba8(), 2, 2, 1).unwrap();
        let mut not_depth = TextureLevel::new(TextureFormat::rgba8(), 2, 2, 1).unwrap();
        let target = RenderTarget::new(single(&mut color)).with_depth(single(&mut not_depth));
        assert!(target.validate().is_err());
    }

    #[test]
    fn test_color_buffer_limit() {
        let mut levels: Vec<TextureLevel> = (0..5)
            .map(|_| TextureLevel::new(TextureFormat::rgba8(), 1, 1, 1).unwrap())
            .collect();
        let mut iter = levels.iter_mut();
        let mut target = RenderTarget::new(single(iter.next().unwrap()));
        for (i, level) in iter.enumerate() {
            let result = target.add_color_buffer(single(level));
            assert_eq!(result.is_ok(), i < 3);
        }
        assert_eq!(target.num_color_buffers(), 4);
        assert!(target.buffers(4).is_err());
    }
}
