//! JSON scene description and its rendering
//!
//! A scene is one draw call: framebuffer shape and formats, clear values,
//! the fixed-function state, and a list of colored vertices.

use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};
use refrast_core::texture::{
    clear, clear_depth, clear_stencil, resolve_multisample_color_buffer, ChannelOrder, ChannelType,
    MultisampleConstPixelBufferAccess, MultisamplePixelBufferAccess, TextureFormat, TextureLevel,
};
use refrast_core::types::Vec4;
use refrast_core::vertex::{VertexAttrib, VertexAttribType};
use refrast_renderer::render_state::ViewportState;
use refrast_renderer::shaders::ColorInterpolationShader;
use refrast_renderer::{
    DrawCommand, DrawIndices, IndexType, PrimitiveList, PrimitiveType, Program, ReferenceRenderer, RenderState,
    RenderTarget, Renderer,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SceneVertex {
    pub position: Vec4,
    #[serde(default = "default_vertex_color")]
    pub color: Vec4,
}

fn default_vertex_color() -> Vec4 {
    [1.0, 1.0, 1.0, 1.0]
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SceneConfig {
    pub width: usize,
    pub height: usize,
    pub samples: usize,
    pub color_format: TextureFormat,
    pub depth_format: Option<TextureFormat>,
    pub stencil_format: Option<TextureFormat>,
    pub clear_color: Vec4,
    pub clear_depth: f32,
    pub clear_stencil: i32,
    /// A zero-sized viewport is replaced by one covering the framebuffer.
    pub state: RenderState,
    pub primitive: PrimitiveType,
    pub flatshade: bool,
    pub instances: usize,
    pub vertices: Vec<SceneVertex>,
    pub indices: Option<Vec<u32>>,
}

impl Default for SceneConfig {
    fn default() -> Self {
        Self {
            width: 64,
            height: 64,
            samples: 1,
            color_format: TextureFormat::rgba8(),
            depth_format: None,
            stencil_format: None,
            clear_color: [0.0, 0.0, 0.0, 1.0],
            clear_depth: 1.0,
            clear_stencil: 0,
            state: RenderState::default(),
            primitive: PrimitiveType::Triangles,
            flatshade: false,
            instances: 1,
            vertices: Vec::new(),
            indices: None,
        }
    }
}

impl SceneConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("Failed to read scene {}", path.display()))?;
        Self::from_json_str(&text).with_context(|| format!("Invalid scene {}", path.display()))
    }

    pub fn from_json_str(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    fn effective_state(&self) -> RenderState {
        let mut state = self.state;
        if state.viewport.rect.width == 0 || state.viewport.rect.height == 0 {
            let depth_range = (state.viewport.zn, state.viewport.zf);
            state.viewport = ViewportState::from_size(self.width, self.height);
            (state.viewport.zn, state.viewport.zf) = depth_range;
        }
        state
    }

    /// Storage for one attachment; multisampled levels keep samples on x.
    fn attachment(&self, format: TextureFormat) -> Result<TextureLevel> {
        let level = if self.samples > 1 {
            TextureLevel::new(format, self.samples, self.width, self.height)?
        } else {
            TextureLevel::new(format, self.width, self.height, 1)?
        };
        Ok(level)
    }

    fn wrap<'a>(&self, level: &'a mut TextureLevel) -> Result<MultisamplePixelBufferAccess<'a>> {
        if self.samples > 1 {
            Ok(MultisamplePixelBufferAccess::from_multisample_access(level.access_mut()))
        } else {
            Ok(MultisamplePixelBufferAccess::from_single_sample_access(level.access_mut())?)
        }
    }

    /// Draw the scene and return the resolved single-sample color buffer.
    pub fn render(&self) -> Result<TextureLevel> {
        if self.width == 0 || self.height == 0 {
            bail!("Scene framebuffer must not be empty");
        }
        if self.instances == 0 {
            bail!("Scene must draw at least one instance");
        }

        let mut color = self.attachment(self.color_format)?;
        clear(&mut color.access_mut(), self.clear_color)?;

        let combined = match (self.depth_format, self.stencil_format) {
            (Some(d), Some(s)) => d == s && is_depth_stencil(d),
            _ => false,
        };
        let mut depth = self.depth_format.map(|f| self.attachment(f)).transpose()?;
        let mut stencil = if combined {
            None
        } else {
            self.stencil_format.map(|f| self.attachment(f)).transpose()?
        };
        if let Some(level) = depth.as_mut() {
            clear_depth(&mut level.access_mut(), self.clear_depth);
            if combined {
                clear_stencil(&mut level.access_mut(), self.clear_stencil);
            }
        }
        if let Some(level) = stencil.as_mut() {
            clear_stencil(&mut level.access_mut(), self.clear_stencil);
        }

        let positions: Vec<u8> = self
            .vertices
            .iter()
            .flat_map(|v| v.position)
            .flat_map(f32::to_le_bytes)
            .collect();
        let colors: Vec<u8> = self.vertices.iter().flat_map(|v| v.color).flat_map(f32::to_le_bytes).collect();
        let attribs = [
            VertexAttrib::new(VertexAttribType::Float, 4, &positions),
            VertexAttrib::new(VertexAttribType::Float, 4, &colors),
        ];
        let index_bytes: Vec<u8> = self
            .indices
            .iter()
            .flatten()
            .flat_map(|i| i.to_le_bytes())
            .collect();
        let primitives = match &self.indices {
            Some(indices) => PrimitiveList::from_indices(
                self.primitive,
                indices.len(),
                DrawIndices::new(&index_bytes, IndexType::Uint32),
            ),
            None => PrimitiveList::from_arrays(self.primitive, 0, self.vertices.len()),
        };

        let shader = if self.flatshade {
            ColorInterpolationShader::flat()
        } else {
            ColorInterpolationShader::new()
        };
        let state = self.effective_state();
        let mut renderer = ReferenceRenderer::new();
        log::info!(
            "Drawing {} {:?} vertices x{} into {}x{} ({} samples) with {}",
            self.vertices.len(),
            self.primitive,
            self.instances,
            self.width,
            self.height,
            self.samples,
            renderer.name()
        );

        {
            let mut target = RenderTarget::new(self.wrap(&mut color)?);
            if let Some(level) = depth.as_mut() {
                let access = self.wrap(level)?;
                target = if combined {
                    target.with_depth_stencil(access)
                } else {
                    target.with_depth(access)
                };
            }
            if let Some(level) = stencil.as_mut() {
                target = target.with_stencil(self.wrap(level)?);
            }
            let command = DrawCommand::new(&state, &mut target, Program::new(&shader, &shader), &attribs, primitives);
            renderer.draw_instanced(command, self.instances)?;
        }

        if self.samples <= 1 {
            return Ok(color);
        }
        let mut resolved = TextureLevel::new(self.color_format, self.width, self.height, 1)?;
        let source = MultisampleConstPixelBufferAccess::from_multisample_access(color.access());
        resolve_multisample_color_buffer(&mut resolved.access_mut(), &source)?;
        Ok(resolved)
    }
}

/// Formats accepted for a combined depth-stencil attachment.
fn is_depth_stencil(format: TextureFormat) -> bool {
    format.order == ChannelOrder::DS
        && matches!(
            format.channel_type,
            ChannelType::UnsignedInt248 | ChannelType::FloatUnsignedInt248Rev
        )
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRIANGLE: &str = r#"{
        "width": 4,
        "height": 4,
        "clear_color": [0.0, 0.0, 0.0, 0.0],
        "vertices": [
            { "position": [-1.0, -1.0, 0.0, 1.0], "color": [1.0, 0.0, 0.0, 1.0] },
            { "position": [ 3.0, -1.0, 0.0, 1.0], "color": [1.0, 0.0, 0.0, 1.0] },
            { "position": [-1.0,  3.0, 0.0, 1.0], "color": [1.0, 0.0, 0.0, 1.0] }
        ]
    }"#;

    #[test]
    fn test_scene_defaults() {
        let scene = SceneConfig::from_json_str("{}").unwrap();
        assert_eq!(scene.samples, 1);
        assert_eq!(scene.color_format, TextureFormat::rgba8());
        assert_eq!(scene.primitive, PrimitiveType::Triangles);
        assert!(scene.vertices.is_empty());
    }

    #[test]
    fn test_zero_viewport_fills_framebuffer() {
        let scene = SceneConfig::from_json_str(TRIANGLE).unwrap();
        let state = scene.effective_state();
        assert_eq!((state.viewport.rect.width, state.viewport.rect.height), (4, 4));
        assert_eq!(state.viewport.zf, 1.0);
    }

    #[test]
    fn test_oversized_triangle_covers_target() {
        let scene = SceneConfig::from_json_str(TRIANGLE).unwrap();
        let color = scene.render().unwrap();
        let access = color.access();
        for y in 0..4 {
            for x in 0..4 {
                assert_eq!(access.get_pixel_int(x, y, 0), [255, 0, 0, 255]);
            }
        }
    }

    #[test]
    fn test_multisample_scene_resolves() {
        let mut scene = SceneConfig::from_json_str(TRIANGLE).unwrap();
        scene.samples = 4;
        scene.depth_format = Some(TextureFormat::new(ChannelOrder::DS, ChannelType::UnsignedInt248));
        scene.stencil_format = scene.depth_format;

        let color = scene.render().unwrap();
        assert_eq!(color.size(), [4, 4, 1]);
        assert_eq!(color.access().get_pixel_int(1, 2, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_indexed_scene() {
        let mut scene = SceneConfig::from_json_str(TRIANGLE).unwrap();
        scene.indices = Some(vec![2, 1, 0]);
        scene.state.cull_mode = refrast_renderer::render_state::CullMode::None;
        let color = scene.render().unwrap();
        assert_eq!(color.access().get_pixel_int(0, 0, 0), [255, 0, 0, 255]);
    }

    #[test]
    fn test_bundled_scene_renders() {
        let scene = SceneConfig::from_json_str(include_str!("../scenes/depth_triangles.json")).unwrap();
        assert_eq!(scene.samples, 4);
        assert!(scene.state.frag_ops.depth_test_enabled);
        let color = scene.render().unwrap();
        assert_eq!(color.size(), [128, 128, 1]);
    }

    #[test]
    fn test_empty_framebuffer_rejected() {
        let mut scene = SceneConfig::from_json_str(TRIANGLE).unwrap();
        scene.width = 0;
        assert!(scene.render().is_err());
    }
}
