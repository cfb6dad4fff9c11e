//! Reference renderer: primitive assembly, rasterization and per-fragment
//! operations on top of `refrast_core` pixel buffers.
//!
//! # Architecture
//!
//! ```text
//! DrawCommand -> Renderer trait -> ReferenceRenderer
//!     vertex shader -> assemble -> rasterize -> fragment shader
//!     -> FragmentProcessor -> RenderTarget
//! ```
//!
//! Shaders are supplied by the caller through the [`shaders::VertexShader`]
//! and [`shaders::FragmentShader`] traits; everything else is fixed
//! function and configured by a serializable [`render_state::RenderState`].

pub mod fragment_ops;
pub mod primitives;
pub mod rasterizer;
pub mod reference_renderer;
pub mod render_state;
pub mod render_target;
pub mod renderer;
pub mod shaders;
pub mod shading_context;

use refrast_core::CoreError;
use thiserror::Error;

pub use fragment_ops::{Fragment, FragmentProcessor};
pub use primitives::{DrawIndices, IndexType, PrimitiveList, PrimitiveType};
pub use reference_renderer::ReferenceRenderer;
pub use render_state::RenderState;
pub use render_target::RenderTarget;
pub use renderer::{DrawCommand, Renderer};
pub use shaders::{FragmentShader, Program, VertexShader};

#[derive(Error, Debug)]
pub enum RenderError {
    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("Render target attachment mismatch: {0}")]
    AttachmentMismatch(String),

    #[error("Negative vertex index {0}")]
    NegativeIndex(i64),

    #[error("Index {index} is outside the index buffer of {count} indices")]
    IndexOutOfBounds { index: usize, count: usize },

    #[error("Shader writes {outputs} outputs but {buffers} color buffers are bound")]
    OutputCountMismatch { outputs: usize, buffers: usize },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, RenderError>;
