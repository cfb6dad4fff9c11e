//! Renderer trait - abstraction over rasterization backends
//!
//! A backend consumes [`DrawCommand`]s: the fixed-function state, the
//! attachments to draw into, a shader program, the vertex attribute arrays
//! and the primitive list describing which vertices to fetch.
//!
//! # Architecture
//!
//! ```text
//! caller -> DrawCommand -> Renderer trait -> ReferenceRenderer
//! ```
//!
//! The reference backend is the only implementation; results from other
//! rasterizers are checked against it with `refrast_compare`.

use refrast_core::vertex::VertexAttrib;

use crate::primitives::PrimitiveList;
use crate::render_state::RenderState;
use crate::render_target::RenderTarget;
use crate::shaders::Program;
use crate::Result;

/// Everything one draw call needs.
pub struct DrawCommand<'a, 'b> {
    pub state: &'a RenderState,
    pub render_target: &'a mut RenderTarget<'b>,
    pub program: Program<'a>,
    pub vertex_attribs: &'a [VertexAttrib<'a>],
    pub primitives: PrimitiveList<'a>,
}

impl<'a, 'b> DrawCommand<'a, 'b> {
    pub fn new(
        state: &'a RenderState,
        render_target: &'a mut RenderTarget<'b>,
        program: Program<'a>,
        vertex_attribs: &'a [VertexAttrib<'a>],
        primitives: PrimitiveList<'a>,
    ) -> Self {
        Self {
            state,
            render_target,
            program,
            vertex_attribs,
            primitives,
        }
    }
}

/// Trait for rendering backends
pub trait Renderer {
    /// Backend name for logs and reports
    fn name(&self) -> &str;

    /// Draw a single instance
    fn draw(&mut self, command: DrawCommand<'_, '_>) -> Result<()> {
        self.draw_instanced(command, 1)
    }

    /// Draw `num_instances` instances; vertex shaders see the instance
    /// index in every packet.
    ///
    /// Primitives are not clipped: one with any vertex at `w <= 0` (or a
    /// non-finite `w`) is dropped whole, so geometry crossing the near plane
    /// disappears instead of being cut.
    fn draw_instanced(&mut self, command: DrawCommand<'_, '_>, num_instances: usize) -> Result<()>;
}
