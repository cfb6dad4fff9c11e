//! Reference rendering backend
//!
//! Runs the whole fixed-function pipeline on the CPU, one primitive at a
//! time, in submission order:
//!
//! ```text
//! vertex shader -> assemble -> distinct shared vertices -> primitive ids
//!   -> flatshade -> window transform -> rasterize -> polygon offset
//!   -> depth clamp -> fragment shader -> FragmentProcessor per output
//! ```

use refrast_core::float::{EncodedFloat, FLOAT32};
use refrast_core::logging::{log, LogCategory, LogLevel};
use refrast_core::types::{GenericVec4, Vec4};
use refrast_core::vertex::VertexAttrib;

use crate::fragment_ops::{DepthPrecision, Fragment, FragmentProcessor};
use crate::primitives::{assemble, BasePrimitive, DrawIndices, IndexType, Primitive, PrimitiveList, PrimitiveType};
use crate::rasterizer::{LineRasterizer, PointRasterizer, RasterRegion, TriangleRasterizer};
use crate::render_state::{CullMode, FaceType, FragmentOperationState, RenderState, ViewportState};
use crate::render_target::RenderTarget;
use crate::renderer::{DrawCommand, Renderer};
use crate::shaders::{FragmentPacket, Program, VertexPacket};
use crate::shading_context::FragmentShadingContext;
use crate::{RenderError, Result};

/// Determinants smaller than this treat the triangle as edge-on.
const DEPTH_SLOPE_EPSILON: f32 = 1e-4;

/// Software reference renderer
#[derive(Debug, Default)]
pub struct ReferenceRenderer {
    fragment_processor: FragmentProcessor,
}

/// Per-draw setup shared by every restart-free run.
struct DrawContext<'c> {
    state: &'c RenderState,
    program: Program<'c>,
    vertex_attribs: &'c [VertexAttrib<'c>],
    primitive_type: PrimitiveType,
    num_samples: usize,
    target_height: usize,
    depth_precision: Option<DepthPrecision>,
    triangles: TriangleRasterizer,
    lines: LineRasterizer,
    points: PointRasterizer,
}

impl ReferenceRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Draw `count / 4` quads from consecutive vertices starting at `first`.
    /// Each quad lists its corners as bottom-left, bottom-right, top-left,
    /// top-right and is split into two counter-clockwise triangles.
    pub fn draw_quads(
        &mut self,
        state: &RenderState,
        render_target: &mut RenderTarget<'_>,
        program: Program<'_>,
        vertex_attribs: &[VertexAttrib<'_>],
        first: usize,
        count: usize,
    ) -> Result<()> {
        let mut index_bytes = Vec::with_capacity(count / 4 * 6 * 4);
        for quad in 0..count / 4 {
            let base = (first + quad * 4) as u32;
            let (bl, br, tl, tr) = (base, base + 1, base + 2, base + 3);
            for index in [tl, bl, tr, tr, bl, br] {
                index_bytes.extend_from_slice(&index.to_le_bytes());
            }
        }

        let indices = DrawIndices::new(&index_bytes, IndexType::Uint32);
        let primitives = PrimitiveList::from_indices(PrimitiveType::Triangles, count / 4 * 6, indices);
        self.draw(DrawCommand::new(state, render_target, program, vertex_attribs, primitives))
    }

    fn draw_run(
        &mut self,
        ctx: &DrawContext<'_>,
        target: &mut RenderTarget<'_>,
        instance_ndx: usize,
        vertex_indices: &[usize],
        next_primitive_id: &mut i32,
    ) -> Result<()> {
        let vertex_shader = ctx.program.vertex_shader;
        let varyings = vertex_shader.outputs();

        let mut packets: Vec<VertexPacket> = vertex_indices
            .iter()
            .map(|&vertex_ndx| VertexPacket {
                instance_ndx,
                vertex_ndx,
                point_size: ctx.state.point.point_size,
                ..VertexPacket::new(varyings.len())
            })
            .collect();
        vertex_shader.shade_vertices(ctx.vertex_attribs, &mut packets)?;

        let handles: Vec<usize> = (0..packets.len()).collect();
        let mut primitives = Vec::new();
        assemble(
            ctx.primitive_type,
            &handles,
            ctx.state.provoking_vertex_convention,
            &mut primitives,
        );
        make_shared_vertices_distinct(&mut primitives, &mut packets);

        for primitive in &primitives {
            let id = *next_primitive_id;
            *next_primitive_id += 1;
            for &handle in primitive.handles() {
                packets[handle].primitive_id = id;
            }
        }

        for primitive in &primitives {
            let provoking = primitive.provoking_vertex();
            for (varying_ndx, info) in varyings.iter().enumerate() {
                if !info.flatshade {
                    continue;
                }
                let value = packets[provoking].outputs[varying_ndx];
                for &handle in primitive.handles() {
                    packets[handle].outputs[varying_ndx] = value;
                }
            }
        }

        for packet in packets.iter_mut() {
            packet.position = window_transform(packet.position, &ctx.state.viewport, ctx.target_height);
        }

        log(LogCategory::Assembly, LogLevel::Trace, || {
            format!(
                "Instance {}: {} vertices assembled into {} primitives",
                instance_ndx,
                packets.len(),
                primitives.len()
            )
        });

        for primitive in &primitives {
            self.draw_primitive(ctx, target, primitive, &packets)?;
        }
        Ok(())
    }

    fn draw_primitive(
        &mut self,
        ctx: &DrawContext<'_>,
        target: &mut RenderTarget<'_>,
        primitive: &Primitive,
        packets: &[VertexPacket],
    ) -> Result<()> {
        let handles = primitive.handles();
        if handles
            .iter()
            .any(|&h| !(packets[h].position[3] > 0.0 && packets[h].position[3].is_finite()))
        {
            log(LogCategory::Raster, LogLevel::Trace, || {
                "Discarding primitive with a vertex behind the eye".to_string()
            });
            return Ok(());
        }

        let vertex = |i: usize| &packets[handles[i.min(handles.len() - 1)]];
        let mut fragment_packets = Vec::new();
        let mut depths = Vec::new();

        let face = match primitive.kind {
            BasePrimitive::Triangle => {
                let (p0, p1, p2) = (vertex(0).position, vertex(1).position, vertex(2).position);
                let Some(setup) = ctx.triangles.setup(p0, p1, p2) else {
                    return Ok(());
                };
                let face = setup.visible_face();
                let culled = match ctx.state.cull_mode {
                    CullMode::None => false,
                    CullMode::Front => face == FaceType::Front,
                    CullMode::Back => face == FaceType::Back,
                };
                if culled {
                    return Ok(());
                }
                ctx.triangles.rasterize(&setup, &mut fragment_packets, &mut depths);

                let frag_ops = &ctx.state.frag_ops;
                if frag_ops.polygon_offset_enabled {
                    if let Some(precision) = ctx.depth_precision {
                        let offset = polygon_offset(p0, p1, p2, precision, frag_ops);
                        for depth in depths.iter_mut() {
                            *depth = (*depth + offset).clamp(0.0, 1.0);
                        }
                    }
                }
                face
            }
            BasePrimitive::Line => {
                ctx.lines
                    .rasterize(vertex(0).position, vertex(1).position, &mut fragment_packets, &mut depths);
                FaceType::Front
            }
            BasePrimitive::Point => {
                let v = vertex(0);
                ctx.points
                    .rasterize(v.position, v.point_size, &mut fragment_packets, &mut depths);
                FaceType::Front
            }
        };

        if fragment_packets.is_empty() {
            return Ok(());
        }

        if ctx.state.frag_ops.depth_clamp_enabled {
            let viewport = &ctx.state.viewport;
            let (lo, hi) = (viewport.zn.min(viewport.zf), viewport.zn.max(viewport.zf));
            for depth in depths.iter_mut() {
                *depth = depth.clamp(lo, hi);
            }
        }

        let fragment_shader = ctx.program.fragment_shader;
        let output_infos = fragment_shader.outputs();
        let num_outputs = output_infos.len();
        let mut shading = FragmentShadingContext::new(
            primitive.kind,
            [
                &vertex(0).outputs[..],
                &vertex(1).outputs[..],
                &vertex(2).outputs[..],
            ],
            num_outputs,
            fragment_packets.len(),
            ctx.num_samples,
            ctx.depth_precision.map(|_| depths),
            packets[handles[0]].primitive_id,
            face,
        )
        .with_varying_infos(ctx.program.vertex_shader.outputs());
        fragment_shader.shade_fragments(&fragment_packets, &mut shading);
        let (outputs, depths) = shading.into_results();

        for (output_ndx, info) in output_infos.iter().enumerate() {
            let fragments = collect_fragments(
                &fragment_packets,
                &outputs,
                depths.as_deref(),
                ctx.num_samples,
                num_outputs,
                output_ndx,
            )
            .map(|mut fragment| {
                fragment.value = fragment.value.convert(info.vec_type);
                fragment
            })
            .collect::<Vec<_>>();

            let pass_state = if output_ndx + 1 < num_outputs {
                without_depth_stencil_writes(&ctx.state.frag_ops)
            } else {
                ctx.state.frag_ops
            };
            self.fragment_processor
                .render(target, output_ndx, &fragments, face, &pass_state)?;
        }
        Ok(())
    }
}

impl Renderer for ReferenceRenderer {
    fn name(&self) -> &str {
        "Reference"
    }

    fn draw_instanced(&mut self, command: DrawCommand<'_, '_>, num_instances: usize) -> Result<()> {
        let DrawCommand {
            state,
            render_target,
            program,
            vertex_attribs,
            primitives,
        } = command;

        render_target.validate()?;
        let outputs = program.fragment_shader.outputs().len();
        let buffers = render_target.num_color_buffers();
        if outputs != buffers {
            return Err(RenderError::OutputCountMismatch { outputs, buffers });
        }

        let num_samples = render_target.num_samples();
        let region = RasterRegion::new(&state.viewport, render_target.width(), render_target.height());
        let ctx = DrawContext {
            state,
            program,
            vertex_attribs,
            primitive_type: primitives.primitive_type(),
            num_samples,
            target_height: render_target.height(),
            depth_precision: render_target
                .depth_buffer()
                .map(|depth| DepthPrecision::of(depth.raw().format())),
            triangles: TriangleRasterizer::new(region, num_samples, state.rasterization)?,
            lines: LineRasterizer::new(region, num_samples, state.line.line_width)?,
            points: PointRasterizer::new(region, num_samples)?,
        };

        log(LogCategory::Assembly, LogLevel::Debug, || {
            format!(
                "{}: {} elements of {:?} x {} instances",
                self.name(),
                primitives.num_elements(),
                primitives.primitive_type(),
                num_instances
            )
        });

        let mut run = Vec::new();
        for instance_ndx in 0..num_instances {
            let mut next_primitive_id = 0;
            run.clear();
            for element in 0..primitives.num_elements() {
                if state.restart.enabled && primitives.is_restart_index(element, state.restart.restart_index)? {
                    if !run.is_empty() {
                        self.draw_run(&ctx, render_target, instance_ndx, &run, &mut next_primitive_id)?;
                        run.clear();
                    }
                    continue;
                }
                run.push(primitives.get_index(element)?);
            }
            if !run.is_empty() {
                self.draw_run(&ctx, render_target, instance_ndx, &run, &mut next_primitive_id)?;
            }
        }
        Ok(())
    }
}

/// Give every primitive its own copy of vertices it shares with an
/// earlier primitive, so per-primitive writes stay local.
fn make_shared_vertices_distinct(primitives: &mut [Primitive], packets: &mut Vec<VertexPacket>) {
    let mut used = vec![false; packets.len()];
    for primitive in primitives.iter_mut() {
        for handle in primitive.handles_mut() {
            if used[*handle] {
                let copy = packets[*handle].clone();
                packets.push(copy);
                *handle = packets.len() - 1;
            } else {
                used[*handle] = true;
            }
        }
    }
}

/// Clip coordinates to window coordinates with y flipped around the
/// target height; `w` becomes `1 / w`.
fn window_transform(clip: Vec4, viewport: &ViewportState, target_height: usize) -> Vec4 {
    let rect = viewport.rect;
    let (w, h) = (rect.width as f32, rect.height as f32);
    let inv_w = 1.0 / clip[3];
    let ndc = [clip[0] * inv_w, clip[1] * inv_w, clip[2] * inv_w];
    [
        ndc[0] * w / 2.0 + (rect.left as f32 + w / 2.0),
        target_height as f32 - (ndc[1] * h / 2.0 + (rect.bottom as f32 + h / 2.0)),
        ndc[2] * (viewport.zf - viewport.zn) / 2.0 + (viewport.zn + viewport.zf) / 2.0,
        inv_w,
    ]
}

/// Largest of |dz/dx| and |dz/dy| over a window-space triangle.
fn triangle_depth_slope(p0: Vec4, p1: Vec4, p2: Vec4) -> f32 {
    let (x1, y1, z1) = (p1[0] - p0[0], p1[1] - p0[1], p1[2] - p0[2]);
    let (x2, y2, z2) = (p2[0] - p0[0], p2[1] - p0[1], p2[2] - p0[2]);
    let det = x1 * y2 - x2 * y1;
    if det.abs() < DEPTH_SLOPE_EPSILON {
        return 0.0;
    }
    let dzdx = (z1 * y2 - z2 * y1) / det;
    let dzdy = (x1 * z2 - x2 * z1) / det;
    dzdx.abs().max(dzdy.abs())
}

fn minimum_resolvable_difference(precision: DepthPrecision, max_depth: f32) -> f32 {
    match precision {
        DepthPrecision::Fixed(bits) => (2.0f64).powi(-(bits as i32)) as f32,
        DepthPrecision::Float => {
            let exponent = EncodedFloat::from_f32(FLOAT32, max_depth).exponent();
            (2.0f64).powi(exponent - 23) as f32
        }
    }
}

fn polygon_offset(p0: Vec4, p1: Vec4, p2: Vec4, precision: DepthPrecision, state: &FragmentOperationState) -> f32 {
    let max_depth = p0[2].abs().max(p1[2].abs()).max(p2[2].abs());
    triangle_depth_slope(p0, p1, p2) * state.polygon_offset_factor
        + minimum_resolvable_difference(precision, max_depth) * state.polygon_offset_units
}

fn without_depth_stencil_writes(state: &FragmentOperationState) -> FragmentOperationState {
    let mut pass = *state;
    pass.depth_mask = false;
    for stencil in pass.stencil_states.iter_mut() {
        stencil.write_mask = 0;
    }
    pass
}

fn collect_fragments<'p>(
    packets: &'p [FragmentPacket],
    outputs: &'p [GenericVec4],
    depths: Option<&'p [f32]>,
    num_samples: usize,
    num_outputs: usize,
    output_ndx: usize,
) -> impl Iterator<Item = Fragment> + 'p {
    packets.iter().enumerate().flat_map(move |(packet_ndx, packet)| {
        (0..4).filter_map(move |frag_ndx| {
            let coverage = packet.fragment_coverage(frag_ndx, num_samples);
            if coverage == 0 {
                return None;
            }
            let slot = packet_ndx * 4 + frag_ndx;
            let sample_depths = depths
                .map(|d| d[slot * num_samples..(slot + 1) * num_samples].to_vec())
                .unwrap_or_default();
            Some(Fragment {
                pixel_coord: packet.fragment_position(frag_ndx),
                coverage,
                sample_depths,
                value: outputs[slot * num_outputs + output_ndx],
                barycentric: std::array::from_fn(|v| packet.barycentric[v][frag_ndx]),
            })
        })
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render_state::{TestFunc, WindowRectangle};
    use crate::shaders::ColorInterpolationShader;
    use refrast_core::texture::{ChannelOrder, ChannelType, MultisamplePixelBufferAccess, TextureFormat, TextureLevel};
    use refrast_core::vertex::VertexAttribType;

    fn float_bytes(values: &[f32]) -> Vec<u8> {
        values.iter().flat_map(|v| v.to_le_bytes()).collect()
    }

    fn color_level(size: usize) -> TextureLevel {
        TextureLevel::new(TextureFormat::new(ChannelOrder::RGBA, ChannelType::Float), size, size, 1).unwrap()
    }

    fn single(level: &mut TextureLevel) -> MultisamplePixelBufferAccess<'_> {
        MultisamplePixelBufferAccess::from_single_sample_access(level.access_mut()).unwrap()
    }

    fn assert_near(actual: Vec4, expected: Vec4) {
        for c in 0..4 {
            assert!((actual[c] - expected[c]).abs() < 1e-5, "{:?} != {:?}", actual, expected);
        }
    }

    fn count_written(level: &TextureLevel) -> usize {
        let access = level.access();
        let mut n = 0;
        for y in 0..access.height() {
            for x in 0..access.width() {
                if access.get_pixel(x, y, 0)[3] != 0.0 {
                    n += 1;
                }
            }
        }
        n
    }

    #[test]
    fn test_reference_renderer_creation() {
        let renderer = ReferenceRenderer::new();
        assert_eq!(renderer.name(), "Reference");
    }

    #[test]
    fn test_fullscreen_quad_covers_target() {
        let mut color = color_level(4);
        let positions = float_bytes(&[
            -1.0, -1.0, 0.0, 1.0, //
            1.0, -1.0, 0.0, 1.0, //
            -1.0, 1.0, 0.0, 1.0, //
            1.0, 1.0, 0.0, 1.0,
        ]);
        let attribs = [
            VertexAttrib::new(VertexAttribType::Float, 4, &positions),
            VertexAttrib::generic(GenericVec4::Float([0.0, 1.0, 0.0, 1.0])),
        ];
        let shader = ColorInterpolationShader::new();
        let state = RenderState::new(ViewportState::from_size(4, 4));
        let mut target = RenderTarget::new(single(&mut color));

        let mut renderer = ReferenceRenderer::new();
        renderer
            .draw_quads(&state, &mut target, Program::new(&shader, &shader), &attribs, 0, 4)
            .unwrap();
        drop(target);
        assert_eq!(count_written(&color), 16);
        assert_near(color.access().get_pixel(2, 1, 0), [0.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_back_face_culling() {
        let mut color = color_level(4);
        // Clockwise in normalized device coordinates.
        let positions = float_bytes(&[
            -1.0, -1.0, 0.0, 1.0, //
            -1.0, 1.0, 0.0, 1.0, //
            1.0, -1.0, 0.0, 1.0,
        ]);
        let attribs = [VertexAttrib::new(VertexAttribType::Float, 4, &positions)];
        let shader = ColorInterpolationShader::new();
        let mut state = RenderState::new(ViewportState::from_size(4, 4));
        state.cull_mode = CullMode::Back;
        let mut target = RenderTarget::new(single(&mut color));

        let mut renderer = ReferenceRenderer::new();
        let command = DrawCommand::new(
            &state,
            &mut target,
            Program::new(&shader, &shader),
            &attribs,
            PrimitiveList::from_arrays(PrimitiveType::Triangles, 0, 3),
        );
        renderer.draw(command).unwrap();
        drop(target);
        assert_eq!(count_written(&color), 0);
    }

    #[test]
    fn test_flatshade_uses_provoking_vertex() {
        let mut color = color_level(4);
        let positions = float_bytes(&[
            -1.0, -1.0, 0.0, 1.0, //
            1.0, -1.0, 0.0, 1.0, //
            -1.0, 1.0, 0.0, 1.0,
        ]);
        let colors = float_bytes(&[
            1.0, 0.0, 0.0, 1.0, //
            0.0, 1.0, 0.0, 1.0, //
            0.0, 0.0, 1.0, 1.0,
        ]);
        let attribs = [
            VertexAttrib::new(VertexAttribType::Float, 4, &positions),
            VertexAttrib::new(VertexAttribType::Float, 4, &colors),
        ];
        let shader = ColorInterpolationShader::flat();
        let state = RenderState::new(ViewportState::from_size(4, 4));
        let mut target = RenderTarget::new(single(&mut color));

        let mut renderer = ReferenceRenderer::new();
        let command = DrawCommand::new(
            &state,
            &mut target,
            Program::new(&shader, &shader),
            &attribs,
            PrimitiveList::from_arrays(PrimitiveType::Triangles, 0, 3),
        );
        renderer.draw(command).unwrap();
        drop(target);
        // Last vertex provokes by default; NDC bottom-left lands on the last row.
        assert_eq!(color.access().get_pixel(0, 3, 0), [0.0, 0.0, 1.0, 1.0]);
    }

    #[test]
    fn test_restart_splits_strip() {
        let mut color = color_level(4);
        let positions = float_bytes(&[
            -1.0, -1.0, 0.0, 1.0, //
            0.0, -1.0, 0.0, 1.0, //
            -1.0, 0.0, 0.0, 1.0, //
            0.0, 0.0, 0.0, 1.0, //
            1.0, 1.0, 0.0, 1.0,
        ]);
        let attribs = [VertexAttrib::new(VertexAttribType::Float, 4, &positions)];
        let indices = [0u8, 1, 2, 0xff, 3, 4];
        let shader = ColorInterpolationShader::new();
        let mut state = RenderState::new(ViewportState::from_size(4, 4));
        state.restart.enabled = true;
        state.restart.restart_index = 0xff;
        let mut target = RenderTarget::new(single(&mut color));

        let mut renderer = ReferenceRenderer::new();
        let command = DrawCommand::new(
            &state,
            &mut target,
            Program::new(&shader, &shader),
            &attribs,
            PrimitiveList::from_indices(
                PrimitiveType::TriangleStrip,
                indices.len(),
                DrawIndices::new(&indices, IndexType::Uint8),
            ),
        );
        renderer.draw(command).unwrap();
        drop(target);
        // Only the first run forms a triangle: the lower-left quadrant's half.
        let written = count_written(&color);
        assert!(written > 0 && written < 4);
    }

    #[test]
    fn test_primitive_behind_eye_dropped_whole() {
        let mut color = color_level(4);
        // Only the last vertex is behind the eye; the rest of the triangle
        // would cover most of the target.
        let positions = float_bytes(&[
            -1.0, -1.0, 0.0, 1.0, //
            1.0, -1.0, 0.0, 1.0, //
            -1.0, 1.0, 0.0, -1.0,
        ]);
        let attribs = [VertexAttrib::new(VertexAttribType::Float, 4, &positions)];
        let shader = ColorInterpolationShader::new();
        let state = RenderState::new(ViewportState::from_size(4, 4));
        let mut target = RenderTarget::new(single(&mut color));

        let mut renderer = ReferenceRenderer::new();
        let command = DrawCommand::new(
            &state,
            &mut target,
            Program::new(&shader, &shader),
            &attribs,
            PrimitiveList::from_arrays(PrimitiveType::Triangles, 0, 3),
        );
        renderer.draw(command).unwrap();
        drop(target);
        assert_eq!(count_written(&color), 0);
    }

    #[test]
    fn test_output_count_mismatch() {
        let mut color0 = color_level(2);
        let mut color1 = color_level(2);
        let mut target = RenderTarget::new(single(&mut color0));
        target.add_color_buffer(single(&mut color1)).unwrap();
        let shader = ColorInterpolationShader::new();
        let state = RenderState::new(ViewportState::from_size(2, 2));
        let mut renderer = ReferenceRenderer::new();
        let command = DrawCommand::new(
            &state,
            &mut target,
            Program::new(&shader, &shader),
            &[],
            PrimitiveList::from_arrays(PrimitiveType::Points, 0, 1),
        );
        assert!(matches!(
            renderer.draw(command),
            Err(RenderError::OutputCountMismatch { outputs: 1, buffers: 2 })
        ));
    }

    #[test]
    fn test_depth_test_across_draws() {
        let mut color = color_level(2);
        let depth_format = TextureFormat::new(ChannelOrder::D, ChannelType::Float);
        let mut depth = TextureLevel::new(depth_format, 2, 2, 1).unwrap();
        refrast_core::texture::clear_depth(&mut depth.access_mut(), 1.0);

        let mut state = RenderState::new(ViewportState::from_size(2, 2));
        state.frag_ops.depth_test_enabled = true;
        state.frag_ops.depth_func = TestFunc::Less;
        let shader = ColorInterpolationShader::new();
        let mut renderer = ReferenceRenderer::new();
        let mut target = RenderTarget::new(single(&mut color)).with_depth(single(&mut depth));

        for (z, rgb) in [(-0.6, [1.0, 0.0, 0.0]), (0.0, [0.0, 1.0, 0.0])] {
            let positions = float_bytes(&[
                -1.0, -1.0, z, 1.0, //
                1.0, -1.0, z, 1.0, //
                -1.0, 1.0, z, 1.0, //
                1.0, 1.0, z, 1.0,
            ]);
            let attribs = [
                VertexAttrib::new(VertexAttribType::Float, 4, &positions),
                VertexAttrib::generic(GenericVec4::Float([rgb[0], rgb[1], rgb[2], 1.0])),
            ];
            renderer
                .draw_quads(&state, &mut target, Program::new(&shader, &shader), &attribs, 0, 4)
                .unwrap();
        }
        drop(target);
        assert!((depth.access().get_pix_depth(1, 1, 0) - 0.2).abs() < 1e-6);
        assert_near(color.access().get_pixel(1, 1, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_window_transform() {
        let viewport = ViewportState {
            rect: WindowRectangle::new(0, 0, 4, 2),
            zn: 0.0,
            zf: 1.0,
        };
        let p = window_transform([1.0, 1.0, 0.0, 2.0], &viewport, 2);
        assert_eq!(p, [3.0, 0.5, 0.5, 0.5]);
        // The lower half of a taller target sits on its last rows.
        let p = window_transform([1.0, 1.0, 0.0, 2.0], &viewport, 4);
        assert_eq!(p, [3.0, 2.5, 0.5, 0.5]);
    }

    #[test]
    fn test_depth_slope_and_offset() {
        let p0 = [0.0, 0.0, 0.0, 1.0];
        let p1 = [4.0, 0.0, 1.0, 1.0];
        let p2 = [0.0, 4.0, 0.5, 1.0];
        assert_eq!(triangle_depth_slope(p0, p1, p2), 0.25);
        assert_eq!(triangle_depth_slope(p0, p0, p2), 0.0);

        assert_eq!(minimum_resolvable_difference(DepthPrecision::Fixed(16), 0.5), 1.0 / 65536.0);
        assert_eq!(minimum_resolvable_difference(DepthPrecision::Float, 1.0), (2.0f32).powi(-23));

        let state = FragmentOperationState {
            polygon_offset_factor: 2.0,
            polygon_offset_units: 1.0,
            ..FragmentOperationState::default()
        };
        let offset = polygon_offset(p0, p1, p2, DepthPrecision::Fixed(24), &state);
        assert!((offset - (0.5 + (2.0f32).powi(-24))).abs() < 1e-7);
    }

    #[test]
    fn test_shared_vertices_made_distinct() {
        let mut packets = vec![VertexPacket::new(0); 4];
        let mut primitives = Vec::new();
        assemble(
            PrimitiveType::TriangleStrip,
            &[0, 1, 2, 3],
            crate::render_state::ProvokingVertex::Last,
            &mut primitives,
        );
        make_shared_vertices_distinct(&mut primitives, &mut packets);

        let mut seen: Vec<usize> = primitives.iter().flat_map(|p| p.handles().to_vec()).collect();
        let total = seen.len();
        seen.sort();
        seen.dedup();
        assert_eq!(seen.len(), total);
        assert_eq!(packets.len(), 6);
    }
}
