//! End-to-end checks of the draw pipeline
//!
//! These drive the public API only: vertex buffers in, pixels out.

use std::cell::RefCell;

use refrast_core::float::{f32_to_half, half_to_f32};
use refrast_core::texture::{
    clear_depth, resolve_multisample_color_buffer, ChannelOrder, ChannelType, MultisampleConstPixelBufferAccess,
    MultisamplePixelBufferAccess, TextureFormat, TextureLevel,
};
use refrast_core::types::{GenericVec4, GenericVecType, Vec4};
use refrast_core::vertex::{read_vertex_attrib, VertexAttrib, VertexAttribType};
use refrast_renderer::render_state::{FaceType, FragmentOperationState, TestFunc, ViewportState, WindowRectangle};
use refrast_renderer::shaders::{
    ColorInterpolationShader, FragmentOutputInfo, FragmentPacket, VertexPacket, VertexVaryingInfo,
};
use refrast_renderer::shading_context::FragmentShadingContext;
use refrast_renderer::{
    DrawCommand, Fragment, FragmentProcessor, FragmentShader, PrimitiveList, PrimitiveType, Program,
    ReferenceRenderer, RenderState, RenderTarget, Renderer, VertexShader,
};

fn float_bytes(values: &[f32]) -> Vec<u8> {
    values.iter().flat_map(|v| v.to_le_bytes()).collect()
}

fn float_color(width: usize, height: usize) -> TextureLevel {
    TextureLevel::new(TextureFormat::new(ChannelOrder::RGBA, ChannelType::Float), width, height, 1).unwrap()
}

fn single(level: &mut TextureLevel) -> MultisamplePixelBufferAccess<'_> {
    MultisamplePixelBufferAccess::from_single_sample_access(level.access_mut()).unwrap()
}

fn fullscreen_quad(z: f32) -> Vec<u8> {
    float_bytes(&[
        -1.0, -1.0, z, 1.0, //
        1.0, -1.0, z, 1.0, //
        -1.0, 1.0, z, 1.0, //
        1.0, 1.0, z, 1.0,
    ])
}

/// Fragment shader that records every covered fragment's barycentrics.
struct RecordingShader {
    outputs: [FragmentOutputInfo; 1],
    seen: RefCell<Vec<([i32; 2], [f32; 3])>>,
}

impl RecordingShader {
    fn new() -> Self {
        Self {
            outputs: [FragmentOutputInfo {
                vec_type: GenericVecType::Float,
            }],
            seen: RefCell::new(Vec::new()),
        }
    }
}

impl FragmentShader for RecordingShader {
    fn outputs(&self) -> &[FragmentOutputInfo] {
        &self.outputs
    }

    fn shade_fragments(&self, packets: &[FragmentPacket], context: &mut FragmentShadingContext<'_>) {
        for (packet_ndx, packet) in packets.iter().enumerate() {
            for frag in 0..4 {
                if !packet.is_fragment_covered(frag, context.num_samples()) {
                    continue;
                }
                let b = [
                    packet.barycentric[0][frag],
                    packet.barycentric[1][frag],
                    packet.barycentric[2][frag],
                ];
                self.seen.borrow_mut().push((packet.fragment_position(frag), b));
                context.write_output(packet_ndx, frag, 0, GenericVec4::Float([1.0; 4]));
            }
        }
    }
}

#[test]
fn test_depth_less_keeps_first_fragment() {
    let mut color = float_color(1, 1);
    let depth_format = TextureFormat::new(ChannelOrder::D, ChannelType::Float);
    let mut depth = TextureLevel::new(depth_format, 1, 1, 1).unwrap();
    clear_depth(&mut depth.access_mut(), 1.0);

    let state = FragmentOperationState {
        depth_test_enabled: true,
        depth_func: TestFunc::Less,
        depth_mask: true,
        ..FragmentOperationState::default()
    };
    let a = Fragment::new([0, 0], 1, GenericVec4::Float([1.0, 0.0, 0.0, 1.0])).with_sample_depths(vec![0.2]);
    let b = Fragment::new([0, 0], 1, GenericVec4::Float([0.0, 0.0, 1.0, 1.0])).with_sample_depths(vec![0.5]);

    let mut target = RenderTarget::new(single(&mut color)).with_depth(single(&mut depth));
    FragmentProcessor::new()
        .render(&mut target, 0, &[a, b], FaceType::Front, &state)
        .unwrap();
    drop(target);

    assert_eq!(depth.access().get_pix_depth(0, 0, 0), 0.2);
    assert_eq!(color.access().get_pixel(0, 0, 0), [1.0, 0.0, 0.0, 1.0]);
}

#[test]
fn test_half_float_round_trip() {
    let half = f32_to_half(1.0);
    assert_eq!(half_to_f32(half), 1.0);
}

#[test]
fn test_quad_produces_four_fragments() {
    let mut color = float_color(2, 2);
    let positions = fullscreen_quad(0.0);
    let attribs = [VertexAttrib::new(VertexAttribType::Float, 4, &positions)];
    let vertex_shader = ColorInterpolationShader::new();
    let fragment_shader = RecordingShader::new();
    let state = RenderState::new(ViewportState::from_size(2, 2));

    let mut target = RenderTarget::new(single(&mut color));
    ReferenceRenderer::new()
        .draw_quads(
            &state,
            &mut target,
            Program::new(&vertex_shader, &fragment_shader),
            &attribs,
            0,
            4,
        )
        .unwrap();

    let mut seen = fragment_shader.seen.into_inner();
    assert_eq!(seen.len(), 4);
    seen.sort_by_key(|(p, _)| *p);
    let positions: Vec<[i32; 2]> = seen.iter().map(|(p, _)| *p).collect();
    assert_eq!(positions, vec![[0, 0], [0, 1], [1, 0], [1, 1]]);
    for (_, b) in seen {
        assert!((b.iter().sum::<f32>() - 1.0).abs() < 1e-5);
        assert!(b.iter().all(|&w| w >= 0.0));
    }
}

#[test]
fn test_multisample_edge_resolves_to_partial_coverage() {
    let num_samples = 4;
    let mut samples = TextureLevel::new(
        TextureFormat::new(ChannelOrder::RGBA, ChannelType::Float),
        num_samples,
        4,
        4,
    )
    .unwrap();
    // Triangle covering the upper-left half of a 4x4 target.
    let positions = float_bytes(&[
        -1.0, -1.0, 0.0, 1.0, //
        1.0, 1.0, 0.0, 1.0, //
        -1.0, 1.0, 0.0, 1.0,
    ]);
    let attribs = [VertexAttrib::new(VertexAttribType::Float, 4, &positions)];
    let shader = ColorInterpolationShader::new();
    let state = RenderState::new(ViewportState::from_size(4, 4));

    {
        let access = MultisamplePixelBufferAccess::from_multisample_access(samples.access_mut());
        let mut target = RenderTarget::new(access);
        let command = DrawCommand::new(
            &state,
            &mut target,
            Program::new(&shader, &shader),
            &attribs,
            PrimitiveList::from_arrays(PrimitiveType::Triangles, 0, 3),
        );
        ReferenceRenderer::new().draw(command).unwrap();
    }

    let mut resolved = float_color(4, 4);
    let source = MultisampleConstPixelBufferAccess::from_multisample_access(samples.access());
    resolve_multisample_color_buffer(&mut resolved.access_mut(), &source).unwrap();

    let access = resolved.access();
    // Pixels with x + y == 3 straddle the hypotenuse; two of four samples land inside.
    for (x, y) in [(0, 0), (1, 1), (0, 2)] {
        assert!((access.get_pixel(x, y, 0)[3] - 1.0).abs() < 1e-6);
    }
    for (x, y) in [(3, 1), (2, 2), (3, 3)] {
        assert_eq!(access.get_pixel(x, y, 0)[3], 0.0);
    }
    for (x, y) in [(0, 3), (1, 2), (2, 1), (3, 0)] {
        let alpha = access.get_pixel(x, y, 0)[3];
        assert!((alpha - 0.5).abs() < 1e-6, "pixel ({}, {}) alpha {}", x, y, alpha);
    }
}

/// Offsets each instance to the right by the attribute in slot 2.
struct InstancedShader {
    varyings: [VertexVaryingInfo; 1],
    outputs: [FragmentOutputInfo; 1],
}

impl VertexShader for InstancedShader {
    fn outputs(&self) -> &[VertexVaryingInfo] {
        &self.varyings
    }

    fn shade_vertices(
        &self,
        inputs: &[VertexAttrib<'_>],
        packets: &mut [VertexPacket],
    ) -> refrast_renderer::Result<()> {
        for packet in packets.iter_mut() {
            let (instance, vertex) = (packet.instance_ndx, packet.vertex_ndx);
            let position = read_vertex_attrib(&inputs[0], instance, vertex, GenericVecType::Float)?.to_float();
            let offset = read_vertex_attrib(&inputs[1], instance, vertex, GenericVecType::Float)?.to_float();
            packet.position = [position[0] + offset[0], position[1], position[2], position[3]];
            packet.outputs[0] = GenericVec4::Float([1.0, 1.0, 1.0, 1.0]);
        }
        Ok(())
    }
}

impl FragmentShader for InstancedShader {
    fn outputs(&self) -> &[FragmentOutputInfo] {
        &self.outputs
    }

    fn shade_fragments(&self, packets: &[FragmentPacket], context: &mut FragmentShadingContext<'_>) {
        for (packet_ndx, packet) in packets.iter().enumerate() {
            for frag in 0..4 {
                if packet.is_fragment_covered(frag, context.num_samples()) {
                    let white = context.read_flat_varying(0);
                    context.write_output(packet_ndx, frag, 0, white);
                }
            }
        }
    }
}

#[test]
fn test_instanced_points() {
    let mut color = float_color(4, 1);
    // One point at the first pixel center, moved one pixel per instance.
    let positions = float_bytes(&[-0.75, 0.0, 0.0, 1.0]);
    let offsets = float_bytes(&[0.0, 0.5, 1.0, 1.5]);
    let attribs = [
        VertexAttrib::new(VertexAttribType::Float, 4, &positions),
        VertexAttrib::new(VertexAttribType::Float, 1, &offsets).with_instance_divisor(1),
    ];
    let shader = InstancedShader {
        varyings: [VertexVaryingInfo::flat(GenericVecType::Float)],
        outputs: [FragmentOutputInfo {
            vec_type: GenericVecType::Float,
        }],
    };
    let state = RenderState::new(ViewportState::from_size(4, 1));

    let mut target = RenderTarget::new(single(&mut color));
    let command = DrawCommand::new(
        &state,
        &mut target,
        Program::new(&shader, &shader),
        &attribs,
        PrimitiveList::from_arrays(PrimitiveType::Points, 0, 1),
    );
    ReferenceRenderer::new().draw_instanced(command, 3).unwrap();
    drop(target);

    let access = color.access();
    let lit: Vec<bool> = (0..4).map(|x| access.get_pixel(x, 0, 0)[3] == 1.0).collect();
    assert_eq!(lit, vec![true, true, true, false]);
}

/// Writes the flat color to output 0 and its inverse to output 1.
struct TwoOutputShader {
    outputs: [FragmentOutputInfo; 2],
}

impl FragmentShader for TwoOutputShader {
    fn outputs(&self) -> &[FragmentOutputInfo] {
        &self.outputs
    }

    fn shade_fragments(&self, packets: &[FragmentPacket], context: &mut FragmentShadingContext<'_>) {
        for (packet_ndx, packet) in packets.iter().enumerate() {
            for frag in 0..4 {
                if !packet.is_fragment_covered(frag, context.num_samples()) {
                    continue;
                }
                let c: Vec4 = context.read_flat_varying(0).to_float();
                context.write_output(packet_ndx, frag, 0, GenericVec4::Float(c));
                context.write_output(
                    packet_ndx,
                    frag,
                    1,
                    GenericVec4::Float([1.0 - c[0], 1.0 - c[1], 1.0 - c[2], c[3]]),
                );
            }
        }
    }
}

#[test]
fn test_multiple_color_outputs() {
    let mut color0 = float_color(2, 2);
    let mut color1 = float_color(2, 2);
    let positions = fullscreen_quad(0.0);
    let attribs = [
        VertexAttrib::new(VertexAttribType::Float, 4, &positions),
        VertexAttrib::generic(GenericVec4::Float([0.25, 0.5, 1.0, 1.0])),
    ];
    let vertex_shader = ColorInterpolationShader::flat();
    let fragment_shader = TwoOutputShader {
        outputs: [FragmentOutputInfo {
            vec_type: GenericVecType::Float,
        }; 2],
    };
    let state = RenderState::new(ViewportState::from_size(2, 2));

    let mut target = RenderTarget::new(single(&mut color0));
    target.add_color_buffer(single(&mut color1)).unwrap();
    ReferenceRenderer::new()
        .draw_quads(
            &state,
            &mut target,
            Program::new(&vertex_shader, &fragment_shader),
            &attribs,
            0,
            4,
        )
        .unwrap();
    drop(target);

    assert_eq!(color0.access().get_pixel(1, 1, 0), [0.25, 0.5, 1.0, 1.0]);
    assert_eq!(color1.access().get_pixel(1, 1, 0), [0.75, 0.5, 0.0, 1.0]);
}

fn written_rows(level: &TextureLevel) -> Vec<usize> {
    let access = level.access();
    (0..access.height())
        .filter(|&y| (0..access.width()).any(|x| access.get_pixel(x, y, 0)[3] != 0.0))
        .collect()
}

fn draw_fullscreen_quad(state: &RenderState, color: &mut TextureLevel) {
    let positions = fullscreen_quad(0.0);
    let attribs = [VertexAttrib::new(VertexAttribType::Float, 4, &positions)];
    let shader = ColorInterpolationShader::new();
    let mut target = RenderTarget::new(single(color));
    ReferenceRenderer::new()
        .draw_quads(state, &mut target, Program::new(&shader, &shader), &attribs, 0, 4)
        .unwrap();
}

#[test]
fn test_viewport_origin_counts_from_target_bottom() {
    let mut state = RenderState::new(ViewportState::from_size(4, 4));

    state.viewport.rect = WindowRectangle::new(0, 0, 4, 2);
    let mut color = float_color(4, 4);
    draw_fullscreen_quad(&state, &mut color);
    assert_eq!(written_rows(&color), vec![2, 3]);

    state.viewport.rect = WindowRectangle::new(0, 2, 4, 2);
    let mut color = float_color(4, 4);
    draw_fullscreen_quad(&state, &mut color);
    assert_eq!(written_rows(&color), vec![0, 1]);
}

#[test]
fn test_scissor_matching_viewport_keeps_every_fragment() {
    let mut state = RenderState::new(ViewportState::from_size(4, 4));
    state.viewport.rect = WindowRectangle::new(0, 1, 4, 2);
    state.frag_ops.scissor_test_enabled = true;
    state.frag_ops.scissor_rectangle = state.viewport.rect;

    let mut color = float_color(4, 4);
    draw_fullscreen_quad(&state, &mut color);
    assert_eq!(written_rows(&color), vec![1, 2]);
    let access = color.access();
    for y in 1..3 {
        for x in 0..4 {
            assert_eq!(access.get_pixel(x, y, 0)[3], 1.0);
        }
    }
}

/// Interpolates attribute 1 twice, perspective corrected into output 0 and
/// linearly in window space into output 1.
struct InterpolationModeShader {
    varyings: [VertexVaryingInfo; 2],
    outputs: [FragmentOutputInfo; 2],
}

impl VertexShader for InterpolationModeShader {
    fn outputs(&self) -> &[VertexVaryingInfo] {
        &self.varyings
    }

    fn shade_vertices(
        &self,
        inputs: &[VertexAttrib<'_>],
        packets: &mut [VertexPacket],
    ) -> refrast_renderer::Result<()> {
        for packet in packets.iter_mut() {
            let (instance, vertex) = (packet.instance_ndx, packet.vertex_ndx);
            packet.position = read_vertex_attrib(&inputs[0], instance, vertex, GenericVecType::Float)?.to_float();
            let value = read_vertex_attrib(&inputs[1], instance, vertex, GenericVecType::Float)?;
            packet.outputs[0] = value;
            packet.outputs[1] = value;
        }
        Ok(())
    }
}

impl FragmentShader for InterpolationModeShader {
    fn outputs(&self) -> &[FragmentOutputInfo] {
        &self.outputs
    }

    fn shade_fragments(&self, packets: &[FragmentPacket], context: &mut FragmentShadingContext<'_>) {
        for (packet_ndx, packet) in packets.iter().enumerate() {
            for frag in 0..4 {
                if !packet.is_fragment_covered(frag, context.num_samples()) {
                    continue;
                }
                for output in 0..2 {
                    let v = context.read_varying(packet, output, frag)[0];
                    context.write_output(packet_ndx, frag, output, GenericVec4::Float([v, 0.0, 0.0, 1.0]));
                }
            }
        }
    }
}

#[test]
fn test_noperspective_varying_is_screen_linear() {
    let mut smooth = float_color(4, 4);
    let mut linear = float_color(4, 4);
    // Fullscreen on screen, but the right edge sits at w = 2.
    let positions = float_bytes(&[
        -1.0, -1.0, 0.0, 1.0, //
        2.0, -2.0, 0.0, 2.0, //
        -1.0, 1.0, 0.0, 1.0, //
        2.0, 2.0, 0.0, 2.0,
    ]);
    let values = float_bytes(&[0.0, 1.0, 0.0, 1.0]);
    let attribs = [
        VertexAttrib::new(VertexAttribType::Float, 4, &positions),
        VertexAttrib::new(VertexAttribType::Float, 1, &values),
    ];
    let shader = InterpolationModeShader {
        varyings: [
            VertexVaryingInfo::smooth(GenericVecType::Float),
            VertexVaryingInfo::noperspective(GenericVecType::Float),
        ],
        outputs: [FragmentOutputInfo {
            vec_type: GenericVecType::Float,
        }; 2],
    };
    let state = RenderState::new(ViewportState::from_size(4, 4));

    let mut target = RenderTarget::new(single(&mut smooth));
    target.add_color_buffer(single(&mut linear)).unwrap();
    ReferenceRenderer::new()
        .draw_quads(&state, &mut target, Program::new(&shader, &shader), &attribs, 0, 4)
        .unwrap();
    drop(target);

    for y in 0..4 {
        for x in 0..4 {
            let t = (x as f32 + 0.5) / 4.0;
            let expected_smooth = t * 0.5 / ((1.0 - t) + t * 0.5);
            let got_linear = linear.access().get_pixel(x, y, 0)[0];
            let got_smooth = smooth.access().get_pixel(x, y, 0)[0];
            assert!((got_linear - t).abs() < 1e-4, "linear ({}, {}) = {}", x, y, got_linear);
            assert!((got_smooth - expected_smooth).abs() < 1e-4, "smooth ({}, {}) = {}", x, y, got_smooth);
        }
    }
    assert!(smooth.access().get_pixel(1, 0, 0)[0] < linear.access().get_pixel(1, 0, 0)[0] - 0.1);
}

#[test]
fn test_render_state_round_trips_through_json() {
    let mut state = RenderState::new(ViewportState::from_size(8, 8));
    state.frag_ops.depth_test_enabled = true;
    state.frag_ops.depth_func = TestFunc::Gequal;
    let json = state.to_json_string().unwrap();
    assert_eq!(RenderState::from_json_str(&json).unwrap(), state);
}
