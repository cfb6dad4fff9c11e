//! Per-fragment operations: scissor, stencil, depth, blending and color
//! write-back into a multisample render target.
//!
//! # Architecture
//!
//! ```text
//! Fragment -> scissor -> stencil compare (sFail) -> depth compare / write
//!          -> stencil dpFail / dpPass -> kill depth failures
//!          -> blend (float buffers) -> masked color write
//! ```
//!
//! Fragments are processed one at a time, each through every stage, so
//! fragments hitting the same sample resolve in submission order.

use refrast_core::logging::{log, LogCategory, LogLevel};
use refrast_core::texture::{
    channel_class, linear_to_srgb, srgb_to_linear, ChannelType, MultisamplePixelBufferAccess,
    TextureChannelClass, TextureFormat,
};
use refrast_core::types::{GenericVec4, IVec4, UVec4, Vec4};

use crate::render_state::{
    BlendEquation, BlendFunc, BlendMode, BlendState, FaceType, FragmentOperationState, StencilOp, StencilState,
};
use crate::render_target::RenderTarget;
use crate::Result;

/// A shaded fragment ready for the per-sample tests.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub pixel_coord: [i32; 2],
    /// Bit per sample.
    pub coverage: u32,
    /// One depth per sample; empty when no depth buffer is bound.
    pub sample_depths: Vec<f32>,
    pub value: GenericVec4,
    pub barycentric: [f32; 3],
}

impl Fragment {
    pub fn new(pixel_coord: [i32; 2], coverage: u32, value: GenericVec4) -> Self {
        Self {
            pixel_coord,
            coverage,
            sample_depths: Vec::new(),
            value,
            barycentric: [1.0, 0.0, 0.0],
        }
    }

    pub fn with_sample_depths(mut self, depths: Vec<f32>) -> Self {
        self.sample_depths = depths;
        self
    }
}

/// How the bound depth buffer stores values.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum DepthPrecision {
    Fixed(u32),
    Float,
}

impl DepthPrecision {
    pub fn of(format: TextureFormat) -> Self {
        match format.channel_type {
            ChannelType::UnormInt16 => DepthPrecision::Fixed(16),
            ChannelType::UnsignedInt248 => DepthPrecision::Fixed(24),
            ChannelType::UnormInt32 => DepthPrecision::Fixed(32),
            _ => DepthPrecision::Float,
        }
    }

    fn quantize(self, depth: f32) -> f32 {
        match self {
            DepthPrecision::Fixed(bits) => {
                let max = ((1u64 << bits) - 1) as f64;
                ((depth as f64 * max).round() / max) as f32
            }
            DepthPrecision::Float => depth,
        }
    }
}

/// Register of one sample's progress through the stages.
#[derive(Debug, Clone, Copy, Default)]
struct SampleData {
    is_alive: bool,
    stencil_passed: bool,
    depth_passed: bool,

    clamped_blend_src: Vec4,
    clamped_blend_dst: Vec4,
    blend_src_factor: Vec4,
    blend_dst_factor: Vec4,
    blended_rgb: [f32; 3],
    blended_a: f32,

    signed_value: IVec4,
    unsigned_value: UVec4,
}

#[derive(Debug, Default)]
pub struct FragmentProcessor {
    samples: Vec<SampleData>,
}

impl FragmentProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `fragments` through every enabled test and write the survivors
    /// into color buffer `color_ndx` of `target`.
    pub fn render(
        &mut self,
        target: &mut RenderTarget<'_>,
        color_ndx: usize,
        fragments: &[Fragment],
        facing: FaceType,
        state: &FragmentOperationState,
    ) -> Result<()> {
        target.validate()?;
        let mut buffers = target.buffers(color_ndx)?;
        let num_samples = buffers.color.num_samples();
        let color_format = buffers.color.raw().format();
        let color_class = channel_class(color_format.channel_type)?;

        let stencil_state = state.stencil_states[facing.index()];
        let stencil_bits = state.num_stencil_bits.min(32);
        let stencil_max = ((1u64 << stencil_bits) - 1) as i64;

        let mut written = 0usize;
        for fragment in fragments {
            let [x, y] = fragment.pixel_coord;
            if x < 0 || y < 0 {
                continue;
            }
            let (x, y) = (x as usize, y as usize);
            if x >= buffers.color.width() || y >= buffers.color.height() {
                continue;
            }

            self.samples.clear();
            self.samples.extend((0..num_samples).map(|s| SampleData {
                is_alive: s < 32 && fragment.coverage & (1 << s) != 0,
                stencil_passed: true,
                depth_passed: true,
                ..SampleData::default()
            }));

            // Scissor rectangles count rows from the bottom of the target.
            let window_y = (buffers.color.height() - 1 - y) as i32;
            if state.scissor_test_enabled && !state.scissor_rectangle.contains(x as i32, window_y) {
                continue;
            }

            if state.stencil_test_enabled {
                if let Some(stencil) = buffers.stencil() {
                    self.stencil_test(stencil, x, y, &stencil_state, stencil_max);
                }
            }

            if state.depth_test_enabled && !fragment.sample_depths.is_empty() {
                if let Some(depth) = buffers.depth() {
                    self.depth_test(depth, x, y, &fragment.sample_depths, state);
                }
            }

            if state.stencil_test_enabled {
                if let Some(stencil) = buffers.stencil() {
                    self.stencil_depth_ops(stencil, x, y, &stencil_state, stencil_max);
                }
            }

            for sample in self.samples.iter_mut() {
                if !sample.depth_passed {
                    sample.is_alive = false;
                }
            }

            match color_class {
                TextureChannelClass::SignedInteger | TextureChannelClass::UnsignedInteger => {
                    self.write_int_color(buffers.color, x, y, fragment.value, color_class, state)
                }
                _ => {
                    self.blend(buffers.color, x, y, fragment.value.to_float(), color_format, state);
                    self.write_float_color(buffers.color, x, y, color_format, state);
                }
            }
            written += self.samples.iter().filter(|s| s.is_alive).count();
        }

        log(LogCategory::Fragment, LogLevel::Trace, || {
            format!(
                "{} fragments into color buffer {}, {} samples written",
                fragments.len(),
                color_ndx,
                written
            )
        });
        Ok(())
    }

    fn stencil_test(
        &mut self,
        stencil: &mut MultisamplePixelBufferAccess<'_>,
        x: usize,
        y: usize,
        st: &StencilState,
        max: i64,
    ) {
        let reference = (st.reference as i64).clamp(0, max);
        for (s, sample) in self.samples.iter_mut().enumerate() {
            if !sample.is_alive {
                continue;
            }
            let current = stencil.raw().get_pix_stencil(s, x, y);
            let masked_ref = reference as u32 & st.comp_mask;
            let masked_buf = current as u32 & st.comp_mask;
            sample.stencil_passed = st.func.compare(masked_ref, masked_buf);
            if !sample.stencil_passed {
                let updated = stencil_op(st.s_fail, reference, current, max);
                let merged = masked_stencil(current, updated, st.write_mask);
                stencil.raw_mut().set_pix_stencil(merged, s, x, y);
                sample.is_alive = false;
            }
        }
    }

    fn depth_test(
        &mut self,
        depth: &mut MultisamplePixelBufferAccess<'_>,
        x: usize,
        y: usize,
        sample_depths: &[f32],
        state: &FragmentOperationState,
    ) {
        let precision = DepthPrecision::of(depth.raw().format());
        for (s, sample) in self.samples.iter_mut().enumerate() {
            if !sample.is_alive {
                continue;
            }
            let Some(&frag_depth) = sample_depths.get(s) else {
                continue;
            };
            let frag_depth = precision.quantize(frag_depth.clamp(0.0, 1.0));
            let buffer_depth = depth.raw().get_pix_depth(s, x, y);
            sample.depth_passed = state.depth_func.compare(frag_depth, buffer_depth);
            if sample.depth_passed && state.depth_mask {
                depth.raw_mut().set_pix_depth(frag_depth, s, x, y);
            }
        }
    }

    fn stencil_depth_ops(
        &mut self,
        stencil: &mut MultisamplePixelBufferAccess<'_>,
        x: usize,
        y: usize,
        st: &StencilState,
        max: i64,
    ) {
        let reference = (st.reference as i64).clamp(0, max);
        for (s, sample) in self.samples.iter().enumerate() {
            if !sample.is_alive {
                continue;
            }
            let op = if sample.depth_passed { st.dp_pass } else { st.dp_fail };
            let current = stencil.raw().get_pix_stencil(s, x, y);
            let updated = stencil_op(op, reference, current, max);
            let merged = masked_stencil(current, updated, st.write_mask);
            stencil.raw_mut().set_pix_stencil(merged, s, x, y);
        }
    }

    fn blend(
        &mut self,
        color: &MultisamplePixelBufferAccess<'_>,
        x: usize,
        y: usize,
        src: Vec4,
        format: TextureFormat,
        state: &FragmentOperationState,
    ) {
        let constant = state.blend_color.map(|c| c.clamp(0.0, 1.0));
        for (s, sample) in self.samples.iter_mut().enumerate() {
            if !sample.is_alive {
                continue;
            }
            if state.blend_mode == BlendMode::None {
                sample.blended_rgb = [src[0], src[1], src[2]];
                sample.blended_a = src[3];
                continue;
            }

            let dst = color.raw().get_pixel(s, x, y);
            let dst = if format.is_srgb() { srgb_to_linear(dst) } else { dst };
            sample.clamped_blend_src = src.map(|c| c.clamp(0.0, 1.0));
            sample.clamped_blend_dst = dst.map(|c| c.clamp(0.0, 1.0));

            let (s_c, d_c) = (sample.clamped_blend_src, sample.clamped_blend_dst);
            let rgb_src = blend_factor(state.blend_rgb_state.src_func, s_c, d_c, constant);
            let rgb_dst = blend_factor(state.blend_rgb_state.dst_func, s_c, d_c, constant);
            let a_src = blend_factor(state.blend_a_state.src_func, s_c, d_c, constant);
            let a_dst = blend_factor(state.blend_a_state.dst_func, s_c, d_c, constant);
            sample.blend_src_factor = [rgb_src[0], rgb_src[1], rgb_src[2], a_src[3]];
            sample.blend_dst_factor = [rgb_dst[0], rgb_dst[1], rgb_dst[2], a_dst[3]];

            let blended: Vec4 = std::array::from_fn(|c| {
                let eq_state: &BlendState = if c < 3 {
                    &state.blend_rgb_state
                } else {
                    &state.blend_a_state
                };
                apply_equation(
                    eq_state.equation,
                    s_c[c],
                    d_c[c],
                    sample.blend_src_factor[c],
                    sample.blend_dst_factor[c],
                )
            });
            sample.blended_rgb = [blended[0], blended[1], blended[2]];
            sample.blended_a = blended[3];
        }
    }

    fn write_float_color(
        &self,
        color: &mut MultisamplePixelBufferAccess<'_>,
        x: usize,
        y: usize,
        format: TextureFormat,
        state: &FragmentOperationState,
    ) {
        let mask = state.color_mask;
        if !mask.iter().any(|&m| m) {
            return;
        }
        for (s, sample) in self.samples.iter().enumerate() {
            if !sample.is_alive {
                continue;
            }
            let [r, g, b] = sample.blended_rgb;
            let mut value = [r, g, b, sample.blended_a];
            if format.is_srgb() {
                value = linear_to_srgb(value);
            }
            if !mask.iter().all(|&m| m) {
                let old = color.raw().get_pixel(s, x, y);
                value = std::array::from_fn(|c| if mask[c] { value[c] } else { old[c] });
            }
            color.raw_mut().set_pixel(value, s, x, y);
        }
    }

    fn write_int_color(
        &mut self,
        color: &mut MultisamplePixelBufferAccess<'_>,
        x: usize,
        y: usize,
        value: GenericVec4,
        class: TextureChannelClass,
        state: &FragmentOperationState,
    ) {
        let mask = state.color_mask;
        if !mask.iter().any(|&m| m) {
            return;
        }
        for (s, sample) in self.samples.iter_mut().enumerate() {
            if !sample.is_alive {
                continue;
            }
            if class == TextureChannelClass::SignedInteger {
                let old = color.raw().get_pixel_int(s, x, y);
                let new = value.to_int();
                sample.signed_value = std::array::from_fn(|c| if mask[c] { new[c] } else { old[c] });
                color.raw_mut().set_pixel_int(sample.signed_value, s, x, y);
            } else {
                let old = color.raw().get_pixel_uint(s, x, y);
                let new = value.to_uint();
                sample.unsigned_value = std::array::from_fn(|c| if mask[c] { new[c] } else { old[c] });
                color.raw_mut().set_pixel_uint(sample.unsigned_value, s, x, y);
            }
        }
    }
}

fn stencil_op(op: StencilOp, reference: i64, current: i32, max: i64) -> i32 {
    let old = current as i64;
    let new = match op {
        StencilOp::Keep => old,
        StencilOp::Zero => 0,
        StencilOp::Replace => reference,
        StencilOp::Incr => (old + 1).min(max),
        StencilOp::Decr => (old - 1).max(0),
        StencilOp::Invert => !old & max,
        StencilOp::IncrWrap => (old + 1) & max,
        StencilOp::DecrWrap => (old - 1) & max,
    };
    new as i32
}

fn masked_stencil(old: i32, new: i32, write_mask: u32) -> i32 {
    ((old as u32 & !write_mask) | (new as u32 & write_mask)) as i32
}

/// Factor as a full vector; component 3 holds the alpha factor.
fn blend_factor(func: BlendFunc, src: Vec4, dst: Vec4, constant: Vec4) -> Vec4 {
    let one_minus = |v: Vec4| v.map(|c| 1.0 - c);
    match func {
        BlendFunc::Zero => [0.0; 4],
        BlendFunc::One => [1.0; 4],
        BlendFunc::SrcColor => src,
        BlendFunc::OneMinusSrcColor => one_minus(src),
        BlendFunc::DstColor => dst,
        BlendFunc::OneMinusDstColor => one_minus(dst),
        BlendFunc::SrcAlpha => [src[3]; 4],
        BlendFunc::OneMinusSrcAlpha => [1.0 - src[3]; 4],
        BlendFunc::DstAlpha => [dst[3]; 4],
        BlendFunc::OneMinusDstAlpha => [1.0 - dst[3]; 4],
        BlendFunc::ConstantColor => constant,
        BlendFunc::OneMinusConstantColor => one_minus(constant),
        BlendFunc::ConstantAlpha => [constant[3]; 4],
        BlendFunc::OneMinusConstantAlpha => [1.0 - constant[3]; 4],
        BlendFunc::SrcAlphaSaturate => {
            let f = src[3].min(1.0 - dst[3]);
            [f, f, f, 1.0]
        }
    }
}

fn apply_equation(equation: BlendEquation, src: f32, dst: f32, src_factor: f32, dst_factor: f32) -> f32 {
    match equation {
        BlendEquation::Add => src * src_factor + dst * dst_factor,
        BlendEquation::Subtract => src * src_factor - dst * dst_factor,
        BlendEquation::ReverseSubtract => dst * dst_factor - src * src_factor,
        BlendEquation::Min => src.min(dst),
        BlendEquation::Max => src.max(dst),
    }
}
