//! Shader program interface and the packets that flow through it.
//!
//! The renderer never interprets shader code: a vertex shader fills
//! [`VertexPacket`]s from vertex attributes and a fragment shader turns
//! rasterized [`FragmentPacket`]s into output values through a
//! [`FragmentShadingContext`].

use refrast_core::types::{GenericVec4, GenericVecType, Vec4};
use refrast_core::vertex::{read_vertex_attrib, VertexAttrib};

use crate::shading_context::FragmentShadingContext;
use crate::Result;

/// Per-vertex shader input and output.
#[derive(Debug, Clone, PartialEq)]
pub struct VertexPacket {
    pub instance_ndx: usize,
    pub vertex_ndx: usize,
    /// Clip coordinates from the shader, window coordinates with `1 / w`
    /// after the viewport transform.
    pub position: Vec4,
    pub point_size: f32,
    pub primitive_id: i32,
    pub outputs: Vec<GenericVec4>,
}

impl VertexPacket {
    pub fn new(num_outputs: usize) -> Self {
        Self {
            instance_ndx: 0,
            vertex_ndx: 0,
            position: [0.0; 4],
            point_size: 1.0,
            primitive_id: 0,
            outputs: vec![GenericVec4::default(); num_outputs],
        }
    }
}

/// A 2x2 block of fragments. Fragment `i` sits at
/// `position + (i & 1, i >> 1)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FragmentPacket {
    pub position: [i32; 2],
    /// Bit `frag * num_samples + sample`.
    pub coverage: u64,
    /// `barycentric[vertex][frag]`, perspective corrected at pixel centers.
    pub barycentric: [Vec4; 3],
    /// Same layout, linear in window space.
    pub linear_barycentric: [Vec4; 3],
}

impl FragmentPacket {
    pub fn fragment_coverage(&self, frag_ndx: usize, num_samples: usize) -> u32 {
        let mask = if num_samples >= 32 {
            u32::MAX
        } else {
            (1u32 << num_samples) - 1
        };
        ((self.coverage >> (frag_ndx * num_samples)) as u32) & mask
    }

    pub fn is_fragment_covered(&self, frag_ndx: usize, num_samples: usize) -> bool {
        self.fragment_coverage(frag_ndx, num_samples) != 0
    }

    pub fn fragment_position(&self, frag_ndx: usize) -> [i32; 2] {
        [
            self.position[0] + (frag_ndx & 1) as i32,
            self.position[1] + (frag_ndx >> 1) as i32,
        ]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VertexVaryingInfo {
    pub vec_type: GenericVecType,
    /// Take the value of the provoking vertex instead of interpolating.
    pub flatshade: bool,
    /// Interpolate linearly in window space, skipping perspective correction.
    pub noperspective: bool,
}

impl VertexVaryingInfo {
    pub fn smooth(vec_type: GenericVecType) -> Self {
        Self {
            vec_type,
            flatshade: false,
            noperspective: false,
        }
    }

    pub fn flat(vec_type: GenericVecType) -> Self {
        Self {
            flatshade: true,
            ..Self::smooth(vec_type)
        }
    }

    pub fn noperspective(vec_type: GenericVecType) -> Self {
        Self {
            noperspective: true,
            ..Self::smooth(vec_type)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FragmentOutputInfo {
    pub vec_type: GenericVecType,
}

pub trait VertexShader {
    fn outputs(&self) -> &[VertexVaryingInfo];

    /// Fill `position`, `point_size` and `outputs` of every packet.
    fn shade_vertices(&self, inputs: &[VertexAttrib<'_>], packets: &mut [VertexPacket]) -> Result<()>;
}

pub trait FragmentShader {
    fn outputs(&self) -> &[FragmentOutputInfo];

    fn shade_fragments(&self, packets: &[FragmentPacket], context: &mut FragmentShadingContext<'_>);
}

#[derive(Clone, Copy)]
pub struct Program<'a> {
    pub vertex_shader: &'a dyn VertexShader,
    pub fragment_shader: &'a dyn FragmentShader,
}

impl<'a> Program<'a> {
    pub fn new(vertex_shader: &'a dyn VertexShader, fragment_shader: &'a dyn FragmentShader) -> Self {
        Self {
            vertex_shader,
            fragment_shader,
        }
    }
}

/// Passes attribute 0 through as the position and interpolates attribute 1
/// into the single color output.
#[derive(Debug, Clone)]
pub struct ColorInterpolationShader {
    varyings: [VertexVaryingInfo; 1],
    outputs: [FragmentOutputInfo; 1],
}

impl ColorInterpolationShader {
    pub fn new() -> Self {
        Self::with_flatshade(false)
    }

    /// Same shader with the color taken from the provoking vertex.
    pub fn flat() -> Self {
        Self::with_flatshade(true)
    }

    fn with_flatshade(flatshade: bool) -> Self {
        Self {
            varyings: [VertexVaryingInfo {
                flatshade,
                ..VertexVaryingInfo::smooth(GenericVecType::Float)
            }],
            outputs: [FragmentOutputInfo {
                vec_type: GenericVecType::Float,
            }],
        }
    }
}

impl Default for ColorInterpolationShader {
    fn default() -> Self {
        Self::new()
    }
}

impl VertexShader for ColorInterpolationShader {
    fn outputs(&self) -> &[VertexVaryingInfo] {
        &self.varyings
    }

    fn shade_vertices(&self, inputs: &[VertexAttrib<'_>], packets: &mut [VertexPacket]) -> Result<()> {
        for packet in packets.iter_mut() {
            let (instance, vertex) = (packet.instance_ndx, packet.vertex_ndx);
            if let Some(position) = inputs.first() {
                packet.position =
                    read_vertex_attrib(position, instance, vertex, GenericVecType::Float)?.to_float();
            }
            packet.outputs[0] = match inputs.get(1) {
                Some(color) => read_vertex_attrib(color, instance, vertex, GenericVecType::Float)?,
                None => GenericVec4::Float([1.0; 4]),
            };
        }
        Ok(())
    }
}

impl FragmentShader for ColorInterpolationShader {
    fn outputs(&self) -> &[FragmentOutputInfo] {
        &self.outputs
    }

    fn shade_fragments(&self, packets: &[FragmentPacket], context: &mut FragmentShadingContext<'_>) {
        let flat = self.varyings[0].flatshade;
        for (packet_ndx, packet) in packets.iter().enumerate() {
            for frag_ndx in 0..4 {
                if packet.is_fragment_covered(frag_ndx, context.num_samples()) {
                    let color = if flat {
                        context.read_flat_varying(0).to_float()
                    } else {
                        context.read_varying(packet, 0, frag_ndx)
                    };
                    context.write_output(packet_ndx, frag_ndx, 0, GenericVec4::Float(color));
                }
            }
        }
    }
}
