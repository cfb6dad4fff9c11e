//! State a fragment shader sees while shading one primitive.

use refrast_core::types::{GenericVec4, Vec4};

use crate::primitives::BasePrimitive;
use crate::render_state::FaceType;
use crate::shaders::{FragmentPacket, VertexVaryingInfo};

/// Varyings of the primitive's vertices plus the output and depth storage
/// for every packet handed to [`crate::FragmentShader::shade_fragments`].
///
/// Outputs are laid out as `(packet * 4 + frag) * num_outputs + output`,
/// depths as `(packet * 4 + frag) * num_samples + sample`.
pub struct FragmentShadingContext<'a> {
    primitive: BasePrimitive,
    varyings: [&'a [GenericVec4]; 3],
    varying_infos: &'a [VertexVaryingInfo],
    outputs: Vec<GenericVec4>,
    num_outputs: usize,
    fragment_depths: Option<Vec<f32>>,
    num_samples: usize,
    primitive_id: i32,
    visible_face: FaceType,
}

impl<'a> FragmentShadingContext<'a> {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        primitive: BasePrimitive,
        varyings: [&'a [GenericVec4]; 3],
        num_outputs: usize,
        num_packets: usize,
        num_samples: usize,
        fragment_depths: Option<Vec<f32>>,
        primitive_id: i32,
        visible_face: FaceType,
    ) -> Self {
        Self {
            primitive,
            varyings,
            varying_infos: &[],
            outputs: vec![GenericVec4::default(); num_packets * 4 * num_outputs],
            num_outputs,
            fragment_depths,
            num_samples,
            primitive_id,
            visible_face,
        }
    }

    /// Interpolation qualifiers of the varyings; without them every
    /// varying is perspective corrected.
    pub fn with_varying_infos(mut self, varying_infos: &'a [VertexVaryingInfo]) -> Self {
        self.varying_infos = varying_infos;
        self
    }

    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    pub fn num_outputs(&self) -> usize {
        self.num_outputs
    }

    pub fn primitive_id(&self) -> i32 {
        self.primitive_id
    }

    pub fn visible_face(&self) -> FaceType {
        self.visible_face
    }

    /// Interpolated value of a varying at fragment `frag_ndx` of `packet`.
    pub fn read_varying(&self, packet: &FragmentPacket, varying_ndx: usize, frag_ndx: usize) -> Vec4 {
        let noperspective = self.varying_infos.get(varying_ndx).is_some_and(|info| info.noperspective);
        let weights = if noperspective {
            &packet.linear_barycentric
        } else {
            &packet.barycentric
        };
        let value = |vertex: usize| self.varyings[vertex][varying_ndx].to_float();
        let weight = |vertex: usize| weights[vertex][frag_ndx];

        match self.primitive {
            BasePrimitive::Point => value(0),
            BasePrimitive::Line => {
                let (v0, v1) = (value(0), value(1));
                let (b0, b1) = (weight(0), weight(1));
                std::array::from_fn(|c| b0 * v0[c] + b1 * v1[c])
            }
            BasePrimitive::Triangle => {
                let (v0, v1, v2) = (value(0), value(1), value(2));
                let (b0, b1, b2) = (weight(0), weight(1), weight(2));
                std::array::from_fn(|c| b0 * v0[c] + b1 * v1[c] + b2 * v2[c])
            }
        }
    }

    /// Uninterpolated value; flatshaded varyings hold the provoking
    /// vertex's value on every vertex.
    pub fn read_flat_varying(&self, varying_ndx: usize) -> GenericVec4 {
        self.varyings[0][varying_ndx]
    }

    /// Horizontal difference within the packet's fragment pairs.
    pub fn dfdx_varying(&self, packet: &FragmentPacket, varying_ndx: usize, frag_ndx: usize) -> Vec4 {
        let row = frag_ndx & 2;
        let left = self.read_varying(packet, varying_ndx, row);
        let right = self.read_varying(packet, varying_ndx, row + 1);
        std::array::from_fn(|c| right[c] - left[c])
    }

    /// Vertical difference within the packet's fragment columns.
    pub fn dfdy_varying(&self, packet: &FragmentPacket, varying_ndx: usize, frag_ndx: usize) -> Vec4 {
        let column = frag_ndx & 1;
        let top = self.read_varying(packet, varying_ndx, column);
        let bottom = self.read_varying(packet, varying_ndx, column + 2);
        std::array::from_fn(|c| bottom[c] - top[c])
    }

    pub fn write_output(&mut self, packet_ndx: usize, frag_ndx: usize, output_ndx: usize, value: GenericVec4) {
        let ndx = self.output_index(packet_ndx, frag_ndx, output_ndx);
        self.outputs[ndx] = value;
    }

    pub fn output(&self, packet_ndx: usize, frag_ndx: usize, output_ndx: usize) -> GenericVec4 {
        self.outputs[self.output_index(packet_ndx, frag_ndx, output_ndx)]
    }

    /// `None` when the render target has no depth buffer.
    pub fn read_fragment_depth(&self, packet_ndx: usize, frag_ndx: usize, sample_ndx: usize) -> Option<f32> {
        let ndx = self.depth_index(packet_ndx, frag_ndx, sample_ndx);
        self.fragment_depths.as_ref().map(|depths| depths[ndx])
    }

    /// Ignored when the render target has no depth buffer.
    pub fn write_fragment_depth(&mut self, packet_ndx: usize, frag_ndx: usize, sample_ndx: usize, depth: f32) {
        let ndx = self.depth_index(packet_ndx, frag_ndx, sample_ndx);
        if let Some(depths) = self.fragment_depths.as_mut() {
            depths[ndx] = depth;
        }
    }

    pub(crate) fn into_results(self) -> (Vec<GenericVec4>, Option<Vec<f32>>) {
        (self.outputs, self.fragment_depths)
    }

    fn output_index(&self, packet_ndx: usize, frag_ndx: usize, output_ndx: usize) -> usize {
        (packet_ndx * 4 + frag_ndx) * self.num_outputs + output_ndx
    }

    fn depth_index(&self, packet_ndx: usize, frag_ndx: usize, sample_ndx: usize) -> usize {
        (packet_ndx * 4 + frag_ndx) * self.num_samples + sample_ndx
    }
}
