//! Index streams and primitive assembly.
//!
//! Assembly works on handles into the draw call's vertex packet arena, so
//! strips and fans share packets until the renderer makes them distinct.

use serde::{Deserialize, Serialize};

use crate::render_state::ProvokingVertex;
use crate::{RenderError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PrimitiveType {
    Triangles,
    TriangleStrip,
    TriangleFan,
    Lines,
    LineStrip,
    LineLoop,
    Points,
}

impl PrimitiveType {
    pub fn base_primitive(self) -> BasePrimitive {
        match self {
            PrimitiveType::Triangles | PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan => {
                BasePrimitive::Triangle
            }
            PrimitiveType::Lines | PrimitiveType::LineStrip | PrimitiveType::LineLoop => {
                BasePrimitive::Line
            }
            PrimitiveType::Points => BasePrimitive::Point,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndexType {
    Uint8,
    Uint16,
    Uint32,
}

impl IndexType {
    pub fn size(self) -> usize {
        match self {
            IndexType::Uint8 => 1,
            IndexType::Uint16 => 2,
            IndexType::Uint32 => 4,
        }
    }
}

/// Little-endian index buffer plus the base vertex added to every index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DrawIndices<'a> {
    data: &'a [u8],
    index_type: IndexType,
    base_vertex: i32,
}

impl<'a> DrawIndices<'a> {
    pub fn new(data: &'a [u8], index_type: IndexType) -> Self {
        Self {
            data,
            index_type,
            base_vertex: 0,
        }
    }

    pub fn with_base_vertex(mut self, base_vertex: i32) -> Self {
        self.base_vertex = base_vertex;
        self
    }

    pub fn index_type(&self) -> IndexType {
        self.index_type
    }

    pub fn base_vertex(&self) -> i32 {
        self.base_vertex
    }

    /// Number of whole indices in the buffer.
    pub fn len(&self) -> usize {
        self.data.len() / self.index_type.size()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Raw index value, before the base vertex is applied.
    pub fn read_index(&self, ndx: usize) -> Result<u32> {
        if ndx >= self.len() {
            return Err(RenderError::IndexOutOfBounds {
                index: ndx,
                count: self.len(),
            });
        }
        let size = self.index_type.size();
        let b = &self.data[ndx * size..(ndx + 1) * size];
        Ok(match self.index_type {
            IndexType::Uint8 => u32::from(b[0]),
            IndexType::Uint16 => u32::from(u16::from_le_bytes([b[0], b[1]])),
            IndexType::Uint32 => u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum IndexSource<'a> {
    Sequential { first: usize },
    Indexed(DrawIndices<'a>),
}

/// Topology plus the element stream that feeds it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimitiveList<'a> {
    primitive_type: PrimitiveType,
    num_elements: usize,
    source: IndexSource<'a>,
}

impl<'a> PrimitiveList<'a> {
    /// Vertices `first..first + count`.
    pub fn from_arrays(primitive_type: PrimitiveType, first: usize, count: usize) -> Self {
        Self {
            primitive_type,
            num_elements: count,
            source: IndexSource::Sequential { first },
        }
    }

    pub fn from_indices(primitive_type: PrimitiveType, count: usize, indices: DrawIndices<'a>) -> Self {
        Self {
            primitive_type,
            num_elements: count,
            source: IndexSource::Indexed(indices),
        }
    }

    pub fn primitive_type(&self) -> PrimitiveType {
        self.primitive_type
    }

    pub fn num_elements(&self) -> usize {
        self.num_elements
    }

    pub fn index_type(&self) -> Option<IndexType> {
        match self.source {
            IndexSource::Sequential { .. } => None,
            IndexSource::Indexed(indices) => Some(indices.index_type()),
        }
    }

    /// Vertex number of an element, base vertex applied.
    pub fn get_index(&self, element_ndx: usize) -> Result<usize> {
        match self.source {
            IndexSource::Sequential { first } => Ok(first + element_ndx),
            IndexSource::Indexed(indices) => {
                let raw = indices.read_index(element_ndx)?;
                let vertex = i64::from(raw) + i64::from(indices.base_vertex());
                if vertex < 0 {
                    return Err(RenderError::NegativeIndex(vertex));
                }
                Ok(vertex as usize)
            }
        }
    }

    /// Compares the raw index, so the base vertex never creates restarts.
    pub fn is_restart_index(&self, element_ndx: usize, restart_index: u32) -> Result<bool> {
        match self.source {
            IndexSource::Sequential { .. } => Ok(false),
            IndexSource::Indexed(indices) => Ok(indices.read_index(element_ndx)? == restart_index),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BasePrimitive {
    Triangle,
    Line,
    Point,
}

impl BasePrimitive {
    pub fn num_vertices(self) -> usize {
        match self {
            BasePrimitive::Triangle => 3,
            BasePrimitive::Line => 2,
            BasePrimitive::Point => 1,
        }
    }
}

/// Assembled primitive holding handles into the vertex packet arena.
/// Unused trailing handles repeat the last real vertex.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Primitive {
    pub kind: BasePrimitive,
    pub vertices: [usize; 3],
    pub provoking_index: usize,
}

impl Primitive {
    pub fn triangle(v0: usize, v1: usize, v2: usize, provoking_index: usize) -> Self {
        Self {
            kind: BasePrimitive::Triangle,
            vertices: [v0, v1, v2],
            provoking_index,
        }
    }

    pub fn line(v0: usize, v1: usize, provoking_index: usize) -> Self {
        Self {
            kind: BasePrimitive::Line,
            vertices: [v0, v1, v1],
            provoking_index,
        }
    }

    pub fn point(v0: usize) -> Self {
        Self {
            kind: BasePrimitive::Point,
            vertices: [v0; 3],
            provoking_index: 0,
        }
    }

    pub fn handles(&self) -> &[usize] {
        &self.vertices[..self.kind.num_vertices()]
    }

    pub fn handles_mut(&mut self) -> &mut [usize] {
        let n = self.kind.num_vertices();
        &mut self.vertices[..n]
    }

    pub fn provoking_vertex(&self) -> usize {
        self.vertices[self.provoking_index]
    }
}

/// Number of primitives `num_vertices` vertices form.
pub fn primitive_count(primitive_type: PrimitiveType, num_vertices: usize) -> usize {
    match primitive_type {
        PrimitiveType::Triangles => num_vertices / 3,
        PrimitiveType::TriangleStrip | PrimitiveType::TriangleFan => num_vertices.saturating_sub(2),
        PrimitiveType::Lines => num_vertices / 2,
        PrimitiveType::LineStrip => num_vertices.saturating_sub(1),
        PrimitiveType::LineLoop => {
            if num_vertices < 2 {
                0
            } else {
                num_vertices
            }
        }
        PrimitiveType::Points => num_vertices,
    }
}

/// Build primitives from one restart-free run of vertex handles.
pub fn assemble(
    primitive_type: PrimitiveType,
    vertices: &[usize],
    provoking: ProvokingVertex,
    out: &mut Vec<Primitive>,
) {
    let first = provoking == ProvokingVertex::First;
    let n = vertices.len();
    out.reserve(primitive_count(primitive_type, n));

    match primitive_type {
        PrimitiveType::Triangles => {
            for tri in vertices.chunks_exact(3) {
                out.push(Primitive::triangle(tri[0], tri[1], tri[2], if first { 0 } else { 2 }));
            }
        }
        PrimitiveType::TriangleStrip => {
            for i in 0..n.saturating_sub(2) {
                let primitive = if i % 2 == 0 {
                    Primitive::triangle(vertices[i], vertices[i + 1], vertices[i + 2], if first { 0 } else { 2 })
                } else {
                    // Swap the first two to keep the winding consistent
                    Primitive::triangle(vertices[i + 1], vertices[i], vertices[i + 2], if first { 1 } else { 2 })
                };
                out.push(primitive);
            }
        }
        PrimitiveType::TriangleFan => {
            for i in 1..n.saturating_sub(1) {
                out.push(Primitive::triangle(
                    vertices[0],
                    vertices[i],
                    vertices[i + 1],
                    if first { 1 } else { 2 },
                ));
            }
        }
        PrimitiveType::Lines => {
            for line in vertices.chunks_exact(2) {
                out.push(Primitive::line(line[0], line[1], if first { 0 } else { 1 }));
            }
        }
        PrimitiveType::LineStrip | PrimitiveType::LineLoop => {
            if n < 2 {
                return;
            }
            for pair in vertices.windows(2) {
                out.push(Primitive::line(pair[0], pair[1], if first { 0 } else { 1 }));
            }
            if primitive_type == PrimitiveType::LineLoop {
                out.push(Primitive::line(vertices[n - 1], vertices[0], if first { 0 } else { 1 }));
            }
        }
        PrimitiveType::Points => {
            out.extend(vertices.iter().map(|&v| Primitive::point(v)));
        }
    }
}
