//! Vertex attribute decoding.
//!
//! An attribute either points into a borrowed byte buffer or carries a
//! generic constant value. Reads are bounds checked, little-endian and
//! produce a [`GenericVec4`] in the lane the shader asked for.
//!
//! # Encodings
//!
//! - **Float lane only**: `Float`, `Half`, `Fixed` (16.16), `Double`, the
//!   normalized `Nonpure*` types and the non-normalized `NonpureInt*` /
//!   `NonpureUint*` types
//! - **Integer lanes**: the `Pure*` types
//! - **Packed**: `*2101010Rev*` types hold x in bits 0..10, y in 10..20,
//!   z in 20..30 and w in 30..32 and require `size == 4`
//!
//! Missing components default to `(0, 0, 0, 1)`.

use crate::error::CoreError;
use crate::float::half_to_f32;
use crate::logging::{log, LogCategory, LogLevel};
use crate::types::{GenericVec4, GenericVecType, Vec4};
use crate::Result;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum VertexAttribType {
    Float,
    Half,
    Fixed,
    Double,

    NonpureUnorm8,
    NonpureUnorm16,
    NonpureUnorm32,
    NonpureUnorm2101010Rev,

    NonpureSnorm8Clamp,
    NonpureSnorm16Clamp,
    NonpureSnorm32Clamp,
    NonpureSnorm2101010RevClamp,

    NonpureSnorm8Scale,
    NonpureSnorm16Scale,
    NonpureSnorm32Scale,
    NonpureSnorm2101010RevScale,

    NonpureUint8,
    NonpureUint16,
    NonpureUint32,

    NonpureInt8,
    NonpureInt16,
    NonpureInt32,

    NonpureUint2101010Rev,
    NonpureInt2101010Rev,

    PureUint8,
    PureUint16,
    PureUint32,

    PureInt8,
    PureInt16,
    PureInt32,

    NonpureUnorm8Bgra,
    NonpureUnorm2101010RevBgra,
    NonpureSnorm2101010RevClampBgra,
    NonpureSnorm2101010RevScaleBgra,

    /// Generic attribute readable as any lane.
    DontCare,
}

impl VertexAttribType {
    pub fn is_packed(self) -> bool {
        use VertexAttribType::*;
        matches!(
            self,
            NonpureUnorm2101010Rev
                | NonpureSnorm2101010RevClamp
                | NonpureSnorm2101010RevScale
                | NonpureUint2101010Rev
                | NonpureInt2101010Rev
                | NonpureUnorm2101010RevBgra
                | NonpureSnorm2101010RevClampBgra
                | NonpureSnorm2101010RevScaleBgra
        )
    }

    pub fn is_pure_integer(self) -> bool {
        use VertexAttribType::*;
        matches!(
            self,
            PureUint8 | PureUint16 | PureUint32 | PureInt8 | PureInt16 | PureInt32
        )
    }

    fn is_bgra(self) -> bool {
        use VertexAttribType::*;
        matches!(
            self,
            NonpureUnorm8Bgra
                | NonpureUnorm2101010RevBgra
                | NonpureSnorm2101010RevClampBgra
                | NonpureSnorm2101010RevScaleBgra
        )
    }

    /// Whether values of this type may be read into `lane`.
    pub fn supports_lane(self, lane: GenericVecType) -> bool {
        match self {
            VertexAttribType::DontCare => true,
            t if t.is_pure_integer() => lane != GenericVecType::Float,
            _ => lane == GenericVecType::Float,
        }
    }
}

/// Bytes per component; packed types count a quarter of their 32-bit word.
pub fn component_size(attrib_type: VertexAttribType) -> Result<usize> {
    use VertexAttribType::*;
    match attrib_type {
        Float | Fixed => Ok(4),
        Half => Ok(2),
        Double => Ok(8),
        NonpureUnorm8 | NonpureSnorm8Clamp | NonpureSnorm8Scale | NonpureUint8 | NonpureInt8
        | PureUint8 | PureInt8 | NonpureUnorm8Bgra => Ok(1),
        NonpureUnorm16 | NonpureSnorm16Clamp | NonpureSnorm16Scale | NonpureUint16
        | NonpureInt16 | PureUint16 | PureInt16 => Ok(2),
        NonpureUnorm32 | NonpureSnorm32Clamp | NonpureSnorm32Scale | NonpureUint32
        | NonpureInt32 | PureUint32 | PureInt32 => Ok(4),
        t if t.is_packed() => Ok(1),
        _ => Err(CoreError::InvalidVertexAttrib(format!(
            "{:?} has no component size",
            attrib_type
        ))),
    }
}

/// Attribute descriptor over a borrowed vertex buffer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VertexAttrib<'a> {
    pub attrib_type: VertexAttribType,
    /// Components per element, 0..=4.
    pub size: usize,
    /// Bytes between elements; 0 means tightly packed.
    pub stride: usize,
    /// Non-zero steps the element per `instance_divisor` instances instead
    /// of per vertex.
    pub instance_divisor: usize,
    pub pointer: Option<&'a [u8]>,
    /// Value returned when `pointer` is `None`.
    pub generic: GenericVec4,
}

impl Default for VertexAttrib<'_> {
    fn default() -> Self {
        Self {
            attrib_type: VertexAttribType::Float,
            size: 0,
            stride: 0,
            instance_divisor: 0,
            pointer: None,
            generic: GenericVec4::default(),
        }
    }
}

impl<'a> VertexAttrib<'a> {
    /// Tightly packed buffer attribute.
    pub fn new(attrib_type: VertexAttribType, size: usize, data: &'a [u8]) -> Self {
        Self {
            attrib_type,
            size,
            pointer: Some(data),
            ..Self::default()
        }
    }

    /// Constant attribute readable into any lane.
    pub fn generic(value: GenericVec4) -> Self {
        Self {
            attrib_type: VertexAttribType::DontCare,
            generic: value,
            ..Self::default()
        }
    }

    pub fn with_stride(mut self, stride: usize) -> Self {
        self.stride = stride;
        self
    }

    pub fn with_instance_divisor(mut self, divisor: usize) -> Self {
        self.instance_divisor = divisor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.size > 4 {
            return Err(CoreError::InvalidVertexAttrib(format!(
                "size {} outside 0..=4",
                self.size
            )));
        }
        if self.pointer.is_none() && self.attrib_type != VertexAttribType::DontCare {
            return Err(CoreError::InvalidVertexAttrib(format!(
                "{:?} attribute without a buffer",
                self.attrib_type
            )));
        }
        if self.attrib_type.is_packed() && self.size != 4 {
            return Err(CoreError::InvalidVertexAttrib(format!(
                "packed {:?} requires size 4, got {}",
                self.attrib_type, self.size
            )));
        }
        Ok(())
    }
}

pub fn is_valid_vertex_attrib(attrib: &VertexAttrib<'_>) -> bool {
    attrib.validate().is_ok()
}

const NATURAL_ORDER: [usize; 4] = [0, 1, 2, 3];
const BGRA_ORDER: [usize; 4] = [2, 1, 0, 3];

/// Read one element of `attrib` for the given instance and vertex.
pub fn read_vertex_attrib(
    attrib: &VertexAttrib<'_>,
    instance_ndx: usize,
    vertex_ndx: usize,
    lane: GenericVecType,
) -> Result<GenericVec4> {
    attrib.validate()?;

    let Some(buffer) = attrib.pointer else {
        return Ok(attrib.generic.convert(lane));
    };

    if !attrib.attrib_type.supports_lane(lane) {
        return Err(CoreError::AttribLaneMismatch {
            attrib_type: attrib.attrib_type,
            lane,
        });
    }

    let comp_size = component_size(attrib.attrib_type)?;
    let element = if attrib.instance_divisor != 0 {
        instance_ndx / attrib.instance_divisor
    } else {
        vertex_ndx
    };
    let stride = if attrib.stride != 0 {
        attrib.stride
    } else {
        attrib.size * comp_size
    };
    let offset = element * stride;
    let len = attrib.size * comp_size;
    if offset + len > buffer.len() {
        log(LogCategory::Vertex, LogLevel::Error, || {
            format!(
                "Attribute read at element {} (offset {}) overruns {} byte buffer",
                element,
                offset,
                buffer.len()
            )
        });
        return Err(CoreError::AttribOutOfBounds {
            offset,
            len,
            buffer_len: buffer.len(),
        });
    }
    let bytes = &buffer[offset..offset + len];

    if attrib.attrib_type.is_pure_integer() {
        let values = read_pure(attrib.attrib_type, attrib.size, bytes);
        return Ok(match lane {
            GenericVecType::Uint32 => GenericVec4::Uint(values.map(|v| v as u32)),
            _ => GenericVec4::Int(values),
        });
    }

    Ok(GenericVec4::Float(read_float(attrib.attrib_type, attrib.size, bytes)))
}

fn le_u16(bytes: &[u8], i: usize) -> u16 {
    u16::from_le_bytes([bytes[i * 2], bytes[i * 2 + 1]])
}

fn le_u32(bytes: &[u8], i: usize) -> u32 {
    let b = &bytes[i * 4..i * 4 + 4];
    u32::from_le_bytes([b[0], b[1], b[2], b[3]])
}

fn le_f64(bytes: &[u8], i: usize) -> f64 {
    let mut b = [0u8; 8];
    b.copy_from_slice(&bytes[i * 8..i * 8 + 8]);
    f64::from_le_bytes(b)
}

fn read_pure(attrib_type: VertexAttribType, size: usize, bytes: &[u8]) -> [i32; 4] {
    use VertexAttribType::*;
    let mut dst = [0, 0, 0, 1];
    for (i, slot) in dst.iter_mut().enumerate().take(size) {
        *slot = match attrib_type {
            PureUint8 => i32::from(bytes[i]),
            PureUint16 => i32::from(le_u16(bytes, i)),
            PureUint32 => le_u32(bytes, i) as i32,
            PureInt8 => i32::from(bytes[i] as i8),
            PureInt16 => i32::from(le_u16(bytes, i) as i16),
            PureInt32 => le_u32(bytes, i) as i32,
            _ => 0,
        };
    }
    dst
}

fn sign_extend(value: u32, bits: u32) -> i32 {
    let shift = 32 - bits;
    ((value << shift) as i32) >> shift
}

/// Raw component `i` of a scalar (non-packed) encoding, as f64.
fn scalar_component(attrib_type: VertexAttribType, bytes: &[u8], i: usize) -> f64 {
    use VertexAttribType::*;
    match attrib_type {
        NonpureUnorm8 | NonpureUint8 | NonpureUnorm8Bgra => f64::from(bytes[i]),
        NonpureUnorm16 | NonpureUint16 => f64::from(le_u16(bytes, i)),
        NonpureUnorm32 | NonpureUint32 => f64::from(le_u32(bytes, i)),
        NonpureSnorm8Clamp | NonpureSnorm8Scale | NonpureInt8 => f64::from(bytes[i] as i8),
        NonpureSnorm16Clamp | NonpureSnorm16Scale | NonpureInt16 => {
            f64::from(le_u16(bytes, i) as i16)
        }
        NonpureSnorm32Clamp | NonpureSnorm32Scale | NonpureInt32 => {
            f64::from(le_u32(bytes, i) as i32)
        }
        _ => 0.0,
    }
}

fn unorm(c: f64, bits: u32) -> f32 {
    (c / ((1u64 << bits) - 1) as f64) as f32
}

fn snorm_clamp(c: f64, bits: u32) -> f32 {
    (c / ((1u64 << (bits - 1)) - 1) as f64).max(-1.0) as f32
}

fn snorm_scale(c: f64, bits: u32) -> f32 {
    ((2.0 * c + 1.0) / ((1u64 << bits) - 1) as f64) as f32
}

fn read_float(attrib_type: VertexAttribType, size: usize, bytes: &[u8]) -> Vec4 {
    use VertexAttribType::*;
    let mut dst: Vec4 = [0.0, 0.0, 0.0, 1.0];
    let order = if attrib_type.is_bgra() {
        BGRA_ORDER
    } else {
        NATURAL_ORDER
    };

    if attrib_type.is_packed() {
        let word = le_u32(bytes, 0);
        let fields = [(0, 10), (10, 10), (20, 10), (30, 2)];
        for (i, &(offset, bits)) in fields.iter().enumerate() {
            let raw = (word >> offset) & ((1 << bits) - 1);
            let signed = f64::from(sign_extend(raw, bits));
            dst[order[i]] = match attrib_type {
                NonpureUnorm2101010Rev | NonpureUnorm2101010RevBgra => unorm(f64::from(raw), bits),
                NonpureSnorm2101010RevClamp | NonpureSnorm2101010RevClampBgra => {
                    snorm_clamp(signed, bits)
                }
                NonpureSnorm2101010RevScale | NonpureSnorm2101010RevScaleBgra => {
                    snorm_scale(signed, bits)
                }
                NonpureUint2101010Rev => raw as f32,
                _ => signed as f32,
            };
        }
        return dst;
    }

    for i in 0..size {
        dst[order[i]] = match attrib_type {
            Float => f32::from_bits(le_u32(bytes, i)),
            Half => half_to_f32(le_u16(bytes, i)),
            Fixed => (f64::from(le_u32(bytes, i) as i32) / 65536.0) as f32,
            Double => le_f64(bytes, i) as f32,
            NonpureUnorm8 | NonpureUnorm8Bgra => unorm(scalar_component(attrib_type, bytes, i), 8),
            NonpureUnorm16 => unorm(scalar_component(attrib_type, bytes, i), 16),
            NonpureUnorm32 => unorm(scalar_component(attrib_type, bytes, i), 32),
            NonpureSnorm8Clamp => snorm_clamp(scalar_component(attrib_type, bytes, i), 8),
            NonpureSnorm16Clamp => snorm_clamp(scalar_component(attrib_type, bytes, i), 16),
            NonpureSnorm32Clamp => snorm_clamp(scalar_component(attrib_type, bytes, i), 32),
            NonpureSnorm8Scale => snorm_scale(scalar_component(attrib_type, bytes, i), 8),
            NonpureSnorm16Scale => snorm_scale(scalar_component(attrib_type, bytes, i), 16),
            NonpureSnorm32Scale => snorm_scale(scalar_component(attrib_type, bytes, i), 32),
            _ => scalar_component(attrib_type, bytes, i) as f32,
        };
    }
    dst
}
