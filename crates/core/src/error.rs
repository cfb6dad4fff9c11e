use thiserror::Error;

use crate::texture::{ChannelOrder, ChannelType};
use crate::types::GenericVecType;
use crate::vertex::VertexAttribType;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("Invalid float format: {exponent_bits} exponent bits, {mantissa_bits} mantissa bits")]
    InvalidFloatFormat {
        exponent_bits: u32,
        mantissa_bits: u32,
    },

    #[error("Invalid float construction: {0}")]
    InvalidFloatConstruct(String),

    #[error("Invalid vertex attribute: {0}")]
    InvalidVertexAttrib(String),

    #[error("Vertex attribute of type {attrib_type:?} cannot be read as {lane:?}")]
    AttribLaneMismatch {
        attrib_type: VertexAttribType,
        lane: GenericVecType,
    },

    #[error("Vertex attribute read of {len} bytes at offset {offset} exceeds buffer of {buffer_len} bytes")]
    AttribOutOfBounds {
        offset: usize,
        len: usize,
        buffer_len: usize,
    },

    #[error("Channel type {0:?} has no single channel class")]
    InvalidChannelType(ChannelType),

    #[error("Format {order:?}/{channel_type:?} does not support {operation}")]
    UnsupportedFormat {
        order: ChannelOrder,
        channel_type: ChannelType,
        operation: &'static str,
    },

    #[error("Buffer size mismatch: {0:?} vs {1:?}")]
    SizeMismatch([usize; 3], [usize; 3]),

    #[error("Pixel buffer of {actual} bytes is smaller than the {required} bytes addressed")]
    BufferTooSmall { required: usize, actual: usize },

    #[error("Unsupported sample count: {0}")]
    UnsupportedSampleCount(usize),
}
