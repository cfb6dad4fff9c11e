//! Texel formats, typed pixel access and buffer utilities.

pub mod access;
pub mod format;
pub mod multisample;
pub mod util;

pub use access::{
    convert_sat_rte, norm_float_to_channel, ConstPixelBufferAccess, PixelBufferAccess,
    TextureLevel,
};
pub use format::{ChannelOrder, ChannelSwizzle, ChannelType, TextureFormat};
pub use multisample::{
    resolve_multisample_color_buffer, MultisampleConstPixelBufferAccess,
    MultisamplePixelBufferAccess,
};
pub use util::{
    channel_bit_depth, channel_class, channel_value_range, clear, clear_depth, clear_int,
    clear_stencil, copy, fill_with_component_gradients, linear_to_srgb, srgb_to_linear,
    texture_format_bit_depth, texture_format_info, TextureChannelClass, TextureFormatInfo,
};
