use crate::error::CoreError;
use crate::types::{IVec4, Vec4};
use crate::Result;

use super::access::{ConstPixelBufferAccess, PixelBufferAccess};
use super::format::{ChannelOrder, ChannelType, TextureFormat};

/// Numeric interpretation of a channel type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TextureChannelClass {
    SignedFixedPoint,
    UnsignedFixedPoint,
    SignedInteger,
    UnsignedInteger,
    FloatingPoint,
}

pub fn channel_class(channel_type: ChannelType) -> Result<TextureChannelClass> {
    use ChannelType::*;
    use TextureChannelClass as C;
    match channel_type {
        SnormInt8 | SnormInt16 | SnormInt32 => Ok(C::SignedFixedPoint),
        UnormInt8 | UnormInt16 | UnormInt32 | UnormShort565 | UnormShort555 | UnormShort4444
        | UnormShort5551 | UnormInt101010 | UnormInt1010102Rev => Ok(C::UnsignedFixedPoint),
        SignedInt8 | SignedInt16 | SignedInt32 => Ok(C::SignedInteger),
        UnsignedInt8 | UnsignedInt16 | UnsignedInt32 | UnsignedInt1010102Rev => {
            Ok(C::UnsignedInteger)
        }
        UnsignedInt11f11f10fRev | UnsignedInt999E5Rev | HalfFloat | Float => Ok(C::FloatingPoint),
        UnsignedInt248 | FloatUnsignedInt248Rev => Err(CoreError::InvalidChannelType(channel_type)),
    }
}

/// Representable (or sensible test) value range of one channel.
pub fn channel_value_range(channel_type: ChannelType) -> Result<(f32, f32)> {
    use ChannelType::*;
    match channel_type {
        SnormInt8 | SnormInt16 | SnormInt32 => Ok((-1.0, 1.0)),
        UnormInt8 | UnormInt16 | UnormInt32 | UnormShort565 | UnormShort555 | UnormShort4444
        | UnormShort5551 | UnormInt101010 | UnormInt1010102Rev => Ok((0.0, 1.0)),
        SignedInt8 => Ok((-128.0, 127.0)),
        SignedInt16 => Ok((-32768.0, 32767.0)),
        SignedInt32 => Ok((-2147483648.0, 2147483647.0)),
        UnsignedInt8 => Ok((0.0, 255.0)),
        UnsignedInt16 => Ok((0.0, 65535.0)),
        UnsignedInt32 => Ok((0.0, 4294967295.0)),
        UnsignedInt1010102Rev => Ok((0.0, 1023.0)),
        HalfFloat => Ok((-1e3, 1e3)),
        Float => Ok((-1e5, 1e5)),
        UnsignedInt11f11f10fRev => Ok((0.0, 1e4)),
        UnsignedInt999E5Rev => Ok((0.0, 1e5)),
        UnsignedInt248 | FloatUnsignedInt248Rev => Err(CoreError::InvalidChannelType(channel_type)),
    }
}

pub fn channel_bit_depth(channel_type: ChannelType) -> IVec4 {
    use ChannelType::*;
    match channel_type {
        SnormInt8 | UnormInt8 | SignedInt8 | UnsignedInt8 => [8; 4],
        SnormInt16 | UnormInt16 | SignedInt16 | UnsignedInt16 | HalfFloat => [16; 4],
        SnormInt32 | UnormInt32 | SignedInt32 | UnsignedInt32 | Float => [32; 4],
        UnormShort565 => [5, 6, 5, 0],
        UnormShort4444 => [4, 4, 4, 4],
        UnormShort555 => [5, 5, 5, 0],
        UnormShort5551 => [5, 5, 5, 1],
        UnormInt101010 => [10, 10, 10, 0],
        UnormInt1010102Rev | UnsignedInt1010102Rev => [10, 10, 10, 2],
        UnsignedInt248 => [24, 0, 0, 8],
        UnsignedInt11f11f10fRev => [11, 11, 10, 0],
        UnsignedInt999E5Rev => [9, 9, 9, 0],
        FloatUnsignedInt248Rev => [32, 0, 0, 8],
    }
}

fn channel_mask(order: ChannelOrder) -> [bool; 4] {
    use ChannelOrder::*;
    match order {
        R | D => [true, false, false, false],
        A | S => [false, false, false, true],
        RA | DS => [true, false, false, true],
        L | RGB | SRGB => [true, true, true, false],
        RG => [true, true, false, false],
        I | LA | RGBA | BGRA | ARGB | SRGBA => [true; 4],
    }
}

/// Bits per RGBA component of a format; absent components report 0.
pub fn texture_format_bit_depth(format: TextureFormat) -> IVec4 {
    let bits = channel_bit_depth(format.channel_type);
    let swizzle = match format.order {
        ChannelOrder::BGRA => [2, 1, 0, 3],
        ChannelOrder::ARGB => [1, 2, 3, 0],
        _ => [0, 1, 2, 3],
    };
    let mask = channel_mask(format.order);
    std::array::from_fn(|c| if mask[c] { bits[swizzle[c]] } else { 0 })
}

/// Value ranges for exercising a format and the scale / bias that maps
/// them back into [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextureFormatInfo {
    pub value_min: Vec4,
    pub value_max: Vec4,
    pub lookup_scale: Vec4,
    pub lookup_bias: Vec4,
}

pub fn texture_format_info(format: TextureFormat) -> Result<TextureFormatInfo> {
    if format == TextureFormat::new(ChannelOrder::RGBA, ChannelType::UnsignedInt1010102Rev) {
        return Ok(TextureFormatInfo {
            value_min: [0.0; 4],
            value_max: [1023.0, 1023.0, 1023.0, 3.0],
            lookup_scale: [1.0 / 1023.0, 1.0 / 1023.0, 1.0 / 1023.0, 1.0 / 3.0],
            lookup_bias: [0.0; 4],
        });
    }
    if format.has_depth() {
        return Ok(TextureFormatInfo {
            value_min: [0.0; 4],
            value_max: [1.0, 1.0, 1.0, 0.0],
            lookup_scale: [1.0; 4],
            lookup_bias: [0.0; 4],
        });
    }
    if format == TextureFormat::new(ChannelOrder::RGBA, ChannelType::UnormShort5551) {
        return Ok(TextureFormatInfo {
            value_min: [0.0, 0.0, 0.0, 0.5],
            value_max: [1.0, 1.0, 1.0, 1.5],
            lookup_scale: [1.0; 4],
            lookup_bias: [0.0; 4],
        });
    }

    let (min, max) = channel_value_range(format.channel_type)?;
    let mask = channel_mask(format.order);
    let scale = 1.0 / (max - min);
    let bias = -min * scale;
    let select = |on: f32, off: f32| mask.map(|m| if m { on } else { off });
    Ok(TextureFormatInfo {
        value_min: select(min, 0.0),
        value_max: select(max, 0.0),
        lookup_scale: select(scale, 1.0),
        lookup_bias: select(bias, 0.0),
    })
}

pub fn srgb_channel_to_linear(cs: f32) -> f32 {
    if cs <= 0.04045 {
        cs / 12.92
    } else {
        ((cs + 0.055) / 1.055).powf(2.4)
    }
}

pub fn linear_channel_to_srgb(cl: f32) -> f32 {
    if cl <= 0.0 {
        0.0
    } else if cl < 0.0031308 {
        12.92 * cl
    } else if cl < 1.0 {
        1.055 * cl.powf(0.41666) - 0.055
    } else {
        1.0
    }
}

/// Decode sRGB encoded RGB; alpha is linear already.
pub fn srgb_to_linear(cs: Vec4) -> Vec4 {
    [
        srgb_channel_to_linear(cs[0]),
        srgb_channel_to_linear(cs[1]),
        srgb_channel_to_linear(cs[2]),
        cs[3],
    ]
}

pub fn linear_to_srgb(cl: Vec4) -> Vec4 {
    [
        linear_channel_to_srgb(cl[0]),
        linear_channel_to_srgb(cl[1]),
        linear_channel_to_srgb(cl[2]),
        cl[3],
    ]
}

fn is_integer_class(channel_type: ChannelType) -> bool {
    matches!(
        channel_class(channel_type),
        Ok(TextureChannelClass::SignedInteger | TextureChannelClass::UnsignedInteger)
    )
}

/// Copy texels between equally sized accesses, converting formats.
pub fn copy(dst: &mut PixelBufferAccess<'_>, src: &ConstPixelBufferAccess<'_>) -> Result<()> {
    if dst.size() != src.size() {
        return Err(CoreError::SizeMismatch(dst.size(), src.size()));
    }
    let [width, height, depth] = src.size();

    if dst.format() == src.format() {
        let row_bytes = width * src.format().pixel_size();
        let (src_pitch, dst_pitch) = (src.pitch(), dst.pitch());
        let rows_contiguous = src_pitch[0] == src.format().pixel_size()
            && dst_pitch[0] == dst.format().pixel_size();
        if rows_contiguous {
            let src_data = src.data();
            let dst_data = dst.data_mut();
            for z in 0..depth {
                for y in 0..height {
                    let s = y * src_pitch[1] + z * src_pitch[2];
                    let d = y * dst_pitch[1] + z * dst_pitch[2];
                    dst_data[d..d + row_bytes].copy_from_slice(&src_data[s..s + row_bytes]);
                }
            }
            return Ok(());
        }
    }

    let integer_path =
        is_integer_class(src.format().channel_type) && is_integer_class(dst.format().channel_type);
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                if integer_path {
                    dst.set_pixel_int(src.get_pixel_int(x, y, z), x, y, z);
                } else {
                    dst.set_pixel(src.get_pixel(x, y, z), x, y, z);
                }
            }
        }
    }
    Ok(())
}

const CLEAR_OPTIMIZE_THRESHOLD: usize = 128;
const CLEAR_OPTIMIZE_MAX_PIXEL_SIZE: usize = 8;

/// Replicate one encoded texel over every texel of the access.
fn fill_encoded(access: &mut PixelBufferAccess<'_>, texel: &[u8]) {
    let [width, height, depth] = access.size();
    let pitch = access.pitch();
    let data = access.data_mut();
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                let offset = x * pitch[0] + y * pitch[1] + z * pitch[2];
                data[offset..offset + texel.len()].copy_from_slice(texel);
            }
        }
    }
}

fn encode_single(format: TextureFormat, write: impl FnOnce(&mut PixelBufferAccess<'_>)) -> Result<[u8; CLEAR_OPTIMIZE_MAX_PIXEL_SIZE]> {
    let mut texel = [0u8; CLEAR_OPTIMIZE_MAX_PIXEL_SIZE];
    let mut single = PixelBufferAccess::new(format, 1, 1, 1, &mut texel)?;
    write(&mut single);
    Ok(texel)
}

fn use_fast_clear(access: &PixelBufferAccess<'_>) -> bool {
    let [w, h, d] = access.size();
    w * h * d >= CLEAR_OPTIMIZE_THRESHOLD
        && access.format().pixel_size() < CLEAR_OPTIMIZE_MAX_PIXEL_SIZE
}

/// Fill with a float color; large buffers encode once and replicate.
pub fn clear(access: &mut PixelBufferAccess<'_>, color: Vec4) -> Result<()> {
    if use_fast_clear(access) {
        let format = access.format();
        let texel = encode_single(format, |single| single.set_pixel(color, 0, 0, 0))?;
        fill_encoded(access, &texel[..format.pixel_size()]);
        return Ok(());
    }
    for_each_texel(access, |a, x, y, z| a.set_pixel(color, x, y, z));
    Ok(())
}

pub fn clear_int(access: &mut PixelBufferAccess<'_>, color: IVec4) {
    for_each_texel(access, |a, x, y, z| a.set_pixel_int(color, x, y, z));
}

pub fn clear_depth(access: &mut PixelBufferAccess<'_>, depth: f32) {
    for_each_texel(access, |a, x, y, z| a.set_pix_depth(depth, x, y, z));
}

pub fn clear_stencil(access: &mut PixelBufferAccess<'_>, stencil: i32) {
    for_each_texel(access, |a, x, y, z| a.set_pix_stencil(stencil, x, y, z));
}

fn for_each_texel(
    access: &mut PixelBufferAccess<'_>,
    mut f: impl FnMut(&mut PixelBufferAccess<'_>, usize, usize, usize),
) {
    let [width, height, depth] = access.size();
    for z in 0..depth {
        for y in 0..height {
            for x in 0..width {
                f(access, x, y, z);
            }
        }
    }
}

fn lerp(t: f32, min: f32, max: f32) -> f32 {
    min + (max - min) * t
}

/// Fill with per-component gradients between `min` and `max`, picking the
/// pattern by the dimensionality of the access.
pub fn fill_with_component_gradients(access: &mut PixelBufferAccess<'_>, min: Vec4, max: Vec4) {
    let [width, height, depth] = access.size();
    for_each_texel(access, |a, x, y, z| {
        let s = (x as f32 + 0.5) / width as f32;
        let t = (y as f32 + 0.5) / height as f32;
        let p = (z as f32 + 0.5) / depth as f32;
        let color = if height == 1 && depth == 1 {
            [
                lerp(s, min[0], max[0]),
                lerp(1.0 - s, min[1], max[1]),
                lerp(s, min[2], max[2]),
                lerp(1.0 - s, min[3], max[3]),
            ]
        } else if depth == 1 {
            [
                lerp((s + t) * 0.5, min[0], max[0]),
                lerp((s + (1.0 - t)) * 0.5, min[1], max[1]),
                lerp(((1.0 - s) + t) * 0.5, min[2], max[2]),
                lerp(((1.0 - s) + (1.0 - t)) * 0.5, min[3], max[3]),
            ]
        } else {
            [
                lerp(s, min[0], max[0]),
                lerp(t, min[1], max[1]),
                lerp(p, min[2], max[2]),
                lerp(1.0 - (s + t + p) / 3.0, min[3], max[3]),
            ]
        };
        a.set_pixel(color, x, y, z);
    });
}
