//! Typed views over raw texel storage.
//!
//! Texels are stored little-endian. An access addresses a 3D box of texels
//! with an independent byte stride per dimension, which lets the same code
//! serve plain images, subregions and multisample buffers (where the first
//! dimension is the sample index).

use crate::error::CoreError;
use crate::float::{
    f32_to_float10, f32_to_float11, f32_to_half, float10_to_f32, float11_to_f32, half_to_f32,
};
use crate::types::{IVec4, UVec4, Vec4};
use crate::Result;

use super::format::{ChannelOrder, ChannelSwizzle, ChannelType, TextureFormat};

/// Owned storage for one image level.
#[derive(Debug, Clone, PartialEq)]
pub struct TextureLevel {
    format: TextureFormat,
    size: [usize; 3],
    data: Vec<u8>,
}

impl TextureLevel {
    /// Zero-initialized storage.
    pub fn new(format: TextureFormat, width: usize, height: usize, depth: usize) -> Result<Self> {
        if !format.is_valid() {
            return Err(format.unsupported("storage"));
        }
        let len = width * height * depth * format.pixel_size();
        Ok(Self {
            format,
            size: [width, height, depth],
            data: vec![0; len],
        })
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.size[0]
    }

    pub fn height(&self) -> usize {
        self.size[1]
    }

    pub fn depth(&self) -> usize {
        self.size[2]
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn access(&self) -> ConstPixelBufferAccess<'_> {
        ConstPixelBufferAccess {
            format: self.format,
            size: self.size,
            pitch: packed_pitch(self.format, self.size),
            data: &self.data,
        }
    }

    pub fn access_mut(&mut self) -> PixelBufferAccess<'_> {
        PixelBufferAccess {
            format: self.format,
            size: self.size,
            pitch: packed_pitch(self.format, self.size),
            data: &mut self.data,
        }
    }
}

fn packed_pitch(format: TextureFormat, size: [usize; 3]) -> [usize; 3] {
    let pixel = format.pixel_size();
    [pixel, pixel * size[0], pixel * size[0] * size[1]]
}

fn required_len(format: TextureFormat, size: [usize; 3], pitch: [usize; 3]) -> usize {
    if size.iter().any(|&s| s == 0) {
        return 0;
    }
    (0..3).map(|d| (size[d] - 1) * pitch[d]).sum::<usize>() + format.pixel_size()
}

fn check_len(format: TextureFormat, size: [usize; 3], pitch: [usize; 3], len: usize) -> Result<()> {
    let required = required_len(format, size, pitch);
    if len < required {
        return Err(CoreError::BufferTooSmall { required, actual: len });
    }
    Ok(())
}

/// Read-only view of texel data.
#[derive(Debug, Clone, Copy)]
pub struct ConstPixelBufferAccess<'a> {
    format: TextureFormat,
    size: [usize; 3],
    pitch: [usize; 3],
    data: &'a [u8],
}

/// Read-write view of texel data.
#[derive(Debug)]
pub struct PixelBufferAccess<'a> {
    format: TextureFormat,
    size: [usize; 3],
    pitch: [usize; 3],
    data: &'a mut [u8],
}

impl<'a> ConstPixelBufferAccess<'a> {
    /// Tightly packed view over `data`.
    pub fn new(
        format: TextureFormat,
        width: usize,
        height: usize,
        depth: usize,
        data: &'a [u8],
    ) -> Result<Self> {
        let size = [width, height, depth];
        Self::with_pitch(format, size, packed_pitch(format, size), data)
    }

    /// View with explicit byte strides per dimension.
    pub fn with_pitch(
        format: TextureFormat,
        size: [usize; 3],
        pitch: [usize; 3],
        data: &'a [u8],
    ) -> Result<Self> {
        check_len(format, size, pitch, data.len())?;
        Ok(Self {
            format,
            size,
            pitch,
            data,
        })
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.size[0]
    }

    pub fn height(&self) -> usize {
        self.size[1]
    }

    pub fn depth(&self) -> usize {
        self.size[2]
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn pitch(&self) -> [usize; 3] {
        self.pitch
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    pub fn data(&self) -> &'a [u8] {
        self.data
    }

    fn texel(&self, x: usize, y: usize, z: usize) -> &'a [u8] {
        let offset = texel_offset(self.size, self.pitch, x, y, z);
        &self.data[offset..offset + self.format.pixel_size()]
    }

    pub fn get_pixel(&self, x: usize, y: usize, z: usize) -> Vec4 {
        read_float(self.format, self.texel(x, y, z))
    }

    pub fn get_pixel_int(&self, x: usize, y: usize, z: usize) -> IVec4 {
        read_int(self.format, self.texel(x, y, z))
    }

    pub fn get_pixel_uint(&self, x: usize, y: usize, z: usize) -> UVec4 {
        self.get_pixel_int(x, y, z).map(|c| c as u32)
    }

    /// Depth value; formats without depth report their first component.
    pub fn get_pix_depth(&self, x: usize, y: usize, z: usize) -> f32 {
        read_depth(self.format, self.texel(x, y, z))
    }

    /// Stencil value; formats without stencil report their alpha component.
    pub fn get_pix_stencil(&self, x: usize, y: usize, z: usize) -> i32 {
        read_stencil(self.format, self.texel(x, y, z))
    }

    /// Same bytes addressed with a different box and strides.
    pub(crate) fn reshape(self, size: [usize; 3], pitch: [usize; 3]) -> Result<Self> {
        Self::with_pitch(self.format, size, pitch, self.data)
    }

    pub fn subregion(
        &self,
        offset: [usize; 3],
        size: [usize; 3],
    ) -> ConstPixelBufferAccess<'a> {
        debug_assert!((0..3).all(|d| offset[d] + size[d] <= self.size[d]));
        let start = (0..3).map(|d| offset[d] * self.pitch[d]).sum::<usize>();
        ConstPixelBufferAccess {
            format: self.format,
            size,
            pitch: self.pitch,
            data: &self.data[start.min(self.data.len())..],
        }
    }
}

impl<'a> PixelBufferAccess<'a> {
    pub fn new(
        format: TextureFormat,
        width: usize,
        height: usize,
        depth: usize,
        data: &'a mut [u8],
    ) -> Result<Self> {
        let size = [width, height, depth];
        Self::with_pitch(format, size, packed_pitch(format, size), data)
    }

    pub fn with_pitch(
        format: TextureFormat,
        size: [usize; 3],
        pitch: [usize; 3],
        data: &'a mut [u8],
    ) -> Result<Self> {
        check_len(format, size, pitch, data.len())?;
        Ok(Self {
            format,
            size,
            pitch,
            data,
        })
    }

    pub fn as_const(&self) -> ConstPixelBufferAccess<'_> {
        ConstPixelBufferAccess {
            format: self.format,
            size: self.size,
            pitch: self.pitch,
            data: &*self.data,
        }
    }

    /// Shorter-lived mutable view of the same texels.
    pub fn reborrow(&mut self) -> PixelBufferAccess<'_> {
        PixelBufferAccess {
            format: self.format,
            size: self.size,
            pitch: self.pitch,
            data: &mut *self.data,
        }
    }

    pub fn format(&self) -> TextureFormat {
        self.format
    }

    pub fn width(&self) -> usize {
        self.size[0]
    }

    pub fn height(&self) -> usize {
        self.size[1]
    }

    pub fn depth(&self) -> usize {
        self.size[2]
    }

    pub fn size(&self) -> [usize; 3] {
        self.size
    }

    pub fn pitch(&self) -> [usize; 3] {
        self.pitch
    }

    pub fn is_empty(&self) -> bool {
        self.size.iter().any(|&s| s == 0)
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut *self.data
    }

    fn texel_mut(&mut self, x: usize, y: usize, z: usize) -> &mut [u8] {
        let offset = texel_offset(self.size, self.pitch, x, y, z);
        let pixel_size = self.format.pixel_size();
        &mut self.data[offset..offset + pixel_size]
    }

    pub fn get_pixel(&self, x: usize, y: usize, z: usize) -> Vec4 {
        self.as_const().get_pixel(x, y, z)
    }

    pub fn get_pixel_int(&self, x: usize, y: usize, z: usize) -> IVec4 {
        self.as_const().get_pixel_int(x, y, z)
    }

    pub fn get_pixel_uint(&self, x: usize, y: usize, z: usize) -> UVec4 {
        self.as_const().get_pixel_uint(x, y, z)
    }

    pub fn get_pix_depth(&self, x: usize, y: usize, z: usize) -> f32 {
        self.as_const().get_pix_depth(x, y, z)
    }

    pub fn get_pix_stencil(&self, x: usize, y: usize, z: usize) -> i32 {
        self.as_const().get_pix_stencil(x, y, z)
    }

    pub fn set_pixel(&mut self, color: Vec4, x: usize, y: usize, z: usize) {
        let format = self.format;
        write_float(format, self.texel_mut(x, y, z), color);
    }

    pub fn set_pixel_int(&mut self, color: IVec4, x: usize, y: usize, z: usize) {
        let format = self.format;
        write_int(format, self.texel_mut(x, y, z), color.map(i64::from));
    }

    pub fn set_pixel_uint(&mut self, color: UVec4, x: usize, y: usize, z: usize) {
        let format = self.format;
        write_int(format, self.texel_mut(x, y, z), color.map(i64::from));
    }

    /// Write depth, keeping the stencil bits of combined formats.
    pub fn set_pix_depth(&mut self, depth: f32, x: usize, y: usize, z: usize) {
        let format = self.format;
        write_depth(format, self.texel_mut(x, y, z), depth);
    }

    /// Write stencil, keeping the depth bits of combined formats.
    pub fn set_pix_stencil(&mut self, stencil: i32, x: usize, y: usize, z: usize) {
        let format = self.format;
        write_stencil(format, self.texel_mut(x, y, z), stencil);
    }

    pub(crate) fn reshape(self, size: [usize; 3], pitch: [usize; 3]) -> Result<Self> {
        Self::with_pitch(self.format, size, pitch, self.data)
    }

    pub fn subregion(self, offset: [usize; 3], size: [usize; 3]) -> PixelBufferAccess<'a> {
        debug_assert!((0..3).all(|d| offset[d] + size[d] <= self.size[d]));
        let start = (0..3).map(|d| offset[d] * self.pitch[d]).sum::<usize>();
        let len = self.data.len();
        PixelBufferAccess {
            format: self.format,
            size,
            pitch: self.pitch,
            data: &mut self.data[start.min(len)..],
        }
    }
}

fn texel_offset(size: [usize; 3], pitch: [usize; 3], x: usize, y: usize, z: usize) -> usize {
    debug_assert!(x < size[0] && y < size[1] && z < size[2]);
    x * pitch[0] + y * pitch[1] + z * pitch[2]
}

fn load_u16(bytes: &[u8]) -> u16 {
    u16::from_le_bytes([bytes[0], bytes[1]])
}

fn load_u32(bytes: &[u8]) -> u32 {
    u32::from_le_bytes([bytes[0], bytes[1], bytes[2], bytes[3]])
}

fn store_u16(bytes: &mut [u8], value: u16) {
    bytes[..2].copy_from_slice(&value.to_le_bytes());
}

fn store_u32(bytes: &mut [u8], value: u32) {
    bytes[..4].copy_from_slice(&value.to_le_bytes());
}

fn load_packed(format: TextureFormat, texel: &[u8]) -> u32 {
    if format.pixel_size() == 2 {
        u32::from(load_u16(texel))
    } else {
        load_u32(texel)
    }
}

fn store_packed(format: TextureFormat, texel: &mut [u8], value: u32) {
    if format.pixel_size() == 2 {
        store_u16(texel, value as u16);
    } else {
        store_u32(texel, value);
    }
}

fn bits(pixel: u32, offset: u32, count: u32) -> u32 {
    (pixel >> offset) & ((1u64 << count) - 1) as u32
}

fn norm_bits(pixel: u32, offset: u32, count: u32) -> f32 {
    (f64::from(bits(pixel, offset, count)) / ((1u64 << count) - 1) as f64) as f32
}

/// Round to nearest even, then saturate into `[min, max]`.
pub fn convert_sat_rte(value: f64, min: f64, max: f64) -> f64 {
    if value.is_nan() {
        return 0.0f64.clamp(min, max);
    }
    value.round_ties_even().clamp(min, max)
}

/// Quantize a normalized float into an unsigned `bits`-wide field.
pub fn norm_float_to_channel(value: f32, bits: u32) -> u32 {
    let max = ((1u64 << bits) - 1) as f64;
    convert_sat_rte(f64::from(value) * max, 0.0, max) as u32
}

fn uint_to_channel(value: i64, bits: u32) -> u32 {
    value.clamp(0, ((1u64 << bits) - 1) as i64) as u32
}

fn pack_rgb999e5(color: Vec4) -> u32 {
    const M_BITS: i32 = 9;
    const E_BITS: i32 = 5;
    const E_BIAS: i32 = 15;
    let e_max = (1 << E_BITS) - 1;
    let max_val = f64::from((1 << M_BITS) - 1) * 2f64.powi(e_max - E_BIAS) / f64::from(1 << M_BITS);

    let rc = f64::from(color[0]).clamp(0.0, max_val);
    let gc = f64::from(color[1]).clamp(0.0, max_val);
    let bc = f64::from(color[2]).clamp(0.0, max_val);
    let max_c = rc.max(gc).max(bc);
    let exp_p = f64::from(-E_BIAS - 1).max(max_c.log2().floor()) as i32 + 1 + E_BIAS;
    let e = 2f64.powi(exp_p - E_BIAS - M_BITS);
    let max_s = (max_c / e + 0.5).floor() as i32;
    let exp_s = if max_s == (1 << M_BITS) { exp_p + 1 } else { exp_p };
    let e = 2f64.powi(exp_s - E_BIAS - M_BITS);

    let quantize = |c: f64| ((c / e + 0.5).floor() as u32).min((1 << M_BITS) - 1);
    quantize(rc) | (quantize(gc) << 9) | (quantize(bc) << 18) | ((exp_s as u32 & 0x1F) << 27)
}

fn unpack_rgb999e5(pixel: u32) -> Vec4 {
    let exp = bits(pixel, 27, 5) as i32;
    let e = 2f64.powi(exp - 15 - 9);
    let channel = |offset| (f64::from(bits(pixel, offset, 9)) * e) as f32;
    [channel(0), channel(9), channel(18), 1.0]
}

fn channel_to_float(bytes: &[u8], channel_type: ChannelType) -> f32 {
    use ChannelType::*;
    match channel_type {
        SnormInt8 => (f32::from(bytes[0] as i8) / 127.0).max(-1.0),
        SnormInt16 => (f32::from(load_u16(bytes) as i16) / 32767.0).max(-1.0),
        SnormInt32 => ((f64::from(load_u32(bytes) as i32) / 2147483647.0).max(-1.0)) as f32,
        UnormInt8 => f32::from(bytes[0]) / 255.0,
        UnormInt16 => f32::from(load_u16(bytes)) / 65535.0,
        UnormInt32 => (f64::from(load_u32(bytes)) / 4294967295.0) as f32,
        SignedInt8 => f32::from(bytes[0] as i8),
        SignedInt16 => f32::from(load_u16(bytes) as i16),
        SignedInt32 => load_u32(bytes) as i32 as f32,
        UnsignedInt8 => f32::from(bytes[0]),
        UnsignedInt16 => f32::from(load_u16(bytes)),
        UnsignedInt32 => load_u32(bytes) as f32,
        HalfFloat => half_to_f32(load_u16(bytes)),
        Float => f32::from_bits(load_u32(bytes)),
        _ => 0.0,
    }
}

fn channel_to_int(bytes: &[u8], channel_type: ChannelType) -> i32 {
    use ChannelType::*;
    match channel_type {
        SnormInt8 | SignedInt8 => i32::from(bytes[0] as i8),
        UnormInt8 | UnsignedInt8 => i32::from(bytes[0]),
        SnormInt16 | SignedInt16 => i32::from(load_u16(bytes) as i16),
        UnormInt16 | UnsignedInt16 => i32::from(load_u16(bytes)),
        SnormInt32 | SignedInt32 | UnormInt32 | UnsignedInt32 => load_u32(bytes) as i32,
        HalfFloat => half_to_f32(load_u16(bytes)).round() as i32,
        Float => f32::from_bits(load_u32(bytes)).round() as i32,
        _ => 0,
    }
}

fn float_to_channel(bytes: &mut [u8], value: f32, channel_type: ChannelType) {
    use ChannelType::*;
    let v = f64::from(value);
    match channel_type {
        SnormInt8 => bytes[0] = convert_sat_rte(v * 127.0, -128.0, 127.0) as i8 as u8,
        SnormInt16 => store_u16(bytes, convert_sat_rte(v * 32767.0, -32768.0, 32767.0) as i16 as u16),
        SnormInt32 => store_u32(
            bytes,
            convert_sat_rte(v * 2147483647.0, -2147483648.0, 2147483647.0) as i32 as u32,
        ),
        UnormInt8 => bytes[0] = convert_sat_rte(v * 255.0, 0.0, 255.0) as u8,
        UnormInt16 => store_u16(bytes, convert_sat_rte(v * 65535.0, 0.0, 65535.0) as u16),
        UnormInt32 => store_u32(bytes, convert_sat_rte(v * 4294967295.0, 0.0, 4294967295.0) as u32),
        SignedInt8 => bytes[0] = convert_sat_rte(v, -128.0, 127.0) as i8 as u8,
        SignedInt16 => store_u16(bytes, convert_sat_rte(v, -32768.0, 32767.0) as i16 as u16),
        SignedInt32 => store_u32(bytes, convert_sat_rte(v, -2147483648.0, 2147483647.0) as i32 as u32),
        UnsignedInt8 => bytes[0] = convert_sat_rte(v, 0.0, 255.0) as u8,
        UnsignedInt16 => store_u16(bytes, convert_sat_rte(v, 0.0, 65535.0) as u16),
        UnsignedInt32 => store_u32(bytes, convert_sat_rte(v, 0.0, 4294967295.0) as u32),
        HalfFloat => store_u16(bytes, f32_to_half(value)),
        Float => store_u32(bytes, value.to_bits()),
        _ => {}
    }
}

/// Raw integer store: normalized types receive the stored integer directly.
fn int_to_channel(bytes: &mut [u8], value: i64, channel_type: ChannelType) {
    use ChannelType::*;
    match channel_type {
        SnormInt8 | SignedInt8 => bytes[0] = value.clamp(-128, 127) as i8 as u8,
        UnormInt8 | UnsignedInt8 => bytes[0] = value.clamp(0, 255) as u8,
        SnormInt16 | SignedInt16 => store_u16(bytes, value.clamp(-32768, 32767) as i16 as u16),
        UnormInt16 | UnsignedInt16 => store_u16(bytes, value.clamp(0, 65535) as u16),
        SnormInt32 | SignedInt32 => {
            store_u32(bytes, value.clamp(i64::from(i32::MIN), i64::from(i32::MAX)) as i32 as u32)
        }
        UnormInt32 | UnsignedInt32 => store_u32(bytes, value.clamp(0, i64::from(u32::MAX)) as u32),
        HalfFloat => store_u16(bytes, f32_to_half(value as f32)),
        Float => store_u32(bytes, (value as f32).to_bits()),
        _ => {}
    }
}

fn read_float(format: TextureFormat, texel: &[u8]) -> Vec4 {
    use ChannelType::*;
    let channel_type = format.channel_type;
    if channel_type.packed_size().is_some() {
        let p = load_packed(format, texel);
        return match channel_type {
            UnormShort565 => [norm_bits(p, 11, 5), norm_bits(p, 5, 6), norm_bits(p, 0, 5), 1.0],
            UnormShort555 => [norm_bits(p, 10, 5), norm_bits(p, 5, 5), norm_bits(p, 0, 5), 1.0],
            UnormShort4444 => [
                norm_bits(p, 12, 4),
                norm_bits(p, 8, 4),
                norm_bits(p, 4, 4),
                norm_bits(p, 0, 4),
            ],
            UnormShort5551 => [
                norm_bits(p, 11, 5),
                norm_bits(p, 6, 5),
                norm_bits(p, 1, 5),
                norm_bits(p, 0, 1),
            ],
            UnormInt101010 => [norm_bits(p, 22, 10), norm_bits(p, 12, 10), norm_bits(p, 2, 10), 1.0],
            UnormInt1010102Rev => [
                norm_bits(p, 0, 10),
                norm_bits(p, 10, 10),
                norm_bits(p, 20, 10),
                norm_bits(p, 30, 2),
            ],
            UnsignedInt1010102Rev => [
                bits(p, 0, 10) as f32,
                bits(p, 10, 10) as f32,
                bits(p, 20, 10) as f32,
                bits(p, 30, 2) as f32,
            ],
            UnsignedInt999E5Rev => unpack_rgb999e5(p),
            UnsignedInt11f11f10fRev => [
                float11_to_f32(bits(p, 0, 11)),
                float11_to_f32(bits(p, 11, 11)),
                float10_to_f32(bits(p, 22, 10)),
                1.0,
            ],
            // Stencil is not part of the color value
            UnsignedInt248 => [norm_bits(p, 8, 24), 0.0, 0.0, 1.0],
            FloatUnsignedInt248Rev => [f32::from_bits(p), 0.0, 0.0, 1.0],
            _ => [0.0, 0.0, 0.0, 1.0],
        };
    }

    let size = channel_type.channel_size().unwrap_or(0);
    format.order.read_swizzle().map(|swizzle| match swizzle {
        ChannelSwizzle::Zero => 0.0,
        ChannelSwizzle::One => 1.0,
        ChannelSwizzle::Channel(c) => channel_to_float(&texel[c * size..], channel_type),
    })
}

fn read_int(format: TextureFormat, texel: &[u8]) -> IVec4 {
    use ChannelType::*;
    let channel_type = format.channel_type;
    if channel_type.packed_size().is_some() {
        let p = load_packed(format, texel);
        let b = |offset, count| bits(p, offset, count) as i32;
        return match channel_type {
            UnormShort565 => [b(11, 5), b(5, 6), b(0, 5), 1],
            UnormShort555 => [b(10, 5), b(5, 5), b(0, 5), 1],
            UnormShort4444 => [b(12, 4), b(8, 4), b(4, 4), b(0, 4)],
            UnormShort5551 => [b(11, 5), b(6, 5), b(1, 5), b(0, 1)],
            UnormInt101010 => [b(22, 10), b(12, 10), b(2, 10), 1],
            UnormInt1010102Rev | UnsignedInt1010102Rev => [b(0, 10), b(10, 10), b(20, 10), b(30, 2)],
            UnsignedInt248 => [b(8, 24), 0, 0, 1],
            FloatUnsignedInt248Rev => [f32::from_bits(p) as i32, 0, 0, 1],
            _ => read_float(format, texel).map(|c| c.round() as i32),
        };
    }

    let size = channel_type.channel_size().unwrap_or(0);
    format.order.read_swizzle().map(|swizzle| match swizzle {
        ChannelSwizzle::Zero => 0,
        ChannelSwizzle::One => 1,
        ChannelSwizzle::Channel(c) => channel_to_int(&texel[c * size..], channel_type),
    })
}

fn write_float(format: TextureFormat, texel: &mut [u8], color: Vec4) {
    use ChannelType::*;
    let channel_type = format.channel_type;
    let pn = |value: f32, offset: u32, count: u32| norm_float_to_channel(value, count) << offset;
    let pu = |value: f32, offset: u32, count: u32| uint_to_channel(value as i64, count) << offset;

    let packed = match channel_type {
        UnormShort565 => Some(pn(color[0], 11, 5) | pn(color[1], 5, 6) | pn(color[2], 0, 5)),
        UnormShort555 => Some(pn(color[0], 10, 5) | pn(color[1], 5, 5) | pn(color[2], 0, 5)),
        UnormShort4444 => Some(
            pn(color[0], 12, 4) | pn(color[1], 8, 4) | pn(color[2], 4, 4) | pn(color[3], 0, 4),
        ),
        UnormShort5551 => Some(
            pn(color[0], 11, 5) | pn(color[1], 6, 5) | pn(color[2], 1, 5) | pn(color[3], 0, 1),
        ),
        UnormInt101010 => Some(pn(color[0], 22, 10) | pn(color[1], 12, 10) | pn(color[2], 2, 10)),
        UnormInt1010102Rev => Some(
            pn(color[0], 0, 10) | pn(color[1], 10, 10) | pn(color[2], 20, 10) | pn(color[3], 30, 2),
        ),
        UnsignedInt1010102Rev => Some(
            pu(color[0], 0, 10) | pu(color[1], 10, 10) | pu(color[2], 20, 10) | pu(color[3], 30, 2),
        ),
        UnsignedInt999E5Rev => Some(pack_rgb999e5(color)),
        UnsignedInt11f11f10fRev => Some(
            f32_to_float11(color[0]) | (f32_to_float11(color[1]) << 11) | (f32_to_float10(color[2]) << 22),
        ),
        UnsignedInt248 => Some(match format.order {
            ChannelOrder::DS => pn(color[0], 8, 24) | pu(color[3], 0, 8),
            _ => pn(color[0], 8, 24),
        }),
        FloatUnsignedInt248Rev => {
            store_u32(texel, color[0].to_bits());
            store_u32(&mut texel[4..], uint_to_channel(color[3] as i64, 8));
            return;
        }
        _ => None,
    };

    match packed {
        Some(value) => store_packed(format, texel, value),
        None => {
            let size = channel_type.channel_size().unwrap_or(0);
            for (c, &component) in format.order.write_map().iter().enumerate() {
                float_to_channel(&mut texel[c * size..], color[component], channel_type);
            }
        }
    }
}

fn write_int(format: TextureFormat, texel: &mut [u8], color: [i64; 4]) {
    use ChannelType::*;
    let channel_type = format.channel_type;
    let pu = |value: i64, offset: u32, count: u32| uint_to_channel(value, count) << offset;

    let packed = match channel_type {
        UnormShort565 => Some(pu(color[0], 11, 5) | pu(color[1], 5, 6) | pu(color[2], 0, 5)),
        UnormShort555 => Some(pu(color[0], 10, 5) | pu(color[1], 5, 5) | pu(color[2], 0, 5)),
        UnormShort4444 => Some(
            pu(color[0], 12, 4) | pu(color[1], 8, 4) | pu(color[2], 4, 4) | pu(color[3], 0, 4),
        ),
        UnormShort5551 => Some(
            pu(color[0], 11, 5) | pu(color[1], 6, 5) | pu(color[2], 1, 5) | pu(color[3], 0, 1),
        ),
        UnormInt101010 => Some(pu(color[0], 22, 10) | pu(color[1], 12, 10) | pu(color[2], 2, 10)),
        UnormInt1010102Rev | UnsignedInt1010102Rev => Some(
            pu(color[0], 0, 10) | pu(color[1], 10, 10) | pu(color[2], 20, 10) | pu(color[3], 30, 2),
        ),
        UnsignedInt248 => Some(match format.order {
            ChannelOrder::DS => pu(color[0], 8, 24) | pu(color[3], 0, 8),
            _ => pu(color[0], 8, 24),
        }),
        FloatUnsignedInt248Rev => {
            store_u32(texel, (color[0] as f32).to_bits());
            store_u32(&mut texel[4..], uint_to_channel(color[3], 8));
            return;
        }
        UnsignedInt999E5Rev | UnsignedInt11f11f10fRev => {
            write_float(format, texel, color.map(|c| c as f32));
            return;
        }
        _ => None,
    };

    match packed {
        Some(value) => store_packed(format, texel, value),
        None => {
            let size = channel_type.channel_size().unwrap_or(0);
            for (c, &component) in format.order.write_map().iter().enumerate() {
                int_to_channel(&mut texel[c * size..], color[component], channel_type);
            }
        }
    }
}

fn read_depth(format: TextureFormat, texel: &[u8]) -> f32 {
    match format.channel_type {
        ChannelType::UnsignedInt248 => norm_bits(load_u32(texel), 8, 24),
        ChannelType::FloatUnsignedInt248Rev => f32::from_bits(load_u32(texel)),
        _ => read_float(format, texel)[0],
    }
}

fn read_stencil(format: TextureFormat, texel: &[u8]) -> i32 {
    match (format.order, format.channel_type) {
        (ChannelOrder::DS, ChannelType::UnsignedInt248) => bits(load_u32(texel), 0, 8) as i32,
        (ChannelOrder::DS, ChannelType::FloatUnsignedInt248Rev) => {
            bits(load_u32(&texel[4..]), 0, 8) as i32
        }
        (ChannelOrder::S, channel_type) => channel_to_int(texel, channel_type),
        _ => read_int(format, texel)[3],
    }
}

fn write_depth(format: TextureFormat, texel: &mut [u8], depth: f32) {
    match (format.order, format.channel_type) {
        (ChannelOrder::DS, ChannelType::UnsignedInt248) => {
            let stencil = load_u32(texel) & 0xFF;
            store_u32(texel, (norm_float_to_channel(depth, 24) << 8) | stencil);
        }
        (_, ChannelType::UnsignedInt248) => store_u32(texel, norm_float_to_channel(depth, 24) << 8),
        (_, ChannelType::FloatUnsignedInt248Rev) => store_u32(texel, depth.to_bits()),
        (_, channel_type) if channel_type.channel_size().is_some() => {
            float_to_channel(texel, depth, channel_type)
        }
        _ => {}
    }
}

fn write_stencil(format: TextureFormat, texel: &mut [u8], stencil: i32) {
    match (format.order, format.channel_type) {
        (ChannelOrder::DS, ChannelType::UnsignedInt248) => {
            let depth = load_u32(texel) & 0xFFFF_FF00;
            store_u32(texel, uint_to_channel(i64::from(stencil), 8) | depth);
        }
        (_, ChannelType::FloatUnsignedInt248Rev) => {
            store_u32(&mut texel[4..], uint_to_channel(i64::from(stencil), 8))
        }
        (_, channel_type) => {
            let Some(size) = channel_type.channel_size() else {
                return;
            };
            if let Some(c) = format.order.write_map().iter().position(|&comp| comp == 3) {
                int_to_channel(&mut texel[c * size..], i64::from(stencil), channel_type);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn level(order: ChannelOrder, channel_type: ChannelType) -> TextureLevel {
        TextureLevel::new(TextureFormat::new(order, channel_type), 4, 3, 1).unwrap()
    }

    #[test]
    fn test_rgba8_round_trip() {
        let mut tex = level(ChannelOrder::RGBA, ChannelType::UnormInt8);
        let mut access = tex.access_mut();
        access.set_pixel([1.0, 0.5, 0.0, 0.25], 2, 1, 0);
        assert_eq!(access.get_pixel_int(2, 1, 0), [255, 128, 0, 64]);
        let read = access.get_pixel(2, 1, 0);
        assert_eq!(read[0], 1.0);
        assert!((read[1] - 128.0 / 255.0).abs() < 1e-6);
        assert_eq!(&tex.data()[(4 + 2) * 4..(4 + 2) * 4 + 4], &[255, 128, 0, 64]);
    }

    #[test]
    fn test_unorm_rounds_half_to_even() {
        let mut tex = level(ChannelOrder::R, ChannelType::UnormInt8);
        let mut access = tex.access_mut();
        // 0.5 * 255 = 127.5 ties to 128
        access.set_pixel([0.5, 0.0, 0.0, 0.0], 0, 0, 0);
        assert_eq!(access.get_pixel_int(0, 0, 0)[0], 128);
        access.set_pixel([2.0, 0.0, 0.0, 0.0], 1, 0, 0);
        assert_eq!(access.get_pixel_int(1, 0, 0)[0], 255);
        access.set_pixel([-1.0, 0.0, 0.0, 0.0], 2, 0, 0);
        assert_eq!(access.get_pixel_int(2, 0, 0)[0], 0);
        assert_eq!(access.get_pixel(2, 0, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_snorm_clamps_to_minus_one() {
        let mut tex = level(ChannelOrder::RG, ChannelType::SnormInt8);
        let mut access = tex.access_mut();
        access.set_pixel_int([-128, 127, 0, 0], 0, 0, 0);
        assert_eq!(access.get_pixel(0, 0, 0), [-1.0, 1.0, 0.0, 1.0]);
    }

    #[test]
    fn test_packed_565_layout() {
        let mut tex = level(ChannelOrder::RGB, ChannelType::UnormShort565);
        let mut access = tex.access_mut();
        access.set_pixel([1.0, 0.0, 1.0, 1.0], 0, 0, 0);
        assert_eq!(load_u16(&tex.data()[0..2]), 0xF81F);
        assert_eq!(tex.access().get_pixel_int(0, 0, 0), [31, 0, 31, 1]);
    }

    #[test]
    fn test_packed_1010102_rev_layout() {
        let mut tex = level(ChannelOrder::RGBA, ChannelType::UnsignedInt1010102Rev);
        let mut access = tex.access_mut();
        access.set_pixel_uint([1023, 1, 0, 3], 1, 0, 0);
        assert_eq!(load_u32(&tex.data()[4..8]), 1023 | (1 << 10) | (3 << 30));
        assert_eq!(tex.access().get_pixel(1, 0, 0), [1023.0, 1.0, 0.0, 3.0]);
    }

    #[test]
    fn test_11f11f10f() {
        let mut tex = level(ChannelOrder::RGB, ChannelType::UnsignedInt11f11f10fRev);
        let mut access = tex.access_mut();
        access.set_pixel([1.0, 2.0, 0.5, 1.0], 0, 0, 0);
        assert_eq!(access.get_pixel(0, 0, 0), [1.0, 2.0, 0.5, 1.0]);
    }

    #[test]
    fn test_999e5_round_trip() {
        let mut tex = level(ChannelOrder::RGB, ChannelType::UnsignedInt999E5Rev);
        let mut access = tex.access_mut();
        access.set_pixel([1.0, 0.5, 0.25, 1.0], 0, 0, 0);
        assert_eq!(access.get_pixel(0, 0, 0), [1.0, 0.5, 0.25, 1.0]);
        access.set_pixel([0.0, 0.0, 0.0, 1.0], 1, 0, 0);
        assert_eq!(access.get_pixel(1, 0, 0), [0.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_half_float_channels() {
        let mut tex = level(ChannelOrder::RGBA, ChannelType::HalfFloat);
        let mut access = tex.access_mut();
        access.set_pixel([1.0, -2.0, 0.5, 65504.0], 3, 2, 0);
        assert_eq!(access.get_pixel(3, 2, 0), [1.0, -2.0, 0.5, 65504.0]);
    }

    #[test]
    fn test_bgra_swizzle() {
        let mut tex = level(ChannelOrder::BGRA, ChannelType::UnormInt8);
        tex.access_mut().set_pixel([1.0, 0.0, 0.0, 1.0], 0, 0, 0);
        assert_eq!(&tex.data()[0..4], &[0, 0, 255, 255]);
        assert_eq!(tex.access().get_pixel(0, 0, 0), [1.0, 0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_depth_stencil_248_preserves_other_part() {
        let mut tex = level(ChannelOrder::DS, ChannelType::UnsignedInt248);
        let mut access = tex.access_mut();
        access.set_pix_stencil(0x5A, 1, 1, 0);
        access.set_pix_depth(1.0, 1, 1, 0);
        assert_eq!(access.get_pix_stencil(1, 1, 0), 0x5A);
        assert_eq!(access.get_pix_depth(1, 1, 0), 1.0);
        access.set_pix_stencil(300, 1, 1, 0);
        assert_eq!(access.get_pix_stencil(1, 1, 0), 255);
        assert_eq!(access.get_pix_depth(1, 1, 0), 1.0);
    }

    #[test]
    fn test_float_depth_stencil_rev() {
        let mut tex = level(ChannelOrder::DS, ChannelType::FloatUnsignedInt248Rev);
        let mut access = tex.access_mut();
        access.set_pix_depth(0.375, 0, 0, 0);
        access.set_pix_stencil(7, 0, 0, 0);
        assert_eq!(access.get_pix_depth(0, 0, 0), 0.375);
        assert_eq!(access.get_pix_stencil(0, 0, 0), 7);
    }

    #[test]
    fn test_separate_depth_and_stencil_formats() {
        let mut depth = level(ChannelOrder::D, ChannelType::UnormInt16);
        depth.access_mut().set_pix_depth(0.5, 0, 0, 0);
        assert_eq!(load_u16(&depth.data()[0..2]), 32768);

        let mut stencil = level(ChannelOrder::S, ChannelType::UnsignedInt8);
        stencil.access_mut().set_pix_stencil(9, 3, 2, 0);
        assert_eq!(stencil.access().get_pix_stencil(3, 2, 0), 9);
        assert_eq!(stencil.access().get_pixel_int(3, 2, 0), [0, 0, 0, 9]);
    }

    #[test]
    fn test_subregion_addresses_parent() {
        let mut tex = level(ChannelOrder::RGBA, ChannelType::UnormInt8);
        {
            let mut sub = tex.access_mut().subregion([1, 1, 0], [2, 2, 1]);
            assert_eq!(sub.width(), 2);
            sub.set_pixel_int([1, 2, 3, 4], 1, 1, 0);
        }
        assert_eq!(tex.access().get_pixel_int(2, 2, 0), [1, 2, 3, 4]);
        let sub = tex.access().subregion([2, 2, 0], [1, 1, 1]);
        assert_eq!(sub.get_pixel_int(0, 0, 0), [1, 2, 3, 4]);
    }

    #[test]
    fn test_access_rejects_short_buffer() {
        let data = [0u8; 15];
        assert!(ConstPixelBufferAccess::new(TextureFormat::rgba8(), 2, 2, 1, &data).is_err());
        let data = [0u8; 16];
        assert!(ConstPixelBufferAccess::new(TextureFormat::rgba8(), 2, 2, 1, &data).is_ok());
    }

    #[test]
    fn test_invalid_level_format() {
        let format = TextureFormat::new(ChannelOrder::DS, ChannelType::UnormInt8);
        assert!(TextureLevel::new(format, 1, 1, 1).is_err());
    }
}
