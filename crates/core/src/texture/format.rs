use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::Result;

/// Channel layout of a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelOrder {
    R,
    A,
    I,
    L,
    LA,
    RG,
    RA,
    RGB,
    RGBA,
    ARGB,
    BGRA,
    SRGB,
    SRGBA,
    D,
    S,
    DS,
}

/// Storage type of each channel, or of the whole texel for packed types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChannelType {
    SnormInt8,
    SnormInt16,
    SnormInt32,
    UnormInt8,
    UnormInt16,
    UnormInt32,
    UnormShort565,
    UnormShort555,
    UnormShort4444,
    UnormShort5551,
    UnormInt101010,
    UnormInt1010102Rev,
    UnsignedInt1010102Rev,
    UnsignedInt11f11f10fRev,
    UnsignedInt999E5Rev,
    UnsignedInt248,
    SignedInt8,
    SignedInt16,
    SignedInt32,
    UnsignedInt8,
    UnsignedInt16,
    UnsignedInt32,
    HalfFloat,
    Float,
    FloatUnsignedInt248Rev,
}

impl ChannelType {
    /// Bytes per channel for non-packed types.
    pub fn channel_size(self) -> Option<usize> {
        use ChannelType::*;
        match self {
            SnormInt8 | UnormInt8 | SignedInt8 | UnsignedInt8 => Some(1),
            SnormInt16 | UnormInt16 | SignedInt16 | UnsignedInt16 | HalfFloat => Some(2),
            SnormInt32 | UnormInt32 | SignedInt32 | UnsignedInt32 | Float => Some(4),
            _ => None,
        }
    }

    /// Size of the whole texel for packed types.
    pub fn packed_size(self) -> Option<usize> {
        use ChannelType::*;
        match self {
            UnormShort565 | UnormShort555 | UnormShort4444 | UnormShort5551 => Some(2),
            UnormInt101010 | UnormInt1010102Rev | UnsignedInt1010102Rev
            | UnsignedInt11f11f10fRev | UnsignedInt999E5Rev | UnsignedInt248 => Some(4),
            FloatUnsignedInt248Rev => Some(8),
            _ => None,
        }
    }
}

/// Source of one RGBA component when reading a texel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelSwizzle {
    Channel(usize),
    Zero,
    One,
}

impl ChannelOrder {
    pub fn num_channels(self) -> usize {
        use ChannelOrder::*;
        match self {
            R | A | I | L | D | S => 1,
            LA | RG | RA | DS => 2,
            RGB | SRGB => 3,
            RGBA | ARGB | BGRA | SRGBA => 4,
        }
    }

    /// Stored channel (or constant) feeding each of R, G, B and A.
    pub fn read_swizzle(self) -> [ChannelSwizzle; 4] {
        use ChannelSwizzle::{Channel as C, One, Zero};
        match self {
            ChannelOrder::R => [C(0), Zero, Zero, One],
            ChannelOrder::A => [Zero, Zero, Zero, C(0)],
            ChannelOrder::I => [C(0), C(0), C(0), C(0)],
            ChannelOrder::L => [C(0), C(0), C(0), One],
            ChannelOrder::LA => [C(0), C(0), C(0), C(1)],
            ChannelOrder::RG => [C(0), C(1), Zero, One],
            ChannelOrder::RA => [C(0), Zero, Zero, C(1)],
            ChannelOrder::RGB | ChannelOrder::SRGB => [C(0), C(1), C(2), One],
            ChannelOrder::RGBA | ChannelOrder::SRGBA => [C(0), C(1), C(2), C(3)],
            ChannelOrder::BGRA => [C(2), C(1), C(0), C(3)],
            ChannelOrder::ARGB => [C(1), C(2), C(3), C(0)],
            ChannelOrder::D => [C(0), Zero, Zero, One],
            ChannelOrder::S => [Zero, Zero, Zero, C(0)],
            ChannelOrder::DS => [C(0), Zero, Zero, C(1)],
        }
    }

    /// RGBA component written into each stored channel.
    pub fn write_map(self) -> &'static [usize] {
        use ChannelOrder::*;
        match self {
            R | I | L | D => &[0],
            A | S => &[3],
            LA | RA | DS => &[0, 3],
            RG => &[0, 1],
            RGB | SRGB => &[0, 1, 2],
            RGBA | SRGBA => &[0, 1, 2, 3],
            ARGB => &[3, 0, 1, 2],
            BGRA => &[2, 1, 0, 3],
        }
    }
}

/// Texel format: channel order plus storage type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TextureFormat {
    pub order: ChannelOrder,
    #[serde(rename = "type")]
    pub channel_type: ChannelType,
}

impl TextureFormat {
    pub const fn new(order: ChannelOrder, channel_type: ChannelType) -> Self {
        Self {
            order,
            channel_type,
        }
    }

    /// RGBA, 8-bit unsigned normalized.
    pub const fn rgba8() -> Self {
        Self::new(ChannelOrder::RGBA, ChannelType::UnormInt8)
    }

    /// Whether the order / type pair names a storable format.
    pub fn is_valid(&self) -> bool {
        use ChannelOrder as O;
        use ChannelType as T;
        let order = self.order;
        match self.channel_type {
            T::UnormShort565 | T::UnormShort555 | T::UnormInt101010 => order == O::RGB,
            T::UnsignedInt11f11f10fRev | T::UnsignedInt999E5Rev => order == O::RGB,
            T::UnormShort4444 | T::UnormShort5551 => order == O::RGBA,
            T::UnormInt1010102Rev | T::UnsignedInt1010102Rev => order == O::RGBA,
            T::UnsignedInt248 => matches!(order, O::D | O::DS),
            T::FloatUnsignedInt248Rev => order == O::DS,
            channel_type => match order {
                O::DS => false,
                O::D => matches!(channel_type, T::UnormInt16 | T::UnormInt32 | T::Float),
                O::S => matches!(channel_type, T::UnsignedInt8 | T::UnsignedInt16 | T::UnsignedInt32),
                O::SRGB | O::SRGBA => channel_type == T::UnormInt8,
                _ => true,
            },
        }
    }

    pub fn num_channels(&self) -> usize {
        self.order.num_channels()
    }

    /// Bytes per texel.
    pub fn pixel_size(&self) -> usize {
        match self.channel_type.packed_size() {
            Some(size) => size,
            None => self.num_channels() * self.channel_type.channel_size().unwrap_or(0),
        }
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self.order, ChannelOrder::SRGB | ChannelOrder::SRGBA)
    }

    pub fn has_depth(&self) -> bool {
        matches!(self.order, ChannelOrder::D | ChannelOrder::DS)
    }

    pub fn has_stencil(&self) -> bool {
        matches!(self.order, ChannelOrder::S | ChannelOrder::DS)
    }

    /// Bits of stencil storage.
    pub fn num_stencil_bits(&self) -> Result<u32> {
        use ChannelType as T;
        match (self.order, self.channel_type) {
            (ChannelOrder::S, T::UnsignedInt8) => Ok(8),
            (ChannelOrder::S, T::UnsignedInt16) => Ok(16),
            (ChannelOrder::S, T::UnsignedInt32) => Ok(32),
            (ChannelOrder::DS, T::UnsignedInt248 | T::FloatUnsignedInt248Rev) => Ok(8),
            _ => Err(CoreError::UnsupportedFormat {
                order: self.order,
                channel_type: self.channel_type,
                operation: "stencil",
            }),
        }
    }

    pub(crate) fn unsupported(&self, operation: &'static str) -> CoreError {
        CoreError::UnsupportedFormat {
            order: self.order,
            channel_type: self.channel_type,
            operation,
        }
    }
}
