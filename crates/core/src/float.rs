//! Arbitrary-width binary floating point formats.
//!
//! A [`FloatFormat`] describes a layout of `1 + E + M` bits: sign bit at the
//! top (always present, left at zero by unsigned formats), then `E` exponent
//! bits and `M` mantissa bits. [`EncodedFloat`] pairs a raw bit pattern with
//! its format and converts between formats using round-to-nearest-even,
//! handling denormals, infinities and NaN.
//!
//! # Usage
//!
//! ```rust
//! use refrast_core::float::{f32_to_half, half_to_f32, EncodedFloat, FLOAT16};
//!
//! assert_eq!(f32_to_half(1.0), 0x3C00);
//! assert_eq!(half_to_f32(0x3C00), 1.0);
//! assert!(EncodedFloat::from_f32(FLOAT16, f32::NAN).is_nan());
//! ```

use crate::error::CoreError;
use crate::logging::{log, LogCategory, LogLevel};
use crate::Result;

/// Bit layout of a floating point encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FloatFormat {
    exponent_bits: u32,
    mantissa_bits: u32,
    exponent_bias: i32,
    has_sign: bool,
    supports_denormals: bool,
}

/// Unsigned 10-bit float (blue channel of `R11F_G11F_B10F`).
pub const FLOAT10: FloatFormat = FloatFormat::raw(5, 5, 15, false, false);
/// Unsigned 11-bit float.
pub const FLOAT11: FloatFormat = FloatFormat::raw(5, 6, 15, false, false);
/// IEEE 754 binary16.
pub const FLOAT16: FloatFormat = FloatFormat::raw(5, 10, 15, true, true);
/// IEEE 754 binary32.
pub const FLOAT32: FloatFormat = FloatFormat::raw(8, 23, 127, true, true);
/// IEEE 754 binary64.
pub const FLOAT64: FloatFormat = FloatFormat::raw(11, 52, 1023, true, true);

/// Classification of an encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FloatClass {
    Zero,
    Denormal,
    Normal,
    Infinity,
    NaN,
}

impl FloatFormat {
    const fn raw(
        exponent_bits: u32,
        mantissa_bits: u32,
        exponent_bias: i32,
        has_sign: bool,
        supports_denormals: bool,
    ) -> Self {
        Self {
            exponent_bits,
            mantissa_bits,
            exponent_bias,
            has_sign,
            supports_denormals,
        }
    }

    /// Create a format, rejecting layouts that do not fit the 64-bit codec.
    pub fn new(
        exponent_bits: u32,
        mantissa_bits: u32,
        exponent_bias: i32,
        has_sign: bool,
        supports_denormals: bool,
    ) -> Result<Self> {
        let valid = (1..=11).contains(&exponent_bits)
            && (1..=52).contains(&mantissa_bits)
            && 1 + exponent_bits + mantissa_bits <= 64;
        if !valid {
            log(LogCategory::Codec, LogLevel::Warn, || {
                format!(
                    "Rejected float format with {} exponent / {} mantissa bits",
                    exponent_bits, mantissa_bits
                )
            });
            return Err(CoreError::InvalidFloatFormat {
                exponent_bits,
                mantissa_bits,
            });
        }
        Ok(Self::raw(
            exponent_bits,
            mantissa_bits,
            exponent_bias,
            has_sign,
            supports_denormals,
        ))
    }

    pub fn exponent_bits(&self) -> u32 {
        self.exponent_bits
    }

    pub fn mantissa_bits(&self) -> u32 {
        self.mantissa_bits
    }

    pub fn exponent_bias(&self) -> i32 {
        self.exponent_bias
    }

    pub fn has_sign(&self) -> bool {
        self.has_sign
    }

    pub fn supports_denormals(&self) -> bool {
        self.supports_denormals
    }

    /// Width of the encoding including the sign bit position.
    pub fn total_bits(&self) -> u32 {
        1 + self.exponent_bits + self.mantissa_bits
    }

    pub fn total_bytes(&self) -> u32 {
        self.total_bits().div_ceil(8)
    }

    /// Smallest unbiased exponent of a normal value.
    pub fn min_exponent(&self) -> i32 {
        1 - self.exponent_bias
    }

    /// Largest unbiased exponent of a finite value.
    pub fn max_exponent(&self) -> i32 {
        ((1i32 << self.exponent_bits) - 2) - self.exponent_bias
    }

    fn exponent_mask(&self) -> u64 {
        (1u64 << self.exponent_bits) - 1
    }

    fn mantissa_mask(&self) -> u64 {
        (1u64 << self.mantissa_bits) - 1
    }

    fn sign_mask(&self, sign: i32) -> u64 {
        if sign < 0 && self.has_sign {
            1u64 << (self.exponent_bits + self.mantissa_bits)
        } else {
            0
        }
    }

    pub fn zero(&self, sign: i32) -> EncodedFloat {
        EncodedFloat::from_bits(*self, self.sign_mask(sign))
    }

    pub fn inf(&self, sign: i32) -> EncodedFloat {
        EncodedFloat::from_bits(
            *self,
            self.sign_mask(sign) | (self.exponent_mask() << self.mantissa_bits),
        )
    }

    /// Canonical NaN: every bit below the sign bit set.
    pub fn nan(&self) -> EncodedFloat {
        EncodedFloat::from_bits(
            *self,
            (1u64 << (self.exponent_bits + self.mantissa_bits)) - 1,
        )
    }

    fn check_sign(&self, sign: i32) -> Result<()> {
        if sign != 1 && sign != -1 {
            return Err(CoreError::InvalidFloatConstruct(format!(
                "sign must be 1 or -1, got {}",
                sign
            )));
        }
        if sign < 0 && !self.has_sign {
            return Err(CoreError::InvalidFloatConstruct(
                "negative value in unsigned format".to_string(),
            ));
        }
        Ok(())
    }

    /// Build a value from an unbiased exponent and a mantissa that includes
    /// the leading bit. `(0, 0)` is shorthand for zero; an exponent of
    /// `1 - bias` without the leading bit denotes a denormal.
    pub fn construct(&self, sign: i32, exponent: i32, mantissa: u64) -> Result<EncodedFloat> {
        self.check_sign(sign)?;
        let leading = mantissa >> self.mantissa_bits;
        let is_shorthand_zero = exponent == 0 && mantissa == 0;
        let is_denorm_or_zero = exponent == self.min_exponent() && leading == 0;

        if is_shorthand_zero || is_denorm_or_zero {
            return Ok(EncodedFloat::from_bits(
                *self,
                self.sign_mask(sign) | mantissa,
            ));
        }
        if leading != 1 {
            return Err(CoreError::InvalidFloatConstruct(format!(
                "mantissa {:#x} lacks a single leading bit",
                mantissa
            )));
        }
        let biased = exponent + self.exponent_bias;
        if biased < 1 || biased as u64 >= self.exponent_mask() {
            return Err(CoreError::InvalidFloatConstruct(format!(
                "exponent {} out of range",
                exponent
            )));
        }
        Ok(EncodedFloat::from_bits(
            *self,
            self.sign_mask(sign)
                | ((biased as u64) << self.mantissa_bits)
                | (mantissa & self.mantissa_mask()),
        ))
    }

    /// Build a value from raw fields; the exponent is unbiased and the
    /// mantissa excludes the leading bit.
    pub fn construct_bits(
        &self,
        sign: i32,
        exponent: i32,
        mantissa_bits: u64,
    ) -> Result<EncodedFloat> {
        self.check_sign(sign)?;
        let biased = exponent + self.exponent_bias;
        if biased < 0 || biased as u64 > self.exponent_mask() {
            return Err(CoreError::InvalidFloatConstruct(format!(
                "exponent {} out of range",
                exponent
            )));
        }
        if mantissa_bits > self.mantissa_mask() {
            return Err(CoreError::InvalidFloatConstruct(format!(
                "mantissa bits {:#x} wider than {} bits",
                mantissa_bits, self.mantissa_bits
            )));
        }
        Ok(EncodedFloat::from_bits(
            *self,
            self.sign_mask(sign) | ((biased as u64) << self.mantissa_bits) | mantissa_bits,
        ))
    }
}

/// A bit pattern interpreted in a [`FloatFormat`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EncodedFloat {
    format: FloatFormat,
    bits: u64,
}

impl EncodedFloat {
    pub fn from_bits(format: FloatFormat, bits: u64) -> Self {
        let total = format.total_bits();
        let mask = if total >= 64 {
            u64::MAX
        } else {
            (1u64 << total) - 1
        };
        Self {
            format,
            bits: bits & mask,
        }
    }

    /// Encode a native float. The value goes through binary32 first.
    pub fn from_f32(format: FloatFormat, value: f32) -> Self {
        Self::from_bits(FLOAT32, u64::from(value.to_bits())).convert(format)
    }

    pub fn from_f64(format: FloatFormat, value: f64) -> Self {
        Self::from_bits(FLOAT64, value.to_bits()).convert(format)
    }

    pub fn format(&self) -> FloatFormat {
        self.format
    }

    pub fn bits(&self) -> u64 {
        self.bits
    }

    pub fn sign_bit(&self) -> u64 {
        (self.bits >> (self.format.exponent_bits + self.format.mantissa_bits)) & 1
    }

    pub fn exponent_bits(&self) -> u64 {
        (self.bits >> self.format.mantissa_bits) & self.format.exponent_mask()
    }

    pub fn mantissa_bits(&self) -> u64 {
        self.bits & self.format.mantissa_mask()
    }

    pub fn sign(&self) -> i32 {
        if self.sign_bit() != 0 {
            -1
        } else {
            1
        }
    }

    /// Unbiased exponent; denormals report the minimum normal exponent.
    pub fn exponent(&self) -> i32 {
        if self.is_denorm() {
            self.format.min_exponent()
        } else {
            self.exponent_bits() as i32 - self.format.exponent_bias
        }
    }

    /// Mantissa including the implicit leading bit for normal values.
    pub fn mantissa(&self) -> u64 {
        if self.is_zero() || self.is_denorm() {
            self.mantissa_bits()
        } else {
            (1u64 << self.format.mantissa_bits) | self.mantissa_bits()
        }
    }

    pub fn is_zero(&self) -> bool {
        self.exponent_bits() == 0 && self.mantissa_bits() == 0
    }

    pub fn is_denorm(&self) -> bool {
        self.exponent_bits() == 0 && self.mantissa_bits() != 0
    }

    pub fn is_inf(&self) -> bool {
        self.exponent_bits() == self.format.exponent_mask() && self.mantissa_bits() == 0
    }

    pub fn is_nan(&self) -> bool {
        self.exponent_bits() == self.format.exponent_mask() && self.mantissa_bits() != 0
    }

    pub fn classify(&self) -> FloatClass {
        if self.is_nan() {
            FloatClass::NaN
        } else if self.is_inf() {
            FloatClass::Infinity
        } else if self.is_zero() {
            FloatClass::Zero
        } else if self.is_denorm() {
            FloatClass::Denormal
        } else {
            FloatClass::Normal
        }
    }

    pub fn to_f64(&self) -> f64 {
        match self.classify() {
            FloatClass::NaN => f64::NAN,
            FloatClass::Infinity => f64::INFINITY * f64::from(self.sign()),
            FloatClass::Zero => {
                if self.sign() < 0 {
                    -0.0
                } else {
                    0.0
                }
            }
            FloatClass::Denormal | FloatClass::Normal => {
                let scale = self.exponent() - self.format.mantissa_bits as i32;
                f64::from(self.sign()) * scale_by_pow2(self.mantissa() as f64, scale)
            }
        }
    }

    pub fn to_f32(&self) -> f32 {
        f32::from_bits(self.convert(FLOAT32).bits as u32)
    }

    /// Re-encode into another format with round-to-nearest-even.
    pub fn convert(&self, target: FloatFormat) -> EncodedFloat {
        if self.is_nan() {
            return target.nan();
        }
        let sign = self.sign();
        if !target.has_sign && sign < 0 {
            return target.zero(1);
        }
        if self.is_inf() {
            return target.inf(sign);
        }
        if self.is_zero() {
            return target.zero(sign);
        }

        let src_m = self.format.mantissa_bits as i32;
        let dst_m = target.mantissa_bits as i32;
        let mut e = self.exponent();
        let mut m = self.mantissa();

        if self.is_denorm() {
            while m & (1u64 << src_m) == 0 {
                m <<= 1;
                e -= 1;
            }
        }

        let e_min = target.min_exponent();
        let e_max = target.max_exponent();

        if e < e_min {
            if target.supports_denormals && e_min - e - 1 <= dst_m {
                let bit_diff = (src_m - dst_m) + (e_min - e);
                let denorm = if bit_diff > 0 {
                    round_shift_right(m, bit_diff as u32)
                } else {
                    m << (-bit_diff) as u32
                };
                // Rounding up to 1 << M lands in the exponent field as the
                // smallest normal.
                return EncodedFloat::from_bits(target, target.sign_mask(sign) | denorm);
            }
            return target.zero(sign);
        }

        m &= !(1u64 << src_m);
        if src_m < dst_m {
            m <<= (dst_m - src_m) as u32;
        } else if src_m > dst_m {
            m = round_shift_right(m, (src_m - dst_m) as u32);
            if m & (1u64 << dst_m) != 0 {
                m = 0;
                e += 1;
            }
        }

        if e > e_max {
            return target.inf(sign);
        }

        EncodedFloat::from_bits(
            target,
            target.sign_mask(sign) | (((e + target.exponent_bias) as u64) << dst_m) | m,
        )
    }
}

/// Shift right rounding to nearest, ties to even.
fn round_shift_right(value: u64, shift: u32) -> u64 {
    if shift >= 64 {
        return 0;
    }
    let value = u128::from(value);
    let half = (1u128 << (shift - 1)) - 1;
    let bias = (value >> shift) & 1;
    ((value + half + bias) >> shift) as u64
}

fn scale_by_pow2(mut value: f64, mut exponent: i32) -> f64 {
    while exponent > 1000 {
        value *= 2f64.powi(1000);
        exponent -= 1000;
    }
    while exponent < -1000 {
        value *= 2f64.powi(-1000);
        exponent += 1000;
    }
    value * 2f64.powi(exponent)
}

pub fn f32_to_half(value: f32) -> u16 {
    EncodedFloat::from_f32(FLOAT16, value).bits() as u16
}

pub fn half_to_f32(bits: u16) -> f32 {
    EncodedFloat::from_bits(FLOAT16, u64::from(bits)).to_f32()
}

pub fn f32_to_float11(value: f32) -> u32 {
    EncodedFloat::from_f32(FLOAT11, value).bits() as u32
}

pub fn float11_to_f32(bits: u32) -> f32 {
    EncodedFloat::from_bits(FLOAT11, u64::from(bits)).to_f32()
}

pub fn f32_to_float10(value: f32) -> u32 {
    EncodedFloat::from_f32(FLOAT10, value).bits() as u32
}

pub fn float10_to_f32(bits: u32) -> f32 {
    EncodedFloat::from_bits(FLOAT10, u64::from(bits)).to_f32()
}
