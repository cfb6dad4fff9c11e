//! Core primitives for the reference rasterizer: custom float formats,
//! vertex attribute decoding and texel storage.

pub mod error;
pub mod float;
pub mod logging;
pub mod texture;
pub mod vertex;

pub mod types {
    use serde::{Deserialize, Serialize};

    pub type Vec4 = [f32; 4];
    pub type IVec4 = [i32; 4];
    pub type UVec4 = [u32; 4];

    /// Lane a generic vector is stored in.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub enum GenericVecType {
        Float,
        Int32,
        Uint32,
    }

    /// Four component value tagged with its lane, used for vertex inputs,
    /// varyings and fragment outputs.
    #[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
    pub enum GenericVec4 {
        Float(Vec4),
        Int(IVec4),
        Uint(UVec4),
    }

    impl Default for GenericVec4 {
        fn default() -> Self {
            GenericVec4::Float([0.0; 4])
        }
    }

    impl GenericVec4 {
        pub fn vec_type(&self) -> GenericVecType {
            match self {
                GenericVec4::Float(_) => GenericVecType::Float,
                GenericVec4::Int(_) => GenericVecType::Int32,
                GenericVec4::Uint(_) => GenericVecType::Uint32,
            }
        }

        /// Value conversion into the float lane.
        pub fn to_float(&self) -> Vec4 {
            match *self {
                GenericVec4::Float(v) => v,
                GenericVec4::Int(v) => v.map(|c| c as f32),
                GenericVec4::Uint(v) => v.map(|c| c as f32),
            }
        }

        /// Value conversion into the signed lane (floats truncate toward zero).
        pub fn to_int(&self) -> IVec4 {
            match *self {
                GenericVec4::Float(v) => v.map(|c| c as i32),
                GenericVec4::Int(v) => v,
                GenericVec4::Uint(v) => v.map(|c| c as i32),
            }
        }

        /// Value conversion into the unsigned lane.
        pub fn to_uint(&self) -> UVec4 {
            match *self {
                GenericVec4::Float(v) => v.map(|c| c as u32),
                GenericVec4::Int(v) => v.map(|c| c as u32),
                GenericVec4::Uint(v) => v,
            }
        }

        /// Converts into the requested lane.
        pub fn convert(&self, vec_type: GenericVecType) -> GenericVec4 {
            match vec_type {
                GenericVecType::Float => GenericVec4::Float(self.to_float()),
                GenericVecType::Int32 => GenericVec4::Int(self.to_int()),
                GenericVecType::Uint32 => GenericVec4::Uint(self.to_uint()),
            }
        }
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        #[test]
        fn test_generic_vec_conversions() {
            let v = GenericVec4::Float([1.75, -2.5, 0.0, 1.0]);
            assert_eq!(v.to_int(), [1, -2, 0, 1]);
            assert_eq!(v.vec_type(), GenericVecType::Float);

            let i = GenericVec4::Int([-3, 4, 5, 6]);
            assert_eq!(i.to_float(), [-3.0, 4.0, 5.0, 6.0]);
            assert_eq!(
                i.convert(GenericVecType::Uint32),
                GenericVec4::Uint([(-3i32) as u32, 4, 5, 6])
            );
        }
    }
}

pub use error::CoreError;

/// Result alias used throughout the core crate.
pub type Result<T> = std::result::Result<T, CoreError>;
