//! The color and texel type system.
//!
//! Texels come in four channel layouts times seven scalar types, plus a
//! handful of bit-packed formats. [`ColorDataType`] is the runtime tag a
//! texture or buffer carries; the typed records live in [`types`] and
//! [`packed`].

pub mod hsx;
pub mod packed;
pub mod types;

use bytemuck::Pod;

pub use self::packed::{Rgb332, Rgb565, Rgba1010102, Rgba4444, Rgba5551};
pub use self::types::{
    scalar_cast, ColorR, ColorR8, ColorRg, ColorRgb, ColorRgb8, ColorRgbF, ColorRgba, ColorRgba8,
    ColorRgbaF, ColorScalar,
};

/// Runtime tag for every supported texel layout.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ColorDataType {
    R8Unorm,
    R16Unorm,
    R32Unorm,
    R64Unorm,
    R16Float,
    R32Float,
    R64Float,

    Rg8Unorm,
    Rg16Unorm,
    Rg32Unorm,
    Rg64Unorm,
    Rg16Float,
    Rg32Float,
    Rg64Float,

    Rgb8Unorm,
    Rgb16Unorm,
    Rgb32Unorm,
    Rgb64Unorm,
    Rgb16Float,
    Rgb32Float,
    Rgb64Float,

    Rgba8Unorm,
    Rgba16Unorm,
    Rgba32Unorm,
    Rgba64Unorm,
    Rgba16Float,
    Rgba32Float,
    Rgba64Float,

    Rgb332,
    Rgb565,
    Rgba5551,
    Rgba4444,
    Rgba1010102,
}

impl ColorDataType {
    /// Size of one texel in bytes.
    pub const fn bytes_per_texel(self) -> usize {
        match self {
            Self::R8Unorm => 1,
            Self::R16Unorm | Self::R16Float => 2,
            Self::R32Unorm | Self::R32Float => 4,
            Self::R64Unorm | Self::R64Float => 8,

            Self::Rg8Unorm => 2,
            Self::Rg16Unorm | Self::Rg16Float => 4,
            Self::Rg32Unorm | Self::Rg32Float => 8,
            Self::Rg64Unorm | Self::Rg64Float => 16,

            Self::Rgb8Unorm => 3,
            Self::Rgb16Unorm | Self::Rgb16Float => 6,
            Self::Rgb32Unorm | Self::Rgb32Float => 12,
            Self::Rgb64Unorm | Self::Rgb64Float => 24,

            Self::Rgba8Unorm => 4,
            Self::Rgba16Unorm | Self::Rgba16Float => 8,
            Self::Rgba32Unorm | Self::Rgba32Float => 16,
            Self::Rgba64Unorm | Self::Rgba64Float => 32,

            Self::Rgb332 => 1,
            Self::Rgb565 | Self::Rgba5551 | Self::Rgba4444 => 2,
            Self::Rgba1010102 => 4,
        }
    }

    /// Number of channels a texel carries.
    pub const fn num_channels(self) -> usize {
        match self {
            Self::R8Unorm
            | Self::R16Unorm
            | Self::R32Unorm
            | Self::R64Unorm
            | Self::R16Float
            | Self::R32Float
            | Self::R64Float => 1,

            Self::Rg8Unorm
            | Self::Rg16Unorm
            | Self::Rg32Unorm
            | Self::Rg64Unorm
            | Self::Rg16Float
            | Self::Rg32Float
            | Self::Rg64Float => 2,

            Self::Rgb8Unorm
            | Self::Rgb16Unorm
            | Self::Rgb32Unorm
            | Self::Rgb64Unorm
            | Self::Rgb16Float
            | Self::Rgb32Float
            | Self::Rgb64Float
            | Self::Rgb332
            | Self::Rgb565 => 3,

            Self::Rgba8Unorm
            | Self::Rgba16Unorm
            | Self::Rgba32Unorm
            | Self::Rgba64Unorm
            | Self::Rgba16Float
            | Self::Rgba32Float
            | Self::Rgba64Float
            | Self::Rgba5551
            | Self::Rgba4444
            | Self::Rgba1010102 => 4,
        }
    }

    /// Whether the scalar type is a float. Only float types may back a
    /// depth attachment.
    pub const fn is_float(self) -> bool {
        matches!(
            self,
            Self::R16Float
                | Self::R32Float
                | Self::R64Float
                | Self::Rg16Float
                | Self::Rg32Float
                | Self::Rg64Float
                | Self::Rgb16Float
                | Self::Rgb32Float
                | Self::Rgb64Float
                | Self::Rgba16Float
                | Self::Rgba32Float
                | Self::Rgba64Float
        )
    }

    /// Whether texels are bit-packed rather than channel-per-scalar.
    pub const fn is_packed(self) -> bool {
        matches!(
            self,
            Self::Rgb332 | Self::Rgb565 | Self::Rgba5551 | Self::Rgba4444 | Self::Rgba1010102
        )
    }
}

const MAX_TEXEL_BYTES: usize = 32;

/// A clear value tagged with its texel layout.
///
/// Carries a typed color from the public clear API down to the per-type
/// fill paths without making every clear entry point generic.
#[derive(Copy, Clone, Debug)]
pub struct Color {
    ty: ColorDataType,
    bytes: [u8; MAX_TEXEL_BYTES],
}

impl Color {
    /// Wraps an already-typed texel value. The record size must match the
    /// tag; mismatches are a caller bug.
    pub fn new<C: Pod>(ty: ColorDataType, value: C) -> Self {
        let src = bytemuck::bytes_of(&value);
        assert_eq!(src.len(), ty.bytes_per_texel());

        let mut bytes = [0; MAX_TEXEL_BYTES];
        bytes[..src.len()].copy_from_slice(src);
        Self { ty, bytes }
    }

    /// Builds the texel representation of a normalized RGBA value for any
    /// layout. Missing channels are dropped.
    pub fn from_rgba_f64(ty: ColorDataType, rgba: ColorRgba<f64>) -> Self {
        use ColorDataType as T;

        match ty {
            T::R8Unorm => Self::new(ty, rgba.cast::<u8>().narrow_r()),
            T::R16Unorm => Self::new(ty, rgba.cast::<u16>().narrow_r()),
            T::R32Unorm => Self::new(ty, rgba.cast::<u32>().narrow_r()),
            T::R64Unorm => Self::new(ty, rgba.cast::<u64>().narrow_r()),
            T::R16Float => Self::new(ty, rgba.cast::<half::f16>().narrow_r()),
            T::R32Float => Self::new(ty, rgba.cast::<f32>().narrow_r()),
            T::R64Float => Self::new(ty, rgba.narrow_r()),

            T::Rg8Unorm => Self::new(ty, rgba.cast::<u8>().narrow_rg()),
            T::Rg16Unorm => Self::new(ty, rgba.cast::<u16>().narrow_rg()),
            T::Rg32Unorm => Self::new(ty, rgba.cast::<u32>().narrow_rg()),
            T::Rg64Unorm => Self::new(ty, rgba.cast::<u64>().narrow_rg()),
            T::Rg16Float => Self::new(ty, rgba.cast::<half::f16>().narrow_rg()),
            T::Rg32Float => Self::new(ty, rgba.cast::<f32>().narrow_rg()),
            T::Rg64Float => Self::new(ty, rgba.narrow_rg()),

            T::Rgb8Unorm => Self::new(ty, rgba.cast::<u8>().narrow_rgb()),
            T::Rgb16Unorm => Self::new(ty, rgba.cast::<u16>().narrow_rgb()),
            T::Rgb32Unorm => Self::new(ty, rgba.cast::<u32>().narrow_rgb()),
            T::Rgb64Unorm => Self::new(ty, rgba.cast::<u64>().narrow_rgb()),
            T::Rgb16Float => Self::new(ty, rgba.cast::<half::f16>().narrow_rgb()),
            T::Rgb32Float => Self::new(ty, rgba.cast::<f32>().narrow_rgb()),
            T::Rgb64Float => Self::new(ty, rgba.narrow_rgb()),

            T::Rgba8Unorm => Self::new(ty, rgba.cast::<u8>()),
            T::Rgba16Unorm => Self::new(ty, rgba.cast::<u16>()),
            T::Rgba32Unorm => Self::new(ty, rgba.cast::<u32>()),
            T::Rgba64Unorm => Self::new(ty, rgba.cast::<u64>()),
            T::Rgba16Float => Self::new(ty, rgba.cast::<half::f16>()),
            T::Rgba32Float => Self::new(ty, rgba.cast::<f32>()),
            T::Rgba64Float => Self::new(ty, rgba),

            T::Rgb332 => Self::new(ty, Rgb332::pack(rgba.cast::<f32>())),
            T::Rgb565 => Self::new(ty, Rgb565::pack(rgba.cast::<f32>())),
            T::Rgba5551 => Self::new(ty, Rgba5551::pack(rgba.cast::<f32>())),
            T::Rgba4444 => Self::new(ty, Rgba4444::pack(rgba.cast::<f32>())),
            T::Rgba1010102 => Self::new(ty, Rgba1010102::pack(rgba.cast::<f32>())),
        }
    }

    pub fn data_type(&self) -> ColorDataType {
        self.ty
    }

    /// The texel bytes, sized for the tagged layout.
    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes[..self.ty.bytes_per_texel()]
    }
}

#[cfg(test)]
mod tests {
    use super::{Color, ColorDataType, ColorRgba};

    #[test]
    fn texel_sizes_and_channels() {
        assert_eq!(ColorDataType::R8Unorm.bytes_per_texel(), 1);
        assert_eq!(ColorDataType::Rgb16Float.bytes_per_texel(), 6);
        assert_eq!(ColorDataType::Rgba64Float.bytes_per_texel(), 32);
        assert_eq!(ColorDataType::Rgb565.bytes_per_texel(), 2);

        assert_eq!(ColorDataType::R32Float.num_channels(), 1);
        assert_eq!(ColorDataType::Rgb565.num_channels(), 3);
        assert_eq!(ColorDataType::Rgba1010102.num_channels(), 4);
    }

    #[test]
    fn float_predicate_excludes_packed() {
        assert!(ColorDataType::R16Float.is_float());
        assert!(ColorDataType::Rgba64Float.is_float());
        assert!(!ColorDataType::R8Unorm.is_float());
        assert!(!ColorDataType::Rgba1010102.is_float());
        assert!(ColorDataType::Rgba5551.is_packed());
        assert!(!ColorDataType::Rgba8Unorm.is_packed());
    }

    #[test]
    fn clear_value_bytes() {
        let c = Color::from_rgba_f64(
            ColorDataType::Rgba8Unorm,
            ColorRgba::new(1.0, 0.0, 0.0, 1.0),
        );
        assert_eq!(c.as_bytes(), &[255, 0, 0, 255]);

        let c = Color::from_rgba_f64(ColorDataType::R16Unorm, ColorRgba::new(1.0, 0.0, 0.0, 1.0));
        assert_eq!(c.as_bytes(), &65535u16.to_ne_bytes());
    }
}
