//! Typed color records.
//!
//! Every channel layout exists for every scalar in
//! `{u8, u16, u32, u64, f16, f32, f64}`. Casting between scalars preserves
//! relative intensity: integers rescale by the exact ratio of their maxima
//! (every integer maximum divides `u64::MAX`, so integer round-trips are
//! exact), floats normalize to `[0, 1]`.

use bytemuck::{Pod, Zeroable};
use glam::Vec4;
use half::f16;

/// A scalar that can act as a color channel.
pub trait ColorScalar: Copy + PartialOrd + Pod + Send + Sync + 'static {
    /// The upper end of the intensity range. Integers use the type maximum,
    /// floats use `1.0`.
    const MAX: Self;

    const IS_FLOAT: bool;

    /// Widens to the full `u64` intensity range. Only meaningful for
    /// integer scalars; floats route through [`to_norm_f64`].
    ///
    /// [`to_norm_f64`]: Self::to_norm_f64
    fn to_scaled_u64(self) -> u64;

    fn from_scaled_u64(v: u64) -> Self;

    /// The value normalized so that `MAX` maps to `1.0`. Float scalars
    /// return their raw value.
    fn to_norm_f64(self) -> f64;

    fn from_norm_f64(v: f64) -> Self;
}

macro_rules! impl_int_scalar {
    ($t:ty) => {
        impl ColorScalar for $t {
            const MAX: Self = <$t>::MAX;
            const IS_FLOAT: bool = false;

            #[inline]
            fn to_scaled_u64(self) -> u64 {
                // `MAX` divides `u64::MAX` for every unsigned width, so the
                // scale factor is exact.
                self as u64 * (u64::MAX / <$t>::MAX as u64)
            }

            #[inline]
            fn from_scaled_u64(v: u64) -> Self {
                (v / (u64::MAX / <$t>::MAX as u64)) as $t
            }

            #[inline]
            fn to_norm_f64(self) -> f64 {
                self as f64 / <$t>::MAX as f64
            }

            #[inline]
            fn from_norm_f64(v: f64) -> Self {
                (v * <$t>::MAX as f64).round() as $t
            }
        }
    };
}

impl_int_scalar!(u8);
impl_int_scalar!(u16);
impl_int_scalar!(u32);
impl_int_scalar!(u64);

macro_rules! impl_float_scalar {
    ($t:ty) => {
        impl ColorScalar for $t {
            const MAX: Self = 1.0;
            const IS_FLOAT: bool = true;

            #[inline]
            fn to_scaled_u64(self) -> u64 {
                (self as f64 * u64::MAX as f64) as u64
            }

            #[inline]
            fn from_scaled_u64(v: u64) -> Self {
                (v as f64 / u64::MAX as f64) as $t
            }

            #[inline]
            fn to_norm_f64(self) -> f64 {
                self as f64
            }

            #[inline]
            fn from_norm_f64(v: f64) -> Self {
                v as $t
            }
        }
    };
}

impl_float_scalar!(f32);
impl_float_scalar!(f64);

impl ColorScalar for f16 {
    const MAX: Self = f16::ONE;
    const IS_FLOAT: bool = true;

    #[inline]
    fn to_scaled_u64(self) -> u64 {
        (self.to_f64() * u64::MAX as f64) as u64
    }

    #[inline]
    fn from_scaled_u64(v: u64) -> Self {
        f16::from_f64(v as f64 / u64::MAX as f64)
    }

    #[inline]
    fn to_norm_f64(self) -> f64 {
        self.to_f64()
    }

    #[inline]
    fn from_norm_f64(v: f64) -> Self {
        f16::from_f64(v)
    }
}

/// Rescales one channel between scalar types.
#[inline]
pub fn scalar_cast<T, U>(v: U) -> T
where
    T: ColorScalar,
    U: ColorScalar,
{
    if !T::IS_FLOAT && !U::IS_FLOAT {
        // Integer to integer through the widened range keeps the ratio of
        // maxima exact in both directions.
        T::from_scaled_u64(v.to_scaled_u64())
    } else {
        T::from_norm_f64(v.to_norm_f64())
    }
}

macro_rules! color_record {
    ($name:ident, $($field:ident),+) => {
        #[derive(Copy, Clone, Debug, Default, PartialEq)]
        #[repr(C)]
        pub struct $name<T> {
            $(pub $field: T,)+
        }

        // SAFETY: all fields share the scalar type, so the layout has no
        // padding and every bit pattern of the fields is valid.
        unsafe impl<T: Zeroable> Zeroable for $name<T> {}
        unsafe impl<T: Pod> Pod for $name<T> {}

        impl<T> $name<T> {
            #[inline]
            pub const fn new($($field: T),+) -> Self {
                Self { $($field,)+ }
            }
        }

        impl<U: ColorScalar> $name<U> {
            /// Rescales every channel into the target scalar type.
            #[inline]
            pub fn cast<T: ColorScalar>(self) -> $name<T> {
                $name {
                    $($field: scalar_cast(self.$field),)+
                }
            }
        }
    };
}

color_record!(ColorR, r);
color_record!(ColorRg, r, g);
color_record!(ColorRgb, r, g, b);
color_record!(ColorRgba, r, g, b, a);

pub type ColorR8 = ColorR<u8>;
pub type ColorRgb8 = ColorRgb<u8>;
pub type ColorRgba8 = ColorRgba<u8>;
pub type ColorRgbF = ColorRgb<f32>;
pub type ColorRgbaF = ColorRgba<f32>;

impl<T: ColorScalar> ColorR<T> {
    #[inline]
    pub fn widen(self) -> ColorRgba<T> {
        ColorRgba::new(self.r, T::zeroed(), T::zeroed(), T::MAX)
    }
}

impl<T: ColorScalar> ColorRg<T> {
    #[inline]
    pub fn widen(self) -> ColorRgba<T> {
        ColorRgba::new(self.r, self.g, T::zeroed(), T::MAX)
    }
}

impl<T: ColorScalar> ColorRgb<T> {
    #[inline]
    pub fn widen(self) -> ColorRgba<T> {
        ColorRgba::new(self.r, self.g, self.b, T::MAX)
    }
}

impl<T: ColorScalar> ColorRgba<T> {
    #[inline]
    pub fn widen(self) -> ColorRgba<T> {
        self
    }

    /// Intensity-normalized view, `MAX` mapping to `1.0`.
    #[inline]
    pub fn to_norm_vec4(self) -> Vec4 {
        Vec4::new(
            self.r.to_norm_f64() as f32,
            self.g.to_norm_f64() as f32,
            self.b.to_norm_f64() as f32,
            self.a.to_norm_f64() as f32,
        )
    }

    #[inline]
    pub fn from_norm_vec4(v: Vec4) -> Self {
        Self::new(
            T::from_norm_f64(v.x as f64),
            T::from_norm_f64(v.y as f64),
            T::from_norm_f64(v.z as f64),
            T::from_norm_f64(v.w as f64),
        )
    }

    #[inline]
    pub fn narrow_rgb(self) -> ColorRgb<T> {
        ColorRgb::new(self.r, self.g, self.b)
    }

    #[inline]
    pub fn narrow_rg(self) -> ColorRg<T> {
        ColorRg::new(self.r, self.g)
    }

    #[inline]
    pub fn narrow_r(self) -> ColorR<T> {
        ColorR::new(self.r)
    }
}

#[cfg(test)]
mod tests {
    use half::f16;

    use super::{scalar_cast, ColorRgb, ColorRgba};

    #[test]
    fn int_round_trip_is_exact() {
        for v in [0u8, 1, 7, 127, 128, 200, 255] {
            let wide: u16 = scalar_cast(v);
            assert_eq!(scalar_cast::<u8, u16>(wide), v);

            let wide: u32 = scalar_cast(v);
            assert_eq!(scalar_cast::<u8, u32>(wide), v);

            let wide: u64 = scalar_cast(v);
            assert_eq!(scalar_cast::<u8, u64>(wide), v);
        }

        for v in [0u16, 1, 256, 32767, 65535] {
            let wide: u64 = scalar_cast(v);
            assert_eq!(scalar_cast::<u16, u64>(wide), v);
        }
    }

    #[test]
    fn narrowing_round_trip_within_one_unit() {
        for v in [0u16, 255, 257, 4096, 65535] {
            let narrow: u8 = scalar_cast(v);
            let back: u16 = scalar_cast(narrow);
            assert!(back.abs_diff(v) <= 257, "{v} -> {narrow} -> {back}");
        }
    }

    #[test]
    fn int_extremes_map_to_extremes() {
        assert_eq!(scalar_cast::<u16, u8>(255), 65535);
        assert_eq!(scalar_cast::<u8, u16>(65535), 255);
        assert_eq!(scalar_cast::<u64, u8>(255), u64::MAX);
        assert_eq!(scalar_cast::<u8, u64>(u64::MAX), 255);
        assert_eq!(scalar_cast::<u32, u8>(0), 0);
    }

    #[test]
    fn float_to_int() {
        assert_eq!(scalar_cast::<u8, f32>(1.0), 255);
        assert_eq!(scalar_cast::<u8, f32>(0.0), 0);
        assert_eq!(scalar_cast::<u16, f32>(0.5), 32768);
        assert_eq!(scalar_cast::<u8, f64>(1.0), 255);
    }

    #[test]
    fn int_to_float() {
        assert_eq!(scalar_cast::<f32, u8>(255), 1.0);
        assert_eq!(scalar_cast::<f32, u8>(0), 0.0);
        assert!((scalar_cast::<f32, u16>(32768) - 0.50000763).abs() < 1e-6);
    }

    #[test]
    fn half_round_trip() {
        for v in [0.0f32, 0.25, 0.5, 1.0] {
            let h: f16 = scalar_cast(v);
            let back: f32 = scalar_cast(h);
            assert!((back - v).abs() < 1e-3);
        }
        assert_eq!(scalar_cast::<u8, f16>(f16::ONE), 255);
    }

    #[test]
    fn record_cast_applies_per_channel() {
        let c = ColorRgb::<u8>::new(0, 128, 255);
        let wide: ColorRgb<u16> = c.cast();
        assert_eq!(wide, ColorRgb::new(0, 128 * 257, 65535));
    }

    #[test]
    fn widen_fills_opaque_alpha() {
        let c = ColorRgb::<u8>::new(1, 2, 3).widen();
        assert_eq!(c, ColorRgba::new(1, 2, 3, 255));
    }
}
