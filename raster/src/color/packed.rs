//! Bit-packed color formats.
//!
//! Channels pack most-significant-first (red in the high bits, alpha in the
//! low bits). Every format converts through [`ColorRgba<f32>`] so packed
//! textures can participate in blits and pixel placement without a
//! per-format conversion matrix.

use bytemuck::{Pod, Zeroable};

use super::types::ColorRgba;

#[inline]
fn pack_channel(v: f32, bits: u32) -> u32 {
    let max = ((1u32 << bits) - 1) as f32;
    (v.clamp(0.0, 1.0) * max).round() as u32
}

#[inline]
fn unpack_channel(v: u32, bits: u32) -> f32 {
    let max = ((1u32 << bits) - 1) as f32;
    v as f32 / max
}

macro_rules! packed_format {
    (
        $(#[$meta:meta])*
        $name:ident, $repr:ty, [$(($field:ident, $bits:expr)),+]
    ) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Zeroable, Pod)]
        #[repr(transparent)]
        pub struct $name(pub $repr);

        impl $name {
            pub fn pack(c: ColorRgba<f32>) -> Self {
                let mut bits: u32 = 0;
                $(
                    bits = (bits << $bits) | pack_channel(c.$field, $bits);
                )+
                Self(bits as $repr)
            }

            pub fn unpack(self) -> ColorRgba<f32> {
                let mut out = ColorRgba::new(0.0, 0.0, 0.0, 1.0);
                let mut shift: u32 = 0;
                // Fields were packed in declaration order, so unpack from
                // the low bits in reverse.
                $(shift += $bits;)+
                $(
                    shift -= $bits;
                    out.$field = unpack_channel((self.0 as u32 >> shift) & ((1 << $bits) - 1), $bits);
                )+
                out
            }
        }
    };
}

packed_format!(
    /// 8-bit RGB, 3-3-2.
    Rgb332, u8, [(r, 3), (g, 3), (b, 2)]
);

packed_format!(
    /// 16-bit RGB, 5-6-5.
    Rgb565, u16, [(r, 5), (g, 6), (b, 5)]
);

packed_format!(
    /// 16-bit RGBA, 5-5-5-1.
    Rgba5551, u16, [(r, 5), (g, 5), (b, 5), (a, 1)]
);

packed_format!(
    /// 16-bit RGBA, 4-4-4-4.
    Rgba4444, u16, [(r, 4), (g, 4), (b, 4), (a, 4)]
);

packed_format!(
    /// 32-bit RGBA, 10-10-10-2.
    Rgba1010102, u32, [(r, 10), (g, 10), (b, 10), (a, 2)]
);
