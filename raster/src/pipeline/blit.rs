//! The blit processor: multithreaded nearest-neighbour copies between
//! textures of any two color types.
//!
//! Stepping across the source uses 16.16 fixed point so the inner loop is
//! integer-only. The `(source type x destination type)` matrix is spelled
//! out as two nested dispatches; every pair monomorphizes its own copy
//! loop. Rows of the destination are round-robined over the pool threads,
//! and the source is sampled bottom-up (y flipped).

use bytemuck::Pod;

use crate::color::{
    ColorDataType, ColorR, ColorRg, ColorRgb, ColorRgba, ColorScalar, Rgb332, Rgb565, Rgba1010102,
    Rgba4444, Rgba5551,
};
use crate::texture::TextureView;

const FIXED_BITS: u64 = 16;

/// A texel that can enter or leave the blit conversion matrix.
pub(crate) trait BlitTexel: Pod {
    type Scalar: ColorScalar;

    /// Widens to RGBA; missing channels read zero, missing alpha reads the
    /// scalar maximum.
    fn to_rgba(self) -> ColorRgba<Self::Scalar>;

    /// Converts scalars and drops the channels this layout lacks.
    fn from_rgba<U: ColorScalar>(rgba: ColorRgba<U>) -> Self;
}

impl<T: ColorScalar> BlitTexel for ColorR<T> {
    type Scalar = T;

    fn to_rgba(self) -> ColorRgba<T> {
        self.widen()
    }

    fn from_rgba<U: ColorScalar>(rgba: ColorRgba<U>) -> Self {
        rgba.cast::<T>().narrow_r()
    }
}

impl<T: ColorScalar> BlitTexel for ColorRg<T> {
    type Scalar = T;

    fn to_rgba(self) -> ColorRgba<T> {
        self.widen()
    }

    fn from_rgba<U: ColorScalar>(rgba: ColorRgba<U>) -> Self {
        rgba.cast::<T>().narrow_rg()
    }
}

impl<T: ColorScalar> BlitTexel for ColorRgb<T> {
    type Scalar = T;

    fn to_rgba(self) -> ColorRgba<T> {
        self.widen()
    }

    fn from_rgba<U: ColorScalar>(rgba: ColorRgba<U>) -> Self {
        rgba.cast::<T>().narrow_rgb()
    }
}

impl<T: ColorScalar> BlitTexel for ColorRgba<T> {
    type Scalar = T;

    fn to_rgba(self) -> ColorRgba<T> {
        self
    }

    fn from_rgba<U: ColorScalar>(rgba: ColorRgba<U>) -> Self {
        rgba.cast::<T>()
    }
}

macro_rules! packed_blit_texel {
    ($packed:ty) => {
        impl BlitTexel for $packed {
            type Scalar = f32;

            fn to_rgba(self) -> ColorRgba<f32> {
                self.unpack()
            }

            fn from_rgba<U: ColorScalar>(rgba: ColorRgba<U>) -> Self {
                Self::pack(rgba.cast::<f32>())
            }
        }
    };
}

packed_blit_texel!(Rgb332);
packed_blit_texel!(Rgb565);
packed_blit_texel!(Rgba5551);
packed_blit_texel!(Rgba4444);
packed_blit_texel!(Rgba1010102);

/// Expands `$with!(TexelType)` for the texel record matching a runtime
/// color tag. Both blit dispatch levels go through this, which is what
/// spells out the full conversion matrix.
macro_rules! dispatch_texel {
    ($ty:expr, $with:ident) => {
        match $ty {
            ColorDataType::R8Unorm => $with!(ColorR<u8>),
            ColorDataType::R16Unorm => $with!(ColorR<u16>),
            ColorDataType::R32Unorm => $with!(ColorR<u32>),
            ColorDataType::R64Unorm => $with!(ColorR<u64>),
            ColorDataType::R16Float => $with!(ColorR<half::f16>),
            ColorDataType::R32Float => $with!(ColorR<f32>),
            ColorDataType::R64Float => $with!(ColorR<f64>),

            ColorDataType::Rg8Unorm => $with!(ColorRg<u8>),
            ColorDataType::Rg16Unorm => $with!(ColorRg<u16>),
            ColorDataType::Rg32Unorm => $with!(ColorRg<u32>),
            ColorDataType::Rg64Unorm => $with!(ColorRg<u64>),
            ColorDataType::Rg16Float => $with!(ColorRg<half::f16>),
            ColorDataType::Rg32Float => $with!(ColorRg<f32>),
            ColorDataType::Rg64Float => $with!(ColorRg<f64>),

            ColorDataType::Rgb8Unorm => $with!(ColorRgb<u8>),
            ColorDataType::Rgb16Unorm => $with!(ColorRgb<u16>),
            ColorDataType::Rgb32Unorm => $with!(ColorRgb<u32>),
            ColorDataType::Rgb64Unorm => $with!(ColorRgb<u64>),
            ColorDataType::Rgb16Float => $with!(ColorRgb<half::f16>),
            ColorDataType::Rgb32Float => $with!(ColorRgb<f32>),
            ColorDataType::Rgb64Float => $with!(ColorRgb<f64>),

            ColorDataType::Rgba8Unorm => $with!(ColorRgba<u8>),
            ColorDataType::Rgba16Unorm => $with!(ColorRgba<u16>),
            ColorDataType::Rgba32Unorm => $with!(ColorRgba<u32>),
            ColorDataType::Rgba64Unorm => $with!(ColorRgba<u64>),
            ColorDataType::Rgba16Float => $with!(ColorRgba<half::f16>),
            ColorDataType::Rgba32Float => $with!(ColorRgba<f32>),
            ColorDataType::Rgba64Float => $with!(ColorRgba<f64>),

            ColorDataType::Rgb332 => $with!(Rgb332),
            ColorDataType::Rgb565 => $with!(Rgb565),
            ColorDataType::Rgba5551 => $with!(Rgba5551),
            ColorDataType::Rgba4444 => $with!(Rgba4444),
            ColorDataType::Rgba1010102 => $with!(Rgba1010102),
        }
    };
}

/// One thread's share of a blit.
pub(crate) struct BlitProcessor {
    pub thread_id: usize,
    pub num_threads: usize,
    pub src: TextureView,
    pub dst: TextureView,
    /// `[x0, y0, x1, y1]` in the source, exclusive on the high edge.
    pub src_rect: [u16; 4],
    /// `[x0, y0, x1, y1]` in the destination.
    pub dst_rect: [u16; 4],
}

impl BlitProcessor {
    pub fn execute(&mut self) {
        let src_ty = self.src.ty;

        macro_rules! with_src {
            ($S:ty) => {
                self.blit_src::<$S>()
            };
        }
        dispatch_texel!(src_ty, with_src);
    }

    fn blit_src<S: BlitTexel>(&self) {
        let dst_ty = self.dst.ty;

        macro_rules! with_dst {
            ($D:ty) => {
                self.blit_nearest::<S, $D>()
            };
        }
        dispatch_texel!(dst_ty, with_dst);
    }

    fn blit_nearest<S: BlitTexel, D: BlitTexel>(&self) {
        let [src_x0, src_y0, src_x1, src_y1] = self.src_rect.map(u64::from);
        let [dst_x0, dst_y0, dst_x1, dst_y1] = self.dst_rect.map(u64::from);

        let in_w = src_x1 - src_x0;
        let in_h = src_y1 - src_y0;
        let out_w = dst_x1 - dst_x0;
        let out_h = dst_y1 - dst_y0;
        if in_w == 0 || in_h == 0 || out_w == 0 || out_h == 0 {
            return;
        }

        let x0 = dst_x0;
        let x1 = dst_x1.min(self.dst.width as u64);
        let y1 = dst_y1.min(self.dst.height as u64);

        // Plus one to absorb truncation; the step never lands past the
        // last source texel after clamping below.
        let fstep_x = ((in_w << FIXED_BITS) / out_w) + 1;
        let fstep_y = ((in_h << FIXED_BITS) / out_h) + 1;

        let mut y = dst_y0 + self.thread_id as u64;
        while y < y1 {
            let yf = (((y - dst_y0) * fstep_y) >> FIXED_BITS).min(in_h - 1);
            // The source is stored bottom-up relative to the destination.
            let src_y = (src_y1 - 1 - yf) as u16;

            for x in x0..x1 {
                let xf = (((x - dst_x0) * fstep_x) >> FIXED_BITS).min(in_w - 1);
                let src_x = (src_x0 + xf) as u16;

                let texel = self.src.texel::<S>(src_x, src_y);
                self.dst
                    .set_texel::<D>(x as u16, y as u16, D::from_rgba(texel.to_rgba()));
            }

            y += self.num_threads as u64;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{BlitProcessor, BlitTexel};
    use crate::color::{ColorDataType, ColorR, ColorRgb, ColorRgba, Rgb565};
    use crate::swizzle::TexelOrder;
    use crate::texture::Texture;

    fn run_blit(src: &Texture, dst: &mut Texture) {
        let mut task = BlitProcessor {
            thread_id: 0,
            num_threads: 1,
            src: *src.view(),
            dst: *dst.view(),
            src_rect: [0, 0, src.width(), src.height()],
            dst_rect: [0, 0, dst.width(), dst.height()],
        };
        task.execute();
    }

    #[test]
    fn channel_widening_rules() {
        let r = ColorR::<u8>::new(200);
        let rgba = r.to_rgba();
        assert_eq!(rgba, ColorRgba::new(200, 0, 0, 255));

        let back = ColorRgb::<u16>::from_rgba(rgba);
        assert_eq!(back, ColorRgb::new(200 * 257, 0, 0));
    }

    #[test]
    fn packed_texels_convert_through_rgba() {
        let red = Rgb565::pack(ColorRgba::new(1.0, 0.0, 0.0, 1.0));
        let rgba8 = ColorRgba::<u8>::from_rgba(red.to_rgba());
        assert_eq!(rgba8, ColorRgba::new(255, 0, 0, 255));
    }

    #[test]
    fn same_size_blit_flips_y() {
        let mut src = Texture::new();
        src.init(ColorDataType::R8Unorm, 4, 4, 1).unwrap();
        for y in 0..4u16 {
            for x in 0..4u16 {
                src.set_texel(x, y, (y * 10 + x) as u8);
            }
        }

        let mut dst = Texture::new();
        dst.init(ColorDataType::R8Unorm, 4, 4, 1).unwrap();
        run_blit(&src, &mut dst);

        // Destination row 0 holds the source's top row (y = 3).
        assert_eq!(dst.texel::<u8>(0, 0), 30);
        assert_eq!(dst.texel::<u8>(3, 0), 33);
        assert_eq!(dst.texel::<u8>(0, 3), 0);
    }

    #[test]
    fn type_converting_blit() {
        let mut src = Texture::new();
        src.init(ColorDataType::Rgba32Float, 2, 2, 1).unwrap();
        for y in 0..2u16 {
            for x in 0..2u16 {
                src.set_texel(x, y, ColorRgba::<f32>::new(1.0, 0.5, 0.0, 1.0));
            }
        }

        let mut dst = Texture::new();
        dst.init(ColorDataType::Rgba8Unorm, 2, 2, 1).unwrap();
        run_blit(&src, &mut dst);

        let out = dst.texel::<ColorRgba<u8>>(0, 0);
        assert_eq!(out.r, 255);
        assert_eq!(out.g, 128);
        assert_eq!(out.b, 0);
        assert_eq!(out.a, 255);
    }

    #[test]
    fn swizzled_source_reads_correctly() {
        let mut src = Texture::new();
        src.init_with_order(ColorDataType::Rg8Unorm, 7, 11, 1, TexelOrder::Swizzled)
            .unwrap();
        for y in 0..11u16 {
            for x in 0..7u16 {
                src.set_texel(x, y, crate::color::ColorRg::<u8>::new(x as u8, y as u8));
            }
        }

        let mut dst = Texture::new();
        dst.init(ColorDataType::Rg8Unorm, 7, 11, 1).unwrap();
        run_blit(&src, &mut dst);

        for y in 0..11u16 {
            for x in 0..7u16 {
                let texel = dst.texel::<crate::color::ColorRg<u8>>(x, y);
                // y is flipped by the blit.
                assert_eq!(texel, crate::color::ColorRg::new(x as u8, 10 - y as u8));
            }
        }
    }

    #[test]
    fn upscaling_blit_covers_the_destination() {
        let mut src = Texture::new();
        src.init(ColorDataType::R8Unorm, 2, 2, 1).unwrap();
        src.set_texel(0, 0, 1u8);
        src.set_texel(1, 0, 2u8);
        src.set_texel(0, 1, 3u8);
        src.set_texel(1, 1, 4u8);

        let mut dst = Texture::new();
        dst.init(ColorDataType::R8Unorm, 8, 8, 1).unwrap();
        run_blit(&src, &mut dst);

        for y in 0..8u16 {
            for x in 0..8u16 {
                assert_ne!(dst.texel::<u8>(x, y), 0, "uncovered texel at ({x},{y})");
            }
        }
    }
}
