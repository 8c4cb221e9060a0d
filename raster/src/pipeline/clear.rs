//! The clear processor: typed fills of whole attachments.
//!
//! One task clears up to four color attachments plus a depth attachment in
//! a single pool dispatch. Each thread fills a contiguous slice of the
//! texel range; 4- and 8-byte texels collapse to word fills.

use crate::color::Color;
use crate::swizzle::{chunk_pad, TexelOrder};
use crate::texture::TextureView;

/// Four color attachments plus one depth attachment.
pub(crate) const MAX_CLEAR_TARGETS: usize = 5;

/// One thread's share of a clear.
pub(crate) struct ClearProcessor {
    pub thread_id: usize,
    pub num_threads: usize,
    pub targets: [Option<(TextureView, Color)>; MAX_CLEAR_TARGETS],
}

impl ClearProcessor {
    pub fn execute(&mut self) {
        for target in self.targets.iter().flatten() {
            let (view, color) = target;
            self.fill(view, color);
        }
    }

    fn fill(&self, view: &TextureView, color: &Color) {
        if view.is_empty() {
            return;
        }
        debug_assert_eq!(view.ty, color.data_type());

        // Swizzled layouts scatter logical texels across the chunk-padded
        // range, so the padded range is what gets filled.
        let num_texels = match view.order {
            TexelOrder::Ordered => view.num_texels(),
            TexelOrder::Swizzled => {
                chunk_pad(view.width as u32) as usize
                    * chunk_pad(view.height as u32) as usize
                    * chunk_pad(view.depth as u32) as usize
            }
        };

        let per_thread = num_texels.div_ceil(self.num_threads);
        let begin = per_thread * self.thread_id;
        let end = num_texels.min(begin + per_thread);
        if begin >= end {
            return;
        }

        let bytes = color.as_bytes();
        let base = view.data().unwrap().as_ptr();

        match bytes.len() {
            4 => {
                let value = u32::from_ne_bytes(bytes.try_into().unwrap());
                for i in begin..end {
                    // SAFETY: `i` is inside the (padded) texel range backed
                    // by the allocation; threads fill disjoint slices.
                    unsafe { (base as *mut u32).add(i).write_unaligned(value) };
                }
            }
            8 => {
                let value = u64::from_ne_bytes(bytes.try_into().unwrap());
                for i in begin..end {
                    // SAFETY: as above.
                    unsafe { (base as *mut u64).add(i).write_unaligned(value) };
                }
            }
            len => {
                for i in begin..end {
                    // SAFETY: as above.
                    unsafe {
                        std::ptr::copy_nonoverlapping(bytes.as_ptr(), base.add(i * len), len);
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ClearProcessor, MAX_CLEAR_TARGETS};
    use crate::color::{Color, ColorDataType, ColorRgba};
    use crate::swizzle::TexelOrder;
    use crate::texture::Texture;

    fn clear_single(view: crate::texture::TextureView, color: Color, threads: usize) {
        for thread_id in 0..threads {
            let mut targets: [Option<_>; MAX_CLEAR_TARGETS] = Default::default();
            targets[0] = Some((view, color));
            ClearProcessor {
                thread_id,
                num_threads: threads,
                targets,
            }
            .execute();
        }
    }

    #[test]
    fn word_fill_rgba8() {
        let mut tex = Texture::new();
        tex.init(ColorDataType::Rgba8Unorm, 5, 7, 1).unwrap();

        let color = Color::from_rgba_f64(tex.data_type(), ColorRgba::new(1.0, 0.0, 0.0, 1.0));
        clear_single(*tex.view(), color, 3);

        for y in 0..7u16 {
            for x in 0..5u16 {
                assert_eq!(
                    tex.texel::<ColorRgba<u8>>(x, y),
                    ColorRgba::new(255, 0, 0, 255)
                );
            }
        }
    }

    #[test]
    fn element_fill_rgb8() {
        let mut tex = Texture::new();
        tex.init(ColorDataType::Rgb8Unorm, 4, 4, 1).unwrap();

        let color = Color::from_rgba_f64(tex.data_type(), ColorRgba::new(0.0, 1.0, 0.0, 1.0));
        clear_single(*tex.view(), color, 2);

        for y in 0..4u16 {
            for x in 0..4u16 {
                assert_eq!(
                    tex.texel::<crate::color::ColorRgb<u8>>(x, y),
                    crate::color::ColorRgb::new(0, 255, 0)
                );
            }
        }
    }

    #[test]
    fn depth_fill_f32() {
        let mut tex = Texture::new();
        tex.init(ColorDataType::R32Float, 8, 8, 1).unwrap();

        let color = Color::from_rgba_f64(tex.data_type(), ColorRgba::new(0.5, 0.0, 0.0, 0.0));
        clear_single(*tex.view(), color, 4);

        for y in 0..8u16 {
            for x in 0..8u16 {
                assert_eq!(tex.texel::<f32>(x, y), 0.5);
            }
        }
    }

    #[test]
    fn swizzled_fill_covers_every_logical_texel() {
        let mut tex = Texture::new();
        tex.init_with_order(ColorDataType::R8Unorm, 6, 6, 1, TexelOrder::Swizzled)
            .unwrap();

        let color = Color::from_rgba_f64(tex.data_type(), ColorRgba::new(1.0, 0.0, 0.0, 0.0));
        clear_single(*tex.view(), color, 2);

        for y in 0..6u16 {
            for x in 0..6u16 {
                assert_eq!(tex.texel::<u8>(x, y), 255);
            }
        }
    }
}
