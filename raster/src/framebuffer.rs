//! Framebuffers: attachment slots plus the per-type pixel write paths.
//!
//! A [`Framebuffer`] only records which context-owned textures are
//! attached. At draw time the context resolves it into a
//! [`FramebufferView`] of raw texture views, validates it, and the
//! fragment stage writes through the placement functions selected here.

use glam::Vec4;
use half::f16;

use crate::color::{
    ColorDataType, ColorR, ColorRg, ColorRgb, ColorRgba, ColorScalar, Rgb332, Rgb565, Rgba1010102,
    Rgba4444, Rgba5551,
};
use crate::shader::BlendMode;
use crate::texture::TextureView;
use crate::{Error, TextureId};

/// Color attachment slots per framebuffer.
pub const MAX_COLOR_ATTACHMENTS: usize = 4;

/// A group of color attachments plus at most one depth attachment.
/// Attachments reference context-owned textures; detaching never frees.
#[derive(Debug, Default)]
pub struct Framebuffer {
    colors: [Option<TextureId>; MAX_COLOR_ATTACHMENTS],
    num_reserved: usize,
    depth: Option<TextureId>,
}

impl Framebuffer {
    pub const fn new() -> Self {
        Self {
            colors: [None; MAX_COLOR_ATTACHMENTS],
            num_reserved: 0,
            depth: None,
        }
    }

    /// Declares how many color attachment slots this framebuffer uses.
    /// Shrinking detaches the slots that fall off the end.
    pub fn reserve_color_buffers(&mut self, count: usize) -> Result<(), Error> {
        if count > MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidArgument);
        }

        for slot in self.colors.iter_mut().skip(count) {
            *slot = None;
        }
        self.num_reserved = count;
        Ok(())
    }

    pub fn num_color_buffers(&self) -> usize {
        self.num_reserved
    }

    pub fn attach_color_buffer(&mut self, index: usize, texture: TextureId) -> Result<(), Error> {
        if index >= self.num_reserved {
            return Err(Error::InvalidArgument);
        }
        self.colors[index] = Some(texture);
        Ok(())
    }

    pub fn detach_color_buffer(&mut self, index: usize) -> Option<TextureId> {
        self.colors.get_mut(index).and_then(Option::take)
    }

    pub fn color_buffer(&self, index: usize) -> Option<TextureId> {
        self.colors.get(index).copied().flatten()
    }

    pub fn attach_depth_buffer(&mut self, texture: TextureId) {
        self.depth = Some(texture);
    }

    pub fn detach_depth_buffer(&mut self) -> Option<TextureId> {
        self.depth.take()
    }

    pub fn depth_buffer(&self) -> Option<TextureId> {
        self.depth
    }

    /// Drops a destroyed texture from every slot that references it.
    pub fn drop_texture(&mut self, texture: TextureId) {
        for slot in self.colors.iter_mut() {
            if *slot == Some(texture) {
                *slot = None;
            }
        }
        if self.depth == Some(texture) {
            self.depth = None;
        }
    }
}

/// A framebuffer resolved to raw texture views for one pipeline operation.
#[derive(Copy, Clone, Debug)]
pub struct FramebufferView {
    pub colors: [TextureView; MAX_COLOR_ATTACHMENTS],
    pub num_colors: usize,
    pub depth: Option<TextureView>,
    pub width: u16,
    pub height: u16,
}

impl FramebufferView {
    /// Checks the attachment invariants: at least one attachment, all of
    /// equal extent, and a float-typed depth buffer if one is bound.
    pub fn validate(
        colors: [TextureView; MAX_COLOR_ATTACHMENTS],
        num_colors: usize,
        depth: Option<TextureView>,
    ) -> Result<Self, Error> {
        let mut extent: Option<(u16, u16)> = None;

        for view in colors.iter().take(num_colors).chain(depth.iter()) {
            if view.is_empty() {
                return Err(Error::InvalidArgument);
            }

            match extent {
                None => extent = Some((view.width, view.height)),
                Some(e) => {
                    if e != (view.width, view.height) {
                        return Err(Error::InvalidArgument);
                    }
                }
            }
        }

        let Some((width, height)) = extent else {
            return Err(Error::InvalidArgument);
        };

        if let Some(depth) = &depth {
            if !depth.ty.is_float() || depth.num_channels != 1 {
                return Err(Error::InvalidArgument);
            }
        }

        Ok(Self {
            colors,
            num_colors,
            depth,
            width,
            height,
        })
    }
}

/// Writes one shader output into a color attachment.
pub type PutPixelFn = fn(&TextureView, u16, u16, Vec4);

/// Writes one shader output blended against the attachment.
pub type PutBlendedPixelFn = fn(&TextureView, u16, u16, Vec4, BlendMode);

fn put_r<T: ColorScalar>(view: &TextureView, x: u16, y: u16, c: Vec4) {
    view.set_texel(x, y, ColorR::<T>::new(T::from_norm_f64(c.x as f64)));
}

fn put_rg<T: ColorScalar>(view: &TextureView, x: u16, y: u16, c: Vec4) {
    let texel = ColorRg::<T>::new(T::from_norm_f64(c.x as f64), T::from_norm_f64(c.y as f64));
    view.set_texel(x, y, texel);
}

fn put_rgb<T: ColorScalar>(view: &TextureView, x: u16, y: u16, c: Vec4) {
    let texel = ColorRgb::<T>::new(
        T::from_norm_f64(c.x as f64),
        T::from_norm_f64(c.y as f64),
        T::from_norm_f64(c.z as f64),
    );
    view.set_texel(x, y, texel);
}

fn put_rgba<T: ColorScalar>(view: &TextureView, x: u16, y: u16, c: Vec4) {
    view.set_texel(x, y, ColorRgba::<T>::from_norm_vec4(c));
}

macro_rules! put_packed {
    ($name:ident, $packed:ty) => {
        fn $name(view: &TextureView, x: u16, y: u16, c: Vec4) {
            let rgba = ColorRgba::new(c.x, c.y, c.z, c.w);
            view.set_texel(x, y, <$packed>::pack(rgba));
        }
    };
}

put_packed!(put_332, Rgb332);
put_packed!(put_565, Rgb565);
put_packed!(put_5551, Rgba5551);
put_packed!(put_4444, Rgba4444);
put_packed!(put_1010102, Rgba1010102);

/// Reads an attachment texel widened to normalized RGBA, for blending.
fn read_rgba_norm(view: &TextureView, x: u16, y: u16) -> Vec4 {
    fn read<T: ColorScalar>(view: &TextureView, x: u16, y: u16, channels: u8) -> Vec4 {
        let rgba = match channels {
            1 => view.texel::<ColorR<T>>(x, y).widen(),
            2 => view.texel::<ColorRg<T>>(x, y).widen(),
            3 => view.texel::<ColorRgb<T>>(x, y).widen(),
            _ => view.texel::<ColorRgba<T>>(x, y),
        };
        rgba.to_norm_vec4()
    }

    use ColorDataType as T;

    let ch = view.num_channels;
    match view.ty {
        T::R8Unorm | T::Rg8Unorm | T::Rgb8Unorm | T::Rgba8Unorm => read::<u8>(view, x, y, ch),
        T::R16Unorm | T::Rg16Unorm | T::Rgb16Unorm | T::Rgba16Unorm => read::<u16>(view, x, y, ch),
        T::R32Unorm | T::Rg32Unorm | T::Rgb32Unorm | T::Rgba32Unorm => read::<u32>(view, x, y, ch),
        T::R64Unorm | T::Rg64Unorm | T::Rgb64Unorm | T::Rgba64Unorm => read::<u64>(view, x, y, ch),
        T::R16Float | T::Rg16Float | T::Rgb16Float | T::Rgba16Float => read::<f16>(view, x, y, ch),
        T::R32Float | T::Rg32Float | T::Rgb32Float | T::Rgba32Float => read::<f32>(view, x, y, ch),
        T::R64Float | T::Rg64Float | T::Rgb64Float | T::Rgba64Float => read::<f64>(view, x, y, ch),

        T::Rgb332 => {
            let c = view.texel::<Rgb332>(x, y).unpack();
            Vec4::new(c.r, c.g, c.b, c.a)
        }
        T::Rgb565 => {
            let c = view.texel::<Rgb565>(x, y).unpack();
            Vec4::new(c.r, c.g, c.b, c.a)
        }
        T::Rgba5551 => {
            let c = view.texel::<Rgba5551>(x, y).unpack();
            Vec4::new(c.r, c.g, c.b, c.a)
        }
        T::Rgba4444 => {
            let c = view.texel::<Rgba4444>(x, y).unpack();
            Vec4::new(c.r, c.g, c.b, c.a)
        }
        T::Rgba1010102 => {
            let c = view.texel::<Rgba1010102>(x, y).unpack();
            Vec4::new(c.r, c.g, c.b, c.a)
        }
    }
}

fn put_blended(view: &TextureView, x: u16, y: u16, src: Vec4, blend: BlendMode) {
    let dst = read_rgba_norm(view, x, y);
    let out = blend.blend(src, dst);
    pixel_placement_fn(view.ty)(view, x, y, out);
}

/// Selects the plain write path for an attachment type.
pub fn pixel_placement_fn(ty: ColorDataType) -> PutPixelFn {
    use ColorDataType as T;

    match ty {
        T::R8Unorm => put_r::<u8>,
        T::R16Unorm => put_r::<u16>,
        T::R32Unorm => put_r::<u32>,
        T::R64Unorm => put_r::<u64>,
        T::R16Float => put_r::<f16>,
        T::R32Float => put_r::<f32>,
        T::R64Float => put_r::<f64>,

        T::Rg8Unorm => put_rg::<u8>,
        T::Rg16Unorm => put_rg::<u16>,
        T::Rg32Unorm => put_rg::<u32>,
        T::Rg64Unorm => put_rg::<u64>,
        T::Rg16Float => put_rg::<f16>,
        T::Rg32Float => put_rg::<f32>,
        T::Rg64Float => put_rg::<f64>,

        T::Rgb8Unorm => put_rgb::<u8>,
        T::Rgb16Unorm => put_rgb::<u16>,
        T::Rgb32Unorm => put_rgb::<u32>,
        T::Rgb64Unorm => put_rgb::<u64>,
        T::Rgb16Float => put_rgb::<f16>,
        T::Rgb32Float => put_rgb::<f32>,
        T::Rgb64Float => put_rgb::<f64>,

        T::Rgba8Unorm => put_rgba::<u8>,
        T::Rgba16Unorm => put_rgba::<u16>,
        T::Rgba32Unorm => put_rgba::<u32>,
        T::Rgba64Unorm => put_rgba::<u64>,
        T::Rgba16Float => put_rgba::<f16>,
        T::Rgba32Float => put_rgba::<f32>,
        T::Rgba64Float => put_rgba::<f64>,

        T::Rgb332 => put_332,
        T::Rgb565 => put_565,
        T::Rgba5551 => put_5551,
        T::Rgba4444 => put_4444,
        T::Rgba1010102 => put_1010102,
    }
}

/// Selects the blended write path. All blend arithmetic runs in linear
/// float space; the attachment type only decides the final narrowing.
pub fn blended_pixel_placement_fn(_ty: ColorDataType) -> PutBlendedPixelFn {
    put_blended
}

/// Writes an interpolated depth value into a depth attachment.
pub type PutDepthFn = fn(&TextureView, u16, u16, f32);

/// Reads a stored depth value back as `f32` for the depth test.
pub type ReadDepthFn = fn(&TextureView, u16, u16) -> f32;

fn put_depth_f16(view: &TextureView, x: u16, y: u16, depth: f32) {
    view.set_texel(x, y, f16::from_f32(depth));
}

fn put_depth_f32(view: &TextureView, x: u16, y: u16, depth: f32) {
    view.set_texel(x, y, depth);
}

fn put_depth_f64(view: &TextureView, x: u16, y: u16, depth: f32) {
    view.set_texel(x, y, depth as f64);
}

fn read_depth_f16(view: &TextureView, x: u16, y: u16) -> f32 {
    view.texel::<f16>(x, y).to_f32()
}

fn read_depth_f32(view: &TextureView, x: u16, y: u16) -> f32 {
    view.texel::<f32>(x, y)
}

fn read_depth_f64(view: &TextureView, x: u16, y: u16) -> f32 {
    view.texel::<f64>(x, y) as f32
}

/// Selects the depth write/read pair for a depth attachment type. The
/// framebuffer validity check guarantees a single-channel float type.
pub fn depth_access_fns(ty: ColorDataType) -> (PutDepthFn, ReadDepthFn) {
    match ty {
        ColorDataType::R16Float => (put_depth_f16, read_depth_f16),
        ColorDataType::R64Float => (put_depth_f64, read_depth_f64),
        _ => (put_depth_f32, read_depth_f32),
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::{
        blended_pixel_placement_fn, depth_access_fns, pixel_placement_fn, Framebuffer,
        FramebufferView, MAX_COLOR_ATTACHMENTS,
    };
    use crate::color::{ColorDataType, ColorRgba};
    use crate::shader::BlendMode;
        use crate::texture::{Texture, TextureView};
    use crate::Error;

    fn views(textures: &[&Texture]) -> [TextureView; MAX_COLOR_ATTACHMENTS] {
        let mut out = [TextureView::reset(); MAX_COLOR_ATTACHMENTS];
        for (slot, tex) in out.iter_mut().zip(textures) {
            *slot = *tex.view();
        }
        out
    }

    #[test]
    fn validation_requires_matching_extents() {
        let mut a = Texture::new();
        a.init(ColorDataType::Rgba8Unorm, 8, 8, 1).unwrap();
        let mut b = Texture::new();
        b.init(ColorDataType::Rgba8Unorm, 8, 4, 1).unwrap();

        assert!(FramebufferView::validate(views(&[&a]), 1, None).is_ok());
        assert_eq!(
            FramebufferView::validate(views(&[&a, &b]), 2, None).unwrap_err(),
            Error::InvalidArgument
        );
    }

    #[test]
    fn validation_requires_float_depth() {
        let mut color = Texture::new();
        color.init(ColorDataType::Rgba8Unorm, 8, 8, 1).unwrap();
        let mut bad_depth = Texture::new();
        bad_depth.init(ColorDataType::R32Unorm, 8, 8, 1).unwrap();
        let mut good_depth = Texture::new();
        good_depth.init(ColorDataType::R32Float, 8, 8, 1).unwrap();

        assert_eq!(
            FramebufferView::validate(views(&[&color]), 1, Some(*bad_depth.view())).unwrap_err(),
            Error::InvalidArgument
        );
        assert!(FramebufferView::validate(views(&[&color]), 1, Some(*good_depth.view())).is_ok());
    }

    #[test]
    fn attachment_slots() {
        let mut fbo = Framebuffer::new();
        assert_eq!(fbo.reserve_color_buffers(5), Err(Error::InvalidArgument));
        fbo.reserve_color_buffers(2).unwrap();

        let mut tex = Texture::new();
        tex.init(ColorDataType::Rgba8Unorm, 4, 4, 1).unwrap();
        let id = crate::TextureId::default();

        assert_eq!(fbo.attach_color_buffer(2, id), Err(Error::InvalidArgument));
        fbo.attach_color_buffer(1, id).unwrap();
        assert_eq!(fbo.color_buffer(1), Some(id));
        assert_eq!(fbo.detach_color_buffer(1), Some(id));
        assert_eq!(fbo.color_buffer(1), None);
    }

    #[test]
    fn put_pixel_narrows_to_the_attachment_type() {
        let mut tex = Texture::new();
        tex.init(ColorDataType::Rgba8Unorm, 4, 4, 1).unwrap();

        let put = pixel_placement_fn(tex.data_type());
        put(tex.view(), 1, 2, Vec4::new(1.0, 0.0, 0.0, 1.0));

        assert_eq!(
            tex.texel::<ColorRgba<u8>>(1, 2),
            ColorRgba::new(255, 0, 0, 255)
        );
    }

    #[test]
    fn blended_put_pixel_composites_over_dst() {
        let mut tex = Texture::new();
        tex.init(ColorDataType::Rgba8Unorm, 4, 4, 1).unwrap();

        // Red background.
        pixel_placement_fn(tex.data_type())(tex.view(), 0, 0, Vec4::new(1.0, 0.0, 0.0, 1.0));

        // Half-transparent blue over it.
        let put = blended_pixel_placement_fn(tex.data_type());
        put(
            tex.view(),
            0,
            0,
            Vec4::new(0.0, 0.0, 1.0, 0.5),
            BlendMode::Alpha,
        );

        let out = tex.texel::<ColorRgba<u8>>(0, 0);
        assert_eq!(out.r, 128);
        assert_eq!(out.g, 0);
        assert_eq!(out.b, 128);
    }

    #[test]
    fn depth_round_trip_per_type() {
        for ty in [
            ColorDataType::R16Float,
            ColorDataType::R32Float,
            ColorDataType::R64Float,
        ] {
            let mut tex = Texture::new();
            tex.init(ty, 4, 4, 1).unwrap();

            let (put, read) = depth_access_fns(ty);
            put(tex.view(), 2, 2, 0.5);
            assert_eq!(read(tex.view(), 2, 2), 0.5);
        }
    }
}
