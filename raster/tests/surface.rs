//! Attachment-level operations through the context: blits and clears.

use raster::color::{ColorDataType, ColorRg, ColorRgb, ColorRgba};
use raster::{Context, TexelOrder, TextureView};

#[test]
fn swizzled_texture_blits_into_an_ordered_one() {
    let mut ctx = Context::with_threads(2);

    // Every texel of the source records its own coordinate.
    let src = ctx.create_texture();
    ctx.texture_mut(src)
        .unwrap()
        .init_with_order(ColorDataType::Rg8Unorm, 7, 11, 1, TexelOrder::Swizzled)
        .unwrap();
    for y in 0..11u16 {
        for x in 0..7u16 {
            ctx.texture_mut(src)
                .unwrap()
                .set_texel(x, y, ColorRg::<u8>::new(x as u8, y as u8));
        }
    }

    let dst = ctx.create_texture();
    ctx.texture_mut(dst)
        .unwrap()
        .init(ColorDataType::Rg8Unorm, 7, 11, 1)
        .unwrap();

    ctx.blit(dst, src).unwrap();

    // The blit samples the source bottom-up.
    let dst_tex = ctx.texture(dst).unwrap();
    for y in 0..11u16 {
        for x in 0..7u16 {
            assert_eq!(
                dst_tex.texel::<ColorRg<u8>>(x, y),
                ColorRg::new(x as u8, 10 - y as u8),
                "at ({x},{y})"
            );
        }
    }
}

#[test]
fn blit_converts_between_color_types() {
    let mut ctx = Context::with_threads(1);

    let src = ctx.create_texture();
    ctx.texture_mut(src)
        .unwrap()
        .init(ColorDataType::Rgb8Unorm, 4, 4, 1)
        .unwrap();
    for y in 0..4u16 {
        for x in 0..4u16 {
            ctx.texture_mut(src)
                .unwrap()
                .set_texel(x, y, ColorRgb::<u8>::new(255, 128, 0));
        }
    }

    let dst = ctx.create_texture();
    ctx.texture_mut(dst)
        .unwrap()
        .init(ColorDataType::Rgba16Unorm, 4, 4, 1)
        .unwrap();

    ctx.blit(dst, src).unwrap();

    let out = ctx.texture(dst).unwrap().texel::<ColorRgba<u16>>(0, 0);
    assert_eq!(out.r, 65535);
    assert_eq!(out.g, 128 * 257);
    assert_eq!(out.b, 0);
    // The alpha channel the source lacks fills with the maximum.
    assert_eq!(out.a, 65535);
}

#[test]
fn blit_into_an_external_pixel_buffer() {
    let mut ctx = Context::with_threads(2);

    let src = ctx.create_texture();
    ctx.texture_mut(src)
        .unwrap()
        .init(ColorDataType::Rgba8Unorm, 4, 4, 1)
        .unwrap();
    for y in 0..4u16 {
        for x in 0..4u16 {
            ctx.texture_mut(src)
                .unwrap()
                .set_texel(x, y, ColorRgba::<u8>::new(y as u8, 0, 0, 255));
        }
    }

    let mut backing = vec![0u8; 4 * 4 * 4];
    // SAFETY: the backing buffer outlives the view and matches 4x4 RGBA8.
    let view = unsafe {
        TextureView::from_raw_parts(
            4,
            4,
            1,
            ColorDataType::Rgba8Unorm,
            TexelOrder::Ordered,
            backing.as_mut_ptr(),
        )
    };

    ctx.blit_to_buffer(&view, src).unwrap();

    // Row 0 of the buffer holds the source's top row (y = 3).
    assert_eq!(backing[0], 3);
    let last_row = 3 * 4 * 4;
    assert_eq!(backing[last_row], 0);
}

#[test]
fn clear_color_and_depth_in_one_pass() {
    let mut ctx = Context::with_threads(3);

    let color = ctx.create_texture();
    ctx.texture_mut(color)
        .unwrap()
        .init(ColorDataType::Rgba8Unorm, 9, 5, 1)
        .unwrap();
    let depth = ctx.create_texture();
    ctx.texture_mut(depth)
        .unwrap()
        .init(ColorDataType::R32Float, 9, 5, 1)
        .unwrap();

    let fbo = ctx.create_framebuffer();
    let fb = ctx.framebuffer_mut(fbo).unwrap();
    fb.reserve_color_buffers(1).unwrap();
    fb.attach_color_buffer(0, color).unwrap();
    fb.attach_depth_buffer(depth);

    ctx.clear_framebuffer(fbo, 0, ColorRgba::new(0.0, 1.0, 0.0, 1.0), 0.25)
        .unwrap();

    let color_tex = ctx.texture(color).unwrap();
    let depth_tex = ctx.texture(depth).unwrap();
    for y in 0..5u16 {
        for x in 0..9u16 {
            assert_eq!(
                color_tex.texel::<ColorRgba<u8>>(x, y),
                ColorRgba::new(0, 255, 0, 255)
            );
            assert_eq!(depth_tex.texel::<f32>(x, y), 0.25);
        }
    }
}

#[test]
fn clear_multiple_attachments() {
    let mut ctx = Context::with_threads(2);

    let mut attachments = Vec::new();
    let fbo = ctx.create_framebuffer();
    ctx.framebuffer_mut(fbo).unwrap().reserve_color_buffers(2).unwrap();

    for i in 0..2 {
        let tex = ctx.create_texture();
        ctx.texture_mut(tex)
            .unwrap()
            .init(ColorDataType::Rgba8Unorm, 6, 6, 1)
            .unwrap();
        ctx.framebuffer_mut(fbo)
            .unwrap()
            .attach_color_buffer(i, tex)
            .unwrap();
        attachments.push(tex);
    }

    ctx.clear_framebuffers(
        fbo,
        &[
            (0, ColorRgba::new(1.0, 0.0, 0.0, 1.0)),
            (1, ColorRgba::new(0.0, 0.0, 1.0, 1.0)),
        ],
        None,
    )
    .unwrap();

    assert_eq!(
        ctx.texture(attachments[0])
            .unwrap()
            .texel::<ColorRgba<u8>>(5, 5),
        ColorRgba::new(255, 0, 0, 255)
    );
    assert_eq!(
        ctx.texture(attachments[1])
            .unwrap()
            .texel::<ColorRgba<u8>>(0, 0),
        ColorRgba::new(0, 0, 255, 255)
    );
}

#[test]
fn clear_to_a_packed_format() {
    let mut ctx = Context::with_threads(1);

    let color = ctx.create_texture();
    ctx.texture_mut(color)
        .unwrap()
        .init(ColorDataType::Rgb565, 4, 4, 1)
        .unwrap();

    let fbo = ctx.create_framebuffer();
    let fb = ctx.framebuffer_mut(fbo).unwrap();
    fb.reserve_color_buffers(1).unwrap();
    fb.attach_color_buffer(0, color).unwrap();

    ctx.clear_color_buffer(fbo, 0, ColorRgba::new(1.0, 0.0, 0.0, 1.0))
        .unwrap();

    assert_eq!(ctx.texture(color).unwrap().texel::<u16>(2, 2), 0xF800);
}
