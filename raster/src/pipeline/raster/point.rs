//! The point rasterizer: one pixel per bin, no interpolation.

use glam::Vec4;

use super::FragmentContext;
use crate::pipeline::FragmentBin;
use crate::shader::FragCoord;

pub(crate) fn rasterize(ctx: &mut FragmentContext<'_>, bin: &FragmentBin) {
    let p = bin.screen_coords[0];
    let x = p.x as i64;
    let y = p.y as i64;

    if x < 0 || y < 0 || x >= ctx.width as i64 || y >= ctx.height as i64 || !ctx.owns_row(y) {
        return;
    }

    let z = p.z;
    let (px, py) = (x as u16, y as u16);

    if ctx.test_depth(px, py, z) {
        ctx.write_depth(px, py, z);
        ctx.push_frag(
            bin,
            FragCoord {
                x: px,
                y: py,
                depth: z,
            },
            Vec4::ZERO,
        );
    }
}
