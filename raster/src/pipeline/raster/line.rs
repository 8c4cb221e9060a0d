//! The line rasterizer: all-octant Bresenham over two screen vertices.
//!
//! Varyings are endpoint-interpolated; the queue records the scalar
//! interpolant along the dominant axis plus the two bin corners the
//! shading pass should lerp between (wireframe triangles reuse this walk
//! for each edge).

use glam::Vec4;

use super::FragmentContext;
use crate::pipeline::FragmentBin;
use crate::shader::FragCoord;

pub(crate) fn rasterize(ctx: &mut FragmentContext<'_>, bin: &FragmentBin) {
    rasterize_edge(ctx, bin, 0, 1);
}

/// Walks the edge between bin corners `corner_a` and `corner_b`.
pub(crate) fn rasterize_edge(
    ctx: &mut FragmentContext<'_>,
    bin: &FragmentBin,
    corner_a: usize,
    corner_b: usize,
) {
    let p0 = bin.screen_coords[corner_a];
    let p1 = bin.screen_coords[corner_b];

    let x0 = p0.x.floor() as i64;
    let y0 = p0.y.floor() as i64;
    let x1 = p1.x.floor() as i64;
    let y1 = p1.y.floor() as i64;
    let (z0, z1) = (p0.z, p1.z);

    let dx = (x1 - x0).abs();
    let dy = -(y1 - y0).abs();
    let sx = if x0 < x1 { 1 } else { -1 };
    let sy = if y0 < y1 { 1 } else { -1 };

    let total_steps = dx.max(-dy).max(1) as f32;

    let mut err = dx + dy;
    let mut x = x0;
    let mut y = y0;
    let mut step = 0i64;

    loop {
        if x >= 0 && y >= 0 && x < ctx.width as i64 && y < ctx.height as i64 && ctx.owns_row(y) {
            let t = step as f32 / total_steps;
            let z = z0 + (z1 - z0) * t;
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
                    Vec4::new(t, corner_a as f32, corner_b as f32, 0.0),
                );
            }
        }

        if x == x1 && y == y1 {
            break;
        }

        let e2 = 2 * err;
        if e2 >= dy {
            err += dy;
            x += sx;
        }
        if e2 <= dx {
            err += dx;
            y += sy;
        }
        step += 1;
    }
}
