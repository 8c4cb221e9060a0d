//! The triangle rasterizer.
//!
//! Row spans are solved directly from the stored barycentric edge
//! functions: each weight is affine in `x` for a fixed row, so the three
//! half-plane constraints give the span bounds in constant time. Both span
//! ends round toward the interior and the inclusive `>= 0` weight test is
//! the fill rule everywhere, so output is identical for any thread count.

use glam::{Vec3, Vec4};

use super::FragmentContext;
use crate::pipeline::FragmentBin;
use crate::shader::FragCoord;

pub(crate) fn rasterize(ctx: &mut FragmentContext<'_>, bin: &FragmentBin) {
    let [p0, p1, p2] = bin.screen_coords;

    let min_x = p0.x.min(p1.x).min(p2.x).floor().max(0.0) as i64;
    let min_y = p0.y.min(p1.y).min(p2.y).floor().max(0.0) as i64;
    let max_x = (p0.x.max(p1.x).max(p2.x).ceil() as i64).min(ctx.width as i64 - 1);
    let max_y = (p0.y.max(p1.y).max(p2.y).ceil() as i64).min(ctx.height as i64 - 1);

    if max_x < min_x || max_y < min_y {
        return;
    }

    let ddx = Vec3::new(
        bin.barycentric[0].x,
        bin.barycentric[0].y,
        bin.barycentric[0].z,
    );
    let ddy = Vec3::new(
        bin.barycentric[1].x,
        bin.barycentric[1].y,
        bin.barycentric[1].z,
    );
    let ddz = Vec3::new(
        bin.barycentric[2].x,
        bin.barycentric[2].y,
        bin.barycentric[2].z,
    );
    let zs = Vec3::new(p0.z, p1.z, p2.z);

    let mut y = ctx.first_owned_row(min_y);
    while y <= max_y {
        let row = ddy * y as f32 + ddz;

        // Intersect the three half-planes `ddx[i] * x + row[i] >= 0` with
        // the bounding box, rounding inward.
        let mut lo = min_x as f32;
        let mut hi = max_x as f32;
        let mut empty = false;

        for i in 0..3 {
            let a = ddx[i];
            let c = row[i];

            if a > 0.0 {
                lo = lo.max((-c / a).ceil());
            } else if a < 0.0 {
                hi = hi.min((-c / a).floor());
            } else if c < 0.0 {
                empty = true;
                break;
            }
        }

        if !empty && lo <= hi {
            let mut x = lo as i64;
            let span_end = hi as i64;

            while x <= span_end {
                let weights = ddx * x as f32 + row;

                // The span solve is exact up to rounding; the weight test
                // settles the boundary pixels.
                if weights.x >= 0.0 && weights.y >= 0.0 && weights.z >= 0.0 {
                    let z = weights.dot(zs);
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
                            Vec4::new(weights.x, weights.y, weights.z, 0.0),
                        );
                    }
                }

                x += 1;
            }
        }

        y += ctx.row_step();
    }
}
