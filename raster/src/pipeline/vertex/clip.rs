//! Homogeneous Sutherland–Hodgman clipping for partially visible
//! triangles.
//!
//! The polygon is clipped against each half-space `n · v >= 0` in turn;
//! six planes can grow a triangle to at most nine vertices. Varyings are
//! interpolated with the same parametric `t` as the positions. The fan
//! triangulation reuses the parent's primitive index so the ordering
//! contract sees clipped fragments as one primitive.

use glam::Vec4;

use super::{perspective_divide, tri, viewport_transform, VertexStage};
use crate::pipeline::{TransformedVert, MAX_VARYINGS};

/// Largest vertex count a triangle can clip to.
const MAX_CLIPPED_VERTS: usize = 9;

#[cfg(feature = "z-clipping")]
const CLIP_PLANES: [Vec4; 6] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(-1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, -1.0, 0.0, 1.0),
    Vec4::new(0.0, 0.0, 1.0, 1.0),
    Vec4::new(0.0, 0.0, -1.0, 1.0),
];

#[cfg(not(feature = "z-clipping"))]
const CLIP_PLANES: [Vec4; 4] = [
    Vec4::new(1.0, 0.0, 0.0, 1.0),
    Vec4::new(-1.0, 0.0, 0.0, 1.0),
    Vec4::new(0.0, 1.0, 0.0, 1.0),
    Vec4::new(0.0, -1.0, 0.0, 1.0),
];

struct ClipPolygon {
    verts: [Vec4; MAX_CLIPPED_VERTS],
    varyings: [[Vec4; MAX_VARYINGS]; MAX_CLIPPED_VERTS],
    len: usize,
}

impl ClipPolygon {
    fn push(&mut self, vert: Vec4, varyings: [Vec4; MAX_VARYINGS]) {
        self.verts[self.len] = vert;
        self.varyings[self.len] = varyings;
        self.len += 1;
    }
}

/// Clips one triangle, maps the surviving polygon to screen space and
/// fan-triangulates it into bins carrying the parent `prim_index`.
pub(crate) fn clip_and_process(
    stage: &VertexStage<'_>,
    num_varyings: usize,
    prim_index: u64,
    viewport: Vec4,
    a: &TransformedVert,
    b: &TransformedVert,
    c: &TransformedVert,
) {
    let mut poly = ClipPolygon {
        verts: [Vec4::ZERO; MAX_CLIPPED_VERTS],
        varyings: [[Vec4::ZERO; MAX_VARYINGS]; MAX_CLIPPED_VERTS],
        len: 0,
    };
    poly.push(a.vert, a.varyings);
    poly.push(b.vert, b.varyings);
    poly.push(c.vert, c.varyings);

    let mut next = ClipPolygon {
        verts: [Vec4::ZERO; MAX_CLIPPED_VERTS],
        varyings: [[Vec4::ZERO; MAX_VARYINGS]; MAX_CLIPPED_VERTS],
        len: 0,
    };

    for plane in CLIP_PLANES {
        next.len = 0;

        let mut prev = poly.len - 1;
        let mut dist_prev = poly.verts[prev].dot(plane);
        let mut visible_prev = dist_prev >= 0.0;

        for curr in 0..poly.len {
            let dist_curr = poly.verts[curr].dot(plane);
            let visible_curr = dist_curr >= 0.0;

            if visible_prev != visible_curr {
                let t = dist_prev / (dist_prev - dist_curr);
                let vert = poly.verts[prev].lerp(poly.verts[curr], t);

                let mut varyings = [Vec4::ZERO; MAX_VARYINGS];
                for v in 0..num_varyings {
                    varyings[v] = poly.varyings[prev][v].lerp(poly.varyings[curr][v], t);
                }

                next.push(vert, varyings);
            }

            if visible_curr {
                next.push(poly.verts[curr], poly.varyings[curr]);
            }

            prev = curr;
            dist_prev = dist_curr;
            visible_prev = visible_curr;
        }

        if next.len == 0 {
            return;
        }

        std::mem::swap(&mut poly, &mut next);
    }

    if poly.len < 3 {
        return;
    }

    for i in 0..poly.len {
        perspective_divide(&mut poly.verts[i]);
        viewport_transform(&mut poly.verts[i], viewport);
    }

    let v0 = TransformedVert {
        vert: poly.verts[0],
        varyings: poly.varyings[0],
    };

    // Clipped sub-triangles are coplanar pieces of one primitive; they all
    // share the parent's sort index.
    for i in 1..poly.len - 1 {
        let v1 = TransformedVert {
            vert: poly.verts[i],
            varyings: poly.varyings[i],
        };
        let v2 = TransformedVert {
            vert: poly.verts[i + 1],
            varyings: poly.varyings[i + 1],
        };

        tri::push_bin(stage, num_varyings, prim_index, &v0, &v1, &v2);
    }
}
