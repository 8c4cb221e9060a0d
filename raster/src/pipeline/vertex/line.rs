//! Line vertex processing.
//!
//! Lines skip homogeneous clipping: a bounding-box test against the
//! framebuffer rejects off-screen primitives and the rasterizer clamps
//! the rest per pixel.

use glam::Vec4;

use super::VertexStage;
use crate::pipeline::cache::PtvCache;
use crate::pipeline::{partition_indexed, FragmentBin, TransformedVert};
use crate::pool::BoundMesh;
use crate::shader::VertexParam;

/// Perspective divide plus screen scale for both endpoints, stashing
/// `1/w`.
fn world_to_screen(v: &mut Vec4, half_w: f32, half_h: f32) {
    let w_inv = v.w.recip();
    let ndc = *v * w_inv;
    *v = Vec4::new(ndc.x * half_w + half_w, ndc.y * half_h + half_h, ndc.z, w_inv);
}

fn push_bin(
    stage: &VertexStage<'_>,
    num_varyings: usize,
    prim_index: u64,
    fbo_w: f32,
    fbo_h: f32,
    a: &TransformedVert,
    b: &TransformedVert,
) {
    let p0 = a.vert;
    let p1 = b.vert;

    let min_x = p0.x.min(p1.x);
    let min_y = p0.y.min(p1.y);
    let max_x = p0.x.max(p1.x);
    let max_y = p0.y.max(p1.y);

    if max_x < 0.0 || max_y < 0.0 || min_x > fbo_w || min_y > fbo_h {
        return;
    }
    // Sub-pixel in both extents.
    if max_x - min_x < 1.0 && max_y - min_y < 1.0 {
        return;
    }

    let mut bin = FragmentBin::EMPTY;
    bin.screen_coords[0] = p0;
    bin.screen_coords[1] = p1;
    bin.prim_index = prim_index;

    for v in 0..num_varyings {
        bin.set_varying(0, v, a.varyings[v]);
        bin.set_varying(1, v, b.varyings[v]);
    }

    stage.commit_bin(&bin);
}

pub(crate) fn process_verts(stage: &VertexStage<'_>, bound: &BoundMesh, instance_id: usize) {
    let frame = stage.frame;
    let shader = frame.shader();
    let vert_shader = shader.vertex_shader().shader;
    let num_varyings = shader.num_varyings();

    let uniforms = frame.uniforms();
    let mesh = &bound.mesh;
    let vao = bound.vao();
    let vbo = bound.vbo();
    let ibo = bound.ibo();
    let indexed = mesh.mode.is_indexed();

    let fbo_w = frame.fbo.width as f32;
    let fbo_h = frame.fbo.height as f32;
    let half_w = fbo_w * 0.5;
    let half_h = fbo_h * 0.5;

    let num_elements = mesh.num_elements();
    let prim_offset = (num_elements * instance_id) as u64;

    let owner = (stage.thread_id + instance_id) % stage.num_threads;
    let (begin, end) = partition_indexed(num_elements, stage.num_threads, owner, 2);
    let begin = begin + mesh.element_begin;
    let end = end + mesh.element_begin;

    let mut cache = PtvCache::new();
    let mut transform = |vert_id: usize, out: &mut TransformedVert| {
        let mut params = VertexParam {
            uniforms,
            vert_id,
            instance_id,
            vao,
            vbo,
            varyings: &mut out.varyings,
        };
        out.vert = vert_shader(&mut params);
    };

    let mut v0 = TransformedVert::default();
    let mut v1 = TransformedVert::default();

    let mut i = begin;
    while i + 1 < end {
        stage.poll_flush();

        let (id0, id1) = match ibo {
            Some(ibo) if indexed => (ibo.index(i), ibo.index(i + 1)),
            _ => (i, i + 1),
        };

        cache.query_or_update(id0, &mut v0, &mut transform);
        cache.query_or_update(id1, &mut v1, &mut transform);

        if v0.vert.w >= 0.0 && v1.vert.w >= 0.0 {
            let mut s0 = v0;
            let mut s1 = v1;
            world_to_screen(&mut s0.vert, half_w, half_h);
            world_to_screen(&mut s1.vert, half_w, half_h);

            push_bin(
                stage,
                num_varyings,
                prim_offset + i as u64,
                fbo_w,
                fbo_h,
                &s0,
                &s1,
            );
        }

        i += 2;
    }
}
