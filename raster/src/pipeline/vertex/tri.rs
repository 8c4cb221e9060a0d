//! Triangle vertex processing: the canonical pipeline path.

use super::clip;
use super::{
    barycentric_partials, face_determinant, face_visible, perspective_divide, viewport_transform,
    VertexStage,
};
use crate::pipeline::cache::PtvCache;
use crate::pipeline::{partition_indexed, ClipStatus, FragmentBin, TransformedVert};
use crate::pool::BoundMesh;
use crate::shader::{CullMode, VertexParam};

/// Screen-space triangle to bin, with precomputed barycentric partials.
/// Sub-pixel and degenerate triangles are dropped here.
pub(crate) fn push_bin(
    stage: &VertexStage<'_>,
    num_varyings: usize,
    prim_index: u64,
    a: &TransformedVert,
    b: &TransformedVert,
    c: &TransformedVert,
) {
    let p0 = a.vert;
    let p1 = b.vert;
    let p2 = c.vert;

    let bbox_min = p0.min(p1).min(p2);
    let bbox_max = p0.max(p1).max(p2);
    if bbox_max.x - bbox_min.x < 1.0 || bbox_max.y - bbox_min.y < 1.0 {
        return;
    }

    let Some(partials) = barycentric_partials(p0, p1, p2) else {
        return;
    };

    let mut bin = FragmentBin::EMPTY;
    bin.screen_coords = [p0, p1, p2];
    bin.barycentric = partials;
    bin.prim_index = prim_index;

    for v in 0..num_varyings {
        bin.set_varying(0, v, a.varyings[v]);
        bin.set_varying(1, v, b.varyings[v]);
        bin.set_varying(2, v, c.varyings[v]);
    }

    stage.commit_bin(&bin);
}

/// Runs the triangle vertex pipeline over this thread's slice of a mesh.
pub(crate) fn process_verts(stage: &VertexStage<'_>, bound: &BoundMesh, instance_id: usize) {
    let frame = stage.frame;
    let shader = frame.shader();
    let vert_shader = shader.vertex_shader().shader;
    let cull_mode = shader.pipeline_state().cull_mode();
    let num_varyings = shader.num_varyings();

    let uniforms = frame.uniforms();
    let mesh = &bound.mesh;
    let vao = bound.vao();
    let vbo = bound.vbo();
    let ibo = bound.ibo();
    let indexed = mesh.mode.is_indexed();

    let scissor = frame.scissor;
    let viewport = frame.viewport;

    let num_elements = mesh.num_elements();
    let prim_offset = (num_elements * instance_id) as u64;

    // Rotating the partition owner by instance spreads small instanced
    // draws across the pool.
    let owner = (stage.thread_id + instance_id) % stage.num_threads;
    let (begin, end) = partition_indexed(num_elements, stage.num_threads, owner, 3);
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
        out.vert = scissor * vert_shader(&mut params);
    };

    let mut v0 = TransformedVert::default();
    let mut v1 = TransformedVert::default();
    let mut v2 = TransformedVert::default();

    let mut i = begin;
    // Only complete triangles; a clamped tail shorter than one primitive
    // is dropped.
    while i + 2 < end {
        stage.poll_flush();

        let ids = match ibo {
            Some(ibo) if indexed => ibo.index4(i),
            _ => [i, i + 1, i + 2, i + 3],
        };

        cache.query_or_update(ids[0], &mut v0, &mut transform);
        cache.query_or_update(ids[1], &mut v1, &mut transform);
        cache.query_or_update(ids[2], &mut v2, &mut transform);

        if cull_mode != CullMode::Off {
            let det = face_determinant(v0.vert, v1.vert, v2.vert);
            let culled = match cull_mode {
                CullMode::Back => det < 0.0,
                _ => det > 0.0,
            };
            if culled {
                i += 3;
                continue;
            }
        }

        match face_visible(v0.vert, v1.vert, v2.vert) {
            ClipStatus::FullyVisible => {
                let mut s0 = v0;
                let mut s1 = v1;
                let mut s2 = v2;
                for s in [&mut s0, &mut s1, &mut s2] {
                    perspective_divide(&mut s.vert);
                    viewport_transform(&mut s.vert, viewport);
                }
                push_bin(stage, num_varyings, prim_offset + i as u64, &s0, &s1, &s2);
            }
            ClipStatus::PartiallyVisible => {
                clip::clip_and_process(
                    stage,
                    num_varyings,
                    prim_offset + i as u64,
                    viewport,
                    &v0,
                    &v1,
                    &v2,
                );
            }
            ClipStatus::NotVisible => {}
        }

        i += 3;
    }
}
