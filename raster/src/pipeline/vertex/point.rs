//! Point vertex processing: the degenerate one-vertex pipeline.

use glam::Vec4;

use super::VertexStage;
use crate::pipeline::cache::PtvCache;
use crate::pipeline::{partition_indexed, FragmentBin, TransformedVert};
use crate::pool::BoundMesh;
use crate::shader::VertexParam;

fn push_bin(
    stage: &VertexStage<'_>,
    num_varyings: usize,
    prim_index: u64,
    fbo_w: f32,
    fbo_h: f32,
    a: &TransformedVert,
) {
    let p = a.vert;
    if p.x < 0.0 || p.y < 0.0 || p.x > fbo_w || p.y > fbo_h {
        return;
    }

    let mut bin = FragmentBin::EMPTY;
    bin.screen_coords[0] = p;
    bin.prim_index = prim_index;

    for v in 0..num_varyings {
        bin.set_varying(0, v, a.varyings[v]);
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
    let (begin, end) = partition_indexed(num_elements, stage.num_threads, owner, 1);
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

    let mut vert = TransformedVert::default();

    for i in begin..end {
        stage.poll_flush();

        let id = match ibo {
            Some(ibo) if indexed => ibo.index(i),
            _ => i,
        };

        cache.query_or_update(id, &mut vert, &mut transform);

        // A point behind the eye has no screen position at all.
        if vert.vert.w <= 0.0 {
            continue;
        }

        let mut s = vert;
        let w_inv = s.vert.w.recip();
        let ndc = s.vert * w_inv;
        s.vert = Vec4::new(
            (ndc.x * half_w + half_w).floor(),
            (ndc.y * half_h + half_h).floor(),
            ndc.z,
            w_inv,
        );

        push_bin(stage, num_varyings, prim_offset + i as u64, fbo_w, fbo_h, &s);
    }
}
