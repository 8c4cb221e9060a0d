//! The fragment-processing stage.
//!
//! A drain cycle is a full-pool rendezvous: every thread stops producing,
//! all published bins are ordered by `(prim_index, owner, slot)` — each
//! thread derives the identical order from the same release-published
//! counters — and every thread rasterizes the whole list restricted to its
//! own row strip. The last thread out resets the bin state and reopens the
//! shading phase. Strips never overlap, so no pixel is written by two
//! threads.

pub mod line;
pub mod point;
pub mod tri;
pub mod wire;

use glam::{Vec3, Vec4};

use super::vertex::VertexStage;
use super::{FragQueue, FragmentBin, MAX_VARYINGS};
use crate::framebuffer::{
    blended_pixel_placement_fn, depth_access_fns, pixel_placement_fn, PutBlendedPixelFn,
    PutDepthFn, PutPixelFn, ReadDepthFn, MAX_COLOR_ATTACHMENTS,
};
use crate::pool::DrawFrame;
use crate::shader::{BlendMode, DepthTest, FragCoord, FragmentParam, FragmentShaderFn};
use crate::texture::TextureView;
use crate::RenderMode;

/// Identity of one published bin inside a drain cycle. Sorting these is
/// the whole ordering contract.
#[derive(Copy, Clone, PartialEq, Eq, PartialOrd, Ord)]
struct BinRef {
    prim_index: u64,
    owner: u32,
    slot: u32,
}

/// Runs one full drain cycle. Every pool thread must call this at the
/// same time; producers are summoned through the flush-request counter.
pub(crate) fn drain_cycle(stage: &VertexStage<'_>) {
    let shared = stage.shared;

    // (1) Rendezvous: nobody is producing past this point.
    shared.barrier_wait();

    let mut order = Vec::new();
    for owner in 0..stage.num_threads {
        let ready = shared.ready_count(owner);
        order.reserve(ready);
        for slot in 0..ready {
            // SAFETY: slots below the published count are frozen until the
            // reset at the end of this cycle.
            let prim_index = unsafe { shared.bin(owner, slot) }.prim_index;
            order.push(BinRef {
                prim_index,
                owner: owner as u32,
                slot: slot as u32,
            });
        }
    }
    order.sort_unstable();

    {
        // SAFETY: each thread takes only its own queue, once per cycle.
        let queue = unsafe { shared.queue_mut(stage.thread_id) };
        let mut ctx = FragmentContext::new(stage, queue);

        for bin_ref in &order {
            // SAFETY: as above; the bin stays frozen for the whole cycle.
            let bin = unsafe { shared.bin(bin_ref.owner as usize, bin_ref.slot as usize) };
            ctx.rasterize_bin(bin);
        }
    }

    // (2) All strips rasterized; one thread clears the bin state.
    if shared.barrier_wait() {
        shared.reset_after_drain();
    }

    // (3) The reset is visible; producers may resume binning.
    shared.barrier_wait();
}

/// How queued fragments recover their varyings.
#[derive(Copy, Clone, PartialEq, Eq)]
enum InterpKind {
    /// Perspective-correct barycentrics from the queue's weight vector.
    Barycentric,
    /// Two-endpoint lerp; the queue stores `(t, corner_a, corner_b)`.
    Endpoints,
    /// Straight copy of corner 0.
    None,
}

/// Per-thread fragment-stage state for one drain cycle.
pub(crate) struct FragmentContext<'a> {
    thread_id: usize,
    num_threads: usize,
    frame: &'a DrawFrame,
    queue: &'a mut FragQueue,
    shader: FragmentShaderFn,
    interp: InterpKind,
    num_varyings: usize,
    num_outputs: usize,
    blend: BlendMode,
    depth_test: DepthTest,
    depth_mask: bool,
    depth: Option<(PutDepthFn, ReadDepthFn, TextureView)>,
    puts: [PutPixelFn; MAX_COLOR_ATTACHMENTS],
    blended: PutBlendedPixelFn,
    pub width: u16,
    pub height: u16,
}

impl<'a> FragmentContext<'a> {
    fn new(stage: &VertexStage<'a>, queue: &'a mut FragQueue) -> Self {
        let frame = stage.frame;
        let shader = frame.shader();
        let state = shader.pipeline_state();
        let frag = shader.fragment_shader();

        let interp = match frame.mode {
            RenderMode::Points | RenderMode::IndexedPoints => InterpKind::None,
            RenderMode::Lines | RenderMode::IndexedLines | RenderMode::IndexedTriWire => {
                InterpKind::Endpoints
            }
            RenderMode::Triangles | RenderMode::IndexedTriangles => InterpKind::Barycentric,
        };

        let depth = frame
            .fbo
            .depth
            .map(|view| {
                let (put, read) = depth_access_fns(view.ty);
                (put, read, view)
            });

        let mut puts = [pixel_placement_fn(crate::color::ColorDataType::Rgba8Unorm);
            MAX_COLOR_ATTACHMENTS];
        for (slot, view) in puts.iter_mut().zip(frame.fbo.colors.iter()) {
            if !view.is_empty() {
                *slot = pixel_placement_fn(view.ty);
            }
        }

        queue.clear();

        Self {
            thread_id: stage.thread_id,
            num_threads: stage.num_threads,
            frame,
            queue,
            shader: frag.shader,
            interp,
            num_varyings: state.num_varyings(),
            num_outputs: state.num_outputs(),
            blend: state.blend_mode(),
            depth_test: if depth.is_some() {
                state.depth_test()
            } else {
                DepthTest::Off
            },
            depth_mask: state.depth_mask() && depth.is_some(),
            depth,
            puts,
            blended: blended_pixel_placement_fn(frame.fbo.colors[0].ty),
            width: frame.fbo.width,
            height: frame.fbo.height,
        }
    }

    /// Whether this thread's strip owns framebuffer row `y`.
    #[inline]
    pub fn owns_row(&self, y: i64) -> bool {
        y.rem_euclid(self.num_threads as i64) == self.thread_id as i64
    }

    /// First strip-owned row at or after `y`.
    #[inline]
    pub fn first_owned_row(&self, y: i64) -> i64 {
        y + (self.thread_id as i64 - y).rem_euclid(self.num_threads as i64)
    }

    #[inline]
    pub fn row_step(&self) -> i64 {
        self.num_threads as i64
    }

    /// Depth test against the bound attachment; trivially passes without
    /// one.
    #[inline]
    pub fn test_depth(&self, x: u16, y: u16, z: f32) -> bool {
        match (&self.depth, self.depth_test) {
            (_, DepthTest::Off) => true,
            (Some((_, read, view)), test) => test.passes(z, read(view, x, y)),
            (None, _) => true,
        }
    }

    /// Commits `z` when the depth mask is on. Runs before the fragment
    /// shader: a later discard leaves the depth write in place.
    #[inline]
    pub fn write_depth(&self, x: u16, y: u16, z: f32) {
        if self.depth_mask {
            if let Some((put, _, view)) = &self.depth {
                put(view, x, y, z);
            }
        }
    }

    /// Queues one surviving fragment, shading the batch when it fills.
    #[inline]
    pub fn push_frag(&mut self, bin: &FragmentBin, coord: FragCoord, interp: Vec4) {
        self.queue.push(coord, interp);
        if self.queue.is_full() {
            self.shade_queue(bin);
        }
    }

    fn rasterize_bin(&mut self, bin: &FragmentBin) {
        match self.frame.mode {
            RenderMode::Points | RenderMode::IndexedPoints => point::rasterize(self, bin),
            RenderMode::Lines | RenderMode::IndexedLines => line::rasterize(self, bin),
            RenderMode::Triangles | RenderMode::IndexedTriangles => tri::rasterize(self, bin),
            RenderMode::IndexedTriWire => wire::rasterize(self, bin),
        }

        // Whatever is left in the queue belongs to this bin.
        self.shade_queue(bin);
    }

    /// Interpolates varyings for every queued fragment and runs the
    /// fragment shader, writing surviving outputs to the attachments.
    fn shade_queue(&mut self, bin: &FragmentBin) {
        if self.queue.len == 0 {
            return;
        }

        let uniforms = self.frame.uniforms();
        let inv_w = Vec3::new(
            bin.screen_coords[0].w,
            bin.screen_coords[1].w,
            bin.screen_coords[2].w,
        );

        for i in 0..self.queue.len {
            let coord = self.queue.coords[i];
            let interp = self.queue.interp[i];

            let mut varyings = [Vec4::ZERO; MAX_VARYINGS];
            match self.interp {
                InterpKind::Barycentric => {
                    // Perspective-correct weights; they sum to one by
                    // construction.
                    let pw = Vec3::new(interp.x, interp.y, interp.z) * inv_w;
                    let sum = pw.x + pw.y + pw.z;
                    let scale = if sum != 0.0 { sum.recip() } else { 0.0 };

                    for v in 0..self.num_varyings {
                        varyings[v] = (bin.varying(0, v) * pw.x
                            + bin.varying(1, v) * pw.y
                            + bin.varying(2, v) * pw.z)
                            * scale;
                    }
                }
                InterpKind::Endpoints => {
                    let t = interp.x;
                    let a = interp.y as usize;
                    let b = interp.z as usize;
                    for v in 0..self.num_varyings {
                        varyings[v] = bin.varying(a, v).lerp(bin.varying(b, v), t);
                    }
                }
                InterpKind::None => {
                    varyings[..self.num_varyings]
                        .copy_from_slice(&bin.varyings[..self.num_varyings]);
                }
            }

            let mut params = FragmentParam {
                coord,
                uniforms,
                varyings,
                outputs: [Vec4::ZERO; super::MAX_FRAG_OUTPUTS],
            };

            if !(self.shader)(&mut params) {
                continue;
            }

            for rt in 0..self.num_outputs {
                let view = &self.frame.fbo.colors[rt];
                if self.blend == BlendMode::Off {
                    (self.puts[rt])(view, coord.x, coord.y, params.outputs[rt]);
                } else {
                    (self.blended)(view, coord.x, coord.y, params.outputs[rt], self.blend);
                }
            }
        }

        self.queue.clear();
    }
}
