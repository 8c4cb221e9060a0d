//! The vertex-processing stage.
//!
//! Each pool thread transforms its slice of the element range through the
//! PTV cache, culls and clips in clip space, maps survivors to screen
//! space and pushes fragment bins. When a bin array fills (or the stage
//! ends) the thread requests a drain cycle and becomes a fragment
//! processor together with every other thread.

pub mod clip;
pub mod line;
pub mod point;
pub mod tri;

use glam::{Vec3, Vec4};

use super::raster;
use super::{ClipStatus, FragmentBin};
use crate::pool::{DrawFrame, PoolShared};
use crate::RenderMode;

/// The vertex-stage task shipped to one pool thread.
pub(crate) struct VertexProcessor {
    pub thread_id: usize,
    pub num_threads: usize,
    pub shared: *const PoolShared,
    pub frame: DrawFrame,
}

// SAFETY: the shared pool state and every resource behind the frame
// outlive the draw call, which joins all workers before returning.
unsafe impl Send for VertexProcessor {}

impl VertexProcessor {
    pub fn execute(&mut self) {
        // SAFETY: the pool outlives the draw; see the Send justification.
        let shared = unsafe { &*self.shared };

        let stage = VertexStage {
            thread_id: self.thread_id,
            num_threads: self.num_threads,
            shared,
            frame: &self.frame,
        };

        let process: fn(&VertexStage<'_>, &crate::pool::BoundMesh, usize) = match self.frame.mode {
            RenderMode::Points | RenderMode::IndexedPoints => point::process_verts,
            RenderMode::Lines | RenderMode::IndexedLines => line::process_verts,
            RenderMode::Triangles | RenderMode::IndexedTriangles | RenderMode::IndexedTriWire => {
                tri::process_verts
            }
        };

        if self.frame.num_instances == 1 {
            for mesh in self.frame.meshes() {
                process(&stage, mesh, 0);
            }
        } else {
            let mesh = &self.frame.meshes()[0];
            for instance_id in 0..self.frame.num_instances {
                process(&stage, mesh, instance_id);
            }
        }

        stage.cleanup();
    }
}

/// Per-thread view of the vertex stage, shared by the per-primitive
/// processors.
pub(crate) struct VertexStage<'a> {
    pub thread_id: usize,
    pub num_threads: usize,
    pub shared: &'a PoolShared,
    pub frame: &'a DrawFrame,
}

impl VertexStage<'_> {
    /// Joins a drain cycle if any thread has requested one. Called between
    /// primitives so a full peer never waits long.
    #[inline]
    pub fn poll_flush(&self) {
        if self.shared.flush_requested() {
            raster::drain_cycle(self);
        }
    }

    /// Stores a finished bin in this thread's bin array, draining the
    /// rasterizer and retrying when the array is full.
    pub fn commit_bin(&self, bin: &FragmentBin) {
        loop {
            if let Some(slot) = self.shared.try_acquire_bin(self.thread_id) {
                // SAFETY: the slot was just acquired by this thread and is
                // not yet published.
                unsafe {
                    *self.shared.bin_mut(self.thread_id, slot) = *bin;
                }
                self.shared.publish_bin(self.thread_id, slot);
                return;
            }

            self.shared.request_flush();
            raster::drain_cycle(self);
        }
    }

    /// Ends the stage for this thread: stop producing, force a final drain
    /// and keep serving drain cycles until every producer has retired.
    pub fn cleanup(&self) {
        self.shared.finish_producing();
        self.shared.request_flush();

        loop {
            raster::drain_cycle(self);

            if self.shared.producers_remaining() == 0 {
                return;
            }

            // Producers remain; wait for the next drain request. Every
            // producer issues one more from its own cleanup, so this
            // always terminates.
            while !self.shared.flush_requested() {
                std::hint::spin_loop();
            }
        }
    }
}

/// Homogeneous determinant of a triangle's `(x, y, w)` columns; its sign
/// gives the winding for backface culling without a perspective divide.
#[inline]
pub(crate) fn face_determinant(p0: Vec4, p1: Vec4, p2: Vec4) -> f32 {
    p0.x * (p1.y * p2.w - p2.y * p1.w) - p0.y * (p1.x * p2.w - p2.x * p1.w)
        + p0.w * (p1.x * p2.y - p2.x * p1.y)
}

/// Classifies a triangle against the clip volume.
#[inline]
pub(crate) fn face_visible(p0: Vec4, p1: Vec4, p2: Vec4) -> ClipStatus {
    #[inline]
    fn inside(v: Vec4) -> bool {
        let w = v.w;
        v.x >= -w && v.x <= w && v.y >= -w && v.y <= w && v.z >= -w && v.z <= w
    }

    if inside(p0) && inside(p1) && inside(p2) {
        ClipStatus::FullyVisible
    } else if p0.w > 0.0 || p1.w > 0.0 || p2.w > 0.0 {
        ClipStatus::PartiallyVisible
    } else {
        ClipStatus::NotVisible
    }
}

/// Perspective divide that parks `1/w` in the w slot for later
/// perspective-correct interpolation.
#[inline]
pub(crate) fn perspective_divide(v: &mut Vec4) {
    let w_inv = v.w.recip();
    *v = Vec4::new(v.x * w_inv, v.y * w_inv, v.z * w_inv, w_inv);
}

/// Maps NDC x/y onto the viewport rectangle `(x, y, w, h)`, snapping to
/// pixel origins and clamping at zero. z and the stashed `1/w` pass
/// through.
#[inline]
pub(crate) fn viewport_transform(v: &mut Vec4, viewport: Vec4) {
    let half_w = viewport.z * 0.5;
    let half_h = viewport.w * 0.5;

    v.x = ((v.x + 1.0) * half_w + viewport.x).floor().max(0.0);
    v.y = ((v.y + 1.0) * half_h + viewport.y).floor().max(0.0);
}

/// Barycentric partial derivatives for a screen-space triangle, or `None`
/// for degenerate (zero-area) triangles.
///
/// The three returned vectors hold, per lane `i`, the x partial, y partial
/// and constant term of weight `λᵢ`, so a rasterizer evaluates all three
/// weights at a pixel as `ddx * x + ddy * y + ddz`.
#[inline]
pub(crate) fn barycentric_partials(p0: Vec4, p1: Vec4, p2: Vec4) -> Option<[Vec4; 3]> {
    let xs = Vec3::new(p0.x, p1.x, p2.x);
    let ys = Vec3::new(p0.y, p1.y, p2.y);
    let ones = Vec3::ONE;

    // Twice the signed area, via the 2D cross product of two edges.
    let area2 = (p2.x - p1.x) * (p0.y - p1.y) - (p2.y - p1.y) * (p0.x - p1.x);
    if area2 == 0.0 || !area2.is_finite() {
        return None;
    }
    let denom = area2.recip();

    let ddx = ys.cross(ones) * denom;
    let ddy = ones.cross(xs) * denom;
    let ddz = xs.cross(ys) * denom;

    Some([ddx.extend(0.0), ddy.extend(0.0), ddz.extend(0.0)])
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::{
        barycentric_partials, face_determinant, face_visible, perspective_divide,
        viewport_transform,
    };
    use crate::pipeline::ClipStatus;

    #[test]
    fn determinant_sign_tracks_winding() {
        let a = Vec4::new(-0.5, -0.5, 0.0, 1.0);
        let b = Vec4::new(0.5, -0.5, 0.0, 1.0);
        let c = Vec4::new(0.0, 0.5, 0.0, 1.0);

        let ccw = face_determinant(a, b, c);
        let cw = face_determinant(a, c, b);
        assert!(ccw > 0.0);
        assert!(cw < 0.0);
        assert_eq!(ccw, -cw);
    }

    #[test]
    fn visibility_classification() {
        let inside = |x: f32, y: f32| Vec4::new(x, y, 0.0, 1.0);

        assert_eq!(
            face_visible(inside(0.0, 0.0), inside(0.5, 0.0), inside(0.0, 0.5)),
            ClipStatus::FullyVisible
        );
        assert_eq!(
            face_visible(inside(-2.0, -0.5), inside(2.0, -0.5), inside(0.0, 2.0)),
            ClipStatus::PartiallyVisible
        );
        // Everything behind the eye.
        assert_eq!(
            face_visible(
                Vec4::new(0.0, 0.0, 0.0, -1.0),
                Vec4::new(1.0, 0.0, 0.0, -1.0),
                Vec4::new(0.0, 1.0, 0.0, -1.0)
            ),
            ClipStatus::NotVisible
        );
    }

    #[test]
    fn perspective_divide_stashes_inverse_w() {
        let mut v = Vec4::new(2.0, 4.0, 6.0, 2.0);
        perspective_divide(&mut v);
        assert_eq!(v, Vec4::new(1.0, 2.0, 3.0, 0.5));
    }

    #[test]
    fn viewport_mapping_floors_and_clamps() {
        let viewport = Vec4::new(0.0, 0.0, 4.0, 4.0);

        let mut center = Vec4::new(0.0, 0.0, 0.5, 1.0);
        viewport_transform(&mut center, viewport);
        assert_eq!((center.x, center.y), (2.0, 2.0));
        assert_eq!(center.z, 0.5);

        let mut low = Vec4::new(-1.5, -1.0, 0.0, 1.0);
        viewport_transform(&mut low, viewport);
        assert_eq!((low.x, low.y), (0.0, 0.0));
    }

    #[test]
    fn barycentric_weights_sum_to_one_inside() {
        let p0 = Vec4::new(0.0, 0.0, 0.0, 1.0);
        let p1 = Vec4::new(4.0, 0.0, 0.0, 1.0);
        let p2 = Vec4::new(0.0, 4.0, 0.0, 1.0);

        let [ddx, ddy, ddz] = barycentric_partials(p0, p1, p2).unwrap();

        let at = |x: f32, y: f32| ddx * x + ddy * y + ddz;

        let w = at(1.0, 1.0);
        assert!((w.x + w.y + w.z - 1.0).abs() < 1e-5);
        assert!(w.x >= 0.0 && w.y >= 0.0 && w.z >= 0.0);

        // The weight of a corner is 1 at that corner.
        let w0 = at(0.0, 0.0);
        assert!((w0.x - 1.0).abs() < 1e-5);

        // Outside the triangle a weight goes negative.
        let out = at(4.0, 4.0);
        assert!(out.x < 0.0 || out.y < 0.0 || out.z < 0.0);
    }

    #[test]
    fn degenerate_triangles_have_no_partials() {
        let p = Vec4::new(1.0, 1.0, 0.0, 1.0);
        assert!(barycentric_partials(p, p, p).is_none());
    }

    #[test]
    fn winding_does_not_flip_interior_weights() {
        let p0 = Vec4::new(0.0, 0.0, 0.0, 1.0);
        let p1 = Vec4::new(4.0, 0.0, 0.0, 1.0);
        let p2 = Vec4::new(0.0, 4.0, 0.0, 1.0);

        // Reversed winding: weights at an interior point stay positive.
        let [ddx, ddy, ddz] = barycentric_partials(p0, p2, p1).unwrap();
        let w = ddx * 1.0 + ddy * 1.0 + ddz;
        assert!(w.x >= 0.0 && w.y >= 0.0 && w.z >= 0.0);
        assert!((w.x + w.y + w.z - 1.0).abs() < 1e-5);
    }
}
