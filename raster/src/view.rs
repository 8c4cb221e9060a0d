//! Viewport and scissor state.
//!
//! Both rectangles fold into a single "scissor matrix" multiplied onto
//! every clip-space position: the matrix remaps the scissored region of
//! NDC onto the full `[-1, 1]` cube, so the ordinary clip tests enforce
//! the scissor and the viewport mapping lands surviving pixels in the
//! scissored rectangle.

use glam::{Mat4, Vec4};

/// A pixel rectangle, origin at the bottom-left.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    fn intersect(self, other: Rect) -> Rect {
        let x0 = self.x.max(other.x);
        let y0 = self.y.max(other.y);
        let x1 = (self.x + self.width as i32).min(other.x + other.width as i32);
        let y1 = (self.y + self.height as i32).min(other.y + other.height as i32);

        Rect {
            x: x0,
            y: y0,
            width: (x1 - x0).max(0) as u32,
            height: (y1 - y0).max(0) as u32,
        }
    }

    fn is_empty(self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// Per-context view state. Two contexts never share one.
#[derive(Copy, Clone, Debug, Default)]
pub struct ViewportState {
    viewport: Option<Rect>,
    scissor: Option<Rect>,
}

impl ViewportState {
    pub const fn new() -> Self {
        Self {
            viewport: None,
            scissor: None,
        }
    }

    pub fn set_viewport(&mut self, rect: Rect) {
        self.viewport = Some(rect);
    }

    pub fn reset_viewport(&mut self) {
        self.viewport = None;
    }

    pub fn set_scissor(&mut self, rect: Rect) {
        self.scissor = Some(rect);
    }

    pub fn reset_scissor(&mut self) {
        self.scissor = None;
    }

    fn full(fb_w: u16, fb_h: u16) -> Rect {
        Rect {
            x: 0,
            y: 0,
            width: fb_w as u32,
            height: fb_h as u32,
        }
    }

    /// The rectangle screen mapping targets: viewport ∩ scissor, clamped
    /// to the framebuffer. Returned as `(x, y, w, h)`.
    pub fn viewport_rect(&self, fb_w: u16, fb_h: u16) -> Vec4 {
        let full = Self::full(fb_w, fb_h);
        let vp = self.viewport.unwrap_or(full).intersect(full);
        let r = match self.scissor {
            Some(sc) => vp.intersect(sc),
            None => vp,
        };

        Vec4::new(r.x as f32, r.y as f32, r.width as f32, r.height as f32)
    }

    /// The clip-space transform that makes the ordinary `-w <= c <= w`
    /// tests enforce the scissor.
    pub fn scissor_matrix(&self, fb_w: u16, fb_h: u16) -> Mat4 {
        let full = Self::full(fb_w, fb_h);
        let vp = self.viewport.unwrap_or(full).intersect(full);
        let Some(sc) = self.scissor else {
            return Mat4::IDENTITY;
        };

        let r = vp.intersect(sc);
        if r.is_empty() || vp.is_empty() {
            // Push everything past the +x clip plane.
            return Mat4::from_cols(
                Vec4::ZERO,
                Vec4::new(0.0, 1.0, 0.0, 0.0),
                Vec4::new(0.0, 0.0, 1.0, 0.0),
                Vec4::new(3.0, 0.0, 0.0, 1.0),
            );
        }

        // NDC extent of the scissored region relative to the viewport
        // mapping.
        let nmin_x = 2.0 * (r.x - vp.x) as f32 / vp.width as f32 - 1.0;
        let nmax_x = 2.0 * (r.x + r.width as i32 - vp.x) as f32 / vp.width as f32 - 1.0;
        let nmin_y = 2.0 * (r.y - vp.y) as f32 / vp.height as f32 - 1.0;
        let nmax_y = 2.0 * (r.y + r.height as i32 - vp.y) as f32 / vp.height as f32 - 1.0;

        let sx = 2.0 / (nmax_x - nmin_x);
        let sy = 2.0 / (nmax_y - nmin_y);
        let tx = -(nmax_x + nmin_x) / (nmax_x - nmin_x);
        let ty = -(nmax_y + nmin_y) / (nmax_y - nmin_y);

        Mat4::from_cols(
            Vec4::new(sx, 0.0, 0.0, 0.0),
            Vec4::new(0.0, sy, 0.0, 0.0),
            Vec4::new(0.0, 0.0, 1.0, 0.0),
            Vec4::new(tx, ty, 0.0, 1.0),
        )
    }
}
