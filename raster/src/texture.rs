//! Texture storage and texel addressing.
//!
//! A [`Texture`] owns a page-aligned texel allocation; a [`TextureView`] is
//! the unowned description the pipeline actually works with (framebuffer
//! attachments, blit sources/destinations, external window buffers). Views
//! are plain data: copying one never copies texels.

use std::alloc::{self, Layout};
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::color::ColorDataType;
use crate::swizzle::{self, TexelOrder, TEXELS_PER_CHUNK};
use crate::Error;

/// Texture allocations are page-aligned so attachment rows never straddle
/// a page unnecessarily.
const TEXTURE_ALIGN: usize = 4096;

/// An unowned description of a block of texels.
///
/// The pointer is only dereferenced while the owning allocation is alive;
/// views handed to the pipeline are dropped before the draw/blit entry
/// point returns. External views (window back buffers) are constructed via
/// [`TextureView::from_raw_parts`], which carries the validity obligation.
#[derive(Copy, Clone, Debug)]
pub struct TextureView {
    pub width: u16,
    pub height: u16,
    pub depth: u16,
    pub bytes_per_texel: u8,
    pub num_channels: u8,
    pub ty: ColorDataType,
    /// The layout texel accessors address this view in.
    pub order: TexelOrder,
    texels: Option<NonNull<u8>>,
}

// SAFETY: a view is an address plus a description. The pipeline partitions
// every write path by destination row, so concurrent access through copies
// of one view never aliases a texel mutably.
unsafe impl Send for TextureView {}
unsafe impl Sync for TextureView {}

impl TextureView {
    /// An empty view with no backing texels.
    pub const fn reset() -> Self {
        Self {
            width: 0,
            height: 0,
            depth: 0,
            bytes_per_texel: 0,
            num_channels: 0,
            ty: ColorDataType::Rgb8Unorm,
            order: TexelOrder::Ordered,
            texels: None,
        }
    }

    /// Describes an externally-owned pixel buffer (a window back buffer).
    ///
    /// # Safety
    ///
    /// `texels` must point to at least `w * h * d * ty.bytes_per_texel()`
    /// writable bytes that outlive every use of the view.
    pub unsafe fn from_raw_parts(
        w: u16,
        h: u16,
        d: u16,
        ty: ColorDataType,
        order: TexelOrder,
        texels: *mut u8,
    ) -> Self {
        Self {
            width: w,
            height: h,
            depth: d,
            bytes_per_texel: ty.bytes_per_texel() as u8,
            num_channels: ty.num_channels() as u8,
            ty,
            order,
            texels: NonNull::new(texels),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.texels.is_none()
    }

    pub fn data(&self) -> Option<NonNull<u8>> {
        self.texels
    }

    /// Texel index of a 2D coordinate in the requested layout.
    #[inline]
    pub fn map_coordinate(&self, x: u32, y: u32, order: TexelOrder) -> usize {
        match order {
            TexelOrder::Ordered => (x + self.width as u32 * y) as usize,
            TexelOrder::Swizzled => swizzle::swizzle_2d_index(x, y, self.width as u32),
        }
    }

    /// Texel index of a 3D coordinate in the requested layout.
    #[inline]
    pub fn map_coordinate_3d(&self, x: u32, y: u32, z: u32, order: TexelOrder) -> usize {
        let (w, h) = (self.width as u32, self.height as u32);
        match order {
            TexelOrder::Ordered => (x + w * (y + h * z)) as usize,
            TexelOrder::Swizzled => swizzle::swizzle_3d_index(x, y, z, w, h),
        }
    }

    /// Texel indices of four consecutive-x coordinates, for batched loads.
    /// The chunk-padded tail keeps all four indices backed even at the
    /// right edge.
    #[inline]
    pub fn map_coordinates(&self, x: u32, y: u32, z: u32, order: TexelOrder) -> [usize; 4] {
        [
            self.map_coordinate_3d(x, y, z, order),
            self.map_coordinate_3d(x + 1, y, z, order),
            self.map_coordinate_3d(x + 2, y, z, order),
            self.map_coordinate_3d(x + 3, y, z, order),
        ]
    }

    /// Reads the texel at a precomputed index.
    #[inline]
    pub fn texel_at<C: Pod>(&self, index: usize) -> C {
        debug_assert_eq!(size_of::<C>(), self.bytes_per_texel as usize);
        let ptr = self.texels.unwrap().as_ptr() as *const C;
        // SAFETY: the owning allocation is alive for the duration of the
        // pipeline operation and `index` lies in the padded texel range.
        unsafe { ptr.add(index).read_unaligned() }
    }

    /// Writes the texel at a precomputed index.
    #[inline]
    pub fn set_texel_at<C: Pod>(&self, index: usize, value: C) {
        debug_assert_eq!(size_of::<C>(), self.bytes_per_texel as usize);
        let ptr = self.texels.unwrap().as_ptr() as *mut C;
        // SAFETY: as in `texel_at`; writes are row-partitioned across
        // threads so this texel is only touched by the calling thread.
        unsafe { ptr.add(index).write_unaligned(value) }
    }

    #[inline]
    pub fn texel<C: Pod>(&self, x: u16, y: u16) -> C {
        self.texel_at(self.map_coordinate(x as u32, y as u32, self.order))
    }

    #[inline]
    pub fn set_texel<C: Pod>(&self, x: u16, y: u16, value: C) {
        self.set_texel_at(self.map_coordinate(x as u32, y as u32, self.order), value);
    }

    #[inline]
    pub fn texel_3d<C: Pod>(&self, x: u16, y: u16, z: u16) -> C {
        self.texel_at(self.map_coordinate_3d(x as u32, y as u32, z as u32, self.order))
    }

    #[inline]
    pub fn set_texel_3d<C: Pod>(&self, x: u16, y: u16, z: u16, value: C) {
        self.set_texel_at(self.map_coordinate_3d(x as u32, y as u32, z as u32, self.order), value);
    }

    /// Total number of logical texels.
    pub fn num_texels(&self) -> usize {
        self.width as usize * self.height as usize * self.depth as usize
    }
}

/// Number of bytes backing a texture of the given dimensions, including
/// chunk padding and the batched-load tail.
fn padded_len(w: u16, h: u16, d: u16, bpt: usize) -> usize {
    let w = swizzle::chunk_pad(w as u32) as usize;
    let h = swizzle::chunk_pad(h as u32) as usize;
    let d = swizzle::chunk_pad(d as u32) as usize;

    // The tail lets 4-wide texel loads run past the last texel without
    // touching unmapped memory.
    w * h * d * bpt + TEXELS_PER_CHUNK as usize * bpt
}

/// An owning texel buffer.
#[derive(Debug)]
pub struct Texture {
    view: TextureView,
    /// Size of the live allocation; zero when reset.
    allocated: usize,
}

impl Texture {
    pub const fn new() -> Self {
        Self {
            view: TextureView::reset(),
            allocated: 0,
        }
    }

    /// Allocates zeroed storage for `w * h * d` texels of `ty` in linear
    /// row-major order.
    ///
    /// On failure the texture is left reset and `OutOfMemory` is returned.
    pub fn init(&mut self, ty: ColorDataType, w: u16, h: u16, d: u16) -> Result<(), Error> {
        self.init_with_order(ty, w, h, d, TexelOrder::Ordered)
    }

    /// Like [`init`], with an explicit texel layout.
    ///
    /// [`init`]: Self::init
    pub fn init_with_order(
        &mut self,
        ty: ColorDataType,
        w: u16,
        h: u16,
        d: u16,
        order: TexelOrder,
    ) -> Result<(), Error> {
        self.terminate();

        if w == 0 || h == 0 || d == 0 {
            return Err(Error::InvalidArgument);
        }

        let bpt = ty.bytes_per_texel();
        let len = padded_len(w, h, d, bpt);
        let layout = Layout::from_size_align(len, TEXTURE_ALIGN).map_err(|_| Error::OutOfMemory)?;

        // SAFETY: `len` is nonzero (dimensions were checked above).
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        let Some(texels) = NonNull::new(ptr) else {
            return Err(Error::OutOfMemory);
        };

        self.view = TextureView {
            width: w,
            height: h,
            depth: d,
            bytes_per_texel: bpt as u8,
            num_channels: ty.num_channels() as u8,
            ty,
            order,
            texels: Some(texels),
        };
        self.allocated = len;

        Ok(())
    }

    /// Frees the texel storage and resets the description.
    pub fn terminate(&mut self) {
        if let Some(texels) = self.view.texels.take() {
            let layout = Layout::from_size_align(self.allocated, TEXTURE_ALIGN).unwrap();
            // SAFETY: `texels` came out of `alloc_zeroed` with this layout.
            unsafe { alloc::dealloc(texels.as_ptr(), layout) };
        }

        self.view = TextureView::reset();
        self.allocated = 0;
    }

    pub fn view(&self) -> &TextureView {
        &self.view
    }

    pub fn width(&self) -> u16 {
        self.view.width
    }

    pub fn height(&self) -> u16 {
        self.view.height
    }

    pub fn depth(&self) -> u16 {
        self.view.depth
    }

    pub fn bytes_per_texel(&self) -> usize {
        self.view.bytes_per_texel as usize
    }

    pub fn channels(&self) -> usize {
        self.view.num_channels as usize
    }

    pub fn data_type(&self) -> ColorDataType {
        self.view.ty
    }

    pub fn order(&self) -> TexelOrder {
        self.view.order
    }

    #[inline]
    pub fn texel<C: Pod>(&self, x: u16, y: u16) -> C {
        self.view.texel(x, y)
    }

    #[inline]
    pub fn set_texel<C: Pod>(&mut self, x: u16, y: u16, value: C) {
        self.view.set_texel(x, y, value);
    }

    #[inline]
    pub fn texel_3d<C: Pod>(&self, x: u16, y: u16, z: u16) -> C {
        self.view.texel_3d(x, y, z)
    }

    #[inline]
    pub fn set_texel_3d<C: Pod>(&mut self, x: u16, y: u16, z: u16, value: C) {
        self.view.set_texel_3d(x, y, z, value);
    }

    /// Copies a rectangular region of texels in from caller memory.
    pub fn set_texels<C: Pod>(
        &mut self,
        x: u16,
        y: u16,
        w: u16,
        h: u16,
        data: &[C],
    ) -> Result<(), Error> {
        // Widened so extreme rectangles reject instead of wrapping.
        if x as u32 + w as u32 > self.view.width as u32
            || y as u32 + h as u32 > self.view.height as u32
        {
            return Err(Error::InvalidArgument);
        }
        if data.len() < w as usize * h as usize {
            return Err(Error::InvalidArgument);
        }

        for row in 0..h {
            for col in 0..w {
                let src = data[row as usize * w as usize + col as usize];
                self.view.set_texel(x + col, y + row, src);
            }
        }

        Ok(())
    }
}

impl Default for Texture {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for Texture {
    fn drop(&mut self) {
        self.terminate();
    }
}

// SAFETY: the texture is the sole owner of its allocation; moving it across
// threads moves the allocation with it.
unsafe impl Send for Texture {}
unsafe impl Sync for Texture {}
