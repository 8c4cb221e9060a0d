//! GPU-analog buffer objects: vertex, index and uniform storage.

use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use bytemuck::Pod;

use crate::Error;

/// Buffers are aligned for 16-byte vector loads.
const BUFFER_ALIGN: usize = 16;

/// A fixed-size, 16-byte-aligned, zero-initialized byte region.
struct AlignedBuf {
    ptr: NonNull<u8>,
    len: usize,
}

impl AlignedBuf {
    fn alloc(len: usize) -> Result<Self, Error> {
        if len == 0 {
            return Err(Error::InvalidArgument);
        }

        let layout = Layout::from_size_align(len, BUFFER_ALIGN).map_err(|_| Error::OutOfMemory)?;
        // SAFETY: `len` is nonzero.
        let ptr = unsafe { alloc::alloc_zeroed(layout) };
        NonNull::new(ptr)
            .map(|ptr| Self { ptr, len })
            .ok_or(Error::OutOfMemory)
    }
}

impl Deref for AlignedBuf {
    type Target = [u8];

    fn deref(&self) -> &[u8] {
        // SAFETY: the allocation is `len` bytes and lives as long as self.
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl DerefMut for AlignedBuf {
    fn deref_mut(&mut self) -> &mut [u8] {
        // SAFETY: as in `deref`, and `&mut self` guarantees uniqueness.
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl Drop for AlignedBuf {
    fn drop(&mut self) {
        let layout = Layout::from_size_align(self.len, BUFFER_ALIGN).unwrap();
        // SAFETY: `ptr` came out of `alloc_zeroed` with this layout.
        unsafe { alloc::dealloc(self.ptr.as_ptr(), layout) };
    }
}

// SAFETY: sole owner of the allocation.
unsafe impl Send for AlignedBuf {}
unsafe impl Sync for AlignedBuf {}

impl std::fmt::Debug for AlignedBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlignedBuf").field("len", &self.len).finish()
    }
}

/// An opaque vertex byte buffer. Attribute layout lives on the vertex
/// array, not here.
#[derive(Debug, Default)]
pub struct VertexBuffer {
    data: Option<AlignedBuf>,
}

impl VertexBuffer {
    pub const fn new() -> Self {
        Self { data: None }
    }

    pub fn init(&mut self, num_bytes: usize) -> Result<(), Error> {
        self.data = Some(AlignedBuf::alloc(num_bytes)?);
        Ok(())
    }

    pub fn terminate(&mut self) {
        self.data = None;
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    pub fn num_bytes(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len)
    }

    /// Copies bytes into the buffer at `offset`.
    pub fn assign<T: Pod>(&mut self, offset: usize, elements: &[T]) -> Result<(), Error> {
        let src = bytemuck::cast_slice::<T, u8>(elements);
        let data = self.data.as_mut().ok_or(Error::InvalidArgument)?;

        let end = offset.checked_add(src.len()).ok_or(Error::InvalidArgument)?;
        if end > data.len {
            return Err(Error::InvalidArgument);
        }

        data[offset..end].copy_from_slice(src);
        Ok(())
    }

    /// Reads one element at a raw byte offset. Vertex shaders use this
    /// together with the vertex array's attribute offsets.
    #[inline]
    pub fn element<T: Pod>(&self, byte_offset: usize) -> T {
        let data = self.data.as_ref().unwrap();
        debug_assert!(byte_offset + size_of::<T>() <= data.len);
        // SAFETY: the offset was checked against the allocation above.
        unsafe { (data.ptr.as_ptr().add(byte_offset) as *const T).read_unaligned() }
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

/// Width of the elements in an index buffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum IndexType {
    U8,
    U16,
    #[default]
    U32,
}

impl IndexType {
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 => 4,
        }
    }
}

/// A typed element-index buffer.
///
/// The allocation carries one 16-byte tail so 4-wide index fetches at the
/// end of the buffer stay in bounds.
#[derive(Debug, Default)]
pub struct IndexBuffer {
    data: Option<AlignedBuf>,
    ty: IndexType,
    count: usize,
}

impl IndexBuffer {
    pub const fn new() -> Self {
        Self {
            data: None,
            ty: IndexType::U32,
            count: 0,
        }
    }

    pub fn init(&mut self, ty: IndexType, count: usize) -> Result<(), Error> {
        if count == 0 {
            return Err(Error::InvalidArgument);
        }

        self.data = Some(AlignedBuf::alloc(count * ty.bytes() + BUFFER_ALIGN)?);
        self.ty = ty;
        self.count = count;
        Ok(())
    }

    pub fn terminate(&mut self) {
        self.data = None;
        self.count = 0;
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    pub fn index_type(&self) -> IndexType {
        self.ty
    }

    pub fn count(&self) -> usize {
        self.count
    }

    pub fn set_index(&mut self, i: usize, value: u32) -> Result<(), Error> {
        if i >= self.count {
            return Err(Error::InvalidArgument);
        }
        let ty = self.ty;
        let data = self.data.as_mut().ok_or(Error::InvalidArgument)?;

        match ty {
            IndexType::U8 => data[i] = value as u8,
            IndexType::U16 => {
                data[i * 2..i * 2 + 2].copy_from_slice(&(value as u16).to_ne_bytes());
            }
            IndexType::U32 => {
                data[i * 4..i * 4 + 4].copy_from_slice(&value.to_ne_bytes());
            }
        }
        Ok(())
    }

    /// Uploads a full index list, converting to the buffer's element type.
    pub fn assign(&mut self, indices: &[u32]) -> Result<(), Error> {
        if indices.len() > self.count {
            return Err(Error::InvalidArgument);
        }
        for (i, &v) in indices.iter().enumerate() {
            self.set_index(i, v)?;
        }
        Ok(())
    }

    /// Reads one index, widened to `usize`.
    #[inline]
    pub fn index(&self, i: usize) -> usize {
        debug_assert!(i < self.count);
        let data = self.data.as_ref().unwrap();
        let ptr = data.ptr.as_ptr();

        // SAFETY: `i` is inside the element range checked above.
        unsafe {
            match self.ty {
                IndexType::U8 => *ptr.add(i) as usize,
                IndexType::U16 => (ptr.add(i * 2) as *const u16).read_unaligned() as usize,
                IndexType::U32 => (ptr.add(i * 4) as *const u32).read_unaligned() as usize,
            }
        }
    }

    /// Reads four consecutive indices in one go. The tail padding keeps the
    /// load valid even when fewer than four elements remain.
    #[inline]
    pub fn index4(&self, i: usize) -> [usize; 4] {
        debug_assert!(i < self.count);
        let data = self.data.as_ref().unwrap();
        let ptr = data.ptr.as_ptr();

        // SAFETY: `i` is in range and the 16-byte tail covers the overread.
        unsafe {
            match self.ty {
                IndexType::U8 => {
                    let v = (ptr.add(i) as *const [u8; 4]).read_unaligned();
                    [v[0] as usize, v[1] as usize, v[2] as usize, v[3] as usize]
                }
                IndexType::U16 => {
                    let v = (ptr.add(i * 2) as *const [u16; 4]).read_unaligned();
                    [v[0] as usize, v[1] as usize, v[2] as usize, v[3] as usize]
                }
                IndexType::U32 => {
                    let v = (ptr.add(i * 4) as *const [u32; 4]).read_unaligned();
                    [v[0] as usize, v[1] as usize, v[2] as usize, v[3] as usize]
                }
            }
        }
    }
}

/// A byte buffer for shader-wide constants. Owned by the context, borrowed
/// read-only by shaders for the duration of a draw.
#[derive(Debug, Default)]
pub struct UniformBuffer {
    data: Option<AlignedBuf>,
}

impl UniformBuffer {
    pub const fn new() -> Self {
        Self { data: None }
    }

    pub fn init(&mut self, num_bytes: usize) -> Result<(), Error> {
        self.data = Some(AlignedBuf::alloc(num_bytes)?);
        Ok(())
    }

    pub fn terminate(&mut self) {
        self.data = None;
    }

    pub fn is_valid(&self) -> bool {
        self.data.is_some()
    }

    pub fn num_bytes(&self) -> usize {
        self.data.as_ref().map_or(0, |d| d.len)
    }

    /// Stores a typed uniform block at the start of the buffer.
    pub fn assign<T: Pod>(&mut self, value: &T) -> Result<(), Error> {
        let src = bytemuck::bytes_of(value);
        let data = self.data.as_mut().ok_or(Error::InvalidArgument)?;
        if src.len() > data.len {
            return Err(Error::InvalidArgument);
        }
        data[..src.len()].copy_from_slice(src);
        Ok(())
    }

    /// Borrows the buffer contents as a typed uniform block.
    ///
    /// The backing allocation is 16-byte aligned, which covers every `Pod`
    /// uniform layout the pipeline math produces.
    #[inline]
    pub fn as_ref<T: Pod>(&self) -> &T {
        let data = self.data.as_ref().unwrap();
        bytemuck::from_bytes(&data[..size_of::<T>()])
    }

    pub fn as_bytes(&self) -> &[u8] {
        self.data.as_deref().unwrap_or(&[])
    }
}

#[cfg(test)]
mod tests {
    use bytemuck::{Pod, Zeroable};

    use super::{IndexBuffer, IndexType, UniformBuffer, VertexBuffer};
    use crate::Error;

    #[test]
    fn vbo_assign_and_fetch() {
        let mut vbo = VertexBuffer::new();
        vbo.init(64).unwrap();

        vbo.assign(0, &[1.0f32, 2.0, 3.0]).unwrap();
        vbo.assign(12, &[4.0f32]).unwrap();

        assert_eq!(vbo.element::<[f32; 4]>(0), [1.0, 2.0, 3.0, 4.0]);
        assert_eq!(vbo.element::<f32>(8), 3.0);
    }

    #[test]
    fn vbo_rejects_overflow() {
        let mut vbo = VertexBuffer::new();
        vbo.init(8).unwrap();
        assert_eq!(vbo.assign(4, &[1.0f32, 2.0]), Err(Error::InvalidArgument));
    }

    #[test]
    fn ibo_widens_all_element_types() {
        for ty in [IndexType::U8, IndexType::U16, IndexType::U32] {
            let mut ibo = IndexBuffer::new();
            ibo.init(ty, 6).unwrap();
            ibo.assign(&[0, 1, 2, 2, 1, 3]).unwrap();

            assert_eq!(ibo.index(0), 0);
            assert_eq!(ibo.index(3), 2);
            assert_eq!(ibo.index(5), 3);
            assert_eq!(ibo.index4(2), [2, 2, 1, 3]);
        }
    }

    #[test]
    fn ibo_tail_keeps_batched_fetch_in_bounds() {
        let mut ibo = IndexBuffer::new();
        ibo.init(IndexType::U32, 3).unwrap();
        ibo.assign(&[7, 8, 9]).unwrap();

        // The three live elements are correct; the 4th lane reads padding.
        let v = ibo.index4(0);
        assert_eq!(&v[..3], &[7, 8, 9]);
    }

    #[derive(Copy, Clone, Debug, PartialEq, Zeroable, Pod)]
    #[repr(C)]
    struct TestUniforms {
        scale: [f32; 4],
        bias: [f32; 4],
    }

    #[test]
    fn ubo_typed_round_trip() {
        let uniforms = TestUniforms {
            scale: [1.0, 2.0, 3.0, 4.0],
            bias: [0.5; 4],
        };

        let mut ubo = UniformBuffer::new();
        ubo.init(size_of::<TestUniforms>()).unwrap();
        ubo.assign(&uniforms).unwrap();

        assert_eq!(ubo.as_ref::<TestUniforms>(), &uniforms);
    }
}
