//! Vertex array objects: a VBO/IBO binding plus attribute layout.

use crate::{IboId, VboId};

/// Scalar type of a vertex attribute component.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum AttribType {
    U8,
    U16,
    U32,
    F32,
}

impl AttribType {
    pub const fn bytes(self) -> usize {
        match self {
            Self::U8 => 1,
            Self::U16 => 2,
            Self::U32 | Self::F32 => 4,
        }
    }
}

/// Where one attribute lives inside the bound vertex buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct VertexAttrib {
    pub offset: usize,
    pub stride: usize,
    pub ty: AttribType,
    pub components: usize,
}

impl VertexAttrib {
    /// Byte offset of this attribute for a given vertex.
    #[inline]
    pub const fn byte_offset(&self, vert_id: usize) -> usize {
        self.offset + self.stride * vert_id
    }

    /// Bytes one vertex's worth of this attribute occupies.
    #[inline]
    pub const fn num_bytes(&self) -> usize {
        self.ty.bytes() * self.components
    }

    /// One past the last byte this attribute reads for `count` vertices,
    /// or `None` on arithmetic overflow.
    pub fn span_bytes(&self, count: usize) -> Option<usize> {
        if count == 0 {
            return Some(0);
        }

        self.stride
            .checked_mul(count - 1)
            .and_then(|v| v.checked_add(self.offset))
            .and_then(|v| v.checked_add(self.num_bytes()))
    }
}

/// Binds a vertex buffer, an optional index buffer and the attribute
/// descriptors shaders read vertices through.
#[derive(Debug, Default)]
pub struct VertexArray {
    vbo: Option<VboId>,
    ibo: Option<IboId>,
    attribs: Vec<VertexAttrib>,
}

impl VertexArray {
    pub const fn new() -> Self {
        Self {
            vbo: None,
            ibo: None,
            attribs: Vec::new(),
        }
    }

    pub fn set_vertex_buffer(&mut self, vbo: VboId) {
        self.vbo = Some(vbo);
    }

    pub fn vertex_buffer(&self) -> Option<VboId> {
        self.vbo
    }

    pub fn set_index_buffer(&mut self, ibo: Option<IboId>) {
        self.ibo = ibo;
    }

    pub fn index_buffer(&self) -> Option<IboId> {
        self.ibo
    }

    pub fn has_index_buffer(&self) -> bool {
        self.ibo.is_some()
    }

    /// Appends an attribute descriptor and returns its index.
    pub fn add_attribute(
        &mut self,
        offset: usize,
        stride: usize,
        ty: AttribType,
        components: usize,
    ) -> usize {
        self.attribs.push(VertexAttrib {
            offset,
            stride,
            ty,
            components,
        });
        self.attribs.len() - 1
    }

    pub fn attribute(&self, index: usize) -> Option<&VertexAttrib> {
        self.attribs.get(index)
    }

    pub fn num_attributes(&self) -> usize {
        self.attribs.len()
    }

    pub fn clear_attributes(&mut self) {
        self.attribs.clear();
    }
}
