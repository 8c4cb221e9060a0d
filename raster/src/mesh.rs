//! Mesh records: what a draw call draws.

use crate::VaoId;

/// Primitive topology plus whether element ids come from the index buffer.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RenderMode {
    Points,
    IndexedPoints,
    Lines,
    IndexedLines,
    Triangles,
    IndexedTriangles,
    /// Indexed triangles rasterized as edges.
    IndexedTriWire,
}

impl RenderMode {
    /// Vertices per primitive for partitioning and index stepping.
    pub const fn verts_per_prim(self) -> usize {
        match self {
            Self::Points | Self::IndexedPoints => 1,
            Self::Lines | Self::IndexedLines => 2,
            Self::Triangles | Self::IndexedTriangles | Self::IndexedTriWire => 3,
        }
    }

    pub const fn is_indexed(self) -> bool {
        matches!(
            self,
            Self::IndexedPoints | Self::IndexedLines | Self::IndexedTriangles | Self::IndexedTriWire
        )
    }
}

/// A contiguous element range of a vertex array, drawn with one topology.
#[derive(Copy, Clone, Debug)]
pub struct Mesh {
    pub vao: VaoId,
    pub mode: RenderMode,
    /// First element (vertex id or index-buffer slot) to draw.
    pub element_begin: usize,
    /// One past the last element.
    pub element_end: usize,
    /// Opaque per-mesh tag for the embedding program; the core ignores it.
    pub material_id: u32,
}

impl Mesh {
    pub fn num_elements(&self) -> usize {
        self.element_end.saturating_sub(self.element_begin)
    }
}

#[cfg(test)]
mod tests {
    use super::RenderMode;

    #[test]
    fn verts_per_prim() {
        assert_eq!(RenderMode::Points.verts_per_prim(), 1);
        assert_eq!(RenderMode::IndexedLines.verts_per_prim(), 2);
        assert_eq!(RenderMode::Triangles.verts_per_prim(), 3);
        assert_eq!(RenderMode::IndexedTriWire.verts_per_prim(), 3);
    }

    #[test]
    fn indexed_modes() {
        assert!(RenderMode::IndexedTriangles.is_indexed());
        assert!(RenderMode::IndexedTriWire.is_indexed());
        assert!(!RenderMode::Triangles.is_indexed());
        assert!(!RenderMode::Points.is_indexed());
    }
}
