//! A CPU rasterizing renderer.
//!
//! Vertex and index buffers go in, pixels land in framebuffer attachments;
//! vertex and fragment shaders are function pointers supplied by the
//! embedding program. There is no GPU, no driver and no shader language —
//! every stage runs on a pool of worker threads owned by the [`Context`].

pub mod buffer;
pub mod color;
pub mod context;
pub mod framebuffer;
pub mod mesh;
pub mod pipeline;
pub mod shader;
pub mod swizzle;
pub mod texture;
pub mod vertex_array;
pub mod view;

mod pool;

use slotmap::DefaultKey;
use thiserror::Error;

pub use crate::context::Context;
pub use crate::mesh::{Mesh, RenderMode};
pub use crate::shader::{
    BlendMode, CullMode, DepthTest, FragCoord, FragmentParam, FragmentShader, VertexParam,
    VertexShader,
};
pub use crate::swizzle::TexelOrder;
pub use crate::texture::TextureView;
pub use crate::view::Rect;

/// Everything that can go wrong at the rendering core's surface.
///
/// Failed operations never leave partial state behind: a failed draw leaves
/// the framebuffer untouched, a failed creation leaves the registry
/// unchanged.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Error)]
pub enum Error {
    /// A handle did not resolve, an index was out of range, or bound
    /// resources are inconsistent with the requested operation.
    #[error("invalid argument")]
    InvalidArgument,
    /// Vertex/fragment varying counts are mismatched or exceed the
    /// pipeline limits.
    #[error("invalid shader")]
    InvalidShader,
    /// A texture or buffer allocation failed.
    #[error("out of memory")]
    OutOfMemory,
}

macro_rules! resource_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
        pub struct $name(pub(crate) DefaultKey);
    };
}

resource_id!(
    /// Handle to a context-owned texture.
    TextureId
);
resource_id!(
    /// Handle to a context-owned vertex buffer.
    VboId
);
resource_id!(
    /// Handle to a context-owned index buffer.
    IboId
);
resource_id!(
    /// Handle to a context-owned uniform buffer.
    UboId
);
resource_id!(
    /// Handle to a context-owned vertex array.
    VaoId
);
resource_id!(
    /// Handle to a context-owned framebuffer.
    FboId
);
resource_id!(
    /// Handle to a context-owned shader program.
    ShaderId
);
