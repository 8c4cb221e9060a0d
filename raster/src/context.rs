//! The rendering context: resource registry plus dispatch surface.
//!
//! The context is the sole owner of every GPU-analog resource; callers
//! hold opaque handles into per-kind tables. Cross-references between
//! resources (framebuffer attachments, a shader's uniform buffer, a vertex
//! array's buffers) are handles too, resolved and validated at dispatch
//! time so a failed call never leaves partial state behind.

use slotmap::{DefaultKey, SlotMap};

use crate::buffer::{IndexBuffer, UniformBuffer, VertexBuffer};
use crate::color::{Color, ColorRgba};
use crate::framebuffer::{Framebuffer, FramebufferView, MAX_COLOR_ATTACHMENTS};
use crate::mesh::Mesh;
use crate::pipeline::clear::MAX_CLEAR_TARGETS;
use crate::pool::{BoundMesh, DrawFrame, ProcessorPool};
use crate::shader::{FragmentShader, Shader, VertexShader};
use crate::texture::{Texture, TextureView};
use crate::vertex_array::VertexArray;
use crate::view::{Rect, ViewportState};
use crate::{Error, FboId, IboId, ShaderId, TextureId, UboId, VaoId, VboId};

/// Stands in when a shader has no uniform buffer bound.
static EMPTY_UNIFORMS: UniformBuffer = UniformBuffer::new();

/// Owns all rendering resources and the worker pool.
///
/// Entry points are stateless: all input arrives through parameters and
/// all output lands in the named framebuffer. A draw does not return until
/// its last pixel is committed.
pub struct Context {
    textures: SlotMap<DefaultKey, Texture>,
    vbos: SlotMap<DefaultKey, VertexBuffer>,
    ibos: SlotMap<DefaultKey, IndexBuffer>,
    ubos: SlotMap<DefaultKey, UniformBuffer>,
    vaos: SlotMap<DefaultKey, VertexArray>,
    fbos: SlotMap<DefaultKey, Framebuffer>,
    shaders: SlotMap<DefaultKey, Shader>,
    view_state: ViewportState,
    pool: ProcessorPool,
}

impl Context {
    /// A context with one worker per available CPU.
    pub fn new() -> Self {
        let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
        Self::with_threads(threads)
    }

    pub fn with_threads(num_threads: usize) -> Self {
        Self {
            textures: SlotMap::new(),
            vbos: SlotMap::new(),
            ibos: SlotMap::new(),
            ubos: SlotMap::new(),
            vaos: SlotMap::new(),
            fbos: SlotMap::new(),
            shaders: SlotMap::new(),
            view_state: ViewportState::new(),
            pool: ProcessorPool::new(num_threads),
        }
    }

    // ---- Worker pool -----------------------------------------------------

    pub fn num_threads(&self) -> usize {
        self.pool.concurrency()
    }

    /// Resizes the worker pool, clamped to at least one thread. Resets all
    /// per-thread pipeline storage.
    pub fn set_num_threads(&mut self, num_threads: usize) -> usize {
        self.pool.set_concurrency(num_threads)
    }

    // ---- View state ------------------------------------------------------

    pub fn set_viewport(&mut self, rect: Rect) {
        self.view_state.set_viewport(rect);
    }

    pub fn reset_viewport(&mut self) {
        self.view_state.reset_viewport();
    }

    pub fn set_scissor(&mut self, rect: Rect) {
        self.view_state.set_scissor(rect);
    }

    pub fn reset_scissor(&mut self) {
        self.view_state.reset_scissor();
    }

    // ---- Resources -------------------------------------------------------

    pub fn create_texture(&mut self) -> TextureId {
        TextureId(self.textures.insert(Texture::new()))
    }

    /// Destroys a texture and detaches it from every framebuffer that
    /// still references it.
    pub fn destroy_texture(&mut self, id: TextureId) {
        if self.textures.remove(id.0).is_none() {
            tracing::debug!("destroy_texture on a stale handle");
            return;
        }
        for fbo in self.fbos.values_mut() {
            fbo.drop_texture(id);
        }
    }

    pub fn texture(&self, id: TextureId) -> Result<&Texture, Error> {
        self.textures.get(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn texture_mut(&mut self, id: TextureId) -> Result<&mut Texture, Error> {
        self.textures.get_mut(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn create_vbo(&mut self) -> VboId {
        VboId(self.vbos.insert(VertexBuffer::new()))
    }

    pub fn destroy_vbo(&mut self, id: VboId) {
        self.vbos.remove(id.0);
    }

    pub fn vbo(&self, id: VboId) -> Result<&VertexBuffer, Error> {
        self.vbos.get(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn vbo_mut(&mut self, id: VboId) -> Result<&mut VertexBuffer, Error> {
        self.vbos.get_mut(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn create_ibo(&mut self) -> IboId {
        IboId(self.ibos.insert(IndexBuffer::new()))
    }

    pub fn destroy_ibo(&mut self, id: IboId) {
        self.ibos.remove(id.0);
    }

    pub fn ibo(&self, id: IboId) -> Result<&IndexBuffer, Error> {
        self.ibos.get(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn ibo_mut(&mut self, id: IboId) -> Result<&mut IndexBuffer, Error> {
        self.ibos.get_mut(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn create_ubo(&mut self) -> UboId {
        UboId(self.ubos.insert(UniformBuffer::new()))
    }

    pub fn destroy_ubo(&mut self, id: UboId) {
        self.ubos.remove(id.0);
    }

    pub fn ubo(&self, id: UboId) -> Result<&UniformBuffer, Error> {
        self.ubos.get(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn ubo_mut(&mut self, id: UboId) -> Result<&mut UniformBuffer, Error> {
        self.ubos.get_mut(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn create_vao(&mut self) -> VaoId {
        VaoId(self.vaos.insert(VertexArray::new()))
    }

    pub fn destroy_vao(&mut self, id: VaoId) {
        self.vaos.remove(id.0);
    }

    pub fn vao(&self, id: VaoId) -> Result<&VertexArray, Error> {
        self.vaos.get(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn vao_mut(&mut self, id: VaoId) -> Result<&mut VertexArray, Error> {
        self.vaos.get_mut(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn create_framebuffer(&mut self) -> FboId {
        FboId(self.fbos.insert(Framebuffer::new()))
    }

    pub fn destroy_framebuffer(&mut self, id: FboId) {
        self.fbos.remove(id.0);
    }

    pub fn framebuffer(&self, id: FboId) -> Result<&Framebuffer, Error> {
        self.fbos.get(id.0).ok_or(Error::InvalidArgument)
    }

    pub fn framebuffer_mut(&mut self, id: FboId) -> Result<&mut Framebuffer, Error> {
        self.fbos.get_mut(id.0).ok_or(Error::InvalidArgument)
    }

    /// Links a shader program. Fails with `InvalidShader` when the varying
    /// or output counts break the pipeline limits, and with
    /// `InvalidArgument` when the uniform handle is stale.
    pub fn create_shader(
        &mut self,
        vert: VertexShader,
        frag: FragmentShader,
        uniforms: Option<UboId>,
    ) -> Result<ShaderId, Error> {
        if let Some(id) = uniforms {
            if !self.ubos.contains_key(id.0) {
                return Err(Error::InvalidArgument);
            }
        }

        let shader = Shader::new(vert, frag, uniforms)?;
        Ok(ShaderId(self.shaders.insert(shader)))
    }

    pub fn destroy_shader(&mut self, id: ShaderId) {
        self.shaders.remove(id.0);
    }

    pub fn shader(&self, id: ShaderId) -> Result<&Shader, Error> {
        self.shaders.get(id.0).ok_or(Error::InvalidArgument)
    }

    // ---- Draws -----------------------------------------------------------

    pub fn draw(&mut self, mesh: &Mesh, shader: ShaderId, fbo: FboId) -> Result<(), Error> {
        self.dispatch(std::slice::from_ref(mesh), 1, shader, fbo)
    }

    pub fn draw_instanced(
        &mut self,
        mesh: &Mesh,
        num_instances: usize,
        shader: ShaderId,
        fbo: FboId,
    ) -> Result<(), Error> {
        if num_instances == 0 {
            return Ok(());
        }
        self.dispatch(std::slice::from_ref(mesh), num_instances, shader, fbo)
    }

    pub fn draw_multiple(
        &mut self,
        meshes: &[Mesh],
        shader: ShaderId,
        fbo: FboId,
    ) -> Result<(), Error> {
        if meshes.is_empty() {
            return Ok(());
        }
        self.dispatch(meshes, 1, shader, fbo)
    }

    fn dispatch(
        &mut self,
        meshes: &[Mesh],
        num_instances: usize,
        shader_id: ShaderId,
        fbo_id: FboId,
    ) -> Result<(), Error> {
        let shader = self.shaders.get(shader_id.0).ok_or(Error::InvalidArgument)?;
        let fbo = self.resolve_framebuffer(fbo_id)?;

        let state = shader.pipeline_state();
        if state.depth_test() != crate::DepthTest::Off && fbo.depth.is_none() {
            tracing::warn!("draw with depth test enabled but no depth attachment");
            return Err(Error::InvalidArgument);
        }
        if state.num_outputs() > fbo.num_colors {
            return Err(Error::InvalidArgument);
        }

        let bound = self.bind_meshes(meshes)?;

        let uniforms: *const UniformBuffer = match shader.uniforms() {
            Some(id) => self.ubos.get(id.0).ok_or(Error::InvalidArgument)?,
            None => &EMPTY_UNIFORMS,
        };

        let frame = DrawFrame {
            shader,
            uniforms,
            meshes: bound.as_ptr(),
            num_meshes: bound.len(),
            num_instances,
            mode: meshes[0].mode,
            fbo,
            scissor: self.view_state.scissor_matrix(fbo.width, fbo.height),
            viewport: self.view_state.viewport_rect(fbo.width, fbo.height),
        };

        self.pool.run_shader_processors(&frame);
        Ok(())
    }

    fn bind_meshes(&self, meshes: &[Mesh]) -> Result<Vec<BoundMesh>, Error> {
        meshes
            .iter()
            .map(|&mesh| {
                if mesh.element_end < mesh.element_begin {
                    return Err(Error::InvalidArgument);
                }

                let vao = self.vaos.get(mesh.vao.0).ok_or(Error::InvalidArgument)?;
                let vbo_id = vao.vertex_buffer().ok_or(Error::InvalidArgument)?;
                let vbo = self.vbos.get(vbo_id.0).ok_or(Error::InvalidArgument)?;
                if !vbo.is_valid() {
                    return Err(Error::InvalidArgument);
                }

                let ibo: *const IndexBuffer = if mesh.mode.is_indexed() {
                    let ibo_id = vao.index_buffer().ok_or(Error::InvalidArgument)?;
                    let ibo = self.ibos.get(ibo_id.0).ok_or(Error::InvalidArgument)?;
                    if !ibo.is_valid() || mesh.element_end > ibo.count() {
                        return Err(Error::InvalidArgument);
                    }
                    ibo
                } else {
                    // Non-indexed element ids address the vertex buffer
                    // directly; every declared attribute of the last vertex
                    // must still land inside it.
                    for i in 0..vao.num_attributes() {
                        let attr = vao.attribute(i).ok_or(Error::InvalidArgument)?;
                        let span = attr
                            .span_bytes(mesh.element_end)
                            .ok_or(Error::InvalidArgument)?;
                        if span > vbo.num_bytes() {
                            return Err(Error::InvalidArgument);
                        }
                    }
                    std::ptr::null()
                };

                Ok(BoundMesh {
                    mesh,
                    vao,
                    vbo,
                    ibo,
                })
            })
            .collect()
    }

    fn resolve_framebuffer(&self, id: FboId) -> Result<FramebufferView, Error> {
        let fbo = self.fbos.get(id.0).ok_or(Error::InvalidArgument)?;

        let mut colors = [TextureView::reset(); MAX_COLOR_ATTACHMENTS];
        for (i, slot) in colors.iter_mut().enumerate().take(fbo.num_color_buffers()) {
            let tex_id = fbo.color_buffer(i).ok_or(Error::InvalidArgument)?;
            *slot = *self.textures.get(tex_id.0).ok_or(Error::InvalidArgument)?.view();
        }

        let depth = match fbo.depth_buffer() {
            Some(tex_id) => Some(
                *self
                    .textures
                    .get(tex_id.0)
                    .ok_or(Error::InvalidArgument)?
                    .view(),
            ),
            None => None,
        };

        FramebufferView::validate(colors, fbo.num_color_buffers(), depth)
    }

    // ---- Blits -----------------------------------------------------------

    /// Full-surface blit between two textures, converting texel types as
    /// needed.
    pub fn blit(&mut self, dst: TextureId, src: TextureId) -> Result<(), Error> {
        let src_tex = self.texture(src)?;
        let dst_tex = self.texture(dst)?;
        let src_rect = [0, 0, src_tex.width(), src_tex.height()];
        let dst_rect = [0, 0, dst_tex.width(), dst_tex.height()];
        self.blit_rect(dst, src, src_rect, dst_rect)
    }

    /// Sub-rectangle blit; rectangles are `[x0, y0, x1, y1]`, exclusive on
    /// the high edge.
    pub fn blit_rect(
        &mut self,
        dst: TextureId,
        src: TextureId,
        src_rect: [u16; 4],
        dst_rect: [u16; 4],
    ) -> Result<(), Error> {
        let src_view = *self.texture(src)?.view();
        let dst_view = *self.texture(dst)?.view();
        Self::check_rect(src_rect, src_view.width, src_view.height)?;
        Self::check_rect(dst_rect, dst_view.width, dst_view.height)?;

        self.pool
            .run_blit_processors(src_view, dst_view, src_rect, dst_rect);
        Ok(())
    }

    /// Blits a texture into an externally provided pixel buffer (a window
    /// back buffer). The buffer's view is caller-constructed; the context
    /// neither allocates nor frees it.
    pub fn blit_to_buffer(&mut self, buffer: &TextureView, src: TextureId) -> Result<(), Error> {
        let src_tex = self.texture(src)?;
        let src_rect = [0, 0, src_tex.width(), src_tex.height()];
        let dst_rect = [0, 0, buffer.width, buffer.height];
        self.blit_to_buffer_rect(buffer, src, src_rect, dst_rect)
    }

    pub fn blit_to_buffer_rect(
        &mut self,
        buffer: &TextureView,
        src: TextureId,
        src_rect: [u16; 4],
        dst_rect: [u16; 4],
    ) -> Result<(), Error> {
        if buffer.is_empty() {
            return Err(Error::InvalidArgument);
        }

        let src_view = *self.texture(src)?.view();
        Self::check_rect(src_rect, src_view.width, src_view.height)?;
        Self::check_rect(dst_rect, buffer.width, buffer.height)?;

        self.pool
            .run_blit_processors(src_view, *buffer, src_rect, dst_rect);
        Ok(())
    }

    fn check_rect(rect: [u16; 4], width: u16, height: u16) -> Result<(), Error> {
        let [x0, y0, x1, y1] = rect;
        if x0 >= x1 || y0 >= y1 || x1 > width || y1 > height {
            return Err(Error::InvalidArgument);
        }
        Ok(())
    }

    // ---- Clears ----------------------------------------------------------

    /// Fills one color attachment with a normalized RGBA value.
    pub fn clear_color_buffer(
        &mut self,
        fbo: FboId,
        attachment: usize,
        color: ColorRgba<f64>,
    ) -> Result<(), Error> {
        let view = self.color_attachment_view(fbo, attachment)?;

        let mut targets: [Option<(TextureView, Color)>; MAX_CLEAR_TARGETS] = Default::default();
        targets[0] = Some((view, Color::from_rgba_f64(view.ty, color)));
        self.pool.run_clear_processors(targets);
        Ok(())
    }

    /// Fills the depth attachment with a constant depth.
    pub fn clear_depth_buffer(&mut self, fbo: FboId, depth: f64) -> Result<(), Error> {
        let view = self.depth_attachment_view(fbo)?;

        let mut targets: [Option<(TextureView, Color)>; MAX_CLEAR_TARGETS] = Default::default();
        targets[0] = Some((view, depth_clear_value(view, depth)));
        self.pool.run_clear_processors(targets);
        Ok(())
    }

    /// Clears one color attachment and the depth attachment in one pass.
    pub fn clear_framebuffer(
        &mut self,
        fbo: FboId,
        attachment: usize,
        color: ColorRgba<f64>,
        depth: f64,
    ) -> Result<(), Error> {
        self.clear_framebuffers(fbo, &[(attachment, color)], Some(depth))
    }

    /// Clears up to four color attachments, and the depth attachment when
    /// `depth` is given, in a single pool dispatch.
    pub fn clear_framebuffers(
        &mut self,
        fbo: FboId,
        colors: &[(usize, ColorRgba<f64>)],
        depth: Option<f64>,
    ) -> Result<(), Error> {
        if colors.len() > MAX_COLOR_ATTACHMENTS {
            return Err(Error::InvalidArgument);
        }

        let mut targets: [Option<(TextureView, Color)>; MAX_CLEAR_TARGETS] = Default::default();
        for (slot, &(attachment, color)) in targets.iter_mut().zip(colors) {
            let view = self.color_attachment_view(fbo, attachment)?;
            *slot = Some((view, Color::from_rgba_f64(view.ty, color)));
        }

        if let Some(depth) = depth {
            let view = self.depth_attachment_view(fbo)?;
            targets[MAX_CLEAR_TARGETS - 1] = Some((view, depth_clear_value(view, depth)));
        }

        self.pool.run_clear_processors(targets);
        Ok(())
    }

    fn color_attachment_view(&self, fbo: FboId, attachment: usize) -> Result<TextureView, Error> {
        let fb = self.fbos.get(fbo.0).ok_or(Error::InvalidArgument)?;
        if attachment >= fb.num_color_buffers() {
            return Err(Error::InvalidArgument);
        }
        let tex_id = fb.color_buffer(attachment).ok_or(Error::InvalidArgument)?;
        let view = *self.textures.get(tex_id.0).ok_or(Error::InvalidArgument)?.view();
        if view.is_empty() {
            return Err(Error::InvalidArgument);
        }
        Ok(view)
    }

    fn depth_attachment_view(&self, fbo: FboId) -> Result<TextureView, Error> {
        let fb = self.fbos.get(fbo.0).ok_or(Error::InvalidArgument)?;
        let tex_id = fb.depth_buffer().ok_or(Error::InvalidArgument)?;
        let view = *self.textures.get(tex_id.0).ok_or(Error::InvalidArgument)?.view();
        if view.is_empty() || !view.ty.is_float() {
            return Err(Error::InvalidArgument);
        }
        Ok(view)
    }
}

/// A depth clear carried through the generic clear-value record.
fn depth_clear_value(view: TextureView, depth: f64) -> Color {
    Color::from_rgba_f64(view.ty, ColorRgba::new(depth, 0.0, 0.0, 0.0))
}

impl Default for Context {
    fn default() -> Self {
        Self::new()
    }
}
