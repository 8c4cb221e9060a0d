//! Shader programs and pipeline state.
//!
//! Shaders are plain function pointers supplied by the embedding program;
//! the pipeline state word packs everything the rasterizer dispatch needs
//! to pick a specialization.

use glam::Vec4;

use crate::buffer::{UniformBuffer, VertexBuffer};
use crate::pipeline::{MAX_FRAG_OUTPUTS, MAX_VARYINGS};
use crate::vertex_array::VertexArray;
use crate::{Error, UboId};

/// Triangle culling.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum CullMode {
    Off = 0,
    #[default]
    Back = 1,
    Front = 2,
}

/// Depth comparison applied before a fragment is queued.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum DepthTest {
    #[default]
    Off = 0,
    Lt = 1,
    Le = 2,
    Gt = 3,
    Ge = 4,
    Eq = 5,
    Ne = 6,
}

impl DepthTest {
    /// Compares an incoming depth against the stored value.
    #[inline]
    pub fn passes(self, incoming: f32, stored: f32) -> bool {
        match self {
            Self::Off => true,
            Self::Lt => incoming < stored,
            Self::Le => incoming <= stored,
            Self::Gt => incoming > stored,
            Self::Ge => incoming >= stored,
            Self::Eq => incoming == stored,
            Self::Ne => incoming != stored,
        }
    }
}

/// How fragment output colors combine with the framebuffer.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum BlendMode {
    #[default]
    Off = 0,
    Alpha = 1,
    PremultipliedAlpha = 2,
    Additive = 3,
    Screen = 4,
}

impl BlendMode {
    /// Combines `src` over `dst` in linear float space.
    #[inline]
    pub fn blend(self, src: Vec4, dst: Vec4) -> Vec4 {
        match self {
            Self::Off => src,
            Self::Alpha => src * src.w + dst * (1.0 - src.w),
            Self::PremultipliedAlpha => src + dst * (1.0 - src.w),
            Self::Additive => src + dst,
            Self::Screen => src + dst - src * dst,
        }
    }
}

/// Everything the rasterizer dispatch needs, packed into one word.
///
/// Layout (low to high): cull 2 bits, depth test 3, depth mask 1, blend 3,
/// varying count 3, output count 3.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct PipelineState(u32);

impl PipelineState {
    const CULL_SHIFT: u32 = 0;
    const DEPTH_TEST_SHIFT: u32 = 2;
    const DEPTH_MASK_SHIFT: u32 = 5;
    const BLEND_SHIFT: u32 = 6;
    const VARYINGS_SHIFT: u32 = 9;
    const OUTPUTS_SHIFT: u32 = 12;

    pub fn new(
        cull: CullMode,
        depth_test: DepthTest,
        depth_mask: bool,
        blend: BlendMode,
        num_varyings: usize,
        num_outputs: usize,
    ) -> Self {
        debug_assert!(num_varyings <= MAX_VARYINGS);
        debug_assert!(num_outputs <= MAX_FRAG_OUTPUTS);

        Self(
            (cull as u32) << Self::CULL_SHIFT
                | (depth_test as u32) << Self::DEPTH_TEST_SHIFT
                | (depth_mask as u32) << Self::DEPTH_MASK_SHIFT
                | (blend as u32) << Self::BLEND_SHIFT
                | (num_varyings as u32) << Self::VARYINGS_SHIFT
                | (num_outputs as u32) << Self::OUTPUTS_SHIFT,
        )
    }

    #[inline]
    pub fn cull_mode(self) -> CullMode {
        match (self.0 >> Self::CULL_SHIFT) & 0x3 {
            0 => CullMode::Off,
            1 => CullMode::Back,
            _ => CullMode::Front,
        }
    }

    #[inline]
    pub fn depth_test(self) -> DepthTest {
        match (self.0 >> Self::DEPTH_TEST_SHIFT) & 0x7 {
            0 => DepthTest::Off,
            1 => DepthTest::Lt,
            2 => DepthTest::Le,
            3 => DepthTest::Gt,
            4 => DepthTest::Ge,
            5 => DepthTest::Eq,
            _ => DepthTest::Ne,
        }
    }

    #[inline]
    pub fn depth_mask(self) -> bool {
        (self.0 >> Self::DEPTH_MASK_SHIFT) & 0x1 != 0
    }

    #[inline]
    pub fn blend_mode(self) -> BlendMode {
        match (self.0 >> Self::BLEND_SHIFT) & 0x7 {
            0 => BlendMode::Off,
            1 => BlendMode::Alpha,
            2 => BlendMode::PremultipliedAlpha,
            3 => BlendMode::Additive,
            _ => BlendMode::Screen,
        }
    }

    #[inline]
    pub fn num_varyings(self) -> usize {
        ((self.0 >> Self::VARYINGS_SHIFT) & 0x7) as usize
    }

    #[inline]
    pub fn num_outputs(self) -> usize {
        ((self.0 >> Self::OUTPUTS_SHIFT) & 0x7) as usize
    }
}

/// Inputs to a vertex shader invocation.
pub struct VertexParam<'a> {
    pub uniforms: &'a UniformBuffer,
    pub vert_id: usize,
    pub instance_id: usize,
    pub vao: &'a VertexArray,
    pub vbo: &'a VertexBuffer,
    /// Output slots; the shader fills the first `num_varyings`.
    pub varyings: &'a mut [Vec4; MAX_VARYINGS],
}

/// Returns the clip-space position and writes varyings through the param
/// block.
pub type VertexShaderFn = fn(&mut VertexParam<'_>) -> Vec4;

/// Screen location of a fragment.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct FragCoord {
    pub x: u16,
    pub y: u16,
    pub depth: f32,
}

/// Inputs and outputs of a fragment shader invocation.
pub struct FragmentParam<'a> {
    pub coord: FragCoord,
    pub uniforms: &'a UniformBuffer,
    /// Interpolated varyings; the first `num_varyings` are meaningful.
    pub varyings: [Vec4; MAX_VARYINGS],
    /// Render-target outputs. Slots beyond `num_outputs` are ignored.
    pub outputs: [Vec4; MAX_FRAG_OUTPUTS],
}

/// Returns `false` to discard the fragment (depth, if masked on, is
/// already committed).
pub type FragmentShaderFn = fn(&mut FragmentParam<'_>) -> bool;

/// Vertex stage configuration.
#[derive(Copy, Clone, Debug)]
pub struct VertexShader {
    pub num_varyings: usize,
    pub cull_mode: CullMode,
    pub shader: VertexShaderFn,
}

/// Fragment stage configuration.
#[derive(Copy, Clone, Debug)]
pub struct FragmentShader {
    pub num_varyings: usize,
    pub num_outputs: usize,
    pub blend: BlendMode,
    pub depth_test: DepthTest,
    pub depth_mask: bool,
    pub shader: FragmentShaderFn,
}

/// A linked shader program. Immutable once created.
#[derive(Debug)]
pub struct Shader {
    vert: VertexShader,
    frag: FragmentShader,
    uniforms: Option<UboId>,
    state: PipelineState,
}

impl Shader {
    /// Links a vertex and fragment stage.
    ///
    /// The vertex stage must produce at least as many varyings as the
    /// fragment stage consumes, and all counts are bounded by the pipeline
    /// limits.
    pub fn new(
        vert: VertexShader,
        frag: FragmentShader,
        uniforms: Option<UboId>,
    ) -> Result<Self, Error> {
        if vert.num_varyings > MAX_VARYINGS
            || frag.num_varyings > MAX_VARYINGS
            || vert.num_varyings < frag.num_varyings
            || frag.num_outputs > MAX_FRAG_OUTPUTS
        {
            return Err(Error::InvalidShader);
        }

        let state = PipelineState::new(
            vert.cull_mode,
            frag.depth_test,
            frag.depth_mask,
            frag.blend,
            vert.num_varyings,
            frag.num_outputs,
        );

        Ok(Self {
            vert,
            frag,
            uniforms,
            state,
        })
    }

    pub fn vertex_shader(&self) -> &VertexShader {
        &self.vert
    }

    pub fn fragment_shader(&self) -> &FragmentShader {
        &self.frag
    }

    pub fn uniforms(&self) -> Option<UboId> {
        self.uniforms
    }

    pub fn pipeline_state(&self) -> PipelineState {
        self.state
    }

    pub fn num_varyings(&self) -> usize {
        self.vert.num_varyings
    }

    pub fn num_outputs(&self) -> usize {
        self.frag.num_outputs
    }
}

#[cfg(test)]
mod tests {
    use glam::Vec4;

    use super::{
        BlendMode, CullMode, DepthTest, FragmentParam, FragmentShader, PipelineState, Shader,
        VertexParam, VertexShader,
    };
    use crate::Error;

    fn vs_noop(_: &mut VertexParam<'_>) -> Vec4 {
        Vec4::ZERO
    }

    fn fs_noop(_: &mut FragmentParam<'_>) -> bool {
        true
    }

    fn vert(num_varyings: usize) -> VertexShader {
        VertexShader {
            num_varyings,
            cull_mode: CullMode::Off,
            shader: vs_noop,
        }
    }

    fn frag(num_varyings: usize, num_outputs: usize) -> FragmentShader {
        FragmentShader {
            num_varyings,
            num_outputs,
            blend: BlendMode::Off,
            depth_test: DepthTest::Off,
            depth_mask: false,
            shader: fs_noop,
        }
    }

    #[test]
    fn pipeline_state_round_trip() {
        let state = PipelineState::new(CullMode::Front, DepthTest::Ge, true, BlendMode::Screen, 3, 2);

        assert_eq!(state.cull_mode(), CullMode::Front);
        assert_eq!(state.depth_test(), DepthTest::Ge);
        assert!(state.depth_mask());
        assert_eq!(state.blend_mode(), BlendMode::Screen);
        assert_eq!(state.num_varyings(), 3);
        assert_eq!(state.num_outputs(), 2);
    }

    #[test]
    fn depth_comparisons() {
        assert!(DepthTest::Off.passes(5.0, 1.0));
        assert!(DepthTest::Lt.passes(0.5, 1.0));
        assert!(!DepthTest::Lt.passes(1.0, 1.0));
        assert!(DepthTest::Le.passes(1.0, 1.0));
        assert!(DepthTest::Gt.passes(2.0, 1.0));
        assert!(DepthTest::Ge.passes(1.0, 1.0));
        assert!(DepthTest::Eq.passes(1.0, 1.0));
        assert!(DepthTest::Ne.passes(0.0, 1.0));
    }

    #[test]
    fn blend_equations() {
        let src = Vec4::new(1.0, 0.0, 0.0, 0.5);
        let dst = Vec4::new(0.0, 0.0, 1.0, 1.0);

        let alpha = BlendMode::Alpha.blend(src, dst);
        assert!((alpha.x - 0.5).abs() < 1e-6);
        assert!((alpha.z - 0.5).abs() < 1e-6);

        let add = BlendMode::Additive.blend(src, dst);
        assert_eq!(add, Vec4::new(1.0, 0.0, 1.0, 1.5));

        let screen = BlendMode::Screen.blend(src, dst);
        assert_eq!(screen, Vec4::new(1.0, 0.0, 1.0, 1.0));

        let pma = BlendMode::PremultipliedAlpha.blend(src, dst);
        assert_eq!(pma, Vec4::new(1.0, 0.0, 0.5, 1.0));
    }

    #[test]
    fn shader_linking_checks_varying_counts() {
        assert!(Shader::new(vert(2), frag(2, 1), None).is_ok());
        assert!(Shader::new(vert(4), frag(2, 1), None).is_ok());

        assert_eq!(
            Shader::new(vert(1), frag(2, 1), None).unwrap_err(),
            Error::InvalidShader
        );
        assert_eq!(
            Shader::new(vert(5), frag(0, 1), None).unwrap_err(),
            Error::InvalidShader
        );
    }
}
