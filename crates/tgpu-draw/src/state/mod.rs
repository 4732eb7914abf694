//! Pipeline state bound on a [`crate::Context`] and the hardware words derived from it.

mod blend;
mod depth_stencil;
mod framebuffer;
mod rasterizer;
mod shader;
mod topology;
mod vertex;
mod viewport;

pub use blend::{
    decode_alpha_blend, AlphaBlendFields, BlendColor, BlendFactor, BlendFunc, BlendState,
    ColorMask, RtBlendState,
};
pub use depth_stencil::{
    CompareFunc, DepthStencilAlphaState, StencilOp, StencilRef, StencilState, StencilWords,
};
pub use framebuffer::{FramebufferKey, FramebufferState, Surface, SurfaceRef};
pub use rasterizer::{CullFace, RasterizerState};
pub use shader::{FsShader, VaryingInfo, VsShader};
pub use topology::{PrimMode, Split};
pub use vertex::{attribute_descriptor, ChannelType, VertexBuffer, VertexElement, VertexFormat};
pub use viewport::{Viewport, ViewportState, ViewportTransform};

/// Scissor rectangle in pixels, `min` inclusive and `max` exclusive.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct ScissorState {
    pub minx: u32,
    pub miny: u32,
    pub maxx: u32,
    pub maxy: u32,
}

/// Vertex or fragment constant buffer contents.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct ConstantBuffer {
    pub data: Option<Vec<u8>>,
    pub(crate) dirty: bool,
}

impl ConstantBuffer {
    pub fn size(&self) -> u32 {
        self.data.as_ref().map_or(0, |d| d.len() as u32)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Fragment,
}
