use thiserror::Error;

use crate::ctx_buff::CtxBuff;
use crate::state::{BlendFactor, PrimMode};

/// Reasons a single draw (or state change) is rejected.
///
/// A rejection only affects the call that produced it: the other draws of a multi-draw and the
/// jobs already recorded are left intact.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DrawError {
    #[error("{count} vertices do not form a single {mode:?} primitive")]
    ModeCountMismatch { mode: PrimMode, count: u32 },

    #[error("blend factor {0:?} is not supported")]
    UnsupportedBlendFactor(BlendFactor),

    #[error("index size {0} is not supported (expected 1, 2 or 4)")]
    UnsupportedIndexSize(u8),

    #[error("indexed draw without index data")]
    MissingIndexData,

    #[error("vertex element {element} reads unbound vertex buffer {buffer}")]
    UnboundVertexBuffer { element: usize, buffer: u32 },

    #[error("index range {start}+{count} exceeds the {len}-byte index data")]
    IndexRangeOutOfBounds { start: u32, count: u32, len: usize },

    #[error("index bias {bias} moves vertex {min_index} below zero")]
    NegativeBaseVertex { min_index: u32, bias: i32 },

    #[error("context buffer {0:?} read before it was uploaded")]
    ContextBufferNotUploaded(CtxBuff),

    #[error("{mode:?} draws cannot be split at {max_vertices} vertices")]
    UnsplittableDraw { mode: PrimMode, max_vertices: u32 },

    #[error("{0} sampler views bound, at most {max} fit the texture list", max = crate::texture::MAX_SAMPLER_VIEWS)]
    TooManySamplerViews(usize),

    #[error("buffer allocation of {size} bytes failed")]
    OutOfMemory { size: u32 },
}
