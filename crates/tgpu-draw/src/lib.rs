//! `tgpu-draw` packs draws and clears for a tile-based GPU with a split geometry/pixel
//! pipeline.
//!
//! A [`Context`] holds the bound pipeline state. Each draw turns that state into:
//! - GP command words (vertex shading) and PLBU command words (polygon list building), see
//!   [`cmd`];
//! - the records those words point at: uniforms, attribute and varying descriptor tables, the
//!   render state word block ([`rsw`]) and texture descriptors;
//! - buffer object references tagged with the pipe and access that uses them.
//!
//! Work is grouped into per-framebuffer [`Job`]s. Flushed jobs are drained with
//! [`Context::take_submitted`] and handed to the kernel by the caller.

mod context;
mod ctx_buff;
mod draw;
mod error;
mod index;
mod job;
mod rect;
mod stats;
mod util;
mod varying;

pub mod bo;
pub mod cmd;
pub mod rsw;
pub mod state;
pub mod texture;

pub use bo::{BoAllocator, BoHandle, BoRef, BufferObject, VaAllocator};
pub use context::{Context, ContextConfig, DirtyFlags};
pub use ctx_buff::{BufferState, CtxBuff, CtxBuffers, StreamUploader};
pub use draw::{DrawStatus, SkipReason};
pub use error::DrawError;
pub use index::{scan_min_max, DrawInfo, DrawStartCount, IndexBuffer, IndexSource, MinMaxCache};
pub use job::{BoAccess, ClearBuffers, Job, JobBo, JobClear, JobId, JobTracker, Pipe};
pub use rect::{clip_scissor_to_viewport, Rect};
pub use stats::ContextStats;
pub use texture::SamplerView;
pub use varying::{varying_types, VaryingLayout};
