//! Tile GPU driver core.
//!
//! - [`shader`]: shader IR and the lowering of ray-tracing and compute system values.
//! - [`draw`]: bound pipeline state, draw/clear packing into GP and PLBU command streams, and
//!   per-framebuffer job tracking.

pub use tgpu_draw as draw;
pub use tgpu_shader as shader;
