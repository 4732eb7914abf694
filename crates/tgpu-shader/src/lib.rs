//! `tgpu-shader` holds the shader-side half of the tile GPU driver.
//!
//! It provides:
//! - A small SSA shader IR with a builder (see [`ir`] and [`Builder`]).
//! - Lowering of ray-tracing system values into loads from the RT dispatch globals, MemHit,
//!   MemRay and BVH instance leaf records (see [`rt::lower_rt_intrinsics`]).
//! - Lowering of compute system values into subgroup arithmetic (see
//!   [`cs::lower_cs_intrinsics`]).
//! - A reference interpreter used to check lowered programs against a memory image
//!   (see [`interp`]).

mod builder;
mod device;
mod error;
mod intrinsic;
mod pass;
mod shader;

pub mod cs;
pub mod interp;
pub mod ir;
pub mod rt;

pub use builder::Builder;
pub use cs::lower_cs_intrinsics;
pub use device::{DeviceInfo, HOTZONE_SIZE};
pub use error::LowerError;
pub use intrinsic::{reloc, Intrinsic};
pub use rt::lower_rt_intrinsics;
pub use shader::{ComputeInfo, DerivativeGroup, Shader, ShaderStage};
